//! # wxpay - WeChat Pay merchant gateway client
//!
//! Builds MD5-signed XML requests, submits them over plain or mutual-TLS HTTP,
//! verifies signed responses and drives the payment lifecycle: pay, query,
//! refund, reverse, refund query and prepay, plus bounded order polling and
//! notification relaying.

pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod params;
pub mod polling;
pub mod response;
pub mod sign;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::WxPayClient;
pub use config::{Endpoints, GatewayConfig};
pub use error::{Result, WxPayError};
pub use polling::PollPolicy;
pub use response::ResultSet;
pub use transport::{CertificateMaterial, PemSource, Transport};
pub use types::*;

// Feature-gated framework support
#[cfg(feature = "axum")]
pub mod axum;

/// Current version of the wxpay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
