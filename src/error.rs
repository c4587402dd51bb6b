//! Error types for the wxpay library

use thiserror::Error;

/// Result type alias for wxpay operations
pub type Result<T> = std::result::Result<T, WxPayError>;

/// Main error type for wxpay operations
#[derive(Error, Debug)]
pub enum WxPayError {
    /// HTTP client error (network, DNS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success HTTP status
    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed XML payload
    #[error("XML error: {message}")]
    Xml { message: String },

    /// Base64 decoding error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Client certificate material is missing, unreadable or invalid
    #[error("Certificate error: {message}")]
    Certificate { message: String },

    /// Response signature does not match the recomputed one
    #[error("Signature mismatch: expected {expected}, got {got}")]
    SignatureMismatch { expected: String, got: String },

    /// Gateway-level failure (`return_code` is not `SUCCESS`)
    #[error("Gateway returned {return_code}: {return_msg}")]
    TransportLevelFailure {
        return_code: String,
        return_msg: String,
    },

    /// Operation-level failure (`result_code` is not `SUCCESS`)
    #[error("Business failure {err_code}: {err_code_des}")]
    BusinessFailure {
        err_code: String,
        err_code_des: String,
    },

    /// The payer has not finished paying yet
    #[error("Payment in progress ({err_code}): {err_code_des}")]
    AlreadyPending {
        err_code: String,
        err_code_des: String,
    },

    /// Refund could not recover the original order amount
    #[error("Refund precondition failed: {message}")]
    RefundPrecondition { message: String },

    /// Refund aborted because of an underlying failure
    #[error("Refund failed: {source}")]
    Refund {
        #[source]
        source: Box<WxPayError>,
    },

    /// Reversal was rejected by the gateway
    #[error("Reverse failed: recall={}", .recall.as_deref().unwrap_or("<missing>"))]
    ReverseFailed { recall: Option<String> },

    /// Polled order reached a terminal non-success state
    #[error("Payment failed with trade_state {trade_state}")]
    PaymentFailed { trade_state: String },

    /// Invalid argument passed by the caller
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Poll or retry budget exhausted without a terminal state
    #[error("{operation} timed out after {attempts} attempts")]
    Timeout {
        operation: &'static str,
        attempts: u32,
    },

    /// Caller cancelled a poll or retry loop
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// Malformed inbound notification
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Required response field is absent
    #[error("Field missing: {field}")]
    FieldMissing { field: String },

    /// Response field could not be converted to the requested type
    #[error("Field {field} has unexpected value {value:?}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        value: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl WxPayError {
    /// Create an XML error
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml {
            message: message.into(),
        }
    }

    /// Create a certificate error
    pub fn certificate(message: impl Into<String>) -> Self {
        Self::Certificate {
            message: message.into(),
        }
    }

    /// Create a refund precondition error
    pub fn refund_precondition(message: impl Into<String>) -> Self {
        Self::RefundPrecondition {
            message: message.into(),
        }
    }

    /// Wrap a cause into a refund error
    pub fn refund(source: WxPayError) -> Self {
        Self::Refund {
            source: Box::new(source),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a field missing error
    pub fn field_missing(field: impl Into<String>) -> Self {
        Self::FieldMissing {
            field: field.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error was reported by the gateway rather than raised locally
    pub fn is_gateway_reported(&self) -> bool {
        matches!(
            self,
            Self::TransportLevelFailure { .. }
                | Self::BusinessFailure { .. }
                | Self::AlreadyPending { .. }
        )
    }
}
