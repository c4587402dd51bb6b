//! Gateway endpoint and client configuration
//!
//! Endpoint URLs are injected rather than compiled in so the same build can
//! talk to the production gateway, the sandbox, or a local stand-in.

use crate::{Result, WxPayError};
use std::env;
use std::time::Duration;

/// Production gateway base URL
pub const PRODUCTION_BASE_URL: &str = "https://api.mch.weixin.qq.com";
/// Sandbox gateway base URL
pub const SANDBOX_BASE_URL: &str = "https://api.mch.weixin.qq.com/sandboxnew";

/// Default HTTP timeout applied to every gateway call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-operation endpoint URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Barcode payment (micropay)
    pub pay: String,
    /// Order query
    pub query: String,
    /// Refund (mutual TLS)
    pub refund: String,
    /// Reverse (mutual TLS)
    pub reverse: String,
    /// Refund query
    pub refund_query: String,
    /// Unified order (prepay)
    pub prepay: String,
}

impl Endpoints {
    /// Endpoints rooted at an arbitrary base URL
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            pay: format!("{}/pay/micropay", base),
            query: format!("{}/pay/orderquery", base),
            refund: format!("{}/secapi/pay/refund", base),
            reverse: format!("{}/secapi/pay/reverse", base),
            refund_query: format!("{}/pay/refundquery", base),
            prepay: format!("{}/pay/unifiedorder", base),
        }
    }

    /// Production gateway endpoints
    pub fn production() -> Self {
        Self::with_base_url(PRODUCTION_BASE_URL)
    }

    /// Sandbox gateway endpoints
    pub fn sandbox() -> Self {
        Self::with_base_url(SANDBOX_BASE_URL)
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("pay", self.pay.as_str()),
            ("query", self.query.as_str()),
            ("refund", self.refund.as_str()),
            ("reverse", self.reverse.as_str()),
            ("refund_query", self.refund_query.as_str()),
            ("prepay", self.prepay.as_str()),
        ]
        .into_iter()
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::production()
    }
}

/// Prefixes for merchant-generated trade numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeNoPrefixes {
    /// Prefix for generated `out_trade_no` on Pay
    pub pay: String,
    /// Prefix for generated `out_refund_no` on Refund
    pub refund: String,
    /// Prefix for generated `out_trade_no` on PrePay
    pub prepay: String,
}

impl Default for TradeNoPrefixes {
    fn default() -> Self {
        Self {
            pay: "wxp".to_string(),
            refund: "wxr".to_string(),
            prepay: "wxpre".to_string(),
        }
    }
}

/// Configuration for [`crate::WxPayClient`]
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Endpoint URLs
    pub endpoints: Endpoints,
    /// Request timeout
    pub timeout: Option<Duration>,
    /// Trade-number prefixes
    pub prefixes: TradeNoPrefixes,
}

impl GatewayConfig {
    /// Create a config for the given endpoints
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            timeout: Some(DEFAULT_TIMEOUT),
            prefixes: TradeNoPrefixes::default(),
        }
    }

    /// Config pointing at the sandbox gateway
    pub fn sandbox() -> Self {
        Self::new(Endpoints::sandbox())
    }

    /// Load configuration from the environment.
    ///
    /// `WXPAY_BASE_URL` overrides the base URL, `WXPAY_SANDBOX=true` selects the
    /// sandbox when no base URL is given, `WXPAY_TIMEOUT_SECS` sets the timeout.
    pub fn from_env() -> Result<Self> {
        let endpoints = match env::var("WXPAY_BASE_URL") {
            Ok(base) if !base.trim().is_empty() => Endpoints::with_base_url(base.trim()),
            _ => {
                let sandbox = env::var("WXPAY_SANDBOX")
                    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false);
                if sandbox {
                    Endpoints::sandbox()
                } else {
                    Endpoints::production()
                }
            }
        };

        let mut config = Self::new(endpoints);
        if let Ok(secs) = env::var("WXPAY_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                WxPayError::config(format!("WXPAY_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every endpoint URL
    pub fn validate(&self) -> Result<()> {
        for (name, raw) in self.endpoints.iter() {
            let parsed = url::Url::parse(raw).map_err(|e| {
                WxPayError::config(format!("{} endpoint {:?} is not a valid URL: {}", name, raw, e))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(WxPayError::config(format!(
                    "{} endpoint must start with http:// or https://",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the endpoints
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replace the trade-number prefixes
    pub fn with_prefixes(mut self, prefixes: TradeNoPrefixes) -> Self {
        self.prefixes = prefixes;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(Endpoints::production())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_endpoints() {
        let endpoints = Endpoints::production();
        assert_eq!(endpoints.pay, "https://api.mch.weixin.qq.com/pay/micropay");
        assert_eq!(endpoints.refund, "https://api.mch.weixin.qq.com/secapi/pay/refund");
        assert_eq!(endpoints.prepay, "https://api.mch.weixin.qq.com/pay/unifiedorder");
    }

    #[test]
    fn test_sandbox_endpoints() {
        let endpoints = Endpoints::sandbox();
        assert_eq!(
            endpoints.query,
            "https://api.mch.weixin.qq.com/sandboxnew/pay/orderquery"
        );
        assert_eq!(
            endpoints.reverse,
            "https://api.mch.weixin.qq.com/sandboxnew/secapi/pay/reverse"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let endpoints = Endpoints::with_base_url("http://127.0.0.1:8080/");
        assert_eq!(endpoints.refund_query, "http://127.0.0.1:8080/pay/refundquery");
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = GatewayConfig::new(Endpoints::with_base_url("ftp://example.com"));
        assert!(matches!(config.validate(), Err(WxPayError::Config { .. })));

        let config = GatewayConfig::new(Endpoints::with_base_url("not a url"));
        assert!(config.validate().is_err());

        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = GatewayConfig::sandbox()
            .with_timeout(Duration::from_secs(5))
            .with_prefixes(TradeNoPrefixes {
                pay: "p".into(),
                refund: "r".into(),
                prepay: "pp".into(),
            });
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.prefixes.pay, "p");
        assert_eq!(config.endpoints, Endpoints::sandbox());
    }
}
