//! Request, credential and outcome types for the WeChat Pay gateway

use crate::response::ResultSet;
use crate::transport::{CertificateMaterial, Transport};
use crate::{Result, WxPayError};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Fallback client IP submitted when the caller gives none
pub const FALLBACK_CLIENT_IP: &str = "8.8.8.8";

/// Status value used by the gateway for success
pub const SUCCESS: &str = "SUCCESS";

/// Merchant/app identifiers shared by every request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantAccount {
    /// Official account / app id
    pub app_id: String,
    /// Sub-merchant app id (service-provider mode)
    pub sub_app_id: String,
    /// Merchant id
    pub mch_id: String,
    /// Sub-merchant id (service-provider mode)
    pub sub_mch_id: String,
}

impl MerchantAccount {
    /// Create an account for a directly connected merchant
    pub fn new(app_id: impl Into<String>, mch_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            mch_id: mch_id.into(),
            ..Self::default()
        }
    }

    /// Set the sub-merchant identifiers
    pub fn with_sub_merchant(
        mut self,
        sub_app_id: impl Into<String>,
        sub_mch_id: impl Into<String>,
    ) -> Self {
        self.sub_app_id = sub_app_id.into();
        self.sub_mch_id = sub_mch_id.into();
        self
    }
}

/// Barcode (micropay) payment request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayRequest {
    #[serde(flatten)]
    pub account: MerchantAccount,
    /// Merchant trade number; generated when empty
    pub out_trade_no: String,
    pub body: String,
    /// Amount in fen
    pub total_fee: i64,
    /// Payer's barcode
    pub auth_code: String,
    pub device_info: String,
    pub detail: String,
    pub attach: String,
    pub fee_type: String,
    pub goods_tag: String,
    pub limit_pay: String,
    pub spbill_create_ip: String,
}

/// Order query request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    #[serde(flatten)]
    pub account: MerchantAccount,
    pub transaction_id: String,
    pub out_trade_no: String,
}

impl QueryRequest {
    /// Query an order by merchant trade number
    pub fn by_out_trade_no(account: MerchantAccount, out_trade_no: impl Into<String>) -> Self {
        Self {
            account,
            out_trade_no: out_trade_no.into(),
            ..Self::default()
        }
    }
}

/// Refund request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefundRequest {
    #[serde(flatten)]
    pub account: MerchantAccount,
    pub out_trade_no: String,
    pub transaction_id: String,
    /// Merchant refund number; generated when empty
    pub out_refund_no: String,
    pub device_info: String,
    /// Amount to refund in fen
    pub refund_fee: i64,
    pub refund_fee_type: String,
    pub refund_account: String,
}

/// Reverse (cancel) request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverseRequest {
    #[serde(flatten)]
    pub account: MerchantAccount,
    pub transaction_id: String,
    pub out_trade_no: String,
}

/// Refund query request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefundQueryRequest {
    #[serde(flatten)]
    pub account: MerchantAccount,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub out_refund_no: String,
    pub refund_id: String,
    /// Paging offset for orders with many refunds
    pub offset: Option<i64>,
}

/// Unified order (prepay) request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrePayRequest {
    #[serde(flatten)]
    pub account: MerchantAccount,
    /// Merchant trade number; generated when empty
    pub out_trade_no: String,
    pub spbill_create_ip: String,
    pub sign_type: String,
    pub body: String,
    pub detail: String,
    pub attach: String,
    pub device_info: String,
    pub fee_type: String,
    /// Amount in fen
    pub total_fee: i64,
    pub goods_tag: String,
    /// Overrides the credentials' unified notify URL
    pub notify_url: String,
    /// `NATIVE`, `JSAPI`, `APP`, ...
    pub trade_type: String,
    pub product_id: String,
    pub limit_pay: String,
    pub open_id: String,
    pub sub_open_id: String,
    pub scene_info: String,
}

/// Merchant secrets supplied per call.
///
/// The mutual-TLS transport built from the certificate material is cached
/// inside the value, so reuse one `Credentials` across refund/reverse calls.
#[derive(Clone, Default)]
pub struct Credentials {
    key: String,
    unified_notify_url: String,
    certificate: Option<CertificateMaterial>,
    tls_transport: OnceCell<Transport>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &"<redacted>")
            .field("unified_notify_url", &self.unified_notify_url)
            .field("certificate", &self.certificate.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Create credentials with the signing key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the client certificate used for refund and reverse
    pub fn with_certificate(mut self, certificate: CertificateMaterial) -> Self {
        self.certificate = Some(certificate);
        self.tls_transport = OnceCell::new();
        self
    }

    /// Use a prebuilt transport for refund and reverse instead of building
    /// one from certificate material.
    ///
    /// The production gateway rejects refund and reverse calls that present no
    /// client certificate. A transport without one, such as
    /// [`Transport::plain`], is only useful against a stand-in gateway and is
    /// logged as a warning each time it is handed out.
    pub fn with_tls_transport(mut self, transport: Transport) -> Self {
        self.tls_transport = OnceCell::with_value(transport);
        self
    }

    /// Set the default notify URL for prepay orders
    pub fn with_unified_notify_url(mut self, url: impl Into<String>) -> Self {
        self.unified_notify_url = url.into();
        self
    }

    /// Signing key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Default notify URL for prepay orders
    pub fn unified_notify_url(&self) -> &str {
        &self.unified_notify_url
    }

    /// Client certificate material, if any
    pub fn certificate(&self) -> Option<&CertificateMaterial> {
        self.certificate.as_ref()
    }

    /// Mutual-TLS transport for these credentials, built on first use.
    ///
    /// Fails with [`WxPayError::Certificate`] before any network I/O when the
    /// material is absent or does not parse.
    pub fn mutual_tls_transport(&self, timeout: Option<Duration>) -> Result<&Transport> {
        let transport = self.tls_transport.get_or_try_init(|| {
            let material = self.certificate.as_ref().ok_or_else(|| {
                WxPayError::certificate("client certificate material is missing")
            })?;
            Transport::mutual_tls(material, timeout)
        })?;
        if !transport.is_mutual_tls() {
            warn!("Refund/reverse transport presents no client certificate");
        }
        Ok(transport)
    }
}

/// Order state reported by the query endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeState {
    Success,
    Refund,
    NotPay,
    Closed,
    Revoked,
    UserPaying,
    PayError,
    Other(String),
}

impl TradeState {
    /// Parse a `trade_state` value
    pub fn parse(value: &str) -> Self {
        match value {
            "SUCCESS" => Self::Success,
            "REFUND" => Self::Refund,
            "NOTPAY" => Self::NotPay,
            "CLOSED" => Self::Closed,
            "REVOKED" => Self::Revoked,
            "USERPAYING" => Self::UserPaying,
            "PAYERROR" => Self::PayError,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "SUCCESS",
            Self::Refund => "REFUND",
            Self::NotPay => "NOTPAY",
            Self::Closed => "CLOSED",
            Self::Revoked => "REVOKED",
            Self::UserPaying => "USERPAYING",
            Self::PayError => "PAYERROR",
            Self::Other(value) => value,
        }
    }

    /// States after which the payment can no longer succeed
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Refund | Self::Revoked | Self::NotPay | Self::PayError
        )
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted outcome of a gateway call
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// Gateway accepted the operation
    Success(ResultSet),
    /// Operation is still in progress; `result` carries what the caller needs to poll
    Pending { reason: String, result: ResultSet },
    /// Gateway rejected the operation
    Failure { reason: String, code: Option<String> },
}

impl OperationOutcome {
    /// Classify a parsed response.
    ///
    /// Gateway-reported conditions become outcomes; local errors (network,
    /// signature, XML) are passed through.
    pub fn from_result(result: Result<ResultSet>) -> Result<Self> {
        match result {
            Ok(result) => Ok(Self::Success(result)),
            Err(WxPayError::AlreadyPending { err_code, .. }) => Ok(Self::Pending {
                reason: err_code,
                result: ResultSet::default(),
            }),
            Err(WxPayError::BusinessFailure {
                err_code,
                err_code_des,
            }) => Ok(Self::Failure {
                reason: err_code_des,
                code: Some(err_code),
            }),
            Err(WxPayError::TransportLevelFailure { return_msg, .. }) => Ok(Self::Failure {
                reason: return_msg,
                code: None,
            }),
            Err(err) => Err(err),
        }
    }

    /// Whether the outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the outcome is pending
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Result fields, when the outcome carries any
    pub fn result(&self) -> Option<&ResultSet> {
        match self {
            Self::Success(result) | Self::Pending { result, .. } => Some(result),
            Self::Failure { .. } => None,
        }
    }
}

/// Acknowledgement returned to the gateway after a relayed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "xml")]
pub struct NotifyAck {
    pub return_code: String,
    pub return_msg: String,
}

impl NotifyAck {
    /// The fixed success acknowledgement
    pub fn success() -> Self {
        Self {
            return_code: SUCCESS.to_string(),
            return_msg: "OK".to_string(),
        }
    }

    /// Serialize as the XML body expected by the gateway
    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string(self).map_err(|e| WxPayError::xml(e.to_string()))
    }
}
