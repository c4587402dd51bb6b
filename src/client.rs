//! Gateway client implementing the payment operations

use crate::config::{GatewayConfig, TradeNoPrefixes};
use crate::params::{self, ParamSet, PREPAY_EXPIRY_MINUTES};
use crate::response::{self, ResultSet};
use crate::transport::Transport;
use crate::types::*;
use crate::{Result, WxPayError};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Client for the merchant payment gateway.
///
/// Holds the endpoint configuration and a plain HTTP transport. Secrets are
/// passed per call through [`Credentials`].
#[derive(Debug, Clone)]
pub struct WxPayClient {
    config: GatewayConfig,
    transport: Transport,
}

impl WxPayClient {
    /// Create a client from a validated configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let transport = Transport::plain(config.timeout)?;
        Ok(Self { config, transport })
    }

    /// Create a client configured from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    /// Get the configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Sign, serialize, POST and parse
    pub(crate) async fn submit(
        &self,
        transport: &Transport,
        url: &str,
        mut params: ParamSet,
        key: &str,
    ) -> Result<ResultSet> {
        params.sign_with(key);
        let body = params.to_xml()?;
        let response = transport.post_xml(url, body).await?;
        response::parse(&response, key)
    }

    /// Barcode payment.
    ///
    /// A `USERPAYING` answer is not an error: the outcome is
    /// [`OperationOutcome::Pending`] carrying the `out_trade_no` to poll with.
    pub async fn pay(&self, req: &PayRequest, credentials: &Credentials) -> Result<OperationOutcome> {
        let params = pay_params(req, &self.config.prefixes);
        let out_trade_no = params.get("out_trade_no").unwrap_or_default().to_string();

        info!(out_trade_no = %out_trade_no, total_fee = req.total_fee, "Submitting payment");
        let result = self
            .submit(&self.transport, &self.config.endpoints.pay, params, credentials.key())
            .await;

        match result {
            Ok(result) => Ok(OperationOutcome::Success(result)),
            Err(WxPayError::AlreadyPending { err_code, .. }) => {
                info!(out_trade_no = %out_trade_no, "Payer is still confirming the payment");
                Ok(OperationOutcome::Pending {
                    reason: err_code,
                    result: [("out_trade_no", out_trade_no)].into_iter().collect(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Order query
    pub async fn query(&self, req: &QueryRequest, credentials: &Credentials) -> Result<ResultSet> {
        let mut params = ParamSet::common(&req.account);
        params.set("transaction_id", &req.transaction_id);
        params.set("out_trade_no", &req.out_trade_no);

        debug!(out_trade_no = %req.out_trade_no, "Querying order");
        self.submit(&self.transport, &self.config.endpoints.query, params, credentials.key())
            .await
    }

    /// Refund an order.
    ///
    /// The order is queried first to recover its `total_fee`, then the refund
    /// is submitted over the credentials' mutual-TLS transport. The internal
    /// query carries both `out_trade_no` and `transaction_id` from the request;
    /// the gateway resolves the order from either.
    pub async fn refund(&self, req: &RefundRequest, credentials: &Credentials) -> Result<ResultSet> {
        let transport = credentials
            .mutual_tls_transport(self.config.timeout)
            .map_err(WxPayError::refund)?;

        let query = QueryRequest {
            account: req.account.clone(),
            transaction_id: req.transaction_id.clone(),
            out_trade_no: req.out_trade_no.clone(),
        };
        let order = self.query(&query, credentials).await.map_err(WxPayError::refund)?;
        let total_fee = order
            .get("total_fee")
            .ok_or_else(|| WxPayError::refund_precondition("order query returned no total_fee"))?;

        let params = refund_params(req, total_fee, &self.config.prefixes);
        info!(
            out_trade_no = %req.out_trade_no,
            out_refund_no = params.get("out_refund_no").unwrap_or_default(),
            refund_fee = req.refund_fee,
            "Submitting refund"
        );

        match self
            .submit(transport, &self.config.endpoints.refund, params, credentials.key())
            .await
        {
            Err(err @ (WxPayError::Http(_) | WxPayError::HttpStatus { .. })) => {
                warn!(error = %err, "Refund request failed");
                Err(WxPayError::refund(err))
            }
            other => other,
        }
    }

    /// Refund status query
    pub async fn refund_query(
        &self,
        req: &RefundQueryRequest,
        credentials: &Credentials,
    ) -> Result<ResultSet> {
        let mut params = ParamSet::common(&req.account);
        params.set("transaction_id", &req.transaction_id);
        params.set("out_trade_no", &req.out_trade_no);
        params.set("out_refund_no", &req.out_refund_no);
        params.set("refund_id", &req.refund_id);
        params.set_opt("offset", req.offset);

        self.submit(
            &self.transport,
            &self.config.endpoints.refund_query,
            params,
            credentials.key(),
        )
        .await
    }

    /// Unified order for client-side payment UIs, valid for ten minutes
    pub async fn pre_pay(&self, req: &PrePayRequest, credentials: &Credentials) -> Result<ResultSet> {
        let params = prepay_params(req, credentials, &self.config.prefixes, Utc::now());

        info!(
            out_trade_no = params.get("out_trade_no").unwrap_or_default(),
            trade_type = %req.trade_type,
            "Submitting prepay order"
        );
        self.submit(&self.transport, &self.config.endpoints.prepay, params, credentials.key())
            .await
    }
}

fn pay_params(req: &PayRequest, prefixes: &TradeNoPrefixes) -> ParamSet {
    let mut params = ParamSet::common(&req.account);

    if req.out_trade_no.is_empty() {
        params.set("out_trade_no", params::trade_no(&prefixes.pay));
    } else {
        params.set("out_trade_no", &req.out_trade_no);
    }
    params.set("body", &req.body);
    params.set("total_fee", req.total_fee);
    params.set("auth_code", &req.auth_code);
    params.set("device_info", &req.device_info);
    params.set("detail", &req.detail);
    params.set("attach", &req.attach);
    params.set("fee_type", &req.fee_type);
    params.set("goods_tag", &req.goods_tag);
    params.set("limit_pay", &req.limit_pay);
    if req.spbill_create_ip.trim().is_empty() {
        params.set("spbill_create_ip", FALLBACK_CLIENT_IP);
    } else {
        params.set("spbill_create_ip", &req.spbill_create_ip);
    }
    params
}

fn refund_params(req: &RefundRequest, total_fee: &str, prefixes: &TradeNoPrefixes) -> ParamSet {
    let mut params = ParamSet::common(&req.account);

    if req.out_refund_no.is_empty() {
        params.set("out_refund_no", params::trade_no(&prefixes.refund));
    } else {
        params.set("out_refund_no", &req.out_refund_no);
    }
    params.set("device_info", &req.device_info);
    params.set("transaction_id", &req.transaction_id);
    params.set("total_fee", total_fee);
    params.set("refund_fee", req.refund_fee);
    params.set("refund_fee_type", &req.refund_fee_type);
    params.set("refund_account", &req.refund_account);
    params.set("out_trade_no", &req.out_trade_no);
    params
}

fn prepay_params(
    req: &PrePayRequest,
    credentials: &Credentials,
    prefixes: &TradeNoPrefixes,
    now: DateTime<Utc>,
) -> ParamSet {
    let mut params = ParamSet::common(&req.account);

    if req.out_trade_no.is_empty() {
        params.set("out_trade_no", params::trade_no(&prefixes.prepay));
    } else {
        params.set("out_trade_no", &req.out_trade_no);
    }
    // Unlike pay, a caller-supplied IP is replaced and an empty one is omitted
    if !req.spbill_create_ip.is_empty() {
        params.set("spbill_create_ip", FALLBACK_CLIENT_IP);
    }
    params.set("sign_type", &req.sign_type);
    params.set("body", &req.body);
    params.set("detail", &req.detail);
    params.set("attach", &req.attach);
    params.set("device_info", &req.device_info);
    params.set("fee_type", &req.fee_type);
    params.set("total_fee", req.total_fee);

    let (time_start, time_expire) = params::time_window(now, PREPAY_EXPIRY_MINUTES);
    params.set("time_start", time_start);
    params.set("time_expire", time_expire);
    params.set("goods_tag", &req.goods_tag);

    if req.notify_url.is_empty() {
        params.set("notify_url", credentials.unified_notify_url());
    } else {
        params.set("notify_url", &req.notify_url);
    }
    params.set("trade_type", &req.trade_type);
    params.set("product_id", &req.product_id);
    params.set("limit_pay", &req.limit_pay);
    params.set("openid", &req.open_id);
    params.set("sub_openid", &req.sub_open_id);
    params.set("scene_info", &req.scene_info);
    params
}
