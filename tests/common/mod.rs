//! Shared fixtures for gateway integration tests

#![allow(dead_code)]

use wxpay::sign::{self, SIGN_FIELD};
use wxpay::{
    Credentials, Endpoints, GatewayConfig, MerchantAccount, ResultSet, Transport, WxPayClient,
};

/// Signing key shared with the mock gateway
pub const KEY: &str = "192006250b4c09247ec02edce69f6a2d";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn account() -> MerchantAccount {
    MerchantAccount::new("wx2421b1c4370ec43b", "10000100")
}

/// Client whose endpoints all point at the mock server
pub fn client_for(base_url: &str) -> WxPayClient {
    init_tracing();
    WxPayClient::new(GatewayConfig::new(Endpoints::with_base_url(base_url))).unwrap()
}

/// Credentials whose refund/reverse transport talks plain HTTP to the mock
pub fn credentials() -> Credentials {
    Credentials::new(KEY).with_tls_transport(Transport::plain(None).unwrap())
}

/// A gateway response body signed with [`KEY`]
pub fn signed_response(fields: &[(&str, &str)]) -> String {
    let mut result: ResultSet = fields.iter().copied().collect();
    let signature = sign::sign(result.iter(), KEY);
    result.insert(SIGN_FIELD, signature);
    result.to_xml().unwrap()
}

/// Successful order query response with the given trade state
pub fn query_response(trade_state: &str) -> String {
    signed_response(&[
        ("return_code", "SUCCESS"),
        ("return_msg", "OK"),
        ("result_code", "SUCCESS"),
        ("out_trade_no", "order-1"),
        ("total_fee", "888"),
        ("trade_state", trade_state),
    ])
}
