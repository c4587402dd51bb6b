//! Request parameter assembly
//!
//! Every request is a flat set of string fields. Empty values are dropped on
//! insertion, so they never reach the signer or the XML body.

use crate::types::MerchantAccount;
use crate::{Result, WxPayError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;

/// Length of the random `nonce_str`
pub const NONCE_LEN: usize = 32;

/// Timestamp layout required by the gateway (`yyyyMMddHHmmss`)
pub const TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Validity window for prepay orders
pub const PREPAY_EXPIRY_MINUTES: i64 = 10;

/// Field-name ordered request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSet {
    fields: BTreeMap<String, String>,
}

impl ParamSet {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters shared by every request: account ids and a fresh nonce
    pub fn common(account: &MerchantAccount) -> Self {
        let mut params = Self::new();
        params.set("appid", &account.app_id);
        params.set("sub_appid", &account.sub_app_id);
        params.set("mch_id", &account.mch_id);
        params.set("sub_mch_id", &account.sub_mch_id);
        params.set("nonce_str", nonce());
        params
    }

    /// Set a field; empty values are ignored
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if value.is_empty() {
            return;
        }
        self.fields.insert(key.to_string(), value);
    }

    /// Set a field when a value is present
    pub fn set_opt<T: ToString>(&mut self, key: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    /// Field value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Whether a field is present
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Fields in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the set has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sign with the merchant key and store the result in `sign`
    pub fn sign_with(&mut self, key: &str) {
        self.fields.remove(crate::sign::SIGN_FIELD);
        let signature = crate::sign::sign(self.iter(), key);
        self.fields
            .insert(crate::sign::SIGN_FIELD.to_string(), signature);
    }

    /// Serialize as `<xml><field>value</field>...</xml>`
    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string_with_root("xml", &self.fields)
            .map_err(|e| WxPayError::xml(e.to_string()))
    }
}

/// Random alphanumeric nonce
pub fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Merchant trade number: prefix followed by a dashless v4 UUID
pub fn trade_no(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Offset of China Standard Time, the gateway's reference timezone
pub const CHINA_UTC_OFFSET_HOURS: i64 = 8;

/// Format an instant in the gateway's timezone and layout
pub fn format_gateway_time(instant: DateTime<Utc>) -> String {
    (instant + ChronoDuration::hours(CHINA_UTC_OFFSET_HOURS))
        .naive_utc()
        .format(TIME_FORMAT)
        .to_string()
}

/// `(time_start, time_expire)` for an order created at `now`
pub fn time_window(now: DateTime<Utc>, minutes: i64) -> (String, String) {
    let expire = now + ChronoDuration::minutes(minutes);
    (format_gateway_time(now), format_gateway_time(expire))
}
