//! Gateway response parsing
//!
//! Responses are flat XML documents. [`parse`] turns them into a [`ResultSet`],
//! maps the two status layers onto typed errors and verifies the signature of
//! successful responses.

use crate::sign::{self, SIGN_FIELD};
use crate::types::{TradeState, SUCCESS};
use crate::{Result, WxPayError};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// `err_code` meaning the payer is still confirming the payment
pub const ERR_CODE_USERPAYING: &str = "USERPAYING";

/// Flat field mapping decoded from a gateway XML document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    fields: BTreeMap<String, String>,
}

impl ResultSet {
    /// Decode an XML document without interpreting it.
    ///
    /// Each direct child of the root becomes one field. Text and CDATA are kept
    /// byte for byte, edge whitespace included, so signatures verify over the
    /// same values they were computed on.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut fields = BTreeMap::new();
        let mut field: Option<(String, String)> = None;
        let mut depth = 0usize;
        let mut seen_root = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| WxPayError::xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;
            match event {
                Event::Start(start) => {
                    depth += 1;
                    seen_root = true;
                    if depth == 2 {
                        field = Some((element_name(start.name().as_ref())?, String::new()));
                    }
                }
                Event::Empty(start) => {
                    seen_root = true;
                    if depth == 1 {
                        fields.insert(element_name(start.name().as_ref())?, String::new());
                    }
                }
                Event::Text(text) if depth == 2 => {
                    let text = text.unescape().map_err(|e| WxPayError::xml(e.to_string()))?;
                    if let Some((_, value)) = field.as_mut() {
                        value.push_str(&text);
                    }
                }
                Event::CData(cdata) if depth == 2 => {
                    let cdata = std::str::from_utf8(&cdata)
                        .map_err(|e| WxPayError::xml(e.to_string()))?;
                    if let Some((_, value)) = field.as_mut() {
                        value.push_str(cdata);
                    }
                }
                Event::End(_) => {
                    if depth == 2 {
                        if let Some((name, value)) = field.take() {
                            fields.insert(name, value);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(WxPayError::xml("unexpected end of document"));
        }
        if !seen_root {
            return Err(WxPayError::xml("document has no root element"));
        }
        Ok(Self { fields })
    }

    /// Serialize back to `<xml>...</xml>`
    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string_with_root("xml", &self.fields)
            .map_err(|e| WxPayError::xml(e.to_string()))
    }

    /// Field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Field value, or [`WxPayError::FieldMissing`]
    pub fn require(&self, field: &str) -> Result<&str> {
        self.get(field)
            .ok_or_else(|| WxPayError::field_missing(field))
    }

    /// Field parsed as `T`, or [`WxPayError::FieldMissing`] / [`WxPayError::TypeMismatch`]
    pub fn require_parsed<T: FromStr>(&self, field: &str) -> Result<T> {
        let raw = self.require(field)?;
        raw.trim().parse().map_err(|_| WxPayError::TypeMismatch {
            field: field.to_string(),
            expected: std::any::type_name::<T>(),
            value: raw.to_string(),
        })
    }

    /// Whether a field is present
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Insert or replace a field
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Fields in ascending name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the raw mapping
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// `trade_state` of a query response
    pub fn trade_state(&self) -> Option<TradeState> {
        self.get("trade_state").map(TradeState::parse)
    }

    /// `total_fee` in fen
    pub fn total_fee(&self) -> Result<i64> {
        self.require_parsed("total_fee")
    }

    /// Verify the `sign` field against the other fields
    pub fn verify_signature(&self, key: &str) -> Result<()> {
        let signature = self.get(SIGN_FIELD).unwrap_or_default();
        sign::verify(self.iter(), signature, key)
    }
}

fn element_name(name: &[u8]) -> Result<String> {
    std::str::from_utf8(name)
        .map(str::to_string)
        .map_err(|e| WxPayError::xml(format!("element name is not UTF-8: {}", e)))
}

impl From<BTreeMap<String, String>> for ResultSet {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResultSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Decode a gateway response and interpret its status fields.
///
/// 1. `return_code != SUCCESS` is a [`WxPayError::TransportLevelFailure`].
/// 2. A non-success `result_code` is [`WxPayError::AlreadyPending`] for
///    `USERPAYING`, otherwise [`WxPayError::BusinessFailure`].
/// 3. Anything else must carry a valid signature.
pub fn parse(body: &str, key: &str) -> Result<ResultSet> {
    let result = ResultSet::from_xml(body)?;

    let return_code = result.require("return_code")?;
    if return_code != SUCCESS {
        return Err(WxPayError::TransportLevelFailure {
            return_code: return_code.to_string(),
            return_msg: result.get("return_msg").unwrap_or_default().to_string(),
        });
    }

    if let Some(result_code) = result.get("result_code") {
        if result_code != SUCCESS {
            let err_code = result.get("err_code").unwrap_or_default().to_string();
            let err_code_des = result.get("err_code_des").unwrap_or_default().to_string();
            if err_code == ERR_CODE_USERPAYING {
                return Err(WxPayError::AlreadyPending {
                    err_code,
                    err_code_des,
                });
            }
            return Err(WxPayError::BusinessFailure {
                err_code,
                err_code_des,
            });
        }
    }

    result.verify_signature(key)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-key";

    fn signed_xml(fields: &[(&str, &str)]) -> String {
        let mut result: ResultSet = fields.iter().copied().collect();
        let signature = sign::sign(result.iter(), KEY);
        result.insert(SIGN_FIELD, signature);
        result.to_xml().unwrap()
    }

    #[test]
    fn test_from_xml_with_cdata() {
        let xml = "<xml>\n  <return_code><![CDATA[SUCCESS]]></return_code>\n  <total_fee>888</total_fee>\n  <extra_field><![CDATA[kept]]></extra_field>\n</xml>";
        let result = ResultSet::from_xml(xml).unwrap();
        assert_eq!(result.get("return_code"), Some("SUCCESS"));
        assert_eq!(result.total_fee().unwrap(), 888);
        assert_eq!(result.get("extra_field"), Some("kept"));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            ResultSet::from_xml("<xml><a>1</b></xml>"),
            Err(WxPayError::Xml { .. })
        ));
        assert!(matches!(
            ResultSet::from_xml("<xml><a>1</a>"),
            Err(WxPayError::Xml { .. })
        ));
        assert!(matches!(ResultSet::from_xml(""), Err(WxPayError::Xml { .. })));
    }

    #[test]
    fn test_edge_whitespace_survives_parse() {
        let body = signed_xml(&[
            ("return_code", "SUCCESS"),
            ("result_code", "SUCCESS"),
            ("err_code_des", " padded "),
            ("attach", "{\"NotifyUrl\":\"http://merchant.example/cb\"}\n"),
        ]);
        let result = parse(&body, KEY).unwrap();
        assert_eq!(result.get("err_code_des"), Some(" padded "));
        assert_eq!(
            result.get("attach"),
            Some("{\"NotifyUrl\":\"http://merchant.example/cb\"}\n")
        );
    }

    #[test]
    fn test_layout_whitespace_and_empty_elements() {
        let xml = "<?xml version=\"1.0\"?>\n<xml>\n  <device_info></device_info>\n  <sub_mch_id/>\n  <fee_type> CNY</fee_type>\n  <body>a &amp; b</body>\n</xml>\n";
        let result = ResultSet::from_xml(xml).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.get("device_info"), Some(""));
        assert_eq!(result.get("sub_mch_id"), Some(""));
        assert_eq!(result.get("fee_type"), Some(" CNY"));
        assert_eq!(result.get("body"), Some("a & b"));
    }

    #[test]
    fn test_typed_accessors() {
        let result: ResultSet = [("total_fee", "abc")].into_iter().collect();
        assert!(matches!(
            result.total_fee(),
            Err(WxPayError::TypeMismatch { .. })
        ));
        assert!(matches!(
            result.require("trade_state"),
            Err(WxPayError::FieldMissing { .. })
        ));
        assert!(result.trade_state().is_none());
    }

    #[test]
    fn test_return_code_failure() {
        let xml = "<xml><return_code>FAIL</return_code><return_msg>invalid sign</return_msg></xml>";
        match parse(xml, KEY) {
            Err(WxPayError::TransportLevelFailure { return_msg, .. }) => {
                assert_eq!(return_msg, "invalid sign")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_return_code() {
        assert!(matches!(
            parse("<xml><foo>1</foo></xml>", KEY),
            Err(WxPayError::FieldMissing { .. })
        ));
    }

    #[test]
    fn test_userpaying_is_pending() {
        let xml = signed_xml(&[
            ("return_code", "SUCCESS"),
            ("result_code", "FAIL"),
            ("err_code", "USERPAYING"),
            ("err_code_des", "waiting for password"),
        ]);
        assert!(matches!(
            parse(&xml, KEY),
            Err(WxPayError::AlreadyPending { .. })
        ));
    }

    #[test]
    fn test_business_failure() {
        let xml = "<xml><return_code>SUCCESS</return_code><result_code>FAIL</result_code><err_code>ORDERNOTEXIST</err_code><err_code_des>no such order</err_code_des></xml>";
        match parse(xml, KEY) {
            Err(WxPayError::BusinessFailure {
                err_code,
                err_code_des,
            }) => {
                assert_eq!(err_code, "ORDERNOTEXIST");
                assert_eq!(err_code_des, "no such order");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_success_requires_valid_signature() {
        let xml = signed_xml(&[
            ("return_code", "SUCCESS"),
            ("result_code", "SUCCESS"),
            ("trade_state", "SUCCESS"),
        ]);
        let result = parse(&xml, KEY).unwrap();
        assert_eq!(result.trade_state(), Some(TradeState::Success));

        let tampered = xml.replace("<trade_state>SUCCESS", "<trade_state>CLOSED");
        assert!(matches!(
            parse(&tampered, KEY),
            Err(WxPayError::SignatureMismatch { .. })
        ));

        let unsigned = "<xml><return_code>SUCCESS</return_code><result_code>SUCCESS</result_code></xml>";
        assert!(matches!(
            parse(unsigned, KEY),
            Err(WxPayError::SignatureMismatch { .. })
        ));
    }
}
