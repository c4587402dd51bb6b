//! MD5-with-key request signing and response verification
//!
//! Canonical form: non-empty fields other than `sign`, ascending by name,
//! joined as `k=v&k=v`, followed by `&key=<merchant key>`. The digest is
//! uppercase hex.

use crate::{Result, WxPayError};

/// Name of the signature field
pub const SIGN_FIELD: &str = "sign";

/// Build the canonical string that is hashed (without the key suffix)
pub fn canonical_string<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut pairs: Vec<(&str, &str)> = fields
        .into_iter()
        .filter(|(k, v)| *k != SIGN_FIELD && !v.is_empty())
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the signature of a field set
pub fn sign<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>, key: &str) -> String {
    let payload = format!("{}&key={}", canonical_string(fields), key);
    hex::encode_upper(md5::compute(payload.as_bytes()).0)
}

/// Check `signature` against the fields it claims to cover.
///
/// Comparison is case-insensitive and does not short-circuit on the first
/// differing byte.
pub fn verify<'a>(
    fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    signature: &str,
    key: &str,
) -> Result<()> {
    let expected = sign(fields, key);
    if constant_time_eq_ignore_case(expected.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(WxPayError::SignatureMismatch {
            expected,
            got: signature.to_string(),
        })
    }
}

fn constant_time_eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b)
        .fold(0u8, |acc, (x, y)| {
            acc | (x.to_ascii_uppercase() ^ y.to_ascii_uppercase())
        })
        == 0
}
