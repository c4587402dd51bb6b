//! Asynchronous payment notifications
//!
//! The gateway pushes a signed XML document when a prepay order is paid. The
//! merchant's real callback URL travels inside the `attach` field as JSON
//! (`{"NotifyUrl": "..."}`); the full field set is relayed there and the gateway
//! receives [`NotifyAck::success`]. Any validation failure returns an error and
//! no acknowledgement, so the gateway keeps retrying delivery.

use crate::client::WxPayClient;
use crate::response::ResultSet;
use crate::sign::SIGN_FIELD;
use crate::types::{Credentials, NotifyAck};
use crate::{Result, WxPayError};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct AttachPayload {
    #[serde(rename = "NotifyUrl")]
    notify_url: String,
}

/// A notification that passed validation
#[derive(Debug, Clone)]
pub struct Notification {
    /// All fields of the inbound document
    pub fields: ResultSet,
    /// Relay target taken from `attach`
    pub relay_url: String,
}

/// Decode and validate an inbound notification
pub fn validate_notification(body: &str, key: &str) -> Result<Notification> {
    let fields = ResultSet::from_xml(body)
        .map_err(|e| WxPayError::validation(format!("notification is not valid XML: {}", e)))?;

    if !fields.contains(SIGN_FIELD) {
        return Err(WxPayError::validation("notification is not signed"));
    }
    fields.verify_signature(key)?;

    let attach = fields
        .get("attach")
        .filter(|attach| !attach.trim().is_empty())
        .ok_or_else(|| {
            WxPayError::validation("NotifyUrl is required in attach, but attach is empty")
        })?;
    let payload: AttachPayload = serde_json::from_str(attach)
        .map_err(|_| WxPayError::validation("attach is expected to be a JSON object"))?;
    if payload.notify_url.trim().is_empty() {
        return Err(WxPayError::validation("NotifyUrl in attach is empty"));
    }

    // Only presence is checked; the relay target comes from attach
    if !fields.contains("notify_url") {
        return Err(WxPayError::validation("notify_url is missing"));
    }

    Ok(Notification {
        relay_url: payload.notify_url,
        fields,
    })
}

impl WxPayClient {
    /// Validate a gateway notification, relay it to the merchant callback and
    /// return the acknowledgement for the gateway
    pub async fn relay_notification(
        &self,
        body: &str,
        credentials: &Credentials,
    ) -> Result<NotifyAck> {
        let notification = validate_notification(body, credentials.key()).map_err(|err| {
            warn!(error = %err, "Rejected payment notification");
            err
        })?;

        info!(
            relay_url = %notification.relay_url,
            out_trade_no = notification.fields.get("out_trade_no").unwrap_or_default(),
            "Relaying payment notification"
        );
        self.transport()
            .post_json(&notification.relay_url, notification.fields.as_map())
            .await?;

        Ok(NotifyAck::success())
    }
}
