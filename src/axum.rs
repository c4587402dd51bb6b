//! Axum integration for gateway notifications

use crate::transport::XML_CONTENT_TYPE;
use crate::types::Credentials;
use crate::WxPayClient;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Default path the gateway posts notifications to
pub const DEFAULT_NOTIFY_PATH: &str = "/notify";

/// Shared state of the notification route
#[derive(Debug, Clone)]
pub struct NotifyState {
    pub client: Arc<WxPayClient>,
    pub credentials: Arc<Credentials>,
}

/// Router serving [`DEFAULT_NOTIFY_PATH`]
pub fn notify_router(client: Arc<WxPayClient>, credentials: Arc<Credentials>) -> Router {
    notify_router_at(DEFAULT_NOTIFY_PATH, client, credentials)
}

/// Router serving notifications at a custom path
pub fn notify_router_at(
    path: &str,
    client: Arc<WxPayClient>,
    credentials: Arc<Credentials>,
) -> Router {
    Router::new()
        .route(path, post(notify_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(NotifyState {
            client,
            credentials,
        })
}

/// Relay the notification; answer with the XML acknowledgement or a bare 400
pub async fn notify_handler(State(state): State<NotifyState>, body: String) -> Response {
    let ack = state
        .client
        .relay_notification(&body, &state.credentials)
        .await
        .and_then(|ack| ack.to_xml());

    match ack {
        Ok(xml) => (StatusCode::OK, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], xml).into_response(),
        Err(err) => {
            warn!(error = %err, "Notification not acknowledged");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
