//! Notification relay tests

mod common;

use common::*;
use mockito::{Matcher, Server};
use serde_json::json;
use wxpay::{NotifyAck, WxPayError};

#[cfg(feature = "axum")]
use {
    axum::body::Body,
    axum::http::{Request, StatusCode},
    std::sync::Arc,
    tower::ServiceExt,
};

fn notification(relay_url: &str) -> String {
    let attach = json!({ "NotifyUrl": relay_url }).to_string();
    signed_response(&[
        ("appid", "wx2421b1c4370ec43b"),
        ("attach", attach.as_str()),
        ("notify_url", "https://gateway-hook.example/notify"),
        ("out_trade_no", "order-1"),
        ("result_code", "SUCCESS"),
        ("return_code", "SUCCESS"),
        ("total_fee", "888"),
    ])
}

#[tokio::test]
async fn test_notification_is_relayed_and_acknowledged() {
    let mut server = Server::new_async().await;
    let relay = server
        .mock("POST", "/callback")
        .match_body(Matcher::PartialJson(json!({
            "out_trade_no": "order-1",
            "total_fee": "888",
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let body = notification(&format!("{}/callback", server.url()));

    let ack = client.relay_notification(&body, &credentials()).await.unwrap();
    assert_eq!(ack, NotifyAck::success());
    relay.assert_async().await;
}

#[tokio::test]
async fn test_missing_attach_is_not_relayed() {
    let mut server = Server::new_async().await;
    let relay = server
        .mock("POST", "/callback")
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let body = signed_response(&[
        ("notify_url", "https://gateway-hook.example/notify"),
        ("out_trade_no", "order-1"),
    ]);

    let err = client
        .relay_notification(&body, &credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, WxPayError::Validation { .. }));
    relay.assert_async().await;
}

#[tokio::test]
async fn test_non_json_attach_is_not_relayed() {
    let mut server = Server::new_async().await;
    let relay = server
        .mock("POST", "/callback")
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let body = signed_response(&[
        ("attach", "callback=/callback"),
        ("notify_url", "https://gateway-hook.example/notify"),
    ]);

    let err = client
        .relay_notification(&body, &credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, WxPayError::Validation { .. }));
    relay.assert_async().await;
}

#[tokio::test]
async fn test_failed_relay_is_not_acknowledged() {
    let mut server = Server::new_async().await;
    let _relay = server
        .mock("POST", "/callback")
        .with_status(502)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let body = notification(&format!("{}/callback", server.url()));

    let err = client
        .relay_notification(&body, &credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, WxPayError::HttpStatus { status: 502, .. }));
}

#[cfg(feature = "axum")]
#[tokio::test]
async fn test_axum_route_acknowledges_valid_notification() {
    let mut server = Server::new_async().await;
    let _relay = server
        .mock("POST", "/callback")
        .with_status(200)
        .create_async()
        .await;

    let client = Arc::new(client_for(&server.url()));
    let app = wxpay::axum::notify_router(client, Arc::new(credentials()));

    let request = Request::builder()
        .method("POST")
        .uri("/notify")
        .body(Body::from(notification(&format!("{}/callback", server.url()))))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(body.to_vec()).unwrap(),
        "<xml><return_code>SUCCESS</return_code><return_msg>OK</return_msg></xml>"
    );
}

#[cfg(feature = "axum")]
#[tokio::test]
async fn test_axum_route_rejects_invalid_notification() {
    let client = Arc::new(client_for("http://127.0.0.1:9"));
    let app = wxpay::axum::notify_router(client, Arc::new(credentials()));

    let request = Request::builder()
        .method("POST")
        .uri("/notify")
        .body(Body::from("<xml><out_trade_no>order-1</out_trade_no></xml>"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
}
