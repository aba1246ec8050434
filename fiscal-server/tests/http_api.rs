//! HTTP API 冒烟测试（tower oneshot，无网络）

mod common;

use axum::body::Body;
use common::*;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn sale_body(correlation: &str, normal: &str) -> Value {
    json!({
        "cash_register_id": "REG-1",
        "record_type": "sale",
        "totals": { "normal": normal },
        "correlation_id": correlation
    })
}

#[tokio::test]
async fn provision_sign_close_and_inspect_over_http() {
    let ctx = context();
    let app = fiscal_server::api::build_app(ctx.state.clone());

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let provision = serde_json::to_value(provision_request("REG-1", "SN-1", true)).unwrap();
    let (status, body) = call(&app, "POST", "/api/fiscal/devices", Some(provision)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["connection_state"], "disconnected");

    // 未连接：提示重新连接设备
    let (status, body) = call(&app, "POST", "/api/fiscal/records", Some(sale_body("tx-0", "1"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["user_action"], "reconnect_device");

    let (status, body) = call(
        &app,
        "POST",
        "/api/fiscal/devices/REG-1/connect",
        Some(json!({ "serial_number": "SN-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["connection_state"], "connected");

    let (status, body) = call(&app, "POST", "/api/fiscal/records", Some(sale_body("tx-1", "12.50"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["signature_counter"], 1);
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "GET", &format!("/api/fiscal/records/{record_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["correlation_id"], "tx-1");

    let (status, body) = call(&app, "GET", "/api/fiscal/chain/REG-1/verify", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);

    let (status, body) = call(&app, "GET", "/api/fiscal/closings/REG-1/daily/check", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["can_perform"], true);

    let (status, body) = call(&app, "POST", "/api/fiscal/closings/REG-1/daily", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["transaction_count"], 1);

    let (status, body) = call(&app, "POST", "/api/fiscal/closings/REG-1/daily", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_ne!(body["code"], 0);

    let (status, body) = call(&app, "GET", "/api/fiscal/closings/REG-1?period_type=daily", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, "POST", "/api/fiscal/closings/REG-1/weekly", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "GET", "/api/fiscal/audit/verify", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["chain_intact"], true);

    let (status, body) = call(&app, "GET", "/api/fiscal/compliance/errors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_register_and_missing_error_map_to_not_found() {
    let ctx = context();
    let app = fiscal_server::api::build_app(ctx.state.clone());

    let (status, _) = call(&app, "GET", "/api/fiscal/devices/NOPE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/fiscal/compliance/errors/42/resolve",
        Some(json!({ "resolved_by": "operator-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/fiscal/chain/REG-1/release",
        Some(json!({ "released_by": "operator-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
