//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`devices`] - 签名设备开通、连接、状态
//! - [`records`] - 签名记录（销售 / 红冲）
//! - [`chain`] - 签名链校验与冻结解除
//! - [`closings`] - 日结 / 月结 / 年结
//! - [`compliance`] - 税务申报错误与人工关闭
//! - [`audit`] - 设备审计日志

pub mod audit;
pub mod chain;
pub mod closings;
pub mod compliance;
pub mod devices;
pub mod health;
pub mod records;

use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{ApiResponse, AppError, AppResult};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(target: "http_access", "{} {} {}", method, uri, response.status());
    response
}

/// Build a router with all routes registered (no middleware, no state)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(devices::router())
        .merge(records::router())
        .merge(chain::router())
        .merge(closings::router())
        .merge(compliance::router())
        .merge(audit::router())
}

/// Build a fully configured application with all middleware and state
pub fn build_app(state: ServerState) -> Router {
    build_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
}
