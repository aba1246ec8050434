//! Fiscal device API 模块 (签名设备)

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/fiscal/devices", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::provision))
        .route("/{register_id}", get(handler::status))
        .route("/{register_id}/connect", post(handler::connect))
        .route("/{register_id}/disconnect", post(handler::disconnect))
}
