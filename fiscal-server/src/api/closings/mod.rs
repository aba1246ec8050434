//! Closing API 模块 (日结 / 月结 / 年结)

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/fiscal/closings", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{register_id}", get(handler::history))
        .route("/{register_id}/{period_type}", post(handler::perform))
        .route("/{register_id}/{period_type}/check", get(handler::check))
}
