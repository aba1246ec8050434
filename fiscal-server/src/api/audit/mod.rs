//! Device audit API 模块

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/fiscal/audit", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/verify", get(handler::verify_chain))
        .route("/{register_id}", get(handler::recent))
}
