//! Signature chain API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/fiscal/chain", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{register_id}", get(handler::head))
        .route("/{register_id}/records", get(handler::list_records))
        .route("/{register_id}/verify", get(handler::verify))
        .route("/{register_id}/release", post(handler::release))
}
