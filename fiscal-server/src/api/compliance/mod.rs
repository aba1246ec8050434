//! Compliance API 模块 (税务申报)

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/fiscal/compliance", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/errors", get(handler::list_errors))
        .route("/errors/{id}/resolve", post(handler::resolve))
        .route("/submissions", get(handler::list_pending))
}
