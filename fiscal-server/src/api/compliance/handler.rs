//! Compliance API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::fiscal::{ComplianceError, PendingSubmission, ResolveRequest};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub register_id: Option<String>,
}

/// GET /api/fiscal/compliance/errors?register_id - 未关闭的合规错误
pub async fn list_errors(
    State(state): State<ServerState>,
    Query(query): Query<ErrorsQuery>,
) -> AppResult<Json<ApiResponse<Vec<ComplianceError>>>> {
    let errors = state
        .submissions
        .pending_compliance_errors(query.register_id.as_deref())?;
    Ok(Json(ApiResponse::success(errors)))
}

/// POST /api/fiscal/compliance/errors/:id/resolve - 人工关闭（不会重新申报）
pub async fn resolve(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> AppResult<Json<ApiResponse<ComplianceError>>> {
    let resolved = state
        .submissions
        .resolve(id, &req.resolved_by, req.notes.as_deref())?;
    Ok(Json(ApiResponse::success(resolved)))
}

/// GET /api/fiscal/compliance/submissions - 待申报队列
pub async fn list_pending(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<Vec<PendingSubmission>>>> {
    let pending = state.submissions.pending_submissions()?;
    Ok(Json(ApiResponse::success(pending)))
}
