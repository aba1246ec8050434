//! Signed record API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use shared::fiscal::{CreateRecordRequest, SignedRecord, SubmissionAttempt, SubmissionState};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

/// POST /api/fiscal/records - 签名一笔销售或红冲
///
/// 同一 correlation_id 重复调用返回同一条记录。
pub async fn create(
    State(state): State<ServerState>,
    Json(req): Json<CreateRecordRequest>,
) -> AppResult<Json<ApiResponse<SignedRecord>>> {
    let record = state.ledger.create_signed_record(req).await?;
    Ok(Json(ApiResponse::success(record)))
}

/// GET /api/fiscal/records/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<SignedRecord>>> {
    let record = state.ledger.get_record(&id)?;
    Ok(Json(ApiResponse::success(record)))
}

#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub state: Option<SubmissionState>,
    pub attempts: Vec<SubmissionAttempt>,
}

/// GET /api/fiscal/records/:id/submission - 申报状态与尝试记录
pub async fn submission(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<SubmissionView>>> {
    let record = state.ledger.get_record(&id)?;
    let view = SubmissionView {
        state: state.submissions.submission_state(&record.id)?,
        attempts: state.submissions.submission_attempts(&record.id)?,
    };
    Ok(Json(ApiResponse::success(view)))
}
