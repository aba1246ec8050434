//! Signature chain API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use shared::fiscal::{ChainConflictMarker, ChainVerification, SignedRecord};

use crate::core::ServerState;
use crate::storage::ChainHead;
use crate::utils::{ApiResponse, AppResult};

const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct ChainStatus {
    pub cash_register_id: String,
    pub head: Option<ChainHead>,
    pub conflict: Option<ChainConflictMarker>,
}

/// GET /api/fiscal/chain/:register_id - 链头与冻结状态
pub async fn head(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
) -> AppResult<Json<ApiResponse<ChainStatus>>> {
    state.devices.get(&register_id)?;
    let status = ChainStatus {
        head: state.ledger.chain_head(&register_id)?,
        conflict: state.ledger.active_conflict(&register_id)?,
        cash_register_id: register_id,
    };
    Ok(Json(ApiResponse::success(status)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_from")]
    pub from: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_from() -> u64 {
    1
}

fn default_limit() -> usize {
    100
}

/// GET /api/fiscal/chain/:register_id/records?from&limit
pub async fn list_records(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<SignedRecord>>>> {
    let records = state.ledger.list_records(
        &register_id,
        query.from,
        query.limit.min(MAX_LIST_LIMIT),
    )?;
    Ok(Json(ApiResponse::success(records)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

/// GET /api/fiscal/chain/:register_id/verify?from&to
///
/// 发现断裂时标记记录并冻结收银机。
pub async fn verify(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<ApiResponse<ChainVerification>>> {
    state.devices.get(&register_id)?;
    let verification = state.ledger.verify_chain(
        &register_id,
        query.from.unwrap_or(1),
        query.to.unwrap_or(u64::MAX),
    )?;
    Ok(Json(ApiResponse::success(verification)))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub released_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/fiscal/chain/:register_id/release - 人工解除冻结
pub async fn release(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
    Json(req): Json<ReleaseRequest>,
) -> AppResult<Json<ApiResponse<ChainConflictMarker>>> {
    let marker = state.ledger.release_chain_conflict(
        &register_id,
        &req.released_by,
        req.notes.as_deref(),
    )?;
    Ok(Json(ApiResponse::success(marker)))
}
