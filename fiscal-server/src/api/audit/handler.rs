//! Device audit API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::audit::{AuditChainVerification, DeviceAuditEntry};
use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

const MAX_RECENT_LIMIT: usize = 1000;

/// GET /api/fiscal/audit/verify - 验证设备审计链完整性
pub async fn verify_chain(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<AuditChainVerification>>> {
    let verification = state.audit.verify_chain()?;
    Ok(Json(ApiResponse::success(verification)))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// GET /api/fiscal/audit/:register_id?limit - 收银机最近的设备操作
pub async fn recent(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
    Query(query): Query<RecentQuery>,
) -> AppResult<Json<ApiResponse<Vec<DeviceAuditEntry>>>> {
    let entries = state
        .audit
        .recent(&register_id, query.limit.min(MAX_RECENT_LIMIT))?;
    Ok(Json(ApiResponse::success(entries)))
}
