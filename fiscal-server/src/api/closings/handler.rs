//! Closing API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::fiscal::{ClosingCheck, ClosingPeriod, PeriodType};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppError, AppResult};

const MAX_HISTORY_LIMIT: usize = 366;

fn parse_period_type(value: &str) -> AppResult<PeriodType> {
    value
        .parse()
        .map_err(|e: String| AppError::validation(e).with_detail("field", "period_type"))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub period_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    31
}

/// GET /api/fiscal/closings/:register_id?period_type&limit - 结账历史
pub async fn history(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<Vec<ClosingPeriod>>>> {
    let period_type = query.period_type.as_deref().map(parse_period_type).transpose()?;
    let closings = state.closing.get_closing_history(
        &register_id,
        period_type,
        query.limit.min(MAX_HISTORY_LIMIT),
    )?;
    Ok(Json(ApiResponse::success(closings)))
}

/// GET /api/fiscal/closings/:register_id/:period_type/check - 结账预检
pub async fn check(
    State(state): State<ServerState>,
    Path((register_id, period_type)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<ClosingCheck>>> {
    let period_type = parse_period_type(&period_type)?;
    state.devices.get(&register_id)?;
    let check = state.closing.can_perform_closing(&register_id, period_type)?;
    Ok(Json(ApiResponse::success(check)))
}

/// POST /api/fiscal/closings/:register_id/:period_type - 执行结账
pub async fn perform(
    State(state): State<ServerState>,
    Path((register_id, period_type)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<ClosingPeriod>>> {
    let period_type = parse_period_type(&period_type)?;
    let closing = state.closing.perform_closing(&register_id, period_type).await?;
    Ok(Json(ApiResponse::success(closing)))
}
