//! Fiscal device API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::fiscal::{FiscalDeviceStatus, ProvisionDeviceRequest};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub serial_number: String,
}

/// GET /api/fiscal/devices - 所有收银机的设备状态
pub async fn list(
    State(state): State<ServerState>,
) -> AppResult<Json<ApiResponse<Vec<FiscalDeviceStatus>>>> {
    let mut statuses: Vec<_> = state.devices.all().iter().map(|g| g.status()).collect();
    statuses.sort_by(|a, b| a.cash_register_id.cmp(&b.cash_register_id));
    Ok(Json(ApiResponse::success(statuses)))
}

/// POST /api/fiscal/devices - 开通设备
pub async fn provision(
    State(state): State<ServerState>,
    Json(req): Json<ProvisionDeviceRequest>,
) -> AppResult<Json<ApiResponse<FiscalDeviceStatus>>> {
    let status = state.devices.provision(req)?;
    Ok(Json(ApiResponse::success(status)))
}

/// GET /api/fiscal/devices/:register_id
pub async fn status(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
) -> AppResult<Json<ApiResponse<FiscalDeviceStatus>>> {
    let gateway = state.devices.get(&register_id)?;
    Ok(Json(ApiResponse::success(gateway.status())))
}

/// POST /api/fiscal/devices/:register_id/connect
pub async fn connect(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
    Json(req): Json<ConnectRequest>,
) -> AppResult<Json<ApiResponse<FiscalDeviceStatus>>> {
    let gateway = state.devices.get(&register_id)?;
    let status = gateway.connect(&req.serial_number).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// POST /api/fiscal/devices/:register_id/disconnect
pub async fn disconnect(
    State(state): State<ServerState>,
    Path(register_id): Path<String>,
) -> AppResult<Json<ApiResponse<FiscalDeviceStatus>>> {
    let gateway = state.devices.get(&register_id)?;
    let status = gateway.disconnect().await?;
    Ok(Json(ApiResponse::success(status)))
}
