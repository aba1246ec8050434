//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 健康检查 (设备连接数、待申报数、审计链) |

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::time::SystemTime;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// healthy | degraded
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    registers: usize,
    connected_devices: usize,
    frozen_registers: usize,
    pending_submissions: Option<usize>,
    open_compliance_errors: Option<usize>,
}

static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

fn get_uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(SystemTime::now);
    SystemTime::now()
        .duration_since(*start)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// 存储读取失败时返回 degraded
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let gateways = state.devices.all();
    let connected_devices = gateways.iter().filter(|g| g.is_connected()).count();
    let frozen_registers = gateways
        .iter()
        .filter(|g| matches!(state.ledger.active_conflict(g.register_id()), Ok(Some(_))))
        .count();

    let pending_submissions = state.submissions.pending_submissions().ok().map(|p| p.len());
    let open_compliance_errors = state
        .submissions
        .pending_compliance_errors(None)
        .ok()
        .map(|e| e.len());

    let healthy = pending_submissions.is_some() && open_compliance_errors.is_some();

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: get_uptime_seconds(),
        registers: gateways.len(),
        connected_devices,
        frozen_registers,
        pending_submissions,
        open_compliance_errors,
    })
}
