//! Shared types for the fiscal backend
//!
//! Fiscal domain model, unified error codes and response envelope,
//! and small time/ID helpers used by fiscal-server and operator tooling.

pub mod error;
pub mod fiscal;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
