//! 工具模块 - 日志与时间工具
//!
//! 错误类型与响应结构统一来自 `shared::error`。

pub mod logger;
pub mod time;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
