//! Unified error system for the fiscal backend
//!
//! This module provides the error handling shared by the server and operator tooling:
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`UserAction`]: What the operator should do about an error
//! - [`AppError`]: Rich error type with codes, messages, and details
//! - [`ApiResponse`]: Unified API response format
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Fiscal device errors
//! - 2xxx: Ledger errors
//! - 3xxx: Closing errors
//! - 4xxx: Compliance errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ApiResponse};
//!
//! let err = AppError::new(ErrorCode::DeviceUnavailable);
//! let err = AppError::validation("Missing correlation id")
//!     .with_detail("field", "correlation_id");
//! let response = ApiResponse::<()>::error(&err);
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::{ErrorCategory, UserAction};
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult};
