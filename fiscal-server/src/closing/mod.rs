//! Closing Engine
//!
//! 把一个时间窗口内的签名记录汇总为新的结账签名记录，
//! 链接在同一条签名链上。

mod engine;
mod error;
mod period;
mod scheduler;

pub use engine::{ClosingAggregate, ClosingEngine, aggregate, closing_correlation_id};
pub use error::{ClosingError, ClosingResult};
pub use period::{PeriodWindow, period_dates, period_window};
pub use scheduler::{ClosingScheduler, due_period_types, duration_until};
