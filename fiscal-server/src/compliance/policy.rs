//! 重试策略与响应分类

use std::time::Duration;

use shared::fiscal::SubmissionErrorType;

/// 指数退避：`base * 2^(retry_count-1)`，不超过 `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// 一次失败之后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// 第 `retry_count` 次失败后的等待时间
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// `attempt_number` 从 1 开始
    pub fn decide(&self, error_type: SubmissionErrorType, attempt_number: u32) -> FailureDecision {
        if !error_type.is_retryable() || attempt_number >= self.max_attempts {
            return FailureDecision::GiveUp;
        }
        FailureDecision::RetryAfter(self.backoff(attempt_number))
    }
}

/// HTTP 状态码分类，成功返回 None
pub fn classify_status(status: u16) -> Option<SubmissionErrorType> {
    match status {
        200..=299 => None,
        401 | 403 => Some(SubmissionErrorType::AuthenticationFailure),
        408 | 429 | 500..=599 => Some(SubmissionErrorType::ServerError),
        _ => Some(SubmissionErrorType::ValidationRejected),
    }
}
