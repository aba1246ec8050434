//! 自动结账调度器
//!
//! 每天在 `DAILY_CLOSING_TIME`（收银机时区）为所有已开通收银机执行日结；
//! 每月 1 日追加上月月结，1 月 1 日追加上年年结。
//! 失败只记录日志，由运维人工处理。

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveTime};
use chrono_tz::Tz;
use shared::fiscal::PeriodType;
use tokio_util::sync::CancellationToken;

use super::engine::ClosingEngine;
use super::error::ClosingError;
use crate::device::DeviceRegistry;
use crate::utils::time;

pub struct ClosingScheduler {
    engine: Arc<ClosingEngine>,
    devices: DeviceRegistry,
    closing_time: NaiveTime,
    shutdown: CancellationToken,
}

/// 本地日期需要执行的结账类型
pub fn due_period_types(day: u32, month: u32) -> Vec<PeriodType> {
    let mut types = vec![PeriodType::Daily];
    if day == 1 {
        types.push(PeriodType::Monthly);
        if month == 1 {
            types.push(PeriodType::Yearly);
        }
    }
    types
}

/// 距离下一次本地 `at` 的时长
pub fn duration_until(at: NaiveTime, now: i64, tz: Tz) -> Duration {
    let Some(local_now) = time::millis_to_local(now, tz) else {
        return Duration::from_secs(60);
    };
    let today = local_now.date_naive();
    let mut target = time::local_to_millis(today.and_time(at), tz);
    if target <= now {
        let tomorrow = today.succ_opt().unwrap_or(today);
        target = time::local_to_millis(tomorrow.and_time(at), tz);
    }
    Duration::from_millis((target - now).max(0) as u64)
}

impl ClosingScheduler {
    pub fn new(
        engine: Arc<ClosingEngine>,
        devices: DeviceRegistry,
        closing_time: NaiveTime,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            devices,
            closing_time,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(closing_time = %self.closing_time, "Closing scheduler started");

        loop {
            let tz = self.engine.timezone();
            let sleep_duration = duration_until(self.closing_time, shared::util::now_millis(), tz);
            tracing::info!(
                "Next automatic closing in {} minutes",
                sleep_duration.as_secs() / 60
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Closing scheduler received shutdown signal");
                    return;
                }
            }

            self.run_due_closings().await;
        }
    }

    /// 为所有收银机执行当天到期的结账
    pub async fn run_due_closings(&self) {
        let tz = self.engine.timezone();
        let Some(local_now) = time::millis_to_local(shared::util::now_millis(), tz) else {
            return;
        };
        let types = due_period_types(local_now.day(), local_now.month());

        for register_id in self.devices.register_ids() {
            for period_type in &types {
                if self.shutdown.is_cancelled() {
                    return;
                }
                match self.engine.perform_closing(&register_id, *period_type).await {
                    Ok(closing) => {
                        tracing::info!(
                            register_id = %register_id,
                            period_type = %period_type,
                            closing_id = closing.id,
                            "Automatic closing completed"
                        );
                    }
                    Err(ClosingError::AlreadyPerformed { .. }) => {
                        tracing::debug!(register_id = %register_id, period_type = %period_type, "Closing already performed");
                    }
                    Err(e) => {
                        tracing::error!(
                            register_id = %register_id,
                            period_type = %period_type,
                            error = %e,
                            "Automatic closing failed, operator action required"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_due_period_types() {
        assert_eq!(due_period_types(15, 6), vec![PeriodType::Daily]);
        assert_eq!(
            due_period_types(1, 6),
            vec![PeriodType::Daily, PeriodType::Monthly]
        );
        assert_eq!(
            due_period_types(1, 1),
            vec![PeriodType::Daily, PeriodType::Monthly, PeriodType::Yearly]
        );
    }

    #[test]
    fn test_duration_until_later_today_and_tomorrow() {
        let tz = chrono_tz::Europe::Vienna;
        let date = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        let now = time::local_to_millis(date.and_hms_opt(23, 0, 0).unwrap(), tz);

        let at = NaiveTime::from_hms_opt(23, 55, 0).unwrap();
        assert_eq!(duration_until(at, now, tz), Duration::from_secs(55 * 60));

        let at = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        assert_eq!(duration_until(at, now, tz), Duration::from_secs(23 * 3600));
    }
}
