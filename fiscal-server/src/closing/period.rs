//! 结账时间窗口
//!
//! 窗口为半开区间 `[start, end)`，Unix millis，按收银机时区计算：
//! - Daily: 当天
//! - Monthly: 上一个完整自然月
//! - Yearly: 上一个完整自然年

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use shared::fiscal::PeriodType;

use super::error::{ClosingError, ClosingResult};
use crate::utils::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: i64,
    pub end: i64,
}

impl PeriodWindow {
    pub fn contains(&self, millis: i64) -> bool {
        millis >= self.start && millis < self.end
    }
}

fn invalid(what: &str) -> ClosingError {
    ClosingError::InvalidPeriod(what.to_string())
}

/// 按本地日期计算窗口的起止日期
pub fn period_dates(period_type: PeriodType, today: NaiveDate) -> ClosingResult<(NaiveDate, NaiveDate)> {
    match period_type {
        PeriodType::Daily => {
            let next = today.succ_opt().ok_or_else(|| invalid("date out of range"))?;
            Ok((today, next))
        }
        PeriodType::Monthly => {
            let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                .ok_or_else(|| invalid("date out of range"))?;
            let (year, month) = if today.month() == 1 {
                (today.year() - 1, 12)
            } else {
                (today.year(), today.month() - 1)
            };
            let previous = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| invalid("date out of range"))?;
            Ok((previous, this_month))
        }
        PeriodType::Yearly => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), 1, 1)
                .ok_or_else(|| invalid("date out of range"))?;
            let previous = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)
                .ok_or_else(|| invalid("date out of range"))?;
            Ok((previous, this_year))
        }
    }
}

/// `now` 时刻对应的结账窗口
pub fn period_window(period_type: PeriodType, now: i64, tz: Tz) -> ClosingResult<PeriodWindow> {
    let today = time::millis_to_local(now, tz)
        .ok_or_else(|| invalid("timestamp out of range"))?
        .date_naive();
    let (start, end) = period_dates(period_type, today)?;
    Ok(PeriodWindow {
        start: time::day_start_millis(start, tz),
        end: time::day_start_millis(end, tz),
    })
}
