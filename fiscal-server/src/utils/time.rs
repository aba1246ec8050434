//! 时间工具函数 - 收银机时区转换
//!
//! 存储层只使用 `i64` Unix millis，日期计算统一在这里完成。

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// 本地时间 → Unix millis
///
/// DST gap fallback: 本地时间不存在 (夏令时跳跃) 时按 UTC 解释。
pub fn local_to_millis(naive: NaiveDateTime, tz: Tz) -> i64 {
    naive
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// 日期开始 (00:00:00) → Unix millis
pub fn day_start_millis(date: NaiveDate, tz: Tz) -> i64 {
    local_to_millis(date.and_time(NaiveTime::MIN), tz)
}

/// Unix millis → 本地日期时间
pub fn millis_to_local(millis: i64, tz: Tz) -> Option<DateTime<Tz>> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&tz))
}

/// 解析 HH:MM
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// 解析 IANA 时区名
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_start_in_vienna() {
        let tz = chrono_tz::Europe::Vienna;
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        // 冬令时 UTC+1
        let expected = NaiveDate::from_ymd_opt(2026, 1, 14)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(day_start_millis(date, tz), expected);
    }

    #[test]
    fn test_millis_round_trip() {
        let tz = chrono_tz::Europe::Vienna;
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let local = millis_to_local(day_start_millis(date, tz), tz).unwrap();
        assert_eq!(local.date_naive(), date);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_hhmm("23:55"), NaiveTime::from_hms_opt(23, 55, 0));
        assert!(parse_hhmm("25:00").is_none());
        assert_eq!(parse_timezone("Europe/Vienna"), Some(chrono_tz::Europe::Vienna));
        assert!(parse_timezone("Mars/Olympus").is_none());
    }
}
