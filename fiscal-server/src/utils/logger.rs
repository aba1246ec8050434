//! Logging Infrastructure
//!
//! Structured logging setup with support for both development and production environments.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// 日志文件前缀
const LOG_FILE_PREFIX: &str = "fiscal-server";

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional file output
///
/// `RUST_LOG` 优先于 `log_level`。`log_dir` 存在时写入按天滚动的日志文件。
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = json.unwrap_or(false);

    let file_dir = log_dir
        .map(Path::new)
        .filter(|p| p.exists())
        .and_then(|p| p.to_str());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    // try_init: 测试中可能重复初始化
    let result = match (file_dir, json) {
        (Some(dir), true) => builder
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
            .try_init(),
        (Some(dir), false) => builder
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
            .try_init(),
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Logger already initialized: {e}");
    }
}

/// 删除超过 `days` 天的日志文件
pub fn cleanup_old_logs(log_dir: &str, days: u64) -> std::io::Result<usize> {
    let max_age = std::time::Duration::from_secs(days * 24 * 60 * 60);
    let now = std::time::SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log || !path.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_fresh_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fiscal-server.2026-10-16"), "x").unwrap();
        std::fs::write(dir.path().join("other.log"), "x").unwrap();

        let removed = cleanup_old_logs(dir.path().to_str().unwrap(), 7).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_cleanup_zero_days_removes_own_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fiscal-server.2026-10-15"), "x").unwrap();
        std::fs::write(dir.path().join("other.log"), "x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let removed = cleanup_old_logs(dir.path().to_str().unwrap(), 0).unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("other.log").exists());
    }
}
