//! Logging setup
//!
//! Console output always, plus a daily-rolling file when a log directory is
//! given. `RUST_LOG` overrides the default `info` filter.

use crate::error::BridgeResult;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "viscapad.log";

/// Days of log files kept on startup
pub const LOG_RETENTION_DAYS: i64 = 7;

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Keeps the non-blocking file writer alive
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(log_dir: Option<&Path>) -> BridgeResult<()> {
    let console_layer = fmt::layer().with_target(false);

    let Some(dir) = log_dir else {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(console_layer)
            .try_init();
        return Ok(());
    };

    std::fs::create_dir_all(dir)?;
    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        LOG_GUARD.set(guard).ok();
        LOG_DIR.set(dir.to_path_buf()).ok();
        tracing::info!("Logging to {}", dir.display());
        cleanup_old_logs(dir, LOG_RETENTION_DAYS);
    }
    Ok(())
}

/// Directory file logs are written to, if file logging is on
pub fn log_dir() -> Option<&'static Path> {
    LOG_DIR.get().map(PathBuf::as_path)
}

/// Parse the date suffix of a rolled log file name
fn log_file_date(name: &str) -> Option<chrono::NaiveDate> {
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Delete rolled log files older than `keep_days`; returns how many went
pub fn cleanup_old_logs(dir: &Path, keep_days: i64) -> usize {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(keep_days);

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read log directory for cleanup: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(log_file_date)
        else {
            continue;
        };
        if date < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::debug!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
    if removed > 0 {
        tracing::info!("Removed {} old log files", removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date("viscapad.log.2024-01-15"),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(log_file_date("viscapad.log"), None);
        assert_eq!(log_file_date("other.log.2024-01-15"), None);
        assert_eq!(log_file_date("viscapad.log.yesterday"), None);
    }

    #[test]
    fn test_cleanup_keeps_recent_files() {
        let dir = std::env::temp_dir().join(format!("viscapad-logs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let today = chrono::Local::now().date_naive();
        let recent = dir.join(format!("{}.{}", LOG_FILE_PREFIX, today.format("%Y-%m-%d")));
        let old = dir.join(format!("{}.2001-02-03", LOG_FILE_PREFIX));
        let unrelated = dir.join("notes.txt");
        for path in [&recent, &old, &unrelated] {
            std::fs::write(path, b"x").unwrap();
        }

        assert_eq!(cleanup_old_logs(&dir, 7), 1);
        assert!(recent.exists());
        assert!(!old.exists());
        assert!(unrelated.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        assert!(init_logging(None).is_ok());
        assert!(init_logging(None).is_ok());
    }
}
