//! Logging setup
//!
//! Console output always; a daily rolling file under the configured log
//! directory when one is set. `RUST_LOG` overrides the configured level.

use chrono::{Local, NaiveDate, TimeZone};
use crac_core::ServerConfig;
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "crac.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber
pub fn init(config: &ServerConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let console_layer = fmt::layer().with_target(false).with_ansi(true);

    let Some(log_dir) = config.log_directory.as_deref() else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()?;
        tracing::info!("Logging to console only");
        return Ok(());
    };

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()?;
        tracing::warn!(
            "Cannot create log directory {}, logging to console only: {}",
            log_dir.display(),
            e
        );
        return Ok(());
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD.set(guard).ok();

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging to {}", log_dir.display());
    cleanup_old_logs(log_dir, config.log_retention_days, Local::now().date_naive());
    Ok(())
}

/// Delete rolled log files dated more than `keep_days` before `today`
pub fn cleanup_old_logs(log_dir: &Path, keep_days: u64, today: NaiveDate) -> usize {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read log directory for cleanup: {}", e);
            return 0;
        }
    };

    let cutoff = today - chrono::Duration::days(keep_days as i64);
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

        if date >= cutoff {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed old log file {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("Cannot remove old log file {}: {}", path.display(), e),
        }
    }

    removed
}

/// Date suffix of a rolled file name like `crac.log.2024-01-15`
fn log_file_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    // Skip dates that have no valid local midnight
    Local
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .earliest()
        .map(|_| date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("crac-logging-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date("crac.log.2024-01-15"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(log_file_date("crac.log"), None);
        assert_eq!(log_file_date("crac.log.yesterday"), None);
        assert_eq!(log_file_date("other.log.2024-01-15"), None);
    }

    #[test]
    fn test_cleanup_keeps_recent_files() {
        let dir = scratch_dir("cleanup");
        for name in [
            "crac.log.2024-01-01",
            "crac.log.2024-01-09",
            "crac.log.2024-01-10",
            "notes.txt",
        ] {
            fs::write(dir.join(name), "x").unwrap();
        }

        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let removed = cleanup_old_logs(&dir, 5, today);

        assert_eq!(removed, 2);
        assert!(!dir.join("crac.log.2024-01-01").exists());
        assert!(!dir.join("crac.log.2024-01-09").exists());
        assert!(dir.join("crac.log.2024-01-10").exists());
        assert!(dir.join("notes.txt").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cleanup_missing_directory() {
        let dir = std::env::temp_dir().join("crac-logging-does-not-exist");
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(cleanup_old_logs(&dir, 7, today), 0);
    }
}
