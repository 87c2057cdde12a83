use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Per-run log file name, `worker_YYYYmmdd_HHMMSS.log`
pub fn log_file_name() -> String {
    format!("worker_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// Default filter directive for a configured level
pub fn default_directive(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("subgen_worker={},warn", level)
}

fn open_log_file(log_dir: &Path) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = log_dir.join(log_file_name());
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    Ok((file, path))
}

/// Stderr-only subscriber for the work done before settings are known
pub fn bootstrap(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive("info", verbose)));
    fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .finish()
}

/// Install the global subscriber: stderr plus a per-run file in `log_dir`.
///
/// Stdout is left untouched. `RUST_LOG` overrides the default filter. If the
/// log file cannot be created, logging continues on stderr only. Returns the
/// log file path when one was opened.
pub fn init(log_dir: &Path, level: &str, verbose: bool) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level, verbose)));

    let (file_layer, log_path, file_error) = match open_log_file(log_dir) {
        Ok((file, path)) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            Some(path),
            None,
        ),
        Err(e) => (None, None, Some(e)),
    };

    let stderr_layer = fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        match (&log_path, file_error) {
            (Some(path), _) => tracing::info!("📝 Logging to {}", path.display()),
            (None, Some(e)) => tracing::warn!("⚠️ File logging disabled: {:#}", e),
            _ => {}
        }
    }

    log_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_shape() {
        let name = log_file_name();
        assert!(name.starts_with("worker_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "worker_20240101_120000.log".len());
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("info", false), "subgen_worker=info,warn");
        assert_eq!(default_directive("info", true), "subgen_worker=debug,warn");
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let (_file, path) = open_log_file(&dir.path().join("logs")).unwrap();
        assert!(path.exists());
    }
}
