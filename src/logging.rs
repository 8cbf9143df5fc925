//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and, in parallel, to a file. `RUSTY_RAG_LOG_FILE`
//! selects the file path (`off` disables file logging); without it the server appends to
//! `logs/rusty-rag.log`.
use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_VAR: &str = "RUSTY_RAG_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rusty-rag.log";

/// Where file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileTarget {
    Disabled,
    Path(PathBuf),
}

impl FileTarget {
    fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            Some(value)
                if value.eq_ignore_ascii_case("off") || value.eq_ignore_ascii_case("none") =>
            {
                Self::Disabled
            }
            Some(value) if !value.is_empty() => Self::Path(PathBuf::from(value)),
            _ => Self::Path(Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE)),
        }
    }
}

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = FileTarget::from_setting(std::env::var(LOG_FILE_VAR).ok().as_deref());
    let result = match open_writer(&target) {
        Some(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
            .try_init(),
        None => registry.try_init(),
    };

    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

fn open_writer(target: &FileTarget) -> Option<NonBlocking> {
    let FileTarget::Path(path) = target else {
        return None;
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
        .ok()?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_target_defaults_to_logs_directory() {
        assert_eq!(
            FileTarget::from_setting(None),
            FileTarget::Path(PathBuf::from("logs").join("rusty-rag.log"))
        );
        assert_eq!(
            FileTarget::from_setting(Some("  ")),
            FileTarget::from_setting(None)
        );
    }

    #[test]
    fn file_target_honours_path_and_off() {
        assert_eq!(
            FileTarget::from_setting(Some("/tmp/rag.log")),
            FileTarget::Path(PathBuf::from("/tmp/rag.log"))
        );
        assert_eq!(FileTarget::from_setting(Some("OFF")), FileTarget::Disabled);
        assert_eq!(FileTarget::from_setting(Some("none")), FileTarget::Disabled);
    }
}
