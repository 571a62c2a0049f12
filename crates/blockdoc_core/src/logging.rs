//! Logging bootstrap for hosts embedding the document core.
//!
//! # Responsibility
//! - Start one `flexi_logger` backend per process, writing either rolling
//!   files or stderr.
//! - Provide the payload sanitizer shared by the panic hook and the store's
//!   reaction isolation.
//!
//! # Invariants
//! - Initialization is idempotent for an identical level and target.
//! - Switching level or target after initialization is rejected.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "blockdoc";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Log destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Rolling files in an absolute directory.
    Dir(PathBuf),
    Stderr,
}

impl LogTarget {
    /// Builds a directory target, rejecting empty or relative paths.
    pub fn dir(log_dir: &str) -> Result<Self, String> {
        normalize_log_dir(log_dir).map(Self::Dir)
    }

    fn describe(&self) -> String {
        match self {
            Self::Dir(path) => path.display().to_string(),
            Self::Stderr => "stderr".to_string(),
        }
    }
}

struct LoggingState {
    level: &'static str,
    target: LogTarget,
    _logger: LoggerHandle,
}

/// Initializes process logging.
///
/// # Errors
/// - Unsupported `level`.
/// - Log directory cannot be created, or the backend fails to start.
/// - Logging is already active with a different level or target.
pub fn init_logging(level: &str, target: LogTarget) -> Result<(), String> {
    let normalized_level = normalize_level(level)?;

    if let Some(state) = LOGGING_STATE.get() {
        return check_same_config(state, normalized_level, &target);
    }

    let init_target = target.clone();
    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        let builder = Logger::try_with_str(normalized_level)
            .map_err(|err| format!("invalid log level `{normalized_level}`: {err}"))?;
        let builder = match &init_target {
            LogTarget::Dir(dir) => {
                std::fs::create_dir_all(dir).map_err(|err| {
                    format!("failed to create log directory `{}`: {err}", dir.display())
                })?;
                builder
                    .log_to_file(
                        FileSpec::default()
                            .directory(dir.as_path())
                            .basename(LOG_FILE_BASENAME),
                    )
                    .rotate(
                        Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                        Naming::Numbers,
                        Cleanup::KeepLogFiles(MAX_LOG_FILES),
                    )
                    .write_mode(WriteMode::BufferAndFlush)
                    .append()
                    .format_for_files(flexi_logger::detailed_format)
            }
            LogTarget::Stderr => builder.log_to_stderr(),
        };
        let logger = builder
            .start()
            .map_err(|err| format!("failed to start logger: {err}"))?;

        install_panic_hook_once();

        info!(
            "event=core_init module=logging status=ok level={} target={} version={}",
            normalized_level,
            init_target.describe(),
            env!("CARGO_PKG_VERSION")
        );

        Ok(LoggingState {
            level: normalized_level,
            target: init_target,
            _logger: logger,
        })
    })?;

    check_same_config(state, normalized_level, &target)
}

/// Returns `(level, target)` when logging is active.
pub fn logging_status() -> Option<(&'static str, LogTarget)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.target.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Single-line, length-capped text of a caught panic payload.
pub(crate) fn panic_payload_text(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    sanitize_message(&message, MAX_PANIC_PAYLOAD_CHARS)
}

fn check_same_config(
    state: &LoggingState,
    level: &'static str,
    target: &LogTarget,
) -> Result<(), String> {
    if &state.target != target {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.target.describe(),
            target.describe()
        ));
    }
    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, level
        ));
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.get().is_some() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            panic_payload_text(panic_info.payload())
        );
        previous_hook(panic_info);
    }));

    let _ = PANIC_HOOK_INSTALLED.set(());
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
