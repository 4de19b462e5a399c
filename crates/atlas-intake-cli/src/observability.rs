//! Diagnostics for the CLI. Stdout belongs to the rendered run, so tracing
//! output goes to stderr or to a JSONL file.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_JSON_LOG_FILE: &str = "atlas-intake.logs.jsonl";

/// Where diagnostics are written.
#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    Off,
    Stderr,
    JsonFile(PathBuf),
}

impl LogSink {
    /// `ATLAS_OBSERVABILITY_ENABLED=false` turns logging off;
    /// `ATLAS_JSON_LOG_PATH` selects a JSONL file over stderr.
    fn resolve(enabled: Option<&str>, json_path: Option<&OsStr>) -> Self {
        if enabled.and_then(parse_bool) == Some(false) {
            return Self::Off;
        }
        match json_path {
            Some(path) if !path.is_empty() => Self::JsonFile(PathBuf::from(path)),
            _ => Self::Stderr,
        }
    }

    fn from_env() -> Self {
        let enabled = std::env::var("ATLAS_OBSERVABILITY_ENABLED").ok();
        let json_path = std::env::var_os("ATLAS_JSON_LOG_PATH");
        Self::resolve(enabled.as_deref(), json_path.as_deref())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// `ATLAS_LOG_LEVEL`, then `RUST_LOG`, then `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    std::env::var("ATLAS_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

fn json_file_writer(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let _ = std::fs::create_dir_all(dir);
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_JSON_LOG_FILE));
    tracing_appender::rolling::never(dir, file_name)
}

/// Installs the global subscriber once per process.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(env_filter(default_level));
        let _ = match LogSink::from_env() {
            LogSink::Off => return,
            LogSink::Stderr => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogSink::JsonFile(path) => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(false)
                        .with_writer(json_file_writer(&path)),
                )
                .try_init(),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_env_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("disabled"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn sink_prefers_json_file_unless_disabled() {
        let path = OsStr::new("logs/run.jsonl");
        assert_eq!(LogSink::resolve(None, None), LogSink::Stderr);
        assert_eq!(LogSink::resolve(Some("maybe"), Some(OsStr::new(""))), LogSink::Stderr);
        assert_eq!(
            LogSink::resolve(Some("on"), Some(path)),
            LogSink::JsonFile(PathBuf::from("logs/run.jsonl"))
        );
        assert_eq!(LogSink::resolve(Some("off"), Some(path)), LogSink::Off);
    }
}
