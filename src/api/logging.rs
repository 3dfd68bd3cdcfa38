use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_STREAM_LOG_PATH: &str = "/tmp/ink-stream-debug.log";
const DEBUG_STREAM_ENV: &str = "INK_DEBUG_STREAM";
const STREAM_LOG_PATH_ENV: &str = "INK_STREAM_LOG_PATH";

pub fn debug_stream_enabled() -> bool {
    std::env::var(DEBUG_STREAM_ENV)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn emit_request_debug(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message =
        format!("INK_API DEBUG generation_request url={request_url}\npayload:\n{formatted_payload}\n");
    emit_log_message(&message);
}

/// Records a payload that failed structured parsing. The record is skipped,
/// never fatal; this trail exists so silent skips stay diagnosable.
pub fn emit_record_parse_error(payload: &str, parse_error: &serde_json::Error) {
    let message =
        format!("INK_API WARN record_parse_failed error={parse_error}\npayload:\n{payload}\n");
    emit_log_message(&message);
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(STREAM_LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_STREAM_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_stream_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_STREAM_ENV, "1");
        assert!(debug_stream_enabled());
        std::env::set_var(DEBUG_STREAM_ENV, "TRUE");
        assert!(debug_stream_enabled());
        std::env::remove_var(DEBUG_STREAM_ENV);
    }

    #[test]
    fn test_resolve_log_path_uses_stream_log_path() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(STREAM_LOG_PATH_ENV, "/tmp/test-stream.log");
        assert_eq!(resolve_log_path().as_deref(), Some("/tmp/test-stream.log"));
        std::env::remove_var(STREAM_LOG_PATH_ENV);
    }
}
