//! Global Logger Module
//!
//! Thin facade over `tracing` used across the gateway as
//! `logger::info("source", &message)`. Every record is also kept in a bounded
//! in-memory buffer so recent activity can be inspected over HTTP.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::LoggingConfig;

const DEFAULT_BUFFER_SIZE: usize = 1000;

static BUFFER: Lazy<Mutex<VecDeque<LogEntry>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(DEFAULT_BUFFER_SIZE)));
static BUFFER_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_BUFFER_SIZE);
static NEXT_ID: AtomicI64 = AtomicI64::new(1);

// ============================================
// Log Level & Entry Types
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: i64,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub metadata: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub level: Option<LogLevel>,
    pub source: Option<String>,
}

impl LogQuery {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if entry.source != *source {
                return false;
            }
        }
        true
    }
}

// ============================================
// Initialization
// ============================================

/// Install the global subscriber and size the in-memory buffer.
///
/// `RUST_LOG` wins over the configured level. Calling this more than once is
/// harmless; later calls only resize the buffer.
pub fn init(cfg: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    BUFFER_SIZE.store(cfg.buffer_size.max(1), Ordering::Relaxed);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.as_str()));

    let result = if cfg.format.eq_ignore_ascii_case("text") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    };

    if result.is_err() {
        debug("logger", "Subscriber already installed, keeping the existing one");
    }
}

// ============================================
// Global Log Functions
// ============================================

fn log_internal(level: LogLevel, source: &str, message: &str, metadata: Option<&str>) {
    match level {
        LogLevel::Debug => tracing::debug!(source, metadata, "{}", message),
        LogLevel::Info => tracing::info!(source, metadata, "{}", message),
        LogLevel::Warn => tracing::warn!(source, metadata, "{}", message),
        LogLevel::Error => tracing::error!(source, metadata, "{}", message),
    }

    let entry = LogEntry {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        timestamp: chrono::Utc::now().timestamp(),
        level,
        source: source.to_string(),
        message: message.to_string(),
        metadata: metadata.map(|s| s.to_string()),
    };

    let capacity = BUFFER_SIZE.load(Ordering::Relaxed);
    let mut buffer = BUFFER.lock().unwrap_or_else(|e| e.into_inner());
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(entry);
}

pub fn debug(source: &str, message: &str) {
    log_internal(LogLevel::Debug, source, message, None);
}

pub fn info(source: &str, message: &str) {
    log_internal(LogLevel::Info, source, message, None);
}

pub fn warn(source: &str, message: &str) {
    log_internal(LogLevel::Warn, source, message, None);
}

pub fn error(source: &str, message: &str) {
    log_internal(LogLevel::Error, source, message, None);
}

/// Log with a JSON metadata payload attached.
pub fn log_with_metadata(
    level: LogLevel,
    source: &str,
    message: &str,
    metadata: &serde_json::Value,
) {
    let rendered = metadata.to_string();
    log_internal(level, source, message, Some(&rendered));
}

/// Newest first.
pub fn query_logs(query: &LogQuery) -> Vec<LogEntry> {
    let buffer = BUFFER.lock().unwrap_or_else(|e| e.into_inner());
    buffer
        .iter()
        .rev()
        .filter(|entry| query.matches(entry))
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(100))
        .cloned()
        .collect()
}

pub fn logs_count(query: &LogQuery) -> usize {
    let buffer = BUFFER.lock().unwrap_or_else(|e| e.into_inner());
    buffer.iter().filter(|entry| query.matches(entry)).count()
}

pub fn clear_all_logs() -> usize {
    let mut buffer = BUFFER.lock().unwrap_or_else(|e| e.into_inner());
    let removed = buffer.len();
    buffer.clear();
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_round_trip_accepts_aliases() {
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("Info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("trace"), None);
    }

    #[test]
    fn query_filters_by_source_newest_first() {
        let source = format!("logger-test-{}", uuid::Uuid::new_v4());
        info(&source, "first");
        warn(&source, "second");

        let query = LogQuery {
            source: Some(source.clone()),
            ..Default::default()
        };
        let entries = query_logs(&query);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
        assert_eq!(logs_count(&query), 2);

        let warn_only = LogQuery {
            source: Some(source),
            level: Some(LogLevel::Warn),
            ..Default::default()
        };
        assert_eq!(logs_count(&warn_only), 1);
    }
}
