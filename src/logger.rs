//! The single logger callback the bridge consumes (§1, §4.7).
//!
//! The crate always emits `tracing` events internally. On top of that, a
//! caller may register one callback to receive the same run-loop and
//! dispatcher-level events without wiring up a `tracing` subscriber —
//! useful for embedders that just want a line of text per event.

use std::sync::Arc;

/// Severity of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// A user-supplied logger callback.
pub type LoggerFn = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Emits to both `tracing` and an optional [`LoggerFn`].
#[derive(Clone, Default)]
pub struct Logger {
    callback: Option<LoggerFn>,
}

impl Logger {
    pub fn set(&mut self, callback: LoggerFn) {
        self.callback = Some(callback);
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        if let Some(callback) = &self.callback {
            callback(level, message);
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("callback_set", &self.callback.is_some())
            .finish()
    }
}
