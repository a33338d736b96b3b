//! Logger setup for the command-line tools
//!
//! Compiler diagnostics are printed on their own as `file:line:
//! message`; tracing output is only the pass-level progress landmarks
//! (`debug!` in the pipeline), so the format is the bare message with
//! no timestamp or module path, and tools stay quiet below warnings
//! unless asked.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Verbosity of pass-level progress output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Install the global subscriber. `level` is an explicit `--log-level`
/// choice; without one, only warnings and errors get through, keeping
/// the output channels free for the program and its diagnostics.
pub fn init(level: Option<LogLevel>) {
    let level = level.unwrap_or(LogLevel::Warn);
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_level(false)
        .compact()
        .with_filter(filter);

    Registry::default().with(layer).init();
}
