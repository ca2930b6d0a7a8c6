//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the config is resolved. `RUST_LOG`
//! takes precedence; the configured level is the fallback.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::CoreError;

/// Initialise the global tracing subscriber, writing to stderr so the CLI's
/// JSON output on stdout stays clean.
///
/// `level` accepts standard level strings: `"error"`, `"warn"`, `"info"`,
/// `"debug"`, `"trace"`.
pub fn init(level: &str) -> Result<(), CoreError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CoreError::Logger(format!("invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| CoreError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values. Used to validate configured levels before [`init`].
pub fn parse_level(level: &str) -> Result<LevelFilter, CoreError> {
    if level.is_empty() {
        return Err(CoreError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| CoreError::Logger(format!("unrecognised log level: '{level}'")))
}
