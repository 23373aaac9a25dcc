//! Diagnostic logging setup

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log level
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Map a `LOG_LEVEL` value to a level filter
///
/// Accepts the usual names case-insensitively, including `warning` and
/// `critical`. Returns `None` for anything else.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" | "critical" | "fatal" => Some(LevelFilter::ERROR),
        "off" | "none" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Install the global subscriber; logs go to stderr
///
/// Unset or unknown `LOG_LEVEL` selects the most verbose level.
pub fn init() {
    let raw = std::env::var(LOG_LEVEL_VAR).ok();
    let level = raw.as_deref().and_then(parse_level);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level.unwrap_or(LevelFilter::TRACE).to_string()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let (Some(raw), None) = (raw, level) {
        tracing::warn!("Unknown {}={:?}, logging everything", LOG_LEVEL_VAR, raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("warning"), Some(LevelFilter::WARN));
        assert_eq!(parse_level(" Critical "), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("off"), Some(LevelFilter::OFF));
        assert_eq!(parse_level("verbose"), None);
    }
}
