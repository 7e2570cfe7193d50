//! Leveled diagnostic sink used by the dispatcher.
//!
//! Two levels exist: info (session lifecycle, reported failures) and debug
//! (per-step detail, expected closes).  Messages go to a [`LogSink`]; the
//! default [`TracingSink`] forwards them to `tracing` under the `wsbridge`
//! target so they share the host application's subscriber.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// Prefix added to messages handed to a custom sink.
const PREFIX: &str = "[wsbridge]";

// ── Levels ────────────────────────────────────────────────────────────────────

/// Bit set of enabled levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogLevel(u32);

impl LogLevel {
    pub const INFO_FLAG: u32 = 0x1;
    pub const DEBUG_FLAG: u32 = 0x1 << 1;

    /// Nothing is emitted.
    pub const OFF: LogLevel = LogLevel(0);
    /// Info only.
    pub const INFO: LogLevel = LogLevel(Self::INFO_FLAG);
    /// Info and debug.
    pub const DEBUG: LogLevel = LogLevel(Self::INFO_FLAG | Self::DEBUG_FLAG);

    pub const fn from_bits(bits: u32) -> Self {
        LogLevel(bits & (Self::INFO_FLAG | Self::DEBUG_FLAG))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn info_enabled(self) -> bool {
        self.0 & Self::INFO_FLAG != 0
    }

    pub const fn debug_enabled(self) -> bool {
        self.0 & Self::DEBUG_FLAG != 0
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::INFO
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.info_enabled(), self.debug_enabled()) {
            (_, true) => f.write_str("debug"),
            (true, false) => f.write_str("info"),
            (false, false) => f.write_str("off"),
        }
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown log level '{0}' (expected off, info or debug)")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::OFF),
            "info" => Ok(LogLevel::INFO),
            "debug" => Ok(LogLevel::DEBUG),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Destination for diagnostic messages.
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Forwards messages to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "wsbridge", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "wsbridge", "{message}");
    }
}

// ── Logger ────────────────────────────────────────────────────────────────────

/// Level filter in front of a [`LogSink`].  Cheap to clone.
#[derive(Clone)]
pub struct BridgeLogger {
    level: LogLevel,
    sink: Arc<dyn LogSink>,
    prefixed: bool,
}

impl BridgeLogger {
    /// Creates a logger.  With `sink == None` messages go to [`TracingSink`]
    /// unprefixed; custom sinks receive `[wsbridge] <message>`.
    pub fn new(level: LogLevel, sink: Option<Arc<dyn LogSink>>) -> Self {
        match sink {
            Some(sink) => Self {
                level,
                sink,
                prefixed: true,
            },
            None => Self {
                level,
                sink: Arc::new(TracingSink),
                prefixed: false,
            },
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn info(&self, message: impl fmt::Display) {
        if self.level.info_enabled() {
            self.sink.info(&self.render(message));
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.level.debug_enabled() {
            self.sink.debug(&self.render(message));
        }
    }

    fn render(&self, message: impl fmt::Display) -> String {
        if self.prefixed {
            format!("{PREFIX} {message}")
        } else {
            message.to_string()
        }
    }
}

impl Default for BridgeLogger {
    fn default() -> Self {
        Self::new(LogLevel::default(), None)
    }
}

impl fmt::Debug for BridgeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeLogger")
            .field("level", &self.level)
            .field("prefixed", &self.prefixed)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every message with its level.
    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<(&'static str, String)> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl LogSink for RecordingSink {
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(("info", message.to_string()));
        }

        fn debug(&self, message: &str) {
            self.lines.lock().unwrap().push(("debug", message.to_string()));
        }
    }

    fn logger_with(level: LogLevel) -> (BridgeLogger, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let logger = BridgeLogger::new(level, Some(sink.clone() as Arc<dyn LogSink>));
        (logger, sink)
    }

    #[test]
    fn test_debug_level_emits_both_levels_with_prefix() {
        // Arrange
        let (logger, sink) = logger_with(LogLevel::DEBUG);

        // Act
        logger.info("some messages 0");
        logger.debug(format_args!("prefix {}", "some messages 1"));

        // Assert
        assert_eq!(
            sink.lines(),
            vec![
                ("info", "[wsbridge] some messages 0".to_string()),
                ("debug", "[wsbridge] prefix some messages 1".to_string()),
            ]
        );
    }

    #[test]
    fn test_info_level_drops_debug() {
        let (logger, sink) = logger_with(LogLevel::INFO);
        logger.info("kept");
        logger.debug("dropped");
        assert_eq!(sink.lines(), vec![("info", "[wsbridge] kept".to_string())]);
    }

    #[test]
    fn test_off_level_emits_nothing() {
        let (logger, sink) = logger_with(LogLevel::OFF);
        logger.info("a");
        logger.debug("b");
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_debug_flag_alone_emits_only_debug() {
        let (logger, sink) = logger_with(LogLevel::from_bits(LogLevel::DEBUG_FLAG));
        logger.info("a");
        logger.debug("b");
        assert_eq!(sink.lines(), vec![("debug", "[wsbridge] b".to_string())]);
    }

    #[test]
    fn test_default_tracing_sink_does_not_panic() {
        let logger = BridgeLogger::new(LogLevel::DEBUG, None);
        logger.info("info message");
        logger.debug("debug message");
    }

    #[test]
    fn test_parse_level_names() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::INFO);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::DEBUG);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::OFF);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_display_round_trips() {
        for level in [LogLevel::OFF, LogLevel::INFO, LogLevel::DEBUG] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_from_bits_masks_unknown_bits() {
        assert_eq!(LogLevel::from_bits(0xFF), LogLevel::DEBUG);
    }
}
