//! Logging configuration
//!
//! Optional setup for structured logging of container activity.
//!
//! # Features
//!
//! - `logging` - Enable debug logging (default)
//! - `logging-json` - JSON structured output (production)
//! - `logging-pretty` - Colorful pretty output (development)
//!
//! # Example
//!
//! ```rust,ignore
//! use wirecore::logging;
//!
//! // Initialize with defaults for the enabled format feature.
//! logging::init();
//!
//! // Or configure explicitly.
//! logging::builder()
//!     .with_level(tracing::Level::DEBUG)
//!     .with_target_filter("wirecore")
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Logging output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Builder for logging configuration
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_thread_names: bool,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            with_thread_names: false,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    /// Create a new logging builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Filter to only show logs from a specific target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Include thread names in output (useful for executor diagnostics)
    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.with_thread_names = enabled;
        self
    }

    /// Use JSON output
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty output
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact output
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Initialize the global subscriber. Safe to call once per process;
    /// later calls are ignored.
    #[cfg(any(feature = "logging-pretty", feature = "logging-json"))]
    pub fn init(self) {
        use tracing_subscriber::EnvFilter;

        let filter = match self.target {
            Some(target) => {
                EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    EnvFilter::new(format!("{target}={}", self.level.as_str().to_lowercase()))
                })
            }
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase())),
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(self.with_thread_names);

        let result = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            _ => builder.try_init(),
        };
        // Ignore double initialization.
        let _ = result;
    }

    /// Without a subscriber backend, initialization is a no-op.
    #[cfg(not(any(feature = "logging-pretty", feature = "logging-json")))]
    pub fn init(self) {}
}

/// Start building a logging configuration
#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with defaults
#[cfg(feature = "logging")]
pub fn init() {
    #[cfg(feature = "logging-pretty")]
    {
        builder().pretty().init();
        return;
    }
    #[allow(unreachable_code)]
    builder().init()
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_settings() {
        let b = builder()
            .with_level(Level::TRACE)
            .with_target_filter("wirecore")
            .with_thread_names(true)
            .compact();
        assert_eq!(b.level, Level::TRACE);
        assert_eq!(b.target, Some("wirecore"));
        assert!(b.with_thread_names);
        assert_eq!(b.format, LogFormat::Compact);
    }
}
