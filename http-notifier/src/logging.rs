//! Logging setup with local timezone timestamps.

use std::str::FromStr;

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str =
    "http_notifier=info,build_filter=info,text_template=info,tower_http=info";

/// Timer that formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?} (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub quiet: bool,
    pub format: LogFormat,
}

impl LogOptions {
    /// Filter for these options. `quiet` wins over `verbose`; otherwise
    /// `RUST_LOG` overrides the default directive.
    pub fn filter(&self) -> EnvFilter {
        if self.quiet {
            EnvFilter::new("error")
        } else if self.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
        }
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(options: &LogOptions) -> crate::Result<()> {
    let (text, json) = match options.format {
        LogFormat::Text => (Some(fmt::layer().with_timer(LocalTimer)), None),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_timer(LocalTimer).with_current_span(false)),
        ),
    };

    tracing_subscriber::registry()
        .with(options.filter())
        .with(text)
        .with(json)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_format() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("TEXT".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn quiet_wins_over_verbose() {
        let options = LogOptions {
            verbose: true,
            quiet: true,
            ..Default::default()
        };
        assert_eq!(options.filter().to_string(), "error");
    }

    #[test]
    fn verbose_enables_debug() {
        let options = LogOptions {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(options.filter().to_string(), "debug");
    }
}
