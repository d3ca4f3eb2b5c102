//! Logging settings resolved from the command line.

use std::fmt;
use std::str::FromStr;

use crate::TelemetryError;

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human output with source locations.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if s.eq_ignore_ascii_case("pretty") {
            Ok(Self::Pretty)
        } else {
            Err(TelemetryError::InvalidLogFormat(s.to_string()))
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    pub fn new(log_level: impl Into<String>) -> Self {
        Self {
            log_level: log_level.into(),
            log_format: LogFormat::default(),
        }
    }

    /// Settings for `pushgate serve`. An explicit format wins; otherwise
    /// `dev` selects pretty output.
    pub fn for_serve(
        log_level: &str,
        log_format: Option<&str>,
        dev: bool,
    ) -> Result<Self, TelemetryError> {
        let log_format = match log_format {
            Some(raw) => raw.parse()?,
            None if dev => LogFormat::Pretty,
            None => LogFormat::Json,
        };
        Ok(Self::new(log_level).with_log_format(log_format))
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_format() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::InvalidLogFormat(raw)) if raw == "xml"
        ));
    }

    #[test]
    fn dev_mode_defaults_to_pretty() {
        let config = TelemetryConfig::for_serve("debug", None, true).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Pretty);

        let config = TelemetryConfig::for_serve("info", Some("json"), true).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);

        assert_eq!(
            TelemetryConfig::for_serve("info", None, false).unwrap(),
            TelemetryConfig::default()
        );
    }
}
