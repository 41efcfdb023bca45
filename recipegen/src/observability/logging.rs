//! Structured logging setup on `tracing-subscriber`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::errors::ConfigError;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "RECIPEGEN_LOG";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Enable ANSI colors (text format only).
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module levels, e.g. `{"recipegen::ratelimit": "debug"}`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Builds the filter: `RECIPEGEN_LOG` wins, then level plus module directives.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV_VAR) {
            return Ok(filter);
        }
        self.config_filter()
    }

    fn config_filter(&self) -> Result<EnvFilter, ConfigError> {
        if self.level == "off" {
            return Ok(EnvFilter::new("off"));
        }

        let mut filter = EnvFilter::try_new(&self.level).map_err(|e| ConfigError::Invalid {
            field: "logging.level",
            reason: e.to_string(),
        })?;
        for (module, level) in &self.modules {
            let directive: Directive = format!("{module}={level}").parse().map_err(|e| ConfigError::Invalid {
                field: "logging.modules",
                reason: format!("{module}={level}: {e}"),
            })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Installs the global subscriber.
///
/// Fails if the configuration is invalid or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let registry = Registry::default().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(config.color))
            .try_init(),
    };

    result.map_err(|e| ConfigError::Invalid {
        field: "logging",
        reason: e.to_string(),
    })
}
