use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the stdout log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "echomind_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// Filter directives equivalent to this config, e.g. `info,echomind_store=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Returned by [`init_telemetry`]; records what was installed.
#[derive(Debug)]
pub struct TelemetryGuard {
    directives: String,
    format: LogFormat,
}

impl TelemetryGuard {
    /// The filter actually in effect (RUST_LOG if set, otherwise the config).
    pub fn directives(&self) -> &str {
        &self.directives
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }
}

/// Parse a level name as used in settings files (`"debug"`, `"WARN"`, ...).
pub fn parse_level(value: &str) -> Option<Level> {
    value.trim().parse().ok()
}

fn build_filter(config: &TelemetryConfig) -> Result<(EnvFilter, String), TelemetryError> {
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&env) {
            return Ok((filter, env));
        }
    }
    let directives = config.directives();
    let filter =
        EnvFilter::try_new(&directives).map_err(|e| TelemetryError::Filter(e.to_string()))?;
    Ok((filter, directives))
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let (env_filter, directives) = build_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;

    Ok(TelemetryGuard {
        directives,
        format: config.format,
    })
}
