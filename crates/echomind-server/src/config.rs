//! Server configuration.

use std::time::Duration;

/// Bind address and HTTP limits for the gateway.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind. `0` lets the OS pick one.
    pub port: u16,
    /// Reported by `/health`.
    pub environment: String,
    /// Request bodies above this size are rejected with 413.
    pub max_body_bytes: usize,
    /// How often idle rate windows are dropped.
    pub prune_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            environment: "development".into(),
            max_body_bytes: 64 * 1024,
            prune_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
