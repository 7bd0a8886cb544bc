//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    pub environment: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

pub fn health_check(start_time: Instant, environment: &str) -> HealthResponse {
    HealthResponse {
        status: "ok",
        environment: environment.to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), "production");
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.environment, "production");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, "dev").uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let json = serde_json::to_value(health_check(Instant::now(), "dev")).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["environment"], "dev");
        assert!(json["uptime_secs"].is_number());
    }
}
