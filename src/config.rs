//! TOML configuration with full defaults; a missing file means defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API bind address.
    pub bind: String,
    pub db_path: String,
    pub monitor: MonitorConfig,
    pub predictor: PredictorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Endpoint the probe POSTs to.
    pub url: String,
    /// Probe cadence, 6-field cron expression (with seconds).
    pub cron: String,
    pub timeout_secs: u64,
    /// Baseline window used by the probe cycle.
    pub window_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Forecast service URL. Unset means no external predictor is wired in.
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: "data/pulsewatch.db".to_string(),
            monitor: MonitorConfig::default(),
            predictor: PredictorConfig::default(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: "https://httpbin.org/anything".to_string(),
            cron: "0 */5 * * * *".to_string(),
            timeout_secs: 10,
            window_hours: 24,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.bind, "0.0.0.0:8080");
        assert_eq!(c.monitor.window_hours, 24);
        assert!(c.predictor.url.is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let c = Config::load(Path::new("/nonexistent/pulsewatch.toml")).unwrap();
        assert_eq!(c.monitor.timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulsewatch.toml");
        std::fs::write(
            &path,
            "bind = \"127.0.0.1:9000\"\n\n[predictor]\nurl = \"http://forecaster:9090/forecast\"\n",
        )
        .unwrap();

        let c = Config::load(&path).unwrap();
        assert_eq!(c.bind, "127.0.0.1:9000");
        assert_eq!(
            c.predictor.url.as_deref(),
            Some("http://forecaster:9090/forecast")
        );
        // Untouched sections keep their defaults.
        assert_eq!(c.monitor.cron, "0 */5 * * * *");
        assert_eq!(c.predictor.timeout_ms, 5000);
    }
}
