//! Statistical analysis core -- rolling baselines, anomaly rules, forecasting.

pub mod detector;
pub mod forecast;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded latency measurement for the monitored endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Round-trip time in milliseconds.
    pub value_ms: f64,
    pub status_code: u16,
    pub success: bool,
}

/// Source of time-ordered samples. Implemented by the storage layer;
/// the analysis engines never touch the database directly.
pub trait SampleSource: Send + Sync {
    /// All samples strictly newer than `since`, ascending by timestamp.
    fn samples_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<Sample>>;
}

/// Detection rule that produced an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyType {
    ZScore,
    Threshold,
    PredictionError,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::ZScore => "z-score",
            AnomalyType::Threshold => "threshold",
            AnomalyType::PredictionError => "prediction-error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "z-score" => Some(AnomalyType::ZScore),
            "threshold" => Some(AnomalyType::Threshold),
            "prediction-error" => Some(AnomalyType::PredictionError),
            _ => None,
        }
    }
}

/// Ordinal anomaly severity, LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// A classified deviation emitted by the detector. Immutable within the core;
/// the `acknowledged` flag is flipped only by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sample_id: Uuid,
    pub kind: AnomalyType,
    pub severity: Severity,
    pub actual_value: f64,
    pub expected_value: f64,
    pub deviation: f64,
    pub z_score: Option<f64>,
    pub threshold: Option<f64>,
    pub alert_triggered: bool,
    pub acknowledged: bool,
    pub metadata: serde_json::Value,
}

/// Point-in-time statistical summary of a trailing window.
/// Superseded by the next computation, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub window_hours: i64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub confidence_level: f64,
    pub created_at: DateTime<Utc>,
}

impl StatisticsSnapshot {
    /// Well-defined snapshot for an empty window. Not a real baseline:
    /// callers gate on `sample_count` before trusting it.
    pub fn empty(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        window_hours: i64,
    ) -> Self {
        Self {
            window_start,
            window_end,
            window_hours,
            mean: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            sample_count: 0,
            confidence_lower: 0.0,
            confidence_upper: 0.0,
            confidence_level: 0.95,
            created_at: window_end,
        }
    }
}

/// A single-value forecast with a confidence band. Ephemeral; the caller
/// decides whether to store it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub method: String,
}
