//! Anomaly detection rules over a baseline snapshot.
//!
//! Two independent rules: a z-score rule against the rolling baseline and an
//! absolute response-time ceiling. Both may fire for the same sample.

use crate::analysis::{Anomaly, AnomalyType, Sample, Severity, StatisticsSnapshot};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Z-score magnitude at which the statistical rule fires.
pub const Z_SCORE_THRESHOLD: f64 = 3.0;

/// Hard ceiling in milliseconds for the absolute rule.
pub const ABSOLUTE_THRESHOLD_MS: f64 = 5000.0;

/// Minimum baseline size before any rule is evaluated.
const MIN_BASELINE_SAMPLES: usize = 10;

/// Evaluate all detection rules for one sample against a baseline snapshot.
/// Never fails; an empty result is the normal case. When both rules fire the
/// z-score anomaly precedes the threshold anomaly.
pub fn detect(sample: &Sample, snapshot: &StatisticsSnapshot) -> Vec<Anomaly> {
    let mut detected = Vec::new();

    if snapshot.sample_count < MIN_BASELINE_SAMPLES {
        return detected;
    }

    if let Some(anomaly) = z_score_anomaly(sample, snapshot) {
        detected.push(anomaly);
    }
    if let Some(anomaly) = threshold_anomaly(sample) {
        detected.push(anomaly);
    }

    if !detected.is_empty() {
        warn!(
            sample = %sample.id,
            count = detected.len(),
            value_ms = sample.value_ms,
            "Anomalies detected"
        );
    }

    detected
}

fn z_score_anomaly(sample: &Sample, snapshot: &StatisticsSnapshot) -> Option<Anomaly> {
    // Degenerate baseline: a constant series has no meaningful z-score.
    if snapshot.std_dev == 0.0 {
        return None;
    }

    let z = (sample.value_ms - snapshot.mean) / snapshot.std_dev;
    if z.abs() < Z_SCORE_THRESHOLD {
        return None;
    }

    let severity = severity_for(z.abs());
    Some(Anomaly {
        id: Uuid::new_v4(),
        timestamp: sample.timestamp,
        sample_id: sample.id,
        kind: AnomalyType::ZScore,
        severity,
        actual_value: sample.value_ms,
        expected_value: snapshot.mean,
        deviation: sample.value_ms - snapshot.mean,
        z_score: Some(z),
        threshold: None,
        alert_triggered: severity == Severity::Critical,
        acknowledged: false,
        metadata: json!({
            "stdDev": snapshot.std_dev,
            "threshold": Z_SCORE_THRESHOLD,
        }),
    })
}

fn threshold_anomaly(sample: &Sample) -> Option<Anomaly> {
    if sample.value_ms < ABSOLUTE_THRESHOLD_MS {
        return None;
    }

    Some(Anomaly {
        id: Uuid::new_v4(),
        timestamp: sample.timestamp,
        sample_id: sample.id,
        kind: AnomalyType::Threshold,
        severity: Severity::High,
        actual_value: sample.value_ms,
        expected_value: ABSOLUTE_THRESHOLD_MS,
        deviation: sample.value_ms - ABSOLUTE_THRESHOLD_MS,
        z_score: None,
        threshold: Some(ABSOLUTE_THRESHOLD_MS),
        alert_triggered: true,
        acknowledged: false,
        metadata: json!({ "thresholdMs": ABSOLUTE_THRESHOLD_MS }),
    })
}

/// Severity grade for a z-score magnitude, highest qualifying band wins.
fn severity_for(z_abs: f64) -> Severity {
    if z_abs >= 5.0 {
        Severity::Critical
    } else if z_abs >= 4.0 {
        Severity::High
    } else if z_abs >= 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
