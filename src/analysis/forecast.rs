//! Next-value forecasting with a prioritized predictor chain.
//!
//! External predictors are optional capabilities tried in order; any failure
//! falls through to deterministic exponential smoothing, so `predict_next`
//! only errors when the sample source itself does.

use crate::analysis::stats::TimeSeries;
use crate::analysis::{Prediction, Sample, SampleSource};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Smoothing factor for the exponential fallback.
pub const SMOOTHING_ALPHA: f64 = 0.3;

/// Critical value for the 95% confidence band.
const CONFIDENCE_Z: f64 = 1.96;

/// Minimum samples before any forecast is attempted.
const MIN_FORECAST_SAMPLES: usize = 5;

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("predictor unavailable: {0}")]
    Unavailable(String),
    #[error("predictor timed out after {ms}ms")]
    Timeout { ms: u64 },
    #[error("malformed predictor response: {0}")]
    Malformed(String),
    #[error("predictor request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Raw forecast returned by a predictor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorOutput {
    pub predicted: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
}

/// A forecasting capability. Implementations are tried in priority order;
/// failures stay inside the engine and never reach the caller.
#[async_trait]
pub trait Predictor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Forecast the next value from a time-ordered sample list.
    async fn forecast(&self, samples: &[Sample]) -> Result<PredictorOutput, PredictorError>;
}

/// Remote forecasting service reached over HTTP, bounded by a hard timeout.
pub struct ExternalPredictor {
    client: reqwest::Client,
    url: String,
    timeout: std::time::Duration,
}

impl ExternalPredictor {
    pub fn new(url: &str, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            timeout: std::time::Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl Predictor for ExternalPredictor {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn forecast(&self, samples: &[Sample]) -> Result<PredictorOutput, PredictorError> {
        let body = serde_json::json!({
            "samples": samples
                .iter()
                .map(|s| serde_json::json!({
                    "timestamp": s.timestamp.to_rfc3339(),
                    "value": s.value_ms,
                }))
                .collect::<Vec<_>>(),
        });

        let request = async {
            let resp = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            let out: PredictorOutput = resp
                .json()
                .await
                .map_err(|e| PredictorError::Malformed(e.to_string()))?;
            Ok::<_, PredictorError>(out)
        };

        let out = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| PredictorError::Timeout {
                ms: self.timeout.as_millis() as u64,
            })??;

        if !out.predicted.is_finite() {
            return Err(PredictorError::Malformed(
                "non-finite predicted value".to_string(),
            ));
        }
        Ok(out)
    }
}

/// Forecast engine over a sample source and an ordered predictor chain.
pub struct ForecastEngine {
    source: Arc<dyn SampleSource>,
    predictors: Vec<Box<dyn Predictor>>,
}

impl ForecastEngine {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self {
            source,
            predictors: Vec::new(),
        }
    }

    /// Append a predictor to the chain. Earlier registrations win.
    pub fn with_predictor(mut self, predictor: Box<dyn Predictor>) -> Self {
        self.predictors.push(predictor);
        self
    }

    /// Predict the next value from the trailing window. Returns `None` when
    /// fewer than 5 samples exist. Predictor failures fall through to
    /// exponential smoothing, which always succeeds.
    pub async fn predict_next(&self, window_hours: i64) -> Result<Option<Prediction>> {
        let samples = self.window_samples(window_hours)?;
        if samples.len() < MIN_FORECAST_SAMPLES {
            warn!(
                have = samples.len(),
                need = MIN_FORECAST_SAMPLES,
                "Insufficient data for forecasting"
            );
            return Ok(None);
        }

        for predictor in &self.predictors {
            match predictor.forecast(&samples).await {
                Ok(out) => {
                    info!(
                        method = predictor.name(),
                        predicted = out.predicted,
                        "Forecast produced"
                    );
                    return Ok(Some(Prediction {
                        timestamp: Utc::now(),
                        predicted_value: out.predicted,
                        confidence_lower: out.confidence_lower,
                        confidence_upper: out.confidence_upper,
                        method: predictor.name().to_string(),
                    }));
                }
                Err(e) => {
                    warn!(method = predictor.name(), error = %e, "Predictor failed, falling through");
                }
            }
        }

        Ok(Some(exponential_smoothing(&samples)))
    }

    /// Simple-moving-average forecast over the last `period` values. Invoked
    /// explicitly by callers; not part of the automatic fallback chain.
    pub fn predict_sma(&self, window_hours: i64, period: usize) -> Result<Option<Prediction>> {
        let samples = self.window_samples(window_hours)?;
        if samples.len() < period {
            return Ok(None);
        }

        let values: Vec<f64> = samples[samples.len() - period..]
            .iter()
            .map(|s| s.value_ms)
            .collect();
        let series = TimeSeries::new(values);
        let sma = series.mean();
        let band = CONFIDENCE_Z * series.std_dev();

        Ok(Some(Prediction {
            timestamp: Utc::now(),
            predicted_value: sma,
            confidence_lower: (sma - band).max(0.0),
            confidence_upper: sma + band,
            method: "simple-moving-average".to_string(),
        }))
    }

    fn window_samples(&self, window_hours: i64) -> Result<Vec<Sample>> {
        self.source
            .samples_since(Utc::now() - Duration::hours(window_hours))
    }
}

/// Deterministic exponential smoothing over the full sample set. The band
/// uses the raw values' standard deviation rather than forecast residuals;
/// kept that way deliberately.
fn exponential_smoothing(samples: &[Sample]) -> Prediction {
    let values: Vec<f64> = samples.iter().map(|s| s.value_ms).collect();

    let mut smoothed = values[0];
    for &value in &values[1..] {
        smoothed = SMOOTHING_ALPHA * value + (1.0 - SMOOTHING_ALPHA) * smoothed;
    }

    let band = CONFIDENCE_Z * TimeSeries::new(values).std_dev();

    info!(
        predicted = smoothed,
        "Exponential smoothing forecast produced"
    );

    Prediction {
        timestamp: Utc::now(),
        predicted_value: smoothed,
        confidence_lower: (smoothed - band).max(0.0),
        confidence_upper: smoothed + band,
        method: "exponential-smoothing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use uuid::Uuid;

    struct FixedSource {
        values: Vec<f64>,
    }

    impl SampleSource for FixedSource {
        fn samples_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
            Ok(self
                .values
                .iter()
                .enumerate()
                .map(|(i, &v)| Sample {
                    id: Uuid::new_v4(),
                    timestamp: since + Duration::minutes(i as i64 + 1),
                    value_ms: v,
                    status_code: 200,
                    success: true,
                })
                .collect())
        }
    }

    struct FailingPredictor;

    #[async_trait]
    impl Predictor for FailingPredictor {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn forecast(&self, _samples: &[Sample]) -> Result<PredictorOutput, PredictorError> {
            Err(PredictorError::Unavailable("no backend".to_string()))
        }
    }

    struct CannedPredictor;

    #[async_trait]
    impl Predictor for CannedPredictor {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn forecast(&self, _samples: &[Sample]) -> Result<PredictorOutput, PredictorError> {
            Ok(PredictorOutput {
                predicted: 42.0,
                confidence_lower: 40.0,
                confidence_upper: 44.0,
            })
        }
    }

    fn engine(values: Vec<f64>) -> ForecastEngine {
        ForecastEngine::new(Arc::new(FixedSource { values }))
    }

    #[tokio::test]
    async fn test_insufficient_data_returns_none() {
        let e = engine(vec![100.0, 110.0, 120.0, 105.0]);
        assert!(e.predict_next(24).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exponential_smoothing_is_deterministic() {
        let e = engine(vec![100.0, 200.0, 100.0, 100.0, 200.0, 100.0]);
        let p = e.predict_next(24).await.unwrap().unwrap();
        assert_eq!(p.method, "exponential-smoothing");

        // Replay the recurrence over the same six values.
        let mut smoothed = 100.0;
        for v in [200.0, 100.0, 100.0, 200.0, 100.0] {
            smoothed = 0.3 * v + 0.7 * smoothed;
        }
        assert!((p.predicted_value - smoothed).abs() < 1e-9);
        assert!(p.confidence_lower >= 0.0);
        assert!(p.confidence_upper > p.predicted_value);
    }

    #[test]
    fn test_smoothing_recurrence_reference_values() {
        let samples: Vec<Sample> = [100.0, 200.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample {
                id: Uuid::new_v4(),
                timestamp: Utc::now() + Duration::minutes(i as i64),
                value_ms: v,
                status_code: 200,
                success: true,
            })
            .collect();
        let p = exponential_smoothing(&samples);
        assert!((p.predicted_value - 121.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failing_predictor_falls_through() {
        let e = engine(vec![100.0; 10]).with_predictor(Box::new(FailingPredictor));
        let p = e.predict_next(24).await.unwrap().unwrap();
        assert_eq!(p.method, "exponential-smoothing");
        assert_eq!(p.predicted_value, 100.0);
    }

    #[tokio::test]
    async fn test_first_successful_predictor_wins() {
        let e = engine(vec![100.0; 10])
            .with_predictor(Box::new(FailingPredictor))
            .with_predictor(Box::new(CannedPredictor));
        let p = e.predict_next(24).await.unwrap().unwrap();
        assert_eq!(p.method, "canned");
        assert_eq!(p.predicted_value, 42.0);
        assert_eq!(p.confidence_lower, 40.0);
        assert_eq!(p.confidence_upper, 44.0);
    }

    #[test]
    fn test_sma_requires_period_samples() {
        let e = engine(vec![100.0; 9]);
        assert!(e.predict_sma(24, 10).unwrap().is_none());
    }

    #[test]
    fn test_sma_uses_last_period_values() {
        // First five values are noise; the last five are flat at 50.
        let e = engine(vec![500.0, 900.0, 100.0, 700.0, 300.0, 50.0, 50.0, 50.0, 50.0, 50.0]);
        let p = e.predict_sma(24, 5).unwrap().unwrap();
        assert_eq!(p.method, "simple-moving-average");
        assert_eq!(p.predicted_value, 50.0);
        // Flat slice: zero std dev, band collapses onto the point estimate.
        assert_eq!(p.confidence_lower, 50.0);
        assert_eq!(p.confidence_upper, 50.0);
    }

    #[tokio::test]
    async fn test_external_predictor_timeout_is_an_error() {
        // Unroutable address per RFC 5737; connect attempt outlives the bound.
        let predictor = ExternalPredictor::new("http://192.0.2.1:9/forecast", 50);
        let samples: Vec<Sample> = Vec::new();
        let err = predictor.forecast(&samples).await.unwrap_err();
        match err {
            PredictorError::Timeout { ms } => assert_eq!(ms, 50),
            PredictorError::Http(_) => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
