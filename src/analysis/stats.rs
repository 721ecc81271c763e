use crate::analysis::{SampleSource, StatisticsSnapshot};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Cached snapshots older than this are recomputed on the next request.
const STALENESS_SECS: i64 = 5 * 60;

/// Critical value for a 95% confidence interval.
const CONFIDENCE_Z: f64 = 1.96;

/// A simple time series for statistical analysis.
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance (divide by N, not N-1).
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Rolling-baseline engine. Keeps one cached snapshot per window size and
/// recomputes when the cached value is older than the staleness threshold.
pub struct StatsEngine {
    source: Arc<dyn SampleSource>,
    cache: RwLock<HashMap<i64, StatisticsSnapshot>>,
}

impl StatsEngine {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Return the baseline snapshot for a trailing window, recomputing if the
    /// cached one is absent or stale. Empty windows yield the zero snapshot
    /// and are never cached, so a later non-empty window is computed fresh.
    pub fn snapshot(&self, window_hours: i64, now: DateTime<Utc>) -> Result<StatisticsSnapshot> {
        {
            let cache = self.cache.read().expect("stats cache lock poisoned");
            if let Some(cached) = cache.get(&window_hours) {
                if now.signed_duration_since(cached.created_at)
                    <= Duration::seconds(STALENESS_SECS)
                {
                    return Ok(cached.clone());
                }
            }
        }

        let fresh = self.compute(window_hours, now)?;
        if fresh.sample_count > 0 {
            // Swap-on-complete: readers see the old snapshot until the new
            // one is fully built. Concurrent recomputation is last-write-wins.
            self.cache
                .write()
                .expect("stats cache lock poisoned")
                .insert(window_hours, fresh.clone());
        }
        Ok(fresh)
    }

    fn compute(&self, window_hours: i64, now: DateTime<Utc>) -> Result<StatisticsSnapshot> {
        let window_start = now - Duration::hours(window_hours);
        let samples = self.source.samples_since(window_start)?;

        if samples.is_empty() {
            info!(window_hours, "No samples found in time window");
            return Ok(StatisticsSnapshot::empty(window_start, now, window_hours));
        }

        let series = TimeSeries::new(samples.iter().map(|s| s.value_ms).collect());
        let mean = series.mean();
        let std_dev = series.std_dev();
        let margin = CONFIDENCE_Z * std_dev / (series.len() as f64).sqrt();

        info!(
            window_hours,
            samples = series.len(),
            mean,
            std_dev,
            "Statistics recomputed"
        );

        Ok(StatisticsSnapshot {
            window_start,
            window_end: now,
            window_hours,
            mean,
            std_dev,
            min: series.min(),
            max: series.max(),
            sample_count: series.len(),
            confidence_lower: mean - margin,
            confidence_upper: mean + margin,
            confidence_level: 0.95,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Sample;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FixedSource {
        values: Vec<f64>,
        fetches: AtomicUsize,
    }

    impl FixedSource {
        fn new(values: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                values,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    impl SampleSource for FixedSource {
        fn samples_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
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

    #[test]
    fn test_series_stats() {
        let ts = TimeSeries::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ts.mean(), 3.0);
        // Population variance of 1..5 is 2.0
        assert!((ts.variance() - 2.0).abs() < 1e-9);
        assert_eq!(ts.min(), 1.0);
        assert_eq!(ts.max(), 5.0);
    }

    #[test]
    fn test_snapshot_confidence_band() {
        let source = FixedSource::new(vec![100.0, 110.0, 90.0, 105.0]);
        let engine = StatsEngine::new(source);
        let now = Utc::now();

        let snap = engine.snapshot(24, now).unwrap();
        assert_eq!(snap.sample_count, 4);
        assert!((snap.mean - 101.25).abs() < 1e-9);

        let margin = 1.96 * snap.std_dev / (4.0f64).sqrt();
        assert!((snap.confidence_lower - (snap.mean - margin)).abs() < 1e-9);
        assert!((snap.confidence_upper - (snap.mean + margin)).abs() < 1e-9);
        assert_eq!(snap.confidence_level, 0.95);
    }

    #[test]
    fn test_empty_window_is_zero_valued_and_uncached() {
        let source = FixedSource::new(vec![]);
        let engine = StatsEngine::new(source.clone());
        let now = Utc::now();

        let snap = engine.snapshot(24, now).unwrap();
        assert_eq!(snap.sample_count, 0);
        assert_eq!(snap.mean, 0.0);
        assert_eq!(snap.std_dev, 0.0);
        assert_eq!(snap.confidence_lower, 0.0);
        assert_eq!(snap.confidence_upper, 0.0);

        // Not cached: a second call within the staleness window still fetches.
        engine.snapshot(24, now + Duration::minutes(1)).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_serves_within_staleness_window() {
        let source = FixedSource::new(vec![10.0, 12.0, 11.0]);
        let engine = StatsEngine::new(source.clone());
        let now = Utc::now();

        let first = engine.snapshot(24, now).unwrap();
        let second = engine.snapshot(24, now + Duration::minutes(4)).unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_recomputes_after_staleness() {
        let source = FixedSource::new(vec![10.0, 12.0, 11.0]);
        let engine = StatsEngine::new(source.clone());
        let now = Utc::now();

        let first = engine.snapshot(24, now).unwrap();
        let later = engine.snapshot(24, now + Duration::minutes(6)).unwrap();
        assert_ne!(first.created_at, later.created_at);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_is_per_window_size() {
        let source = FixedSource::new(vec![10.0, 12.0, 11.0]);
        let engine = StatsEngine::new(source.clone());
        let now = Utc::now();

        engine.snapshot(1, now).unwrap();
        engine.snapshot(24, now).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        let one = engine.snapshot(1, now).unwrap();
        assert_eq!(one.window_hours, 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
