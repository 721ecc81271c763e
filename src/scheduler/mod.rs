//! Cron-driven probe loop: probe, persist, baseline, detect, publish.

use crate::analysis::stats::StatsEngine;
use crate::analysis::{detector, Anomaly};
use crate::notify::{Event, Notifier};
use crate::probe::Probe;
use crate::storage::Store;
use anyhow::{anyhow, Result};
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Owns one probe target end to end. The daemon drives it on a cron cadence;
/// the CLI drives a single cycle directly.
pub struct Monitor {
    probe: Arc<dyn Probe>,
    store: Arc<Store>,
    stats: Arc<StatsEngine>,
    notifier: Notifier,
    window_hours: i64,
}

impl Monitor {
    pub fn new(
        probe: Arc<dyn Probe>,
        store: Arc<Store>,
        stats: Arc<StatsEngine>,
        notifier: Notifier,
        window_hours: i64,
    ) -> Self {
        Self {
            probe,
            store,
            stats,
            notifier,
            window_hours,
        }
    }

    /// One full cycle: run the probe, persist and publish the sample, refresh
    /// the baseline, run detection, persist and publish each anomaly.
    pub async fn run_cycle(&self) -> Result<Vec<Anomaly>> {
        let sample = self.probe.run().await?;
        info!(
            value_ms = sample.value_ms,
            status = sample.status_code,
            success = sample.success,
            "Probe finished"
        );

        self.store.save_sample(&sample)?;
        self.notifier.publish(Event::NewSample(sample.clone()));

        let now = Utc::now();
        let snapshot = self.stats.snapshot(self.window_hours, now)?;
        if snapshot.sample_count > 0 {
            self.store.save_statistic(&snapshot)?;
        }

        let anomalies = detector::detect(&sample, &snapshot);
        for anomaly in &anomalies {
            warn!(
                kind = anomaly.kind.as_str(),
                severity = anomaly.severity.as_str(),
                actual = anomaly.actual_value,
                expected = anomaly.expected_value,
                "Anomaly recorded"
            );
            self.store.save_anomaly(anomaly)?;
            self.notifier.publish(Event::NewAnomaly(anomaly.clone()));
        }

        Ok(anomalies)
    }
}

/// Validate a cron expression up front so the daemon can fail fast.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr).map_err(|e| anyhow!("invalid cron expression '{expr}': {e}"))
}

/// Main monitor execution loop. Sleeps until each cron fire time and runs one
/// probe cycle; cycle errors are logged and the loop keeps going.
pub async fn run_monitor_loop(monitor: Arc<Monitor>, schedule: Schedule) {
    info!("Monitor loop started");

    loop {
        let now = Utc::now();
        let Some(next) = schedule.after(&now).next() else {
            error!("Cron schedule yields no future runs, stopping monitor loop");
            return;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = monitor.run_cycle().await {
            error!("Probe cycle failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_default_cron_fires_every_five_minutes() {
        let schedule = parse_cron("0 */5 * * * *").unwrap();
        let now = Utc::now();
        let mut fires = schedule.after(&now);

        let first = fires.next().unwrap();
        let second = fires.next().unwrap();
        assert_eq!(second - first, Duration::minutes(5));
        assert!(first > now);
    }

    #[test]
    fn test_bad_cron_is_rejected() {
        assert!(parse_cron("not a cron").is_err());
    }
}
