//! SQLite storage layer -- schema, queries, migrations.

pub mod schema;

use crate::analysis::{Anomaly, AnomalyType, Sample, SampleSource, Severity, StatisticsSnapshot};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid stored timestamp '{s}'"))?
        .with_timezone(&Utc))
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<(String, f64, u16, bool, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get::<_, i64>(2)? as u16,
        row.get::<_, i64>(3)? != 0,
        row.get(4)?,
    ))
}

/// Persistence facade over the connection pool. Also the `SampleSource` the
/// analysis engines read from.
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn save_sample(&self, sample: &Sample) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO samples (id, value_ms, status_code, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sample.id.to_string(),
                sample.value_ms,
                sample.status_code as i64,
                sample.success as i64,
                sample.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Samples strictly newer than `since`, ascending by timestamp.
    pub fn fetch_samples_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, value_ms, status_code, success, created_at FROM samples
             WHERE created_at > ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], sample_from_row)?;

        let mut samples = Vec::new();
        for r in rows {
            samples.push(build_sample(r?)?);
        }
        Ok(samples)
    }

    /// Most recent samples first.
    pub fn recent_samples(&self, limit: usize) -> Result<Vec<Sample>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, value_ms, status_code, success, created_at FROM samples
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], sample_from_row)?;

        let mut samples = Vec::new();
        for r in rows {
            samples.push(build_sample(r?)?);
        }
        Ok(samples)
    }

    pub fn latest_sample(&self) -> Result<Option<Sample>> {
        Ok(self.recent_samples(1)?.into_iter().next())
    }

    pub fn save_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO anomalies (id, sample_id, kind, severity, actual_value,
                expected_value, deviation, z_score, threshold, alert_triggered,
                acknowledged, metadata_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                anomaly.id.to_string(),
                anomaly.sample_id.to_string(),
                anomaly.kind.as_str(),
                anomaly.severity.as_str(),
                anomaly.actual_value,
                anomaly.expected_value,
                anomaly.deviation,
                anomaly.z_score,
                anomaly.threshold,
                anomaly.alert_triggered as i64,
                anomaly.acknowledged as i64,
                serde_json::to_string(&anomaly.metadata)?,
                anomaly.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent anomalies first, optionally filtered by severity.
    pub fn list_anomalies(&self, limit: usize, severity: Option<Severity>) -> Result<Vec<Anomaly>> {
        let conn = self.pool.get()?;
        let base = "SELECT id, sample_id, kind, severity, actual_value, expected_value,
                deviation, z_score, threshold, alert_triggered, acknowledged,
                metadata_json, created_at FROM anomalies";

        let mut stmt;
        let rows = match severity {
            Some(sev) => {
                stmt = conn.prepare(&format!(
                    "{base} WHERE severity = ?1 ORDER BY created_at DESC LIMIT ?2"
                ))?;
                stmt.query_map(params![sev.as_str(), limit as i64], anomaly_from_row)?
            }
            None => {
                stmt = conn.prepare(&format!("{base} ORDER BY created_at DESC LIMIT ?1"))?;
                stmt.query_map([limit as i64], anomaly_from_row)?
            }
        };

        let mut anomalies = Vec::new();
        for r in rows {
            anomalies.push(build_anomaly(r?)?);
        }
        Ok(anomalies)
    }

    pub fn get_anomaly(&self, id: Uuid) -> Result<Option<Anomaly>> {
        let conn = self.pool.get()?;
        let raw = conn
            .query_row(
                "SELECT id, sample_id, kind, severity, actual_value, expected_value,
                    deviation, z_score, threshold, alert_triggered, acknowledged,
                    metadata_json, created_at FROM anomalies WHERE id = ?1",
                params![id.to_string()],
                anomaly_from_row,
            )
            .optional()?;
        raw.map(build_anomaly).transpose()
    }

    /// Mark an anomaly acknowledged and return the updated record, or `None`
    /// when the id is unknown. The only post-creation mutation anomalies get.
    pub fn acknowledge_anomaly(&self, id: Uuid) -> Result<Option<Anomaly>> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE anomalies SET acknowledged = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        drop(conn);

        if changed == 0 {
            return Ok(None);
        }
        self.get_anomaly(id)
    }

    /// Persist a snapshot. Re-saving the cached snapshot is a no-op thanks to
    /// the (window_hours, created_at) uniqueness guard.
    pub fn save_statistic(&self, snapshot: &StatisticsSnapshot) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO statistics (window_start, window_end, window_hours,
                mean, std_dev, min, max, sample_count, confidence_lower,
                confidence_upper, confidence_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                snapshot.window_start.to_rfc3339(),
                snapshot.window_end.to_rfc3339(),
                snapshot.window_hours,
                snapshot.mean,
                snapshot.std_dev,
                snapshot.min,
                snapshot.max,
                snapshot.sample_count as i64,
                snapshot.confidence_lower,
                snapshot.confidence_upper,
                snapshot.confidence_level,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Snapshot history for a window size, most recent first.
    pub fn statistics_history(
        &self,
        window_hours: i64,
        limit: usize,
    ) -> Result<Vec<StatisticsSnapshot>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT window_start, window_end, window_hours, mean, std_dev, min, max,
                sample_count, confidence_lower, confidence_upper, confidence_level,
                created_at
             FROM statistics WHERE window_hours = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![window_hours, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, f64>(9)?,
                row.get::<_, f64>(10)?,
                row.get::<_, String>(11)?,
            ))
        })?;

        let mut history = Vec::new();
        for r in rows {
            let (
                window_start,
                window_end,
                window_hours,
                mean,
                std_dev,
                min,
                max,
                sample_count,
                confidence_lower,
                confidence_upper,
                confidence_level,
                created_at,
            ) = r?;
            history.push(StatisticsSnapshot {
                window_start: parse_ts(&window_start)?,
                window_end: parse_ts(&window_end)?,
                window_hours,
                mean,
                std_dev,
                min,
                max,
                sample_count: sample_count as usize,
                confidence_lower,
                confidence_upper,
                confidence_level,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(history)
    }
}

impl SampleSource for Store {
    fn samples_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.fetch_samples_since(since)
    }
}

fn build_sample(raw: (String, f64, u16, bool, String)) -> Result<Sample> {
    let (id, value_ms, status_code, success, created_at) = raw;
    Ok(Sample {
        id: Uuid::parse_str(&id).with_context(|| format!("invalid sample id '{id}'"))?,
        timestamp: parse_ts(&created_at)?,
        value_ms,
        status_code,
        success,
    })
}

type RawAnomaly = (
    String,
    String,
    String,
    String,
    f64,
    f64,
    f64,
    Option<f64>,
    Option<f64>,
    bool,
    bool,
    String,
    String,
);

fn anomaly_from_row(row: &Row<'_>) -> rusqlite::Result<RawAnomaly> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get::<_, i64>(9)? != 0,
        row.get::<_, i64>(10)? != 0,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn build_anomaly(raw: RawAnomaly) -> Result<Anomaly> {
    let (
        id,
        sample_id,
        kind,
        severity,
        actual_value,
        expected_value,
        deviation,
        z_score,
        threshold,
        alert_triggered,
        acknowledged,
        metadata_json,
        created_at,
    ) = raw;
    Ok(Anomaly {
        id: Uuid::parse_str(&id).with_context(|| format!("invalid anomaly id '{id}'"))?,
        timestamp: parse_ts(&created_at)?,
        sample_id: Uuid::parse_str(&sample_id)
            .with_context(|| format!("invalid sample id '{sample_id}'"))?,
        kind: AnomalyType::parse(&kind).ok_or_else(|| anyhow!("unknown anomaly kind '{kind}'"))?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| anyhow!("unknown severity '{severity}'"))?,
        actual_value,
        expected_value,
        deviation,
        z_score,
        threshold,
        alert_triggered,
        acknowledged,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}
