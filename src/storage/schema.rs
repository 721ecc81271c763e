//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS samples (
            id TEXT PRIMARY KEY,
            value_ms REAL NOT NULL,
            status_code INTEGER NOT NULL,
            success INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS anomalies (
            id TEXT PRIMARY KEY,
            sample_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            actual_value REAL NOT NULL,
            expected_value REAL NOT NULL,
            deviation REAL NOT NULL,
            z_score REAL,
            threshold REAL,
            alert_triggered INTEGER NOT NULL DEFAULT 0,
            acknowledged INTEGER NOT NULL DEFAULT 0,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            FOREIGN KEY (sample_id) REFERENCES samples(id)
        );

        CREATE TABLE IF NOT EXISTS statistics (
            id INTEGER PRIMARY KEY,
            window_start TEXT NOT NULL,
            window_end TEXT NOT NULL,
            window_hours INTEGER NOT NULL,
            mean REAL NOT NULL,
            std_dev REAL NOT NULL,
            min REAL NOT NULL,
            max REAL NOT NULL,
            sample_count INTEGER NOT NULL,
            confidence_lower REAL NOT NULL,
            confidence_upper REAL NOT NULL,
            confidence_level REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_samples_created ON samples(created_at);
        CREATE INDEX IF NOT EXISTS idx_anomalies_created ON anomalies(created_at);
        CREATE INDEX IF NOT EXISTS idx_anomalies_severity ON anomalies(severity);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_statistics_window
            ON statistics(window_hours, created_at);",
    )?;

    Ok(())
}
