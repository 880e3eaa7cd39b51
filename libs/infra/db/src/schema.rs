//! The five-table archival schema: all inbound messages, one archive
//! table per coincidence tier (signal, timing, coincidence — the
//! coincidence tier archive doubles as the alerts table, since every
//! coincidence-tier row that becomes an alert is archived there), and
//! cached heartbeats. Every row carries an `expires_at` the sweeper uses
//! to keep the tables bounded to the rolling window.

use libsql::Connection;
use tracing::{debug, info};

use crate::errors::DbError;

const TABLES: &[(&str, &str)] = &[
    ("messages", r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            detector_name TEXT NOT NULL,
            message_kind TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            received_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
    ("signal_archive", r#"
        CREATE TABLE IF NOT EXISTS signal_archive (
            id TEXT PRIMARY KEY,
            sub_group_id INTEGER NOT NULL,
            detector_name TEXT NOT NULL,
            neutrino_time_utc TEXT NOT NULL,
            p_val REAL,
            received_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
    ("timing_archive", r#"
        CREATE TABLE IF NOT EXISTS timing_archive (
            id TEXT PRIMARY KEY,
            sub_group_id INTEGER NOT NULL,
            detector_name TEXT NOT NULL,
            offset_seconds REAL NOT NULL,
            received_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
    ("coincidence_alerts", r#"
        CREATE TABLE IF NOT EXISTS coincidence_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sub_group_id INTEGER NOT NULL,
            alert_type TEXT NOT NULL,
            detector_names_json TEXT NOT NULL,
            false_alarm_prob TEXT NOT NULL,
            is_test INTEGER NOT NULL,
            emitted_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
    ("cached_heartbeats", r#"
        CREATE TABLE IF NOT EXISTS cached_heartbeats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            detector_name TEXT NOT NULL,
            received_at TEXT NOT NULL,
            stamped_at TEXT NOT NULL,
            latency_seconds REAL NOT NULL,
            status TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_messages_expires_at ON messages(expires_at);",
    "CREATE INDEX IF NOT EXISTS idx_signal_archive_expires_at ON signal_archive(expires_at);",
    "CREATE INDEX IF NOT EXISTS idx_timing_archive_expires_at ON timing_archive(expires_at);",
    "CREATE INDEX IF NOT EXISTS idx_coincidence_alerts_expires_at ON coincidence_alerts(expires_at);",
    "CREATE INDEX IF NOT EXISTS idx_cached_heartbeats_expires_at ON cached_heartbeats(expires_at);",
];

/// Creates every table and index if it does not already exist. Safe to
/// call on every startup against an existing database.
pub async fn apply_schema(connection: &Connection) -> Result<(), DbError> {
    for (name, statement) in TABLES {
        debug!(table = *name, "ensuring table exists");
        connection.execute(statement, ()).await.map_err(|e| DbError::Schema(format!("{name}: {e}")))?;
    }
    for statement in INDEXES {
        connection.execute(statement, ()).await.map_err(|e| DbError::Schema(e.to_string()))?;
    }
    info!("archival schema ready (5 tables)");
    Ok(())
}
