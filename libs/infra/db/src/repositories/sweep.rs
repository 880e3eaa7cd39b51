//! Periodic sweep removing rows past their `expires_at` from every
//! archival table.

use chrono::{DateTime, Utc};
use libsql::params;
use tracing::debug;

use crate::client::DbClient;
use crate::errors::DbError;

const SWEPT_TABLES: &[&str] = &["messages", "signal_archive", "timing_archive", "coincidence_alerts", "cached_heartbeats"];

pub struct SweepRepository {
    client: DbClient,
}

impl SweepRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    /// Deletes every row in every archival table whose `expires_at` has
    /// passed `now`. Returns the total number of rows removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let connection = self.client.connection()?;
        let mut total_removed = 0;
        for table in SWEPT_TABLES {
            let statement = format!("DELETE FROM {table} WHERE expires_at < ?1");
            let removed = connection.execute(&statement, params![now.to_rfc3339()]).await?;
            if removed > 0 {
                debug!(table = *table, removed, "swept expired archival rows");
            }
            total_removed += removed;
        }
        Ok(total_removed)
    }
}
