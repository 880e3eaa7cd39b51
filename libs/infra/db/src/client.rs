use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::info;

use crate::errors::DbError;
use crate::schema::apply_schema;

/// A connected, schema-initialised database handle. Cloning shares the
/// underlying connection pool; each repository opens its own
/// [`Connection`] from it.
#[derive(Clone)]
pub struct DbClient {
    database: Arc<Database>,
}

impl DbClient {
    /// Connects to `url` (a `libsql://` remote, an `https://` remote, or a
    /// local sqlite file/`:memory:` path), applies the archival schema,
    /// and returns a ready-to-use handle.
    pub async fn connect(url: &str, auth_token: Option<String>) -> Result<Self, DbError> {
        if url.is_empty() {
            return Err(DbError::Connection("DATABASE_URL is empty".to_string()));
        }

        let is_remote = url.starts_with("libsql://") || url.starts_with("https://");
        let database = if is_remote {
            let token = auth_token.ok_or_else(|| DbError::Connection("remote database requires an auth token".to_string()))?;
            Builder::new_remote(url.to_string(), token).build().await
        } else {
            Builder::new_local(url).build().await
        }
        .map_err(|e| DbError::Connection(e.to_string()))?;

        let connection = database.connect().map_err(|e| DbError::Connection(e.to_string()))?;
        apply_schema(&connection).await?;
        info!(url, "archive database connected and schema applied");

        Ok(Self { database: Arc::new(database) })
    }

    pub fn connection(&self) -> Result<Connection, DbError> {
        self.database.connect().map_err(|e| DbError::Connection(e.to_string()))
    }
}
