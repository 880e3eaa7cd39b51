use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("schema initialisation failed: {0}")]
    Schema(String),
    #[error("query failed: {0}")]
    Query(#[from] libsql::Error),
    #[error("row could not be mapped to a domain type: {0}")]
    Mapping(String),
}
