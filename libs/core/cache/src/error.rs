use thiserror::Error;

/// Cache invariant violations never propagate out of a public operation —
/// the operation is rolled back and this is logged by the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    #[error("offset {offset} for entry '{entry_id}' falls outside [-{window}, {window}]")]
    OffsetOutOfWindow { entry_id: String, offset: f64, window: f64 },
    #[error("sub-group {0} contains two entries for detector '{1}'")]
    DuplicateDetector(u64, String),
    #[error("anchor of sub-group {0} does not have a zero offset")]
    AnchorNotZero(u64),
}
