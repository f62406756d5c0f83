//! Error types for the index crate.

use obase_types::{KeyId, Rank};

/// Errors that can occur during index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// The tuple is already held by another rank.
    #[error("duplicate value {tuple} for {key} (held by {existing})")]
    Duplicate {
        key: KeyId,
        tuple: String,
        existing: Rank,
    },
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
