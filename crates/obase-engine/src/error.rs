use obase_types::Rank;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schema error: {0}")]
    Schema(#[from] obase_schema::SchemaError),

    #[error("store error: {0}")]
    Store(#[from] obase_store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] obase_index::IndexError),

    /// A write would give two records the same key values.
    #[error("duplicate {key} on {class}: {values} is already held by {existing}")]
    DuplicateKey {
        key: String,
        class: String,
        values: String,
        existing: Rank,
    },

    /// The object does not currently exist where the operation needs it.
    #[error("reference error: {0}")]
    ReferenceError(String),

    #[error("{attribute} does not apply to {rank} as {class}")]
    AttributeNotApplicable {
        attribute: String,
        class: String,
        rank: Rank,
    },

    /// The attribute is declared outside the lineage of the class being used.
    #[error("{attribute} is not an attribute of {class}")]
    AttributeNotInClass { attribute: String, class: String },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{operation} rejected by hook: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
