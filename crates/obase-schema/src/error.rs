//! Error types for the schema crate.

use obase_types::{AttrId, ClassId, KeyId, Rank};

/// Errors raised by schema lookups, resolution, and validation.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No class with this identity is registered.
    #[error("unknown class: {0}")]
    UnknownClass(ClassId),

    /// No attribute with this identity is registered.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(AttrId),

    /// No key with this identity is registered.
    #[error("unknown key: {0}")]
    UnknownKey(KeyId),

    /// No attribute of this name exists in the context class's tree.
    #[error("no attribute named {name:?} in the hierarchy of {class}")]
    NoSuchAttribute { name: String, class: String },

    /// Several attributes of this name exist in the tree and none is the
    /// closest definition on the context class's ancestor chain.
    #[error("attribute name {name:?} is ambiguous from {class} ({candidates} candidates)")]
    AmbiguousAttribute {
        name: String,
        class: String,
        candidates: usize,
    },

    /// A value failed type, bounds, or cardinality validation.
    #[error("invalid value for {attribute}: {reason}")]
    InvalidValue { attribute: String, reason: String },

    /// A tuple-only operation was applied to a class without a record segment.
    #[error("{0} is not a tuple class")]
    NotATupleClass(String),

    /// A superclass assignment would leave the tree or create a cycle.
    #[error("cannot make {super_class} the superclass of {class}: {reason}")]
    CycleInHierarchy {
        class: String,
        super_class: String,
        reason: String,
    },

    /// A state slot holds something other than a counter.
    #[error("corrupt state for rank {rank} in {class}")]
    CorruptState { class: String, rank: Rank },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] obase_store::StoreError),
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;
