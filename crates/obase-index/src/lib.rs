//! Uniqueness indexes for ObjectBase.
//!
//! Every uniqueness key owns a [`UniqueIndex`]: an ordered map from the
//! tuple of the key attributes' values to the rank holding them. The engine
//! never mutates indexes directly while an operation is in flight; it
//! stages changes through a [`StagedIndex`] and applies the resulting
//! [`IndexOp`]s only once the operation has succeeded.
//!
//! # Key Types
//!
//! - [`KeyTuple`] -- Scalarized key values
//! - [`UniqueIndex`] -- One key's tuple-to-rank map
//! - [`IndexSet`] -- All indexes of a database, by key
//! - [`StagedIndex`] -- Pending changes layered over an [`IndexSet`]

pub mod entry;
pub mod error;
pub mod index;
pub mod staged;

pub use entry::KeyTuple;
pub use error::{IndexError, IndexResult};
pub use index::{IndexOp, IndexSet, UniqueIndex};
pub use staged::StagedIndex;
