//! Slot storage for ObjectBase.
//!
//! The engine stores every attribute value in a *slot*: one entry of the map
//! owned by that attribute, keyed by the record's rank. This crate defines the
//! contract the engine needs from such a store and provides an in-memory
//! implementation together with a write buffer that makes a group of writes
//! atomic.
//!
//! # Storage Backends
//!
//! All backends implement the [`SlotStore`] trait:
//!
//! - [`InMemorySlotStore`] -- `HashMap`-based store for tests and embedding
//! - [`Transaction`] -- buffers writes over another store until committed
//!
//! # Design Rules
//!
//! 1. Writing `None` removes the slot; absent slots read as `None`.
//! 2. `find` matches a slot whose value equals the needle or is a sequence
//!    holding it.
//! 3. The store never interprets values beyond that match.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod traits;
pub mod transaction;

pub use error::{StoreError, StoreResult};
pub use memory::InMemorySlotStore;
pub use traits::{SlotStore, SlotWrite};
pub use transaction::Transaction;
