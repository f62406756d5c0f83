//! Foundation types for ObjectBase.
//!
//! This crate provides the identity and value types shared by every other
//! ObjectBase crate. It has no knowledge of schemas or storage.
//!
//! # Key Types
//!
//! - [`Rank`] -- Stable integer identity of a record, never reused
//! - [`ClassId`], [`AttrId`], [`KeyId`] -- Ranks of schema objects
//! - [`StoreId`] -- Identifier of one backing-store map
//! - [`Object`] -- An identity viewed through a particular class
//! - [`Value`] -- Caller-facing attribute value
//! - [`StoredValue`] -- Value as persisted in the backing store
//! - [`Scalar`] -- Totally ordered value used as a uniqueness-index component

pub mod error;
pub mod object;
pub mod rank;
pub mod scalar;
pub mod value;

pub use error::TypeError;
pub use object::Object;
pub use rank::{AttrId, ClassId, KeyId, Rank, StoreId};
pub use scalar::{Scalar, TotalF64};
pub use value::{BaseType, StoredValue, Value};
