//! Schema model for ObjectBase.
//!
//! The [`Schema`] is a registry of class, attribute, and key definitions
//! indexed by identity, by name, by domain class, and by range class. All
//! structural questions the engine asks (roots, ancestors, subclasses,
//! referring attributes) and attribute-name resolution are pure functions
//! over the registry.
//!
//! # Key Types
//!
//! - [`Schema`] -- The steady-state registry
//! - [`SchemaBuilder`] -- The one-time bootstrap phase that lays down the
//!   meta-schema without key or value checks
//! - [`MetaSchema`] -- Identities of the built-in meta-classes and atoms
//! - [`ClassDef`], [`AttributeDef`], [`KeyDef`] -- Definitions
//!
//! # Roles
//!
//! A class is an *atom* (scalar domain with a base type and optional
//! bounds) or a *tuple* (record type carrying a hidden state attribute).
//! A tuple class may additionally be a *sub* class of another tuple class;
//! classes linked this way form specialization trees.

pub mod attribute;
pub mod builder;
pub mod class;
pub mod error;
pub mod key;
pub mod meta;
pub mod registry;
pub mod resolve;
pub mod validate;

pub use attribute::{AttributeDef, Cardinality, Visibility};
pub use builder::{Bootstrap, SchemaBuilder};
pub use class::{AtomSpec, ClassDef, ClassKind};
pub use error::{SchemaError, SchemaResult};
pub use key::KeyDef;
pub use meta::MetaSchema;
pub use registry::Schema;
