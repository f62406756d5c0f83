//! ObjectBase engine.
//!
//! A small object database over a [`SlotStore`](obase_store::SlotStore):
//! classes with single inheritance, attributes with cardinalities,
//! composite uniqueness keys, and an object lifecycle whose deletes cascade
//! through live reference counts.
//!
//! # Key Types
//!
//! - [`Database`] -- The handle every operation goes through
//! - [`EngineConfig`] -- Settings, loadable from TOML
//! - [`LifecycleHook`] -- Callbacks around create, enter, leave, and assign
//! - [`ReferenceDrift`] -- A reference counter found to be wrong by an audit
//!
//! # Example
//!
//! ```
//! use obase_engine::Database;
//! use obase_schema::Cardinality;
//! use obase_types::Value;
//!
//! let mut db = Database::in_memory().unwrap();
//! let string = db.class_by_name("String").unwrap();
//! let person = db.define_tuple_class("Person", None).unwrap();
//! db.define_attribute(person, "name", string, Cardinality::single()).unwrap();
//! db.define_attribute(person, "best_friend", person, Cardinality::single()).unwrap();
//!
//! let ann = db.create(person, &[("name", Value::from("Ann"))]).unwrap();
//! let bob = db
//!     .create(person, &[("name", Value::from("Bob")), ("best_friend", Value::from(ann))])
//!     .unwrap();
//! assert_eq!(db.current_reference(&ann).unwrap(), 1);
//!
//! db.leave(&bob, person).unwrap();
//! assert_eq!(db.current_reference(&ann).unwrap(), 0);
//! ```

pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod hooks;
mod identity;
mod keys;
mod lifecycle;
mod meta;
mod session;

pub use audit::ReferenceDrift;
pub use config::EngineConfig;
pub use database::Database;
pub use error::{EngineError, EngineResult};
pub use hooks::{AssignEvent, HookOutcome, LeaveSnapshot, LifecycleHook, NoOpHook};
