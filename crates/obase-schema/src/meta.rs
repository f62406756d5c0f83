//! Identities of the built-in meta-schema.
//!
//! Classes, attributes, and keys are themselves records of the tuple
//! meta-classes `Class`, `Attribute`, and `Key`. `Class` is specialized by
//! `AtomClass`, `TupleClass`, and `SubClass`, one segment per role. The
//! ranks below are fixed by [`SchemaBuilder`](crate::SchemaBuilder) and are
//! the lowest ranks of every database.

use serde::{Deserialize, Serialize};

use obase_types::{AttrId, ClassId, KeyId, Rank};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSchema {
    /// Atom holding state counters (`Int`, lower bound 0).
    pub entity_state: ClassId,
    pub string: ClassId,
    pub integer: ClassId,
    pub real: ClassId,
    pub time: ClassId,

    pub class: ClassId,
    pub atom_class: ClassId,
    pub tuple_class: ClassId,
    pub sub_class: ClassId,
    pub attribute: ClassId,
    pub key: ClassId,

    /// `Class.name`
    pub class_name: AttrId,
    /// `AtomClass.baseType`
    pub base_type: AttrId,
    /// `SubClass.superClass`
    pub super_class: AttrId,
    /// `Attribute.name`
    pub attr_name: AttrId,
    /// `Attribute.domainClass`
    pub attr_domain: AttrId,
    /// `Attribute.rangeClass`
    pub attr_range: AttrId,
    pub attr_min_card: AttrId,
    pub attr_max_card: AttrId,
    pub attr_visibility: AttrId,
    /// `Key.ofClass`
    pub key_of_class: AttrId,
    /// `Key.keyAttributes`
    pub key_attributes: AttrId,

    /// Unique class names.
    pub class_name_key: KeyId,
    /// Unique attribute names per domain class.
    pub attribute_name_key: KeyId,

    /// Highest rank allocated during bootstrap.
    pub last_builtin: Rank,
}

impl MetaSchema {
    /// Returns `true` for every class, attribute, and key created by bootstrap.
    pub fn is_builtin(&self, rank: Rank) -> bool {
        rank <= self.last_builtin
    }

    /// Returns `true` for the tuple meta-classes.
    pub fn is_meta_class(&self, class: ClassId) -> bool {
        [
            self.class,
            self.atom_class,
            self.tuple_class,
            self.sub_class,
            self.attribute,
            self.key,
        ]
        .contains(&class)
    }
}
