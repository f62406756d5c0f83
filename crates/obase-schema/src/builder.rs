//! One-time bootstrap of the meta-schema.
//!
//! [`SchemaBuilder`] lays down class, attribute, and key definitions and
//! writes their meta records straight into the store. It performs no key or
//! value checks: it cannot call into validation because it never holds a
//! [`Schema`] until [`finish`](SchemaBuilder::finish) hands one out.

use std::collections::BTreeMap;

use obase_store::{SlotStore, SlotWrite};
use obase_types::{AttrId, BaseType, ClassId, KeyId, Rank, StoreId, StoredValue, Value};
use tracing::info;

use crate::attribute::{AttributeDef, Cardinality, Visibility};
use crate::class::{AtomSpec, ClassDef, ClassKind};
use crate::error::SchemaResult;
use crate::key::KeyDef;
use crate::meta::MetaSchema;
use crate::registry::Schema;

/// Result of a bootstrap: the steady-state schema and the first free rank.
#[derive(Debug)]
pub struct Bootstrap {
    pub schema: Schema,
    pub next_rank: Rank,
}

/// Definitions in allocation order, before any schema exists.
struct Layout {
    state_name: String,
    next: Rank,
    classes: Vec<ClassDef>,
    attributes: Vec<AttributeDef>,
    keys: Vec<KeyDef>,
}

impl Layout {
    fn alloc(&mut self) -> Rank {
        let rank = self.next;
        self.next = rank.next();
        rank
    }

    fn atom(&mut self, name: &str, spec: AtomSpec) -> ClassId {
        let id = ClassId::new(self.alloc());
        self.classes.push(ClassDef {
            id,
            name: name.to_string(),
            kind: ClassKind::Atom(spec),
            super_class: None,
        });
        id
    }

    fn tuple(&mut self, name: &str, super_class: Option<ClassId>, entity_state: ClassId) -> ClassId {
        let id = ClassId::new(self.alloc());
        let state = AttrId::new(self.alloc());
        self.classes.push(ClassDef {
            id,
            name: name.to_string(),
            kind: ClassKind::Tuple { state },
            super_class,
        });
        self.attributes.push(AttributeDef {
            id: state,
            name: self.state_name.clone(),
            domain: id,
            range: entity_state,
            card: Cardinality::required(),
            visibility: Visibility::Hidden,
            is_state: true,
        });
        id
    }

    fn attribute(&mut self, domain: ClassId, name: &str, range: ClassId, card: Cardinality) -> AttrId {
        let id = AttrId::new(self.alloc());
        self.attributes.push(AttributeDef {
            id,
            name: name.to_string(),
            domain,
            range,
            card,
            visibility: Visibility::Public,
            is_state: false,
        });
        id
    }

    fn key(&mut self, of_class: ClassId, attributes: Vec<AttrId>) -> KeyId {
        let id = KeyId::new(self.alloc());
        self.keys.push(KeyDef {
            id,
            of_class,
            attributes,
        });
        id
    }
}

/// Bootstrap phase of a schema.
pub struct SchemaBuilder {
    layout: Layout,
    meta: MetaSchema,
}

impl SchemaBuilder {
    /// Lay out the meta-schema. State attributes are named `state_name`.
    pub fn new(state_name: impl Into<String>) -> Self {
        let mut l = Layout {
            state_name: state_name.into(),
            next: Rank::FIRST,
            classes: Vec::new(),
            attributes: Vec::new(),
            keys: Vec::new(),
        };

        let counter = AtomSpec {
            base: BaseType::Int,
            inf: Some(StoredValue::Int(0)),
            sup: None,
        };
        let entity_state = l.atom("EntityState", counter);
        let string = l.atom("String", AtomSpec::new(BaseType::String));
        let integer = l.atom("Integer", AtomSpec::new(BaseType::Int));
        let real = l.atom("Real", AtomSpec::new(BaseType::Real));
        let time = l.atom("Time", AtomSpec::new(BaseType::Time));

        let class = l.tuple("Class", None, entity_state);
        let atom_class = l.tuple("AtomClass", Some(class), entity_state);
        let tuple_class = l.tuple("TupleClass", Some(class), entity_state);
        let sub_class = l.tuple("SubClass", Some(class), entity_state);
        let attribute = l.tuple("Attribute", None, entity_state);
        let key = l.tuple("Key", None, entity_state);

        let one = Cardinality::required();
        let class_name = l.attribute(class, "name", string, one);
        let base_type = l.attribute(atom_class, "baseType", string, one);
        let super_class = l.attribute(sub_class, "superClass", tuple_class, one);
        let attr_name = l.attribute(attribute, "name", string, one);
        let attr_domain = l.attribute(attribute, "domainClass", tuple_class, one);
        let attr_range = l.attribute(attribute, "rangeClass", class, one);
        let attr_min_card = l.attribute(attribute, "minCard", integer, Cardinality::single());
        let attr_max_card = l.attribute(attribute, "maxCard", integer, Cardinality::single());
        let attr_visibility = l.attribute(attribute, "visibility", string, Cardinality::single());
        let key_of_class = l.attribute(key, "ofClass", tuple_class, one);
        let key_attributes = l.attribute(key, "keyAttributes", attribute, Cardinality::range(1, None));

        let class_name_key = l.key(class, vec![class_name]);
        let attribute_name_key = l.key(attribute, vec![attr_domain, attr_name]);

        let last_builtin = Rank::new(l.next.get() - 1);
        let meta = MetaSchema {
            entity_state,
            string,
            integer,
            real,
            time,
            class,
            atom_class,
            tuple_class,
            sub_class,
            attribute,
            key,
            class_name,
            base_type,
            super_class,
            attr_name,
            attr_domain,
            attr_range,
            attr_min_card,
            attr_max_card,
            attr_visibility,
            key_of_class,
            key_attributes,
            class_name_key,
            attribute_name_key,
            last_builtin,
        };
        Self { layout: l, meta }
    }

    pub fn meta(&self) -> &MetaSchema {
        &self.meta
    }

    pub fn atom_class(&mut self, name: &str, base: BaseType) -> ClassId {
        self.layout.atom(name, AtomSpec::new(base))
    }

    pub fn bounded_atom_class(&mut self, name: &str, spec: AtomSpec) -> ClassId {
        self.layout.atom(name, spec)
    }

    pub fn tuple_class(&mut self, name: &str, super_class: Option<ClassId>) -> ClassId {
        let entity_state = self.meta.entity_state;
        self.layout.tuple(name, super_class, entity_state)
    }

    pub fn attribute(&mut self, domain: ClassId, name: &str, range: ClassId, card: Cardinality) -> AttrId {
        self.layout.attribute(domain, name, range, card)
    }

    pub fn key(&mut self, of_class: ClassId, attributes: Vec<AttrId>) -> KeyId {
        self.layout.key(of_class, attributes)
    }

    /// Build the registry and write every meta record and reference
    /// counter into `store`.
    pub fn finish(self, store: &dyn SlotStore) -> SchemaResult<Bootstrap> {
        let Self { layout, meta } = self;
        let mut schema = Schema::empty(meta, layout.state_name.clone());
        for class in &layout.classes {
            schema.insert_class(class.clone());
        }
        for attr in &layout.attributes {
            schema.insert_attribute(attr.clone());
        }
        for key in &layout.keys {
            schema.insert_key(key.clone());
        }

        let mut records = MetaRecords::new(&schema);
        for class in &layout.classes {
            records.class(class)?;
        }
        for attr in &layout.attributes {
            records.attribute(attr)?;
        }
        for key in &layout.keys {
            records.key(key)?;
        }
        store.write_batch(&records.writes)?;

        let counters = schema.tally_references(store)?;
        let mut writes = Vec::with_capacity(counters.len());
        for ((class, rank), count) in counters {
            let state = schema.attribute(schema.state_attribute(class)?)?;
            writes.push(SlotWrite {
                store: state.store(),
                rank,
                value: Some(StoredValue::Int(count as i64)),
            });
        }
        store.write_batch(&writes)?;

        info!(
            classes = layout.classes.len(),
            attributes = layout.attributes.len(),
            keys = layout.keys.len(),
            next_rank = %layout.next,
            "schema bootstrapped"
        );
        Ok(Bootstrap {
            schema,
            next_rank: layout.next,
        })
    }
}

/// Meta-record writes, collected for one batch.
struct MetaRecords<'a> {
    schema: &'a Schema,
    writes: Vec<SlotWrite>,
}

impl<'a> MetaRecords<'a> {
    fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            writes: Vec::new(),
        }
    }

    fn slot(&mut self, attr: AttrId, rank: Rank, value: StoredValue) {
        self.writes.push(SlotWrite {
            store: StoreId::from(attr),
            rank,
            value: Some(value),
        });
    }

    fn present(&mut self, rank: Rank, class: ClassId) -> SchemaResult<()> {
        let state = self.schema.state_attribute(class)?;
        self.slot(state, rank, StoredValue::Int(0));
        Ok(())
    }

    fn class(&mut self, def: &ClassDef) -> SchemaResult<()> {
        let meta = *self.schema.meta();
        let rank = def.id.rank();
        self.present(rank, meta.class)?;
        self.slot(meta.class_name, rank, StoredValue::Str(def.name.clone()));
        if let Some(spec) = def.atom() {
            self.present(rank, meta.atom_class)?;
            self.slot(meta.base_type, rank, StoredValue::Str(spec.base.to_string()));
        }
        if def.is_tuple() {
            self.present(rank, meta.tuple_class)?;
        }
        if let Some(parent) = def.super_class {
            self.present(rank, meta.sub_class)?;
            self.slot(meta.super_class, rank, StoredValue::Rank(parent.rank()));
        }
        Ok(())
    }

    fn attribute(&mut self, def: &AttributeDef) -> SchemaResult<()> {
        let meta = *self.schema.meta();
        let rank = def.id.rank();
        self.present(rank, meta.attribute)?;
        self.slot(meta.attr_name, rank, StoredValue::Str(def.name.clone()));
        self.slot(meta.attr_domain, rank, StoredValue::Rank(def.domain.rank()));
        self.slot(meta.attr_range, rank, StoredValue::Rank(def.range.rank()));
        self.slot(meta.attr_min_card, rank, StoredValue::Int(i64::from(def.card.min)));
        if let Some(max) = def.card.max {
            self.slot(meta.attr_max_card, rank, StoredValue::Int(i64::from(max)));
        }
        self.slot(
            meta.attr_visibility,
            rank,
            StoredValue::Str(def.visibility.as_str().to_string()),
        );
        Ok(())
    }

    fn key(&mut self, def: &KeyDef) -> SchemaResult<()> {
        let meta = *self.schema.meta();
        let rank = def.id.rank();
        self.present(rank, meta.key)?;
        self.slot(meta.key_of_class, rank, StoredValue::Rank(def.of_class.rank()));
        let members = def
            .attributes
            .iter()
            .map(|a| StoredValue::Rank(a.rank()))
            .collect();
        self.slot(meta.key_attributes, rank, StoredValue::List(members));
        Ok(())
    }
}

impl Schema {
    /// Count, for every live record of every tuple class, how many stored
    /// references point at it. Counts are kept per range-class segment.
    pub fn tally_references(
        &self,
        store: &dyn SlotStore,
    ) -> SchemaResult<BTreeMap<(ClassId, Rank), u64>> {
        let mut counts: BTreeMap<(ClassId, Rank), u64> = BTreeMap::new();
        for attr in self.attributes() {
            if attr.is_state || !self.is_tuple_class(attr.range) {
                continue;
            }
            for holder in store.ranks(attr.store())? {
                if let Some(value) = store.get(attr.store(), holder)? {
                    for target in value.ranks() {
                        *counts.entry((attr.range, target)).or_default() += 1;
                    }
                }
            }
        }
        Ok(counts)
    }

    /// The name and value of every direct attribute of `class` held by `rank`,
    /// state attribute excluded.
    pub fn snapshot(
        &self,
        store: &dyn SlotStore,
        rank: Rank,
        class: ClassId,
    ) -> SchemaResult<Vec<(String, Value)>> {
        let mut values = Vec::new();
        for attr in self.direct_attributes(class) {
            let def = self.attribute(attr)?;
            if def.is_state {
                continue;
            }
            let stored = store.get(def.store(), rank)?;
            values.push((def.name.clone(), self.decode(attr, stored.as_ref())?));
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obase_store::InMemorySlotStore;

    #[test]
    fn meta_schema_is_self_describing() {
        let store = InMemorySlotStore::new();
        let boot = SchemaBuilder::new("_state").finish(&store).unwrap();
        let schema = &boot.schema;
        let meta = *schema.meta();

        assert_eq!(schema.class_by_name("Class"), Some(meta.class));
        assert_eq!(schema.class_by_name("SubClass"), Some(meta.sub_class));
        assert!(schema.exists_in(&store, meta.attribute.rank(), meta.class).unwrap());
        assert!(schema.exists_in(&store, meta.attribute.rank(), meta.tuple_class).unwrap());
        assert!(!schema.exists_in(&store, meta.attribute.rank(), meta.sub_class).unwrap());
        assert!(schema.exists_in(&store, meta.sub_class.rank(), meta.sub_class).unwrap());
        assert!(schema.exists_in(&store, meta.string.rank(), meta.atom_class).unwrap());
        assert_eq!(boot.next_rank, meta.last_builtin.next());
    }

    #[test]
    fn bootstrap_counts_references() {
        let store = InMemorySlotStore::new();
        let boot = SchemaBuilder::new("_state").finish(&store).unwrap();
        let schema = &boot.schema;
        let meta = *schema.meta();

        // String is the range of both name attributes, baseType, and visibility.
        let refs = schema.state_of(&store, meta.string.rank(), meta.class).unwrap();
        assert_eq!(refs, Some(4));
        // Class is the superclass of the three role classes.
        let subs = schema.state_of(&store, meta.class.rank(), meta.tuple_class).unwrap();
        assert!(subs.unwrap() >= 3);

        let tally = schema.tally_references(&store).unwrap();
        for ((class, rank), count) in tally {
            let stored = schema.state_of(&store, rank, class).unwrap().unwrap();
            assert_eq!(stored as u64, count);
        }
    }

    #[test]
    fn builder_accepts_user_definitions() {
        let store = InMemorySlotStore::new();
        let mut b = SchemaBuilder::new("_state");
        let string = b.meta().string;
        let person = b.tuple_class("Person", None);
        let name = b.attribute(person, "name", string, Cardinality::required());
        let key = b.key(person, vec![name]);
        let boot = b.finish(&store).unwrap();
        assert_eq!(boot.schema.keys_of_class(person), vec![key]);
        assert_eq!(boot.schema.keys_of_attribute(name), vec![key]);
        assert_eq!(boot.schema.resolve("name", person).unwrap(), name);
    }

    #[test]
    fn snapshot_skips_state() {
        let store = InMemorySlotStore::new();
        let boot = SchemaBuilder::new("_state").finish(&store).unwrap();
        let meta = *boot.schema.meta();
        let values = boot
            .schema
            .snapshot(&store, meta.key.rank(), meta.class)
            .unwrap();
        assert_eq!(values, vec![("name".to_string(), Value::from("Key"))]);
    }
}
