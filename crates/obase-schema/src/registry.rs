//! The schema registry.
//!
//! [`Schema`] stores every definition in a `BTreeMap` keyed by identity and
//! maintains secondary indexes (by name, by domain class, by range class,
//! parent to children, keys by class and by attribute) so the lifecycle
//! engine never has to scan the whole schema.
//!
//! # Invariants
//!
//! - Every `super_class` names a registered tuple class.
//! - Superclass links are acyclic; every class has exactly one root.
//! - State attributes are never indexed by name.

use std::collections::{BTreeMap, BTreeSet};

use obase_types::{AttrId, ClassId, KeyId};

use crate::attribute::{AttributeDef, Visibility};
use crate::class::ClassDef;
use crate::error::{SchemaError, SchemaResult};
use crate::key::KeyDef;
use crate::meta::MetaSchema;

/// Registry of class, attribute, and key definitions.
#[derive(Clone, Debug)]
pub struct Schema {
    meta: MetaSchema,
    state_name: String,
    classes: BTreeMap<ClassId, ClassDef>,
    attributes: BTreeMap<AttrId, AttributeDef>,
    keys: BTreeMap<KeyId, KeyDef>,
    class_names: BTreeMap<String, ClassId>,
    attrs_by_name: BTreeMap<String, BTreeSet<AttrId>>,
    attrs_by_domain: BTreeMap<ClassId, BTreeSet<AttrId>>,
    attrs_by_range: BTreeMap<ClassId, BTreeSet<AttrId>>,
    children: BTreeMap<ClassId, BTreeSet<ClassId>>,
    keys_by_class: BTreeMap<ClassId, BTreeSet<KeyId>>,
    keys_by_attr: BTreeMap<AttrId, BTreeSet<KeyId>>,
}

impl Schema {
    pub(crate) fn empty(meta: MetaSchema, state_name: impl Into<String>) -> Self {
        Self {
            meta,
            state_name: state_name.into(),
            classes: BTreeMap::new(),
            attributes: BTreeMap::new(),
            keys: BTreeMap::new(),
            class_names: BTreeMap::new(),
            attrs_by_name: BTreeMap::new(),
            attrs_by_domain: BTreeMap::new(),
            attrs_by_range: BTreeMap::new(),
            children: BTreeMap::new(),
            keys_by_class: BTreeMap::new(),
            keys_by_attr: BTreeMap::new(),
        }
    }

    pub fn meta(&self) -> &MetaSchema {
        &self.meta
    }

    /// Name given to hidden state attributes.
    pub fn state_attribute_name(&self) -> &str {
        &self.state_name
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    pub fn class(&self, id: ClassId) -> SchemaResult<&ClassDef> {
        self.classes.get(&id).ok_or(SchemaError::UnknownClass(id))
    }

    pub fn attribute(&self, id: AttrId) -> SchemaResult<&AttributeDef> {
        self.attributes
            .get(&id)
            .ok_or(SchemaError::UnknownAttribute(id))
    }

    pub fn key(&self, id: KeyId) -> SchemaResult<&KeyDef> {
        self.keys.get(&id).ok_or(SchemaError::UnknownKey(id))
    }

    pub fn contains_class(&self, id: ClassId) -> bool {
        self.classes.contains_key(&id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyDef> {
        self.keys.values()
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    /// Display name of a class, falling back to its identity.
    pub fn class_name(&self, id: ClassId) -> String {
        self.classes
            .get(&id)
            .map_or_else(|| id.to_string(), |c| c.name.clone())
    }

    /// Qualified display name of an attribute (`Class.attr`).
    pub fn attribute_name(&self, id: AttrId) -> String {
        match self.attributes.get(&id) {
            Some(attr) => format!("{}.{}", self.class_name(attr.domain), attr.name),
            None => id.to_string(),
        }
    }

    pub fn is_atom_class(&self, id: ClassId) -> bool {
        self.classes.get(&id).is_some_and(ClassDef::is_atom)
    }

    pub fn is_tuple_class(&self, id: ClassId) -> bool {
        self.classes.get(&id).is_some_and(ClassDef::is_tuple)
    }

    pub fn is_sub_class(&self, id: ClassId) -> bool {
        self.classes.get(&id).is_some_and(ClassDef::is_sub)
    }

    /// The state attribute of a tuple class.
    pub fn state_attribute(&self, class: ClassId) -> SchemaResult<AttrId> {
        self.class(class)?
            .state_attribute()
            .ok_or_else(|| SchemaError::NotATupleClass(self.class_name(class)))
    }

    // ---------------------------------------------------------------
    // Hierarchy
    // ---------------------------------------------------------------

    pub fn super_class(&self, class: ClassId) -> SchemaResult<Option<ClassId>> {
        Ok(self.class(class)?.super_class)
    }

    /// The class and its ancestors, nearest first, ending at the root.
    pub fn ancestors(&self, class: ClassId) -> SchemaResult<Vec<ClassId>> {
        let mut chain = vec![class];
        let mut cursor = self.class(class)?.super_class;
        while let Some(parent) = cursor {
            if chain.contains(&parent) {
                return Err(SchemaError::CycleInHierarchy {
                    class: self.class_name(class),
                    super_class: self.class_name(parent),
                    reason: "superclass chain loops".into(),
                });
            }
            chain.push(parent);
            cursor = self.class(parent)?.super_class;
        }
        Ok(chain)
    }

    /// The root down to the class, root first.
    pub fn lineage(&self, class: ClassId) -> SchemaResult<Vec<ClassId>> {
        let mut chain = self.ancestors(class)?;
        chain.reverse();
        Ok(chain)
    }

    /// The top-most ancestor of `class`.
    pub fn root_of(&self, class: ClassId) -> SchemaResult<ClassId> {
        let chain = self.ancestors(class)?;
        Ok(chain.last().copied().unwrap_or(class))
    }

    pub fn same_tree(&self, a: ClassId, b: ClassId) -> SchemaResult<bool> {
        Ok(self.root_of(a)? == self.root_of(b)?)
    }

    /// Returns `true` if `ancestor` is `class` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: ClassId, class: ClassId) -> SchemaResult<bool> {
        Ok(self.ancestors(class)?.contains(&ancestor))
    }

    pub fn direct_subclasses(&self, class: ClassId) -> Vec<ClassId> {
        self.children
            .get(&class)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every transitive subclass, depth-first preorder, excluding `class`.
    pub fn all_subclasses(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut stack: Vec<ClassId> = self.direct_subclasses(class).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            if out.contains(&next) || next == class {
                continue;
            }
            out.push(next);
            stack.extend(self.direct_subclasses(next).into_iter().rev());
        }
        out
    }

    // ---------------------------------------------------------------
    // Attributes and keys
    // ---------------------------------------------------------------

    /// Attributes owned by `class`, including its state attribute, in
    /// definition order.
    pub fn direct_attributes(&self, class: ClassId) -> Vec<AttrId> {
        self.attrs_by_domain
            .get(&class)
            .map(|a| a.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Attributes of `class` and all its ancestors, ancestors first.
    pub fn all_attributes(&self, class: ClassId) -> SchemaResult<Vec<AttrId>> {
        Ok(self
            .lineage(class)?
            .into_iter()
            .flat_map(|c| self.direct_attributes(c))
            .collect())
    }

    /// Every non-state attribute named `name`, anywhere in the schema.
    pub fn attributes_named(&self, name: &str) -> Vec<AttrId> {
        self.attrs_by_name
            .get(name)
            .map(|a| a.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Non-state attributes whose range is exactly `class`.
    pub fn referring_attributes(&self, class: ClassId) -> Vec<AttrId> {
        self.attrs_by_range
            .get(&class)
            .map(|a| {
                a.iter()
                    .copied()
                    .filter(|id| self.attributes.get(id).is_some_and(|d| !d.is_state))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys declared on exactly `class`.
    pub fn keys_of_class(&self, class: ClassId) -> Vec<KeyId> {
        self.keys_by_class
            .get(&class)
            .map(|k| k.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Keys that include `attr`.
    pub fn keys_of_attribute(&self, attr: AttrId) -> Vec<KeyId> {
        self.keys_by_attr
            .get(&attr)
            .map(|k| k.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Keys binding instances of `class`: those declared on it or on any
    /// ancestor, root first.
    pub fn keys_applicable(&self, class: ClassId) -> SchemaResult<Vec<KeyId>> {
        Ok(self
            .lineage(class)?
            .into_iter()
            .flat_map(|c| self.keys_of_class(c))
            .collect())
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    pub fn insert_class(&mut self, def: ClassDef) {
        self.class_names.insert(def.name.clone(), def.id);
        if let Some(parent) = def.super_class {
            self.children.entry(parent).or_default().insert(def.id);
        }
        self.classes.insert(def.id, def);
    }

    pub fn insert_attribute(&mut self, def: AttributeDef) {
        if !def.is_state {
            self.attrs_by_name
                .entry(def.name.clone())
                .or_default()
                .insert(def.id);
        }
        self.attrs_by_domain
            .entry(def.domain)
            .or_default()
            .insert(def.id);
        self.attrs_by_range.entry(def.range).or_default().insert(def.id);
        self.attributes.insert(def.id, def);
    }

    pub fn insert_key(&mut self, def: KeyDef) {
        self.keys_by_class
            .entry(def.of_class)
            .or_default()
            .insert(def.id);
        for attr in &def.attributes {
            self.keys_by_attr.entry(*attr).or_default().insert(def.id);
        }
        self.keys.insert(def.id, def);
    }

    pub fn remove_key(&mut self, id: KeyId) -> Option<KeyDef> {
        let def = self.keys.remove(&id)?;
        remove_from(&mut self.keys_by_class, &def.of_class, &id);
        for attr in &def.attributes {
            remove_from(&mut self.keys_by_attr, attr, &id);
        }
        Some(def)
    }

    pub fn remove_attribute(&mut self, id: AttrId) -> Option<AttributeDef> {
        let def = self.attributes.remove(&id)?;
        remove_from(&mut self.attrs_by_name, &def.name, &id);
        remove_from(&mut self.attrs_by_domain, &def.domain, &id);
        remove_from(&mut self.attrs_by_range, &def.range, &id);
        self.keys_by_attr.remove(&id);
        Some(def)
    }

    /// Remove a class. Its subclasses, if any remain, become autonomous.
    pub fn remove_class(&mut self, id: ClassId) -> Option<ClassDef> {
        let def = self.classes.remove(&id)?;
        if self.class_names.get(&def.name) == Some(&id) {
            self.class_names.remove(&def.name);
        }
        if let Some(parent) = def.super_class {
            remove_from(&mut self.children, &parent, &id);
        }
        for child in self.children.remove(&id).unwrap_or_default() {
            if let Some(c) = self.classes.get_mut(&child) {
                c.super_class = None;
            }
        }
        self.attrs_by_domain.remove(&id);
        self.keys_by_class.remove(&id);
        Some(def)
    }

    /// Validate a superclass assignment without applying it.
    ///
    /// The new superclass must be a tuple class in the same tree that is
    /// neither the class itself nor one of its descendants.
    pub fn check_reparent(&self, class: ClassId, new_super: ClassId) -> SchemaResult<()> {
        let reject = |reason: &str| SchemaError::CycleInHierarchy {
            class: self.class_name(class),
            super_class: self.class_name(new_super),
            reason: reason.to_string(),
        };
        if !self.is_tuple_class(class) {
            return Err(SchemaError::NotATupleClass(self.class_name(class)));
        }
        if !self.is_tuple_class(new_super) {
            return Err(SchemaError::NotATupleClass(self.class_name(new_super)));
        }
        if new_super == class || self.is_ancestor_or_self(class, new_super)? {
            return Err(reject("the new superclass is a descendant of the class"));
        }
        if !self.same_tree(class, new_super)? {
            return Err(reject("the new superclass belongs to another tree"));
        }
        Ok(())
    }

    /// Point `class` at a new superclass (or none). Callers validate with
    /// [`check_reparent`](Self::check_reparent) first.
    pub fn set_super_class(&mut self, class: ClassId, new_super: Option<ClassId>) -> SchemaResult<()> {
        let old = self.class(class)?.super_class;
        if old == new_super {
            return Ok(());
        }
        if let Some(parent) = old {
            remove_from(&mut self.children, &parent, &class);
        }
        if let Some(parent) = new_super {
            self.children.entry(parent).or_default().insert(class);
        }
        if let Some(def) = self.classes.get_mut(&class) {
            def.super_class = new_super;
        }
        Ok(())
    }

    pub fn rename_class(&mut self, class: ClassId, name: &str) -> SchemaResult<()> {
        let def = self
            .classes
            .get_mut(&class)
            .ok_or(SchemaError::UnknownClass(class))?;
        if self.class_names.get(&def.name) == Some(&class) {
            self.class_names.remove(&def.name);
        }
        def.name = name.to_string();
        self.class_names.insert(name.to_string(), class);
        Ok(())
    }

    pub fn rename_attribute(&mut self, attr: AttrId, name: &str) -> SchemaResult<()> {
        let def = self
            .attributes
            .get_mut(&attr)
            .ok_or(SchemaError::UnknownAttribute(attr))?;
        if !def.is_state {
            remove_from(&mut self.attrs_by_name, &def.name, &attr);
            self.attrs_by_name
                .entry(name.to_string())
                .or_default()
                .insert(attr);
        }
        def.name = name.to_string();
        Ok(())
    }

    pub fn set_visibility(&mut self, attr: AttrId, visibility: Visibility) -> SchemaResult<()> {
        let def = self
            .attributes
            .get_mut(&attr)
            .ok_or(SchemaError::UnknownAttribute(attr))?;
        def.visibility = visibility;
        Ok(())
    }
}

fn remove_from<K, V>(index: &mut BTreeMap<K, BTreeSet<V>>, key: &K, value: &V)
where
    K: Ord,
    V: Ord,
{
    if let Some(set) = index.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::attribute::Cardinality;
    use crate::builder::SchemaBuilder;
    use obase_store::InMemorySlotStore;
    use obase_types::BaseType;

    /// Animal <- Dog <- Puppy, Animal <- Cat, plus an unrelated Plant tree.
    pub(crate) struct Zoo {
        pub schema: Schema,
        pub animal: ClassId,
        pub dog: ClassId,
        pub puppy: ClassId,
        pub cat: ClassId,
        pub plant: ClassId,
        pub animal_name: AttrId,
        pub dog_name: AttrId,
        pub cat_name: AttrId,
        pub plant_name: AttrId,
        pub age: AttrId,
        pub owner: AttrId,
    }

    pub(crate) fn zoo() -> Zoo {
        let mut b = SchemaBuilder::new("_state");
        let string = b.meta().string;
        let short = b.atom_class("Short", BaseType::Int);
        let animal = b.tuple_class("Animal", None);
        let dog = b.tuple_class("Dog", Some(animal));
        let puppy = b.tuple_class("Puppy", Some(dog));
        let cat = b.tuple_class("Cat", Some(animal));
        let plant = b.tuple_class("Plant", None);
        let animal_name = b.attribute(animal, "name", string, Cardinality::single());
        let dog_name = b.attribute(dog, "name", string, Cardinality::single());
        let cat_name = b.attribute(cat, "name", string, Cardinality::single());
        let plant_name = b.attribute(plant, "name", string, Cardinality::single());
        let age = b.attribute(puppy, "age", short, Cardinality::single());
        let owner = b.attribute(plant, "owner", animal, Cardinality::many());
        let store = InMemorySlotStore::new();
        let schema = b.finish(&store).unwrap().schema;
        Zoo {
            schema,
            animal,
            dog,
            puppy,
            cat,
            plant,
            animal_name,
            dog_name,
            cat_name,
            plant_name,
            age,
            owner,
        }
    }

    #[test]
    fn roots_and_lineage() {
        let z = zoo();
        assert_eq!(z.schema.root_of(z.puppy).unwrap(), z.animal);
        assert_eq!(z.schema.root_of(z.animal).unwrap(), z.animal);
        assert_eq!(z.schema.lineage(z.puppy).unwrap(), vec![z.animal, z.dog, z.puppy]);
        assert!(z.schema.same_tree(z.cat, z.puppy).unwrap());
        assert!(!z.schema.same_tree(z.cat, z.plant).unwrap());
    }

    #[test]
    fn subclasses_depth_first() {
        let z = zoo();
        assert_eq!(z.schema.all_subclasses(z.animal), vec![z.dog, z.puppy, z.cat]);
        assert!(z.schema.all_subclasses(z.puppy).is_empty());
    }

    #[test]
    fn all_attributes_ancestors_first() {
        let z = zoo();
        let attrs = z.schema.all_attributes(z.puppy).unwrap();
        let visible: Vec<AttrId> = attrs
            .into_iter()
            .filter(|a| !z.schema.attribute(*a).unwrap().is_state)
            .collect();
        assert_eq!(visible, vec![z.animal_name, z.dog_name, z.age]);
    }

    #[test]
    fn roles() {
        let z = zoo();
        assert!(z.schema.is_tuple_class(z.dog));
        assert!(z.schema.is_sub_class(z.dog));
        assert!(!z.schema.is_sub_class(z.animal));
        assert!(z.schema.is_atom_class(z.schema.meta().string));
        assert!(z.schema.state_attribute(z.schema.meta().string).is_err());
    }

    #[test]
    fn referring_attributes_by_range() {
        let z = zoo();
        assert_eq!(z.schema.referring_attributes(z.animal), vec![z.owner]);
        assert!(z.schema.referring_attributes(z.dog).is_empty());
        let _ = (z.cat_name, z.plant_name);
    }

    #[test]
    fn reparent_rules() {
        let z = zoo();
        // Moving Puppy under Cat stays inside the tree.
        z.schema.check_reparent(z.puppy, z.cat).unwrap();
        // Dog under Puppy would loop.
        assert!(matches!(
            z.schema.check_reparent(z.dog, z.puppy),
            Err(SchemaError::CycleInHierarchy { .. })
        ));
        // Under itself.
        assert!(z.schema.check_reparent(z.dog, z.dog).is_err());
        // Across trees.
        assert!(matches!(
            z.schema.check_reparent(z.cat, z.plant),
            Err(SchemaError::CycleInHierarchy { .. })
        ));
    }

    #[test]
    fn set_super_class_updates_children() {
        let mut z = zoo();
        z.schema.set_super_class(z.puppy, Some(z.cat)).unwrap();
        assert_eq!(z.schema.all_subclasses(z.cat), vec![z.puppy]);
        assert_eq!(z.schema.all_subclasses(z.dog), Vec::<ClassId>::new());
        z.schema.set_super_class(z.puppy, None).unwrap();
        assert_eq!(z.schema.root_of(z.puppy).unwrap(), z.puppy);
    }

    #[test]
    fn remove_class_detaches_children() {
        let mut z = zoo();
        z.schema.remove_class(z.dog).unwrap();
        assert!(z.schema.class_by_name("Dog").is_none());
        assert_eq!(z.schema.super_class(z.puppy).unwrap(), None);
        assert_eq!(z.schema.all_subclasses(z.animal), vec![z.cat]);
    }

    #[test]
    fn rename_updates_indexes() {
        let mut z = zoo();
        z.schema.rename_class(z.cat, "Feline").unwrap();
        assert_eq!(z.schema.class_by_name("Feline"), Some(z.cat));
        assert!(z.schema.class_by_name("Cat").is_none());
        z.schema.rename_attribute(z.age, "months").unwrap();
        assert_eq!(z.schema.attributes_named("months"), vec![z.age]);
        assert!(z.schema.attributes_named("age").is_empty());
    }

    #[test]
    fn removing_shared_names_prunes_the_name_index() {
        let mut z = zoo();
        assert_eq!(
            z.schema.attributes_named("name"),
            vec![z.animal_name, z.dog_name, z.cat_name, z.plant_name]
        );
        z.schema.remove_attribute(z.dog_name).unwrap();
        z.schema.rename_attribute(z.cat_name, "nickname").unwrap();
        assert_eq!(z.schema.attributes_named("name"), vec![z.animal_name, z.plant_name]);
        assert_eq!(z.schema.attributes_named("nickname"), vec![z.cat_name]);
        assert!(z.schema.direct_attributes(z.dog).iter().all(|a| *a != z.dog_name));

        z.schema.remove_attribute(z.animal_name).unwrap();
        z.schema.remove_attribute(z.plant_name).unwrap();
        assert!(z.schema.attributes_named("name").is_empty());
        assert!(z.schema.remove_attribute(z.plant_name).is_none());
    }

    #[test]
    fn state_attributes_are_not_named() {
        let z = zoo();
        assert!(z.schema.attributes_named("_state").is_empty());
        let state = z.schema.state_attribute(z.dog).unwrap();
        assert!(z.schema.attribute(state).unwrap().is_state);
        assert!(z.schema.direct_attributes(z.dog).contains(&state));
    }
}
