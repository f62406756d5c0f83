//! The public database handle.

use std::sync::Arc;

use obase_index::{IndexSet, KeyTuple};
use obase_schema::{AtomSpec, Cardinality, Schema, SchemaBuilder, SchemaError};
use obase_store::{InMemorySlotStore, SlotStore};
use obase_types::{AttrId, BaseType, ClassId, KeyId, Object, Rank, StoreId, Value};
use tracing::info;

use crate::audit::{self, ReferenceDrift};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::hooks::LifecycleHook;
use crate::session::{Changes, Session};

/// An object database over a slot store.
///
/// Every mutating call runs as one unit: it either completes and commits
/// its slot writes, index changes, and schema changes together, or fails
/// and leaves nothing behind.
pub struct Database {
    store: Arc<dyn SlotStore>,
    schema: Schema,
    indexes: IndexSet,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    config: EngineConfig,
    next_rank: Rank,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("classes", &self.schema.classes().count())
            .field("indexes", &self.indexes.len())
            .field("hooks", &self.hooks.len())
            .field("next_rank", &self.next_rank)
            .finish()
    }
}

impl Database {
    /// Bootstrap a database into `store` with the default configuration.
    pub fn new(store: Arc<dyn SlotStore>) -> EngineResult<Self> {
        Self::with_config(store, EngineConfig::default())
    }

    /// Bootstrap a database into `store`.
    pub fn with_config(store: Arc<dyn SlotStore>, config: EngineConfig) -> EngineResult<Self> {
        let boot = SchemaBuilder::new(config.state_attribute_name.clone()).finish(store.as_ref())?;
        let schema = boot.schema;

        let mut indexes = IndexSet::new();
        {
            let committed = IndexSet::new();
            let session = Session::new(store.as_ref(), &schema, &committed, &[], &config, boot.next_rank);
            for key in schema.keys() {
                indexes.install(session.build_index(key.id)?);
            }
        }

        info!(next_rank = %boot.next_rank, keys = indexes.len(), "database opened");
        Ok(Self {
            store,
            schema,
            indexes,
            hooks: Vec::new(),
            config,
            next_rank: boot.next_rank,
        })
    }

    /// A database over a fresh [`InMemorySlotStore`].
    pub fn in_memory() -> EngineResult<Self> {
        Self::new(Arc::new(InMemorySlotStore::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn SlotStore> {
        &self.store
    }

    pub fn add_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    // ---------------------------------------------------------------
    // Session plumbing
    // ---------------------------------------------------------------

    fn read<T>(&self, f: impl FnOnce(&Session<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let session = Session::new(
            self.store.as_ref(),
            &self.schema,
            &self.indexes,
            &[],
            &self.config,
            self.next_rank,
        );
        f(&session)
    }

    /// Run `f` in a fresh session and commit its effects. Ranks handed out
    /// by the session stay consumed even when it fails.
    fn write<T>(&mut self, f: impl FnOnce(&mut Session<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let (result, next_rank) = {
            let mut session = Session::new(
                self.store.as_ref(),
                &self.schema,
                &self.indexes,
                &self.hooks,
                &self.config,
                self.next_rank,
            );
            let result = f(&mut session).and_then(|value| {
                session.settle();
                if self.config.audit_references {
                    let drift = audit::audit(&session.schema, &session.store)?;
                    if !drift.is_empty() {
                        let report: Vec<String> = drift.iter().map(ToString::to_string).collect();
                        return Err(EngineError::Integrity(report.join("; ")));
                    }
                }
                Ok(value)
            });
            let next_rank = session.next_rank();
            (result.and_then(|value| Ok((value, session.commit()?))), next_rank)
        };
        self.next_rank = next_rank;
        let (value, outcome) = result?;

        if let Some(schema) = outcome.schema {
            self.schema = schema;
        }
        self.indexes.apply(outcome.index_ops);
        for event in &outcome.events {
            for hook in &self.hooks {
                event.dispatch(hook.as_ref());
            }
        }
        Ok(value)
    }

    /// Resolve and validate caller values against `class`.
    fn resolve_values(
        session: &Session<'_>,
        class: ClassId,
        values: &[(&str, Value)],
    ) -> EngineResult<(Changes, Vec<(String, Value)>)> {
        let lineage = session.schema.lineage(class)?;
        let mut changes = Changes::new();
        let mut named = Vec::with_capacity(values.len());
        for (name, value) in values {
            let attr = session.schema.resolve(name, class)?;
            let def = session.schema.attribute(attr)?;
            if !lineage.contains(&def.domain) {
                return Err(EngineError::AttributeNotInClass {
                    attribute: session.schema.attribute_name(attr),
                    class: session.schema.class_name(class),
                });
            }
            let stored = session.schema.validate(
                &session.store,
                attr,
                value,
                session.config.lenient_collections,
            )?;
            changes.insert(attr, stored);
            named.push((def.name.clone(), value.clone()));
        }
        Ok((changes, named))
    }

    fn reject_meta(&self, class: ClassId, operation: &str) -> EngineResult<()> {
        let meta = self.schema.meta();
        if meta.is_meta_class(class) || meta.is_meta_class(self.schema.root_of(class)?) {
            return Err(EngineError::Unsupported(format!(
                "{operation} on {}; use the schema definition calls",
                self.schema.class_name(class)
            )));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Objects
    // ---------------------------------------------------------------

    /// Create an object of `class` with the given attribute values.
    pub fn create(&mut self, class: ClassId, values: &[(&str, Value)]) -> EngineResult<Object> {
        self.reject_meta(class, "create")?;
        self.write(|s| {
            let (changes, named) = Self::resolve_values(s, class, values)?;
            s.create_record(class, changes, Some(&named))
        })
    }

    /// Add an existing object to `class`, a class of the same tree.
    pub fn enter(&mut self, object: &Object, class: ClassId, values: &[(&str, Value)]) -> EngineResult<Object> {
        self.reject_meta(class, "enter")?;
        self.write(|s| {
            let (changes, named) = Self::resolve_values(s, class, values)?;
            s.enter_record(object, class, changes, Some(&named))
        })
    }

    /// Remove `object` from `class` and all its subclasses, cascading
    /// through references. Leaving a class the object is not in does
    /// nothing.
    ///
    /// On meta records this drops the class, attribute, or key, or
    /// detaches a class from its superclass.
    pub fn leave(&mut self, object: &Object, class: ClassId) -> EngineResult<Object> {
        let meta = *self.schema.meta();
        let rank = object.rank();
        if class == meta.class {
            self.drop_class(ClassId::new(rank))?;
        } else if class == meta.attribute {
            self.drop_attribute(AttrId::new(rank))?;
        } else if class == meta.key {
            self.drop_key(KeyId::new(rank))?;
        } else if class == meta.sub_class {
            self.set_super_class(ClassId::new(rank), None)?;
            return Ok(object.viewed_as(meta.class));
        } else if meta.is_meta_class(class) {
            return Err(EngineError::Unsupported(format!(
                "leaving {}",
                self.schema.class_name(class)
            )));
        } else {
            return self.write(|s| s.leave(object, class));
        }
        Ok(Object::null(class, self.schema.root_of(class)?))
    }

    pub fn get_attr(&self, object: &Object, name: &str) -> EngineResult<Value> {
        self.read(|s| s.get_attr(object, name))
    }

    pub fn set_attr(&mut self, object: &Object, name: &str, value: impl Into<Value>) -> EngineResult<()> {
        let value = value.into();
        let meta = *self.schema.meta();
        self.write(|s| {
            let attr = s.applicable(object, name)?;
            if meta.is_builtin(attr.rank()) && meta.is_meta_class(s.schema.attribute(attr)?.domain) {
                s.assign_meta(object, attr, &value)
            } else {
                s.assign(object, attr, &value)
            }
        })
    }

    pub fn exists_in(&self, object: &Object, class: ClassId) -> EngineResult<bool> {
        if object.is_null()
            || !self.schema.contains_class(object.class())
            || !self.schema.same_tree(object.class(), class)?
        {
            return Ok(false);
        }
        Ok(self.schema.exists_in(self.store.as_ref(), object.rank(), class)?)
    }

    /// Live references to `object`, across every class of its tree.
    pub fn current_reference(&self, object: &Object) -> EngineResult<u64> {
        let root = self.schema.root_of(object.class())?;
        let mut total = 0u64;
        let mut present = false;
        for class in std::iter::once(root).chain(self.schema.all_subclasses(root)) {
            if let Some(count) = self.schema.state_of(self.store.as_ref(), object.rank(), class)? {
                present = true;
                total += count as u64;
            }
        }
        if !present {
            return Err(EngineError::ReferenceError(format!("{object} does not exist")));
        }
        Ok(total)
    }

    /// Every live object of `class`, in rank order.
    pub fn instances(&self, class: ClassId) -> EngineResult<Vec<Object>> {
        let state = self.schema.state_attribute(class)?;
        let root = self.schema.root_of(class)?;
        Ok(self
            .store
            .ranks(StoreId::from(state))?
            .into_iter()
            .map(|rank| Object::new(class, root, rank))
            .collect())
    }

    /// The object holding `values` under `key`, if any.
    pub fn lookup(&self, key: KeyId, values: &[Value]) -> EngineResult<Option<Object>> {
        let def = self.schema.key(key)?;
        if values.len() != def.attributes.len() {
            return Err(SchemaError::InvalidValue {
                attribute: format!("{key}"),
                reason: format!("expected {} values, got {}", def.attributes.len(), values.len()),
            }
            .into());
        }
        let mut slots = Vec::with_capacity(values.len());
        for (attr, value) in def.attributes.iter().zip(values) {
            slots.push(self.schema.validate(self.store.as_ref(), *attr, value, false)?);
        }
        let Some(tuple) = KeyTuple::from_slots(slots.iter().map(Option::as_ref)) else {
            return Ok(None);
        };
        let root = self.schema.root_of(def.of_class)?;
        Ok(self
            .indexes
            .lookup(key, &tuple)
            .map(|rank| Object::new(def.of_class, root, rank)))
    }

    /// Recount every reference and report counters that disagree.
    pub fn reference_audit(&self) -> EngineResult<Vec<ReferenceDrift>> {
        audit::audit(&self.schema, self.store.as_ref())
    }

    // ---------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------

    pub fn define_atom_class(&mut self, name: &str, base: BaseType) -> EngineResult<ClassId> {
        self.write(|s| s.define_atom_class(name, AtomSpec::new(base)))
    }

    /// Define an atom class whose values must lie in `[inf, sup]`.
    pub fn define_bounded_atom_class(
        &mut self,
        name: &str,
        base: BaseType,
        inf: Option<Value>,
        sup: Option<Value>,
    ) -> EngineResult<ClassId> {
        let spec = AtomSpec::bounded(base, inf.as_ref(), sup.as_ref()).map_err(|reason| {
            SchemaError::InvalidValue {
                attribute: name.to_string(),
                reason,
            }
        })?;
        self.write(|s| s.define_atom_class(name, spec))
    }

    pub fn define_tuple_class(&mut self, name: &str, super_class: Option<ClassId>) -> EngineResult<ClassId> {
        self.write(|s| s.define_tuple_class(name, super_class))
    }

    pub fn define_attribute(
        &mut self,
        domain: ClassId,
        name: &str,
        range: ClassId,
        card: Cardinality,
    ) -> EngineResult<AttrId> {
        self.write(|s| s.define_attribute(domain, name, range, card))
    }

    pub fn define_key(&mut self, class: ClassId, attributes: &[AttrId]) -> EngineResult<KeyId> {
        self.write(|s| s.define_key(class, attributes))
    }

    pub fn drop_class(&mut self, class: ClassId) -> EngineResult<()> {
        self.write(|s| s.drop_class(class))
    }

    pub fn drop_attribute(&mut self, attr: AttrId) -> EngineResult<()> {
        self.write(|s| s.drop_attribute(attr))
    }

    pub fn drop_key(&mut self, key: KeyId) -> EngineResult<()> {
        self.write(|s| s.drop_key(key))
    }

    pub fn set_super_class(&mut self, class: ClassId, super_class: Option<ClassId>) -> EngineResult<()> {
        self.write(|s| s.set_super_class(class, super_class))
    }

    /// Changing an attribute's range would require migrating its stored
    /// values, which is not supported.
    pub fn set_range_class(&mut self, attr: AttrId, _range: ClassId) -> EngineResult<()> {
        Err(EngineError::Unsupported(format!(
            "changing the range class of {}",
            self.schema.attribute_name(attr)
        )))
    }

    // ---------------------------------------------------------------
    // Reflection
    // ---------------------------------------------------------------

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.schema.class_by_name(name)
    }

    /// Resolve an attribute name from `class`.
    pub fn attribute_by_name(&self, class: ClassId, name: &str) -> EngineResult<AttrId> {
        Ok(self.schema.resolve(name, class)?)
    }

    /// Visible attributes of `class` and its ancestors, ancestors first.
    pub fn all_attributes(&self, class: ClassId) -> EngineResult<Vec<AttrId>> {
        let mut visible = Vec::new();
        for attr in self.schema.all_attributes(class)? {
            if !self.schema.attribute(attr)?.is_state {
                visible.push(attr);
            }
        }
        Ok(visible)
    }

    pub fn all_subclasses(&self, class: ClassId) -> Vec<ClassId> {
        self.schema.all_subclasses(class)
    }

    pub fn keys_of_class(&self, class: ClassId) -> Vec<KeyId> {
        self.schema.keys_of_class(class)
    }

    pub fn keys_of_attribute(&self, attr: AttrId) -> Vec<KeyId> {
        self.schema.keys_of_attribute(attr)
    }

    /// The meta record of a class, for use with `get_attr`/`set_attr`.
    pub fn class_object(&self, class: ClassId) -> Object {
        let meta = self.schema.meta();
        Object::new(meta.class, meta.class, class.rank())
    }

    pub fn attribute_object(&self, attr: AttrId) -> Object {
        let meta = self.schema.meta();
        Object::new(meta.attribute, meta.attribute, attr.rank())
    }

    pub fn key_object(&self, key: KeyId) -> Object {
        let meta = self.schema.meta();
        Object::new(meta.key, meta.key, key.rank())
    }
}
