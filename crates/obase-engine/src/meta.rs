//! Schema definition and removal through meta records.
//!
//! Classes, attributes, and keys are records of the meta-classes, so
//! defining one is a `create` on the matching meta-class (name uniqueness
//! comes from the meta keys) and dropping one is a `leave`. The hooks below
//! keep the registry in step with the meta records while a cascade runs.

use obase_schema::{
    AtomSpec, AttributeDef, Cardinality, ClassDef, ClassKind, KeyDef, SchemaError, Visibility,
};
use obase_store::SlotStore;
use obase_types::{AttrId, ClassId, KeyId, Object, Rank, StoreId, StoredValue, Value};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::lifecycle::LeaveJob;
use crate::session::{Changes, Retired, Session};

impl Session<'_> {
    fn meta_ref(&self, class: ClassId, rank: Rank) -> EngineResult<Value> {
        Ok(Value::Object(self.object(class, rank)?))
    }

    /// Validate a meta field value against its attribute.
    fn meta_field(&self, attr: AttrId, value: &Value) -> EngineResult<Option<StoredValue>> {
        Ok(self.schema.validate(&self.store, attr, value, false)?)
    }

    fn require_user_class(&self, class: ClassId, what: &str) -> EngineResult<()> {
        self.schema.class(class)?;
        if self.schema.meta().is_builtin(class.rank()) {
            return Err(EngineError::Unsupported(format!(
                "{what} on built-in class {}",
                self.schema.class_name(class)
            )));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Definition
    // ---------------------------------------------------------------

    /// Create the `Class` record for a new class, without registering it.
    fn create_class_record(&mut self, name: &str) -> EngineResult<ClassId> {
        let meta = *self.schema.meta();
        let changes = Changes::from([(
            meta.class_name,
            self.meta_field(meta.class_name, &Value::from(name))?,
        )]);
        let object = self.create_record(meta.class, changes, None)?;
        Ok(ClassId::new(object.rank()))
    }

    fn create_attribute_record(&mut self, def_name: &str, domain: ClassId, range: ClassId, card: Cardinality, visibility: Visibility) -> EngineResult<AttrId> {
        let meta = *self.schema.meta();
        let mut changes = Changes::new();
        changes.insert(meta.attr_name, self.meta_field(meta.attr_name, &Value::from(def_name))?);
        let domain_ref = self.meta_ref(meta.tuple_class, domain.rank())?;
        changes.insert(meta.attr_domain, self.meta_field(meta.attr_domain, &domain_ref)?);
        let range_ref = self.meta_ref(meta.class, range.rank())?;
        changes.insert(meta.attr_range, self.meta_field(meta.attr_range, &range_ref)?);
        changes.insert(meta.attr_min_card, Some(StoredValue::Int(i64::from(card.min))));
        changes.insert(meta.attr_max_card, card.max.map(|m| StoredValue::Int(i64::from(m))));
        changes.insert(
            meta.attr_visibility,
            Some(StoredValue::Str(visibility.as_str().to_string())),
        );
        let object = self.create_record(meta.attribute, changes, None)?;
        Ok(AttrId::new(object.rank()))
    }

    pub fn define_atom_class(&mut self, name: &str, spec: AtomSpec) -> EngineResult<ClassId> {
        let meta = *self.schema.meta();
        let id = self.create_class_record(name)?;
        let object = self.object(meta.class, id.rank())?;
        let changes = Changes::from([(
            meta.base_type,
            self.meta_field(meta.base_type, &Value::from(spec.base.as_str()))?,
        )]);
        self.enter_record(&object, meta.atom_class, changes, None)?;

        self.schema_mut().insert_class(ClassDef {
            id,
            name: name.to_string(),
            kind: ClassKind::Atom(spec),
            super_class: None,
        });
        info!(class = name, %id, "atom class defined");
        Ok(id)
    }

    pub fn define_tuple_class(&mut self, name: &str, super_class: Option<ClassId>) -> EngineResult<ClassId> {
        let meta = *self.schema.meta();
        if let Some(parent) = super_class {
            self.require_user_class(parent, "subclassing")?;
            if !self.schema.is_tuple_class(parent) {
                return Err(SchemaError::NotATupleClass(self.schema.class_name(parent)).into());
            }
        }

        let id = self.create_class_record(name)?;
        let object = self.object(meta.class, id.rank())?;
        self.enter_record(&object, meta.tuple_class, Changes::new(), None)?;
        if let Some(parent) = super_class {
            let parent_ref = self.meta_ref(meta.tuple_class, parent.rank())?;
            let changes = Changes::from([(meta.super_class, self.meta_field(meta.super_class, &parent_ref)?)]);
            self.enter_record(&object, meta.sub_class, changes, None)?;
        }

        let state_name = self.schema.state_attribute_name().to_string();
        let state = self.create_attribute_record(
            &state_name,
            id,
            meta.entity_state,
            Cardinality::required(),
            Visibility::Hidden,
        )?;

        let schema = self.schema_mut();
        schema.insert_class(ClassDef {
            id,
            name: name.to_string(),
            kind: ClassKind::Tuple { state },
            super_class,
        });
        schema.insert_attribute(AttributeDef {
            id: state,
            name: state_name,
            domain: id,
            range: meta.entity_state,
            card: Cardinality::required(),
            visibility: Visibility::Hidden,
            is_state: true,
        });
        info!(class = name, %id, super_class = ?super_class, "tuple class defined");
        Ok(id)
    }

    pub fn define_attribute(
        &mut self,
        domain: ClassId,
        name: &str,
        range: ClassId,
        card: Cardinality,
    ) -> EngineResult<AttrId> {
        self.require_user_class(domain, "defining attributes")?;
        if !self.schema.is_tuple_class(domain) {
            return Err(SchemaError::NotATupleClass(self.schema.class_name(domain)).into());
        }
        self.schema.class(range)?;
        if !card.is_consistent() {
            return Err(SchemaError::InvalidValue {
                attribute: format!("{}.{name}", self.schema.class_name(domain)),
                reason: format!("inconsistent cardinality {card}"),
            }
            .into());
        }

        let id = self.create_attribute_record(name, domain, range, card, Visibility::Public)?;
        self.schema_mut().insert_attribute(AttributeDef {
            id,
            name: name.to_string(),
            domain,
            range,
            card,
            visibility: Visibility::Public,
            is_state: false,
        });
        info!(attribute = name, class = %self.schema.class_name(domain), %id, "attribute defined");
        Ok(id)
    }

    /// Declare a key and index the existing instances of its class.
    pub fn define_key(&mut self, class: ClassId, attributes: &[AttrId]) -> EngineResult<KeyId> {
        let meta = *self.schema.meta();
        self.require_user_class(class, "declaring keys")?;
        if !self.schema.is_tuple_class(class) {
            return Err(SchemaError::NotATupleClass(self.schema.class_name(class)).into());
        }
        let inherited = self.schema.all_attributes(class)?;
        for attr in attributes {
            let def = self.schema.attribute(*attr)?;
            if def.is_state || !inherited.contains(attr) {
                return Err(EngineError::AttributeNotInClass {
                    attribute: self.schema.attribute_name(*attr),
                    class: self.schema.class_name(class),
                });
            }
        }

        let mut changes = Changes::new();
        let class_ref = self.meta_ref(meta.tuple_class, class.rank())?;
        changes.insert(meta.key_of_class, self.meta_field(meta.key_of_class, &class_ref)?);
        let mut members = Vec::with_capacity(attributes.len());
        for attr in attributes {
            members.push(self.meta_ref(meta.attribute, attr.rank())?);
        }
        changes.insert(
            meta.key_attributes,
            self.meta_field(meta.key_attributes, &Value::List(members))?,
        );
        let object = self.create_record(meta.key, changes, None)?;
        let id = KeyId::new(object.rank());

        self.schema_mut().insert_key(KeyDef {
            id,
            of_class: class,
            attributes: attributes.to_vec(),
        });
        let index = self.build_index(id)?;
        let entries = index.len();
        self.index.install(index);
        info!(class = %self.schema.class_name(class), %id, entries, "key defined");
        Ok(id)
    }

    // ---------------------------------------------------------------
    // Removal
    // ---------------------------------------------------------------

    pub fn drop_class(&mut self, class: ClassId) -> EngineResult<()> {
        self.require_user_class(class, "dropping")?;
        let meta = *self.schema.meta();
        info!(class = %self.schema.class_name(class), "dropping class");
        self.run_leave(LeaveJob {
            rank: class.rank(),
            class: meta.class,
        })
    }

    pub fn drop_attribute(&mut self, attr: AttrId) -> EngineResult<()> {
        let def = self.schema.attribute(attr)?;
        if def.is_state || self.schema.meta().is_builtin(attr.rank()) {
            return Err(EngineError::Unsupported(format!(
                "dropping {}",
                self.schema.attribute_name(attr)
            )));
        }
        let meta = *self.schema.meta();
        info!(attribute = %self.schema.attribute_name(attr), "dropping attribute");
        self.run_leave(LeaveJob {
            rank: attr.rank(),
            class: meta.attribute,
        })
    }

    pub fn drop_key(&mut self, key: KeyId) -> EngineResult<()> {
        self.schema.key(key)?;
        if self.schema.meta().is_builtin(key.rank()) {
            return Err(EngineError::Unsupported(format!("dropping built-in {key}")));
        }
        let meta = *self.schema.meta();
        info!(%key, "dropping key");
        self.run_leave(LeaveJob {
            rank: key.rank(),
            class: meta.key,
        })
    }

    /// Work that must precede closing a meta segment.
    pub(crate) fn before_meta_kill(&mut self, rank: Rank, class: ClassId) -> EngineResult<()> {
        let meta = *self.schema.meta();
        if class == meta.tuple_class {
            // Instances leave the class before the class goes.
            let id = ClassId::new(rank);
            if let Ok(state) = self.schema.state_attribute(id) {
                for instance in self.store.ranks(StoreId::from(state))? {
                    self.run_leave(LeaveJob { rank: instance, class: id })?;
                }
            }
        } else if class == meta.attribute {
            let id = AttrId::new(rank);
            if self.schema.attribute(id).is_ok() {
                for key in self.schema.keys_of_attribute(id) {
                    self.run_leave(LeaveJob {
                        rank: key.rank(),
                        class: meta.key,
                    })?;
                }
                for holder in self.store.ranks(StoreId::from(id))? {
                    self.write_stored(id, holder, None)?;
                }
            }
        }
        Ok(())
    }

    /// Registry changes that follow closing a meta segment.
    pub(crate) fn after_meta_kill(&mut self, rank: Rank, class: ClassId) -> EngineResult<()> {
        let meta = *self.schema.meta();
        if class == meta.sub_class {
            let id = ClassId::new(rank);
            if self.schema.contains_class(id) {
                self.schema_mut().set_super_class(id, None)?;
                debug!(class = %self.schema.class_name(id), "class detached");
            }
        } else if class == meta.class {
            self.retire(Retired::Class(ClassId::new(rank)));
        } else if class == meta.attribute {
            self.retire(Retired::Attribute(AttrId::new(rank)));
        } else if class == meta.key {
            self.retire(Retired::Key(KeyId::new(rank)));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reparenting
    // ---------------------------------------------------------------

    pub fn set_super_class(&mut self, class: ClassId, super_class: Option<ClassId>) -> EngineResult<()> {
        self.require_user_class(class, "reparenting")?;
        let old = self.schema.super_class(class)?;
        if old == super_class {
            return Ok(());
        }
        let meta = *self.schema.meta();
        let class_object = self.object(meta.class, class.rank())?;

        match super_class {
            Some(parent) => {
                self.schema.check_reparent(class, parent)?;
                let parent_ref = self.meta_ref(meta.tuple_class, parent.rank())?;
                let stored = self.meta_field(meta.super_class, &parent_ref)?;
                self.write_stored(meta.super_class, class.rank(), stored)?;
                self.schema_mut().set_super_class(class, Some(parent))?;

                let state = self.schema.state_attribute(class)?;
                for instance in self.store.ranks(StoreId::from(state))? {
                    self.confirm_exist(instance, class)?;
                }
            }
            None => {
                let old_root = self.schema.root_of(class)?;
                self.leave(&class_object, meta.sub_class)?;
                let state = self.schema.state_attribute(class)?;
                for instance in self.store.ranks(StoreId::from(state))? {
                    self.run_leave(LeaveJob {
                        rank: instance,
                        class: old_root,
                    })?;
                }
            }
        }
        info!(
            class = %self.schema.class_name(class),
            super_class = ?super_class.map(|c| self.schema.class_name(c)),
            "class reparented"
        );
        Ok(())
    }

    // ---------------------------------------------------------------
    // Meta assignment
    // ---------------------------------------------------------------

    /// Assign a built-in attribute of a meta record.
    pub fn assign_meta(&mut self, object: &Object, attr: AttrId, value: &Value) -> EngineResult<()> {
        let meta = *self.schema.meta();
        let rank = object.rank();
        let target = self.schema.attribute_name(attr);
        let unsupported = |what: String| Err(EngineError::Unsupported(what));

        if meta.is_builtin(rank) {
            return unsupported(format!("changing {target} of a built-in record"));
        }
        if attr == meta.super_class {
            let parent = match value {
                Value::Object(o) if !o.is_null() => Some(ClassId::new(o.rank())),
                v if v.is_null() => None,
                other => {
                    return Err(SchemaError::InvalidValue {
                        attribute: target,
                        reason: format!("expected a class, got {}", other.kind_name()),
                    }
                    .into())
                }
            };
            return self.set_super_class(ClassId::new(rank), parent);
        }
        if attr == meta.attr_range {
            return unsupported("changing the range class of an attribute".into());
        }
        if attr == meta.class_name || attr == meta.attr_name || attr == meta.attr_visibility {
            if attr != meta.class_name && self.schema.attribute(AttrId::new(rank))?.is_state {
                return unsupported(format!("changing {target} of a state attribute"));
            }
            let visibility = if attr == meta.attr_visibility {
                let text = value.as_str().unwrap_or_default();
                Some(text.parse::<Visibility>().map_err(|reason| SchemaError::InvalidValue {
                    attribute: target.clone(),
                    reason,
                })?)
            } else {
                None
            };
            if value.is_null() {
                return Err(SchemaError::InvalidValue {
                    attribute: target,
                    reason: "a name is required".into(),
                }
                .into());
            }
            self.assign(object, attr, value)?;

            let schema = self.schema_mut();
            match (attr, value.as_str(), visibility) {
                (_, _, Some(v)) => schema.set_visibility(AttrId::new(rank), v)?,
                (a, Some(name), _) if a == meta.class_name => schema.rename_class(ClassId::new(rank), name)?,
                (_, Some(name), _) => schema.rename_attribute(AttrId::new(rank), name)?,
                _ => {}
            }
            return Ok(());
        }
        unsupported(format!("changing {target}"))
    }
}
