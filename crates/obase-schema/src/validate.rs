//! Value validation and decoding against an attribute's range class.

use obase_store::SlotStore;
use obase_types::{AttrId, ClassId, Object, Rank, StoredValue, Value};

use crate::attribute::AttributeDef;
use crate::error::{SchemaError, SchemaResult};
use crate::registry::Schema;

impl Schema {
    /// Read the state counter of `rank` in `class`. `None` means the record
    /// has no segment in that class.
    pub fn state_of(
        &self,
        store: &dyn SlotStore,
        rank: Rank,
        class: ClassId,
    ) -> SchemaResult<Option<i64>> {
        if rank.is_null() {
            return Ok(None);
        }
        let state = self.attribute(self.state_attribute(class)?)?;
        match store.get(state.store(), rank)? {
            None => Ok(None),
            Some(StoredValue::Int(n)) if n >= 0 => Ok(Some(n)),
            Some(_) => Err(SchemaError::CorruptState {
                class: self.class_name(class),
                rank,
            }),
        }
    }

    /// Returns `true` if `rank` currently has a segment in `class`.
    pub fn exists_in(&self, store: &dyn SlotStore, rank: Rank, class: ClassId) -> SchemaResult<bool> {
        Ok(self.state_of(store, rank, class)?.is_some())
    }

    /// Check `value` against `attr` and convert it to its stored form.
    ///
    /// `Ok(None)` means the slot should be cleared. With `lenient`, a scalar
    /// assigned to a multi-valued attribute is taken as a one-element list.
    pub fn validate(
        &self,
        store: &dyn SlotStore,
        attr: AttrId,
        value: &Value,
        lenient: bool,
    ) -> SchemaResult<Option<StoredValue>> {
        let def = self.attribute(attr)?;
        if value.is_null() {
            return Ok(None);
        }
        if !def.is_multi() {
            if let Value::List(_) = value {
                return Err(self.invalid(def, "a single-valued attribute cannot hold a list"));
            }
            return self.validate_element(store, def, value).map(Some);
        }

        let items: Vec<&Value> = match value {
            Value::List(items) => items.iter().collect(),
            scalar if lenient => vec![scalar],
            other => {
                return Err(self.invalid(
                    def,
                    &format!("expected a list, got {}", other.kind_name()),
                ))
            }
        };
        if !def.card.admits(items.len()) {
            return Err(self.invalid(
                def,
                &format!("{} values do not fit cardinality {}", items.len(), def.card),
            ));
        }
        if items.is_empty() {
            return Ok(None);
        }
        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            if item.is_null() {
                return Err(self.invalid(def, "lists cannot contain null"));
            }
            stored.push(self.validate_element(store, def, item)?);
        }
        Ok(Some(StoredValue::List(stored)))
    }

    fn validate_element(
        &self,
        store: &dyn SlotStore,
        def: &AttributeDef,
        value: &Value,
    ) -> SchemaResult<StoredValue> {
        let range = self.class(def.range)?;
        if let Some(spec) = range.atom() {
            return spec.coerce(value).map_err(|reason| self.invalid(def, &reason));
        }

        let Value::Object(object) = value else {
            return Err(self.invalid(
                def,
                &format!("expected an object of {}, got {}", range.name, value.kind_name()),
            ));
        };
        let same_tree =
            self.contains_class(object.class()) && self.same_tree(object.class(), def.range)?;
        if !same_tree {
            return Err(self.invalid(
                def,
                &format!("{object} is not in the tree of {}", range.name),
            ));
        }
        if !self.exists_in(store, object.rank(), def.range)? {
            return Err(self.invalid(
                def,
                &format!("{} is not a live {}", object.rank(), range.name),
            ));
        }
        Ok(StoredValue::Rank(object.rank()))
    }

    /// Convert a stored slot back into a caller-facing value.
    ///
    /// References become objects of the range class. An absent multi-valued
    /// slot reads as an empty list; an absent reference reads as the NULL
    /// object of the range class.
    pub fn decode(&self, attr: AttrId, stored: Option<&StoredValue>) -> SchemaResult<Value> {
        let def = self.attribute(attr)?;
        let reference_root = if self.is_tuple_class(def.range) {
            Some(self.root_of(def.range)?)
        } else {
            None
        };
        let element = |v: &StoredValue| match (v, reference_root) {
            (StoredValue::Rank(rank), Some(root)) => Value::Object(Object::new(def.range, root, *rank)),
            (other, _) => decode_scalar(other),
        };

        Ok(match (stored, def.is_multi()) {
            (None, true) => Value::List(Vec::new()),
            (None, false) => match reference_root {
                Some(root) => Value::Object(Object::null(def.range, root)),
                None => Value::Null,
            },
            (Some(StoredValue::List(items)), _) => Value::List(items.iter().map(element).collect()),
            (Some(single), true) => Value::List(vec![element(single)]),
            (Some(single), false) => element(single),
        })
    }

    fn invalid(&self, def: &AttributeDef, reason: &str) -> SchemaError {
        SchemaError::InvalidValue {
            attribute: self.attribute_name(def.id),
            reason: reason.to_string(),
        }
    }
}

fn decode_scalar(value: &StoredValue) -> Value {
    match value {
        StoredValue::Int(v) => Value::Int(*v),
        StoredValue::Real(v) => Value::Real(*v),
        StoredValue::Time(v) => Value::Time(*v),
        StoredValue::Str(v) => Value::Str(v.clone()),
        StoredValue::Rank(r) => Value::Int(r.get() as i64),
        StoredValue::List(items) => Value::List(items.iter().map(decode_scalar).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::zoo;
    use obase_store::InMemorySlotStore;

    fn live(store: &InMemorySlotStore, schema: &Schema, class: ClassId, rank: u64) -> Object {
        for level in schema.lineage(class).unwrap() {
            let state = schema.attribute(schema.state_attribute(level).unwrap()).unwrap();
            store
                .put(state.store(), Rank::new(rank), Some(StoredValue::Int(0)))
                .unwrap();
        }
        Object::new(class, schema.root_of(class).unwrap(), Rank::new(rank))
    }

    #[test]
    fn atoms_coerce_and_null_clears() {
        let z = zoo();
        let store = InMemorySlotStore::new();
        assert_eq!(
            z.schema.validate(&store, z.dog_name, &Value::from("Rex"), false).unwrap(),
            Some(StoredValue::Str("Rex".into()))
        );
        assert_eq!(z.schema.validate(&store, z.dog_name, &Value::Null, false).unwrap(), None);
        assert!(matches!(
            z.schema.validate(&store, z.dog_name, &Value::Int(3), false),
            Err(SchemaError::InvalidValue { .. })
        ));
    }

    #[test]
    fn references_must_be_live_and_in_tree() {
        let z = zoo();
        let store = InMemorySlotStore::new();
        let dog = live(&store, &z.schema, z.dog, 900);
        let list = Value::List(vec![Value::Object(dog)]);
        assert_eq!(
            z.schema.validate(&store, z.owner, &list, false).unwrap(),
            Some(StoredValue::List(vec![StoredValue::Rank(Rank::new(900))]))
        );

        let ghost = Object::new(z.animal, z.animal, Rank::new(901));
        assert!(z
            .schema
            .validate(&store, z.owner, &Value::List(vec![Value::Object(ghost)]), false)
            .is_err());

        let plant = live(&store, &z.schema, z.plant, 902);
        assert!(z
            .schema
            .validate(&store, z.owner, &Value::List(vec![Value::Object(plant)]), false)
            .is_err());
    }

    #[test]
    fn multi_valued_needs_list_unless_lenient() {
        let z = zoo();
        let store = InMemorySlotStore::new();
        let dog = live(&store, &z.schema, z.animal, 10);
        let scalar = Value::Object(dog);
        assert!(z.schema.validate(&store, z.owner, &scalar, false).is_err());
        assert_eq!(
            z.schema.validate(&store, z.owner, &scalar, true).unwrap(),
            Some(StoredValue::List(vec![StoredValue::Rank(Rank::new(10))]))
        );
        assert_eq!(
            z.schema.validate(&store, z.owner, &Value::List(vec![]), false).unwrap(),
            None
        );
    }

    #[test]
    fn decode_wraps_references() {
        let z = zoo();
        let stored = StoredValue::List(vec![StoredValue::Rank(Rank::new(4))]);
        let value = z.schema.decode(z.owner, Some(&stored)).unwrap();
        let objects = value.as_list().unwrap();
        assert_eq!(objects[0].as_object().unwrap().rank(), Rank::new(4));
        assert_eq!(objects[0].as_object().unwrap().class(), z.animal);
        assert_eq!(z.schema.decode(z.owner, None).unwrap(), Value::List(vec![]));
        assert_eq!(z.schema.decode(z.age, None).unwrap(), Value::Null);
    }

    #[test]
    fn state_of_reports_corruption() {
        let z = zoo();
        let store = InMemorySlotStore::new();
        let state = z.schema.attribute(z.schema.state_attribute(z.dog).unwrap()).unwrap();
        store
            .put(state.store(), Rank::new(5), Some(StoredValue::Str("x".into())))
            .unwrap();
        assert!(matches!(
            z.schema.state_of(&store, Rank::new(5), z.dog),
            Err(SchemaError::CorruptState { .. })
        ));
        assert_eq!(z.schema.state_of(&store, Rank::new(6), z.dog).unwrap(), None);
    }
}
