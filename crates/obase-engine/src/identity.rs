//! Attribute reads and writes with reference counting.
//!
//! Every tuple class keeps, per record, a counter of the stored references
//! pointing at that record through attributes ranged over the class. The
//! counter lives in the class's state attribute, so a present segment
//! always reads as `Some(count)`.

use std::collections::BTreeMap;

use obase_store::SlotStore;
use obase_types::{AttrId, ClassId, Object, Rank, StoreId, StoredValue, Value};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::hooks::{AssignEvent, PostEvent};
use crate::session::{Changes, Session};

impl Session<'_> {
    /// Write one slot and move reference counts from the old value's
    /// targets to the new value's.
    pub fn write_stored(&mut self, attr: AttrId, rank: Rank, value: Option<StoredValue>) -> EngineResult<()> {
        let range = self.schema.attribute(attr)?.range;
        let old = self.read(attr, rank)?;
        if old == value {
            return Ok(());
        }
        if !self.schema.is_tuple_class(range) {
            self.store.put(StoreId::from(attr), rank, value)?;
            return Ok(());
        }

        let mut delta: BTreeMap<Rank, i64> = BTreeMap::new();
        for target in old.iter().flat_map(StoredValue::ranks) {
            *delta.entry(target).or_default() -= 1;
        }
        for target in value.iter().flat_map(StoredValue::ranks) {
            *delta.entry(target).or_default() += 1;
        }
        self.store.put(StoreId::from(attr), rank, value)?;
        for (target, change) in delta {
            if change > 0 {
                self.add_reference(target, range, change)?;
            } else if change < 0 {
                self.remove_reference(target, range, -change)?;
            }
        }
        Ok(())
    }

    /// Write validated changes to `rank`.
    pub fn write_changes(&mut self, rank: Rank, changes: Changes) -> EngineResult<()> {
        for (attr, value) in changes {
            self.write_stored(attr, rank, value)?;
        }
        Ok(())
    }

    pub fn add_reference(&mut self, target: Rank, class: ClassId, count: i64) -> EngineResult<()> {
        match self.state(target, class)? {
            Some(current) => self.set_state(target, class, Some(current + count)),
            None => Err(EngineError::ReferenceError(format!(
                "{target} does not exist in {}",
                self.schema.class_name(class)
            ))),
        }
    }

    /// Decrement a counter. A segment that is already gone is left alone.
    pub fn remove_reference(&mut self, target: Rank, class: ClassId, count: i64) -> EngineResult<()> {
        match self.state(target, class)? {
            None => Ok(()),
            Some(current) if current < count => {
                warn!(%target, class = %self.schema.class_name(class), current, count, "reference counter underflow");
                self.set_state(target, class, Some(0))
            }
            Some(current) => self.set_state(target, class, Some(current - count)),
        }
    }

    /// Resolve `name` from `object`'s class and require the owning segment.
    pub fn applicable(&self, object: &Object, name: &str) -> EngineResult<AttrId> {
        let attr = self.schema.resolve(name, object.class())?;
        let owner = self.schema.attribute(attr)?.domain;
        if !self.exists_in(object.rank(), owner)? {
            return Err(EngineError::AttributeNotApplicable {
                attribute: self.schema.attribute_name(attr),
                class: self.schema.class_name(object.class()),
                rank: object.rank(),
            });
        }
        Ok(attr)
    }

    pub fn get_attr(&self, object: &Object, name: &str) -> EngineResult<Value> {
        let attr = self.applicable(object, name)?;
        let stored = self.read(attr, object.rank())?;
        Ok(self.schema.decode(attr, stored.as_ref())?)
    }

    /// Validate, key-check, and write one attribute of a user record.
    pub fn assign(&mut self, object: &Object, attr: AttrId, value: &Value) -> EngineResult<()> {
        let rank = object.rank();
        let stored = self
            .schema
            .validate(&self.store, attr, value, self.config.lenient_collections)?;
        let previous = self.schema.decode(attr, self.read(attr, rank)?.as_ref())?;
        let changes = Changes::from([(attr, stored)]);
        let keys = self.live_keys(rank, self.schema.keys_of_attribute(attr))?;
        let plans = self.plan_keys(rank, &keys, &changes)?;

        let event = AssignEvent {
            object: *object,
            attribute: attr,
            name: self.schema.attribute(attr)?.name.clone(),
            previous,
            value: value.clone(),
        };
        self.check_hooks("assign", |hook| hook.pre_assign(&event))?;

        self.write_changes(rank, changes)?;
        self.apply_keys(rank, plans)?;
        debug!(object = %object, attribute = %event.name, "attribute assigned");
        self.defer(PostEvent::Assigned(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use obase_schema::Cardinality;
    use obase_types::Value;

    use crate::database::tests::world;
    use crate::error::EngineError;

    #[test]
    fn time_and_real_values_round_trip() {
        let mut w = world();
        let time = w.db.class_by_name("Time").unwrap();
        let real = w.db.class_by_name("Real").unwrap();
        w.db.define_attribute(w.employee, "hired", time, Cardinality::single())
            .unwrap();
        w.db.define_attribute(w.employee, "rating", real, Cardinality::single())
            .unwrap();

        let hired = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let e = w
            .db
            .create(w.employee, &[("hired", Value::from(hired)), ("rating", Value::Real(4.5))])
            .unwrap();
        assert_eq!(w.db.get_attr(&e, "hired").unwrap(), Value::Time(hired));
        assert_eq!(w.db.get_attr(&e, "rating").unwrap(), Value::Real(4.5));

        w.db.set_attr(&e, "hired", Value::Null).unwrap();
        assert_eq!(w.db.get_attr(&e, "hired").unwrap(), Value::Null);
        assert!(w.db.set_attr(&e, "hired", 12).is_err());
    }

    #[test]
    fn reassignment_moves_the_reference() {
        let mut w = world();
        let a = w.db.create(w.person, &[]).unwrap();
        let b = w.db.create(w.person, &[]).unwrap();
        let c = w.db.create(w.person, &[("best_friend", Value::from(a))]).unwrap();
        w.db.set_attr(&c, "best_friend", b).unwrap();
        assert_eq!(w.db.current_reference(&a).unwrap(), 0);
        assert_eq!(w.db.current_reference(&b).unwrap(), 1);

        w.db.set_attr(&c, "friends", vec![a, a, b]).unwrap();
        assert_eq!(w.db.current_reference(&a).unwrap(), 2);
        w.db.set_attr(&c, "friends", Value::List(Vec::new())).unwrap();
        assert_eq!(w.db.current_reference(&a).unwrap(), 0);
        assert_eq!(w.db.get_attr(&c, "friends").unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn references_must_point_at_live_records() {
        let mut w = world();
        let a = w.db.create(w.person, &[]).unwrap();
        let b = w.db.create(w.person, &[]).unwrap();
        w.db.leave(&a, w.person).unwrap();
        assert!(w.db.set_attr(&b, "best_friend", a).is_err());
        assert!(matches!(
            w.db.current_reference(&a),
            Err(EngineError::ReferenceError(_))
        ));
    }
}
