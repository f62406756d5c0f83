//! Create, enter, and cascading leave.
//!
//! A record exists in a class while its state slot there is present.
//! `create` opens segments from the root down to the class; `enter` opens
//! the missing segments between the class and the record's current point
//! of existence; `leave` closes the class and every subclass segment and
//! then follows the reference graph outward.
//!
//! Leave runs on an explicit worklist. Killing a segment that is already
//! closed does nothing, so the same record may be reached along several
//! paths, including cycles.

use obase_schema::SchemaError;
use obase_store::SlotStore;
use obase_types::{ClassId, Object, Rank, StoreId, StoredValue, Value};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::hooks::{LeaveSnapshot, PostEvent};
use crate::session::{Changes, Session};

/// One `leave` still to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LeaveJob {
    pub rank: Rank,
    pub class: ClassId,
}

impl Session<'_> {
    fn require_tuple(&self, class: ClassId) -> EngineResult<()> {
        if self.schema.is_tuple_class(class) {
            Ok(())
        } else {
            Err(SchemaError::NotATupleClass(self.schema.class_name(class)).into())
        }
    }

    /// Create a record of `class` holding `changes`.
    ///
    /// `named` carries the caller's values for the pre-create hook; meta
    /// records pass `None` and skip hooks.
    pub fn create_record(
        &mut self,
        class: ClassId,
        changes: Changes,
        named: Option<&[(String, Value)]>,
    ) -> EngineResult<Object> {
        self.require_tuple(class)?;
        let rank = self.alloc_rank();
        let object = self.object(class, rank)?;
        let plans = self.plan_keys(rank, &self.schema.keys_applicable(class)?, &changes)?;
        if let Some(values) = named {
            self.check_hooks("create", |hook| hook.pre_create(&object, values))?;
        }

        for level in self.schema.lineage(class)? {
            self.set_state(rank, level, Some(0))?;
        }
        self.write_changes(rank, changes)?;
        self.apply_keys(rank, plans)?;

        debug!(%object, class = %self.schema.class_name(class), "object created");
        if named.is_some() {
            self.defer(PostEvent::Created(object));
        }
        Ok(object)
    }

    /// Add an existing record to `class`, opening every segment between
    /// `class` and the nearest class the record already exists in.
    pub fn enter_record(
        &mut self,
        object: &Object,
        class: ClassId,
        changes: Changes,
        named: Option<&[(String, Value)]>,
    ) -> EngineResult<Object> {
        self.require_tuple(class)?;
        let rank = object.rank();
        let same_tree = self.schema.contains_class(object.class())
            && self.schema.same_tree(object.class(), class)?;
        if !same_tree {
            return Err(EngineError::ReferenceError(format!(
                "{object} is not in the tree of {}",
                self.schema.class_name(class)
            )));
        }

        let mut missing = Vec::new();
        let mut anchored = false;
        for level in self.schema.ancestors(class)? {
            if self.exists_in(rank, level)? {
                anchored = true;
                break;
            }
            missing.push(level);
        }
        if !anchored {
            return Err(EngineError::ReferenceError(format!(
                "{object} does not exist in the tree of {}",
                self.schema.class_name(class)
            )));
        }

        let entered = object.viewed_as(class);
        let plans = self.plan_keys(rank, &self.schema.keys_applicable(class)?, &changes)?;
        if let Some(values) = named {
            self.check_hooks("enter", |hook| hook.pre_enter(&entered, values))?;
        }

        for level in missing.iter().rev() {
            self.set_state(rank, *level, Some(0))?;
        }
        self.write_changes(rank, changes)?;
        self.apply_keys(rank, plans)?;

        debug!(object = %entered, opened = missing.len(), "object entered");
        if named.is_some() {
            self.defer(PostEvent::Entered(entered));
        }
        Ok(entered)
    }

    /// Make sure `rank` exists in `class` and every ancestor, opening any
    /// segment a reparenting left missing.
    pub fn confirm_exist(&mut self, rank: Rank, class: ClassId) -> EngineResult<()> {
        let mut missing = Vec::new();
        for level in self.schema.ancestors(class)? {
            if !self.exists_in(rank, level)? {
                missing.push(level);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        let plans = self.plan_keys(rank, &self.schema.keys_applicable(class)?, &Changes::new())?;
        for level in missing.iter().rev() {
            self.set_state(rank, *level, Some(0))?;
        }
        self.apply_keys(rank, plans)?;
        debug!(%rank, opened = missing.len(), "existence confirmed");
        Ok(())
    }

    /// Remove `object` from `class` and its subclasses, cascading.
    ///
    /// Returns the object viewed through the superclass of `class`, or the
    /// NULL object of `class` when `class` is a root.
    pub fn leave(&mut self, object: &Object, class: ClassId) -> EngineResult<Object> {
        self.run_leave(LeaveJob {
            rank: object.rank(),
            class,
        })?;
        match self.schema.super_class(class)? {
            Some(parent) => Ok(object.viewed_as(parent)),
            None => Ok(Object::null(class, self.schema.root_of(class)?)),
        }
    }

    pub fn run_leave(&mut self, first: LeaveJob) -> EngineResult<()> {
        let mut jobs = vec![first];
        while let Some(job) = jobs.pop() {
            self.leave_one(job, &mut jobs)?;
        }
        Ok(())
    }

    fn leave_one(&mut self, job: LeaveJob, jobs: &mut Vec<LeaveJob>) -> EngineResult<()> {
        if !self.schema.contains_class(job.class) || !self.exists_in(job.rank, job.class)? {
            return Ok(());
        }

        let mut members = Vec::new();
        for class in std::iter::once(job.class).chain(self.schema.all_subclasses(job.class)) {
            if self.exists_in(job.rank, class)? {
                members.push(class);
            }
        }

        let mut snapshots = Vec::with_capacity(members.len());
        for class in &members {
            let snapshot = LeaveSnapshot {
                object: self.object(*class, job.rank)?,
                class_name: self.schema.class_name(*class),
                values: self.schema.snapshot(&self.store, job.rank, *class)?,
            };
            for hook in self.hooks() {
                hook.pre_leave(&snapshot);
            }
            snapshots.push(snapshot);
        }

        for class in members.iter().rev() {
            self.kill(job.rank, *class, jobs)?;
        }

        for snapshot in snapshots {
            self.defer(PostEvent::Left(snapshot));
        }
        Ok(())
    }

    /// Close the segment of `rank` in `class`.
    fn kill(&mut self, rank: Rank, class: ClassId, jobs: &mut Vec<LeaveJob>) -> EngineResult<()> {
        let Some(counter) = self.state(rank, class)? else {
            return Ok(());
        };
        self.before_meta_kill(rank, class)?;
        self.unindex(rank, class)?;

        for attr in self.schema.direct_attributes(class) {
            if !self.schema.attribute(attr)?.is_state {
                self.write_stored(attr, rank, None)?;
            }
        }

        if counter > 0 {
            let needle = StoredValue::Rank(rank);
            for attr in self.schema.referring_attributes(class) {
                let def = self.schema.attribute(attr)?.clone();
                for holder in self.store.find(StoreId::from(attr), &needle)? {
                    if def.is_multi() && self.splice(holder, &def, rank)? {
                        continue;
                    }
                    debug!(%holder, class = %self.schema.class_name(def.domain), "cascading leave");
                    jobs.push(LeaveJob {
                        rank: holder,
                        class: def.domain,
                    });
                }
            }
        }

        self.set_state(rank, class, None)?;
        self.after_meta_kill(rank, class)?;
        debug!(%rank, class = %self.schema.class_name(class), "segment killed");
        Ok(())
    }

    /// Remove `target` from `holder`'s multi-valued slot if what remains
    /// still satisfies the minimum cardinality and every key. Returns
    /// `false` when the holder has to leave instead.
    fn splice(&mut self, holder: Rank, def: &obase_schema::AttributeDef, target: Rank) -> EngineResult<bool> {
        let Some(StoredValue::List(items)) = self.read(def.id, holder)? else {
            return Ok(false);
        };
        let remaining: Vec<StoredValue> = items
            .into_iter()
            .filter(|item| item.as_rank() != Some(target))
            .collect();
        if remaining.len() < def.card.min as usize {
            return Ok(false);
        }

        let value = if remaining.is_empty() {
            None
        } else {
            Some(StoredValue::List(remaining))
        };
        let changes = Changes::from([(def.id, value)]);
        let keys = self.live_keys(holder, self.schema.keys_of_attribute(def.id))?;
        let plans = match self.plan_keys(holder, &keys, &changes) {
            Ok(plans) => plans,
            Err(EngineError::DuplicateKey { .. }) => return Ok(false),
            Err(err) => return Err(err),
        };
        self.write_changes(holder, changes)?;
        self.apply_keys(holder, plans)?;
        debug!(%holder, %target, attribute = %def.name, "reference spliced");
        Ok(true)
    }
}
