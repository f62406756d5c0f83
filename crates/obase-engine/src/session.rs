//! One top-level operation in flight.
//!
//! A [`Session`] buffers every effect of an operation: slot writes go to a
//! [`Transaction`], index changes to a [`StagedIndex`], schema changes to a
//! copy-on-write [`Schema`], post-hook calls to an event list. Nothing is
//! visible outside until [`Session::commit`] hands the effects back to the
//! database; dropping the session on error discards them all.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use obase_index::{IndexOp, IndexSet, StagedIndex};
use obase_schema::Schema;
use obase_store::{SlotStore, Transaction};
use obase_types::{AttrId, ClassId, KeyId, Object, Rank, StoreId, StoredValue};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::hooks::{HookOutcome, LifecycleHook, PostEvent};

/// Validated slot values to write, by attribute. `None` clears the slot.
pub(crate) type Changes = BTreeMap<AttrId, Option<StoredValue>>;

/// Schema definitions removed by a cascade, unregistered once the cascade
/// has finished with them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Retired {
    Key(KeyId),
    Attribute(AttrId),
    Class(ClassId),
}

/// Effects of a committed session.
pub(crate) struct Outcome {
    pub schema: Option<Schema>,
    pub index_ops: Vec<IndexOp>,
    pub events: Vec<PostEvent>,
}

pub(crate) struct Session<'a> {
    pub store: Transaction<'a>,
    pub schema: Cow<'a, Schema>,
    pub index: StagedIndex<'a>,
    pub config: &'a EngineConfig,
    hooks: &'a [Arc<dyn LifecycleHook>],
    next_rank: Rank,
    retired: Vec<Retired>,
    events: Vec<PostEvent>,
}

impl<'a> Session<'a> {
    pub fn new(
        store: &'a dyn SlotStore,
        schema: &'a Schema,
        indexes: &'a IndexSet,
        hooks: &'a [Arc<dyn LifecycleHook>],
        config: &'a EngineConfig,
        next_rank: Rank,
    ) -> Self {
        Self {
            store: Transaction::new(store),
            schema: Cow::Borrowed(schema),
            index: StagedIndex::new(indexes),
            config,
            hooks,
            next_rank,
            retired: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Hand out the next rank.
    pub fn alloc_rank(&mut self) -> Rank {
        let rank = self.next_rank;
        self.next_rank = rank.next();
        rank
    }

    /// The first rank not yet handed out.
    pub fn next_rank(&self) -> Rank {
        self.next_rank
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        self.schema.to_mut()
    }

    // ---------------------------------------------------------------
    // Slot access
    // ---------------------------------------------------------------

    pub fn read(&self, attr: AttrId, rank: Rank) -> EngineResult<Option<StoredValue>> {
        Ok(self.store.get(StoreId::from(attr), rank)?)
    }

    pub fn state(&self, rank: Rank, class: ClassId) -> EngineResult<Option<i64>> {
        Ok(self.schema.state_of(&self.store, rank, class)?)
    }

    pub fn exists_in(&self, rank: Rank, class: ClassId) -> EngineResult<bool> {
        Ok(self.state(rank, class)?.is_some())
    }

    pub fn set_state(&mut self, rank: Rank, class: ClassId, state: Option<i64>) -> EngineResult<()> {
        let attr = self.schema.state_attribute(class)?;
        self.store
            .put(StoreId::from(attr), rank, state.map(StoredValue::Int))?;
        Ok(())
    }

    /// `rank` viewed through `class`.
    pub fn object(&self, class: ClassId, rank: Rank) -> EngineResult<Object> {
        Ok(Object::new(class, self.schema.root_of(class)?, rank))
    }

    // ---------------------------------------------------------------
    // Hooks
    // ---------------------------------------------------------------

    /// Run a pre-hook on every registered hook; the first rejection wins.
    pub fn check_hooks<F>(&self, operation: &'static str, check: F) -> EngineResult<()>
    where
        F: Fn(&dyn LifecycleHook) -> HookOutcome,
    {
        for hook in self.hooks {
            if let HookOutcome::Reject { reason } = check(hook.as_ref()) {
                debug!(operation, %reason, "hook rejected operation");
                return Err(EngineError::Rejected { operation, reason });
            }
        }
        Ok(())
    }

    pub fn hooks(&self) -> &'a [Arc<dyn LifecycleHook>] {
        self.hooks
    }

    pub fn defer(&mut self, event: PostEvent) {
        if !self.hooks.is_empty() {
            self.events.push(event);
        }
    }

    // ---------------------------------------------------------------
    // Completion
    // ---------------------------------------------------------------

    pub fn retire(&mut self, item: Retired) {
        if !self.retired.contains(&item) {
            self.retired.push(item);
        }
    }

    /// Unregister retired definitions: keys, then attributes, then classes.
    pub fn settle(&mut self) {
        let mut retired = std::mem::take(&mut self.retired);
        retired.sort();
        for item in retired {
            match item {
                Retired::Key(key) => {
                    self.index.drop_index(key);
                    self.schema_mut().remove_key(key);
                }
                Retired::Attribute(attr) => {
                    self.schema_mut().remove_attribute(attr);
                }
                Retired::Class(class) => {
                    self.schema_mut().remove_class(class);
                }
            }
        }
    }

    /// Flush buffered writes and return the remaining effects.
    pub fn commit(self) -> EngineResult<Outcome> {
        let writes = self.store.commit()?;
        let schema = match self.schema {
            Cow::Owned(schema) => Some(schema),
            Cow::Borrowed(_) => None,
        };
        let index_ops = self.index.into_ops();
        debug!(writes, index_ops = index_ops.len(), "session committed");
        Ok(Outcome {
            schema,
            index_ops,
            events: self.events,
        })
    }
}
