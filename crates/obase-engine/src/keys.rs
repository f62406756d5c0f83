//! Uniqueness checks and index maintenance for one write.
//!
//! Every write touching key attributes is planned first: for each affected
//! key the record's tuple before and after the write is computed and the
//! new tuple checked against the staged index. Plans are applied only after
//! the slots have been written.

use obase_index::{KeyTuple, UniqueIndex};
use obase_schema::KeyDef;
use obase_store::SlotStore;
use obase_types::{ClassId, KeyId, Rank, StoreId};

use crate::error::{EngineError, EngineResult};
use crate::session::{Changes, Session};

#[derive(Clone, Debug)]
pub(crate) struct KeyPlan {
    key: KeyId,
    old: Option<KeyTuple>,
    new: Option<KeyTuple>,
}

impl Session<'_> {
    /// The key tuple of `rank`, reading `changes` in preference to the store.
    fn key_tuple(&self, key: &KeyDef, rank: Rank, changes: &Changes) -> EngineResult<Option<KeyTuple>> {
        let mut slots = Vec::with_capacity(key.attributes.len());
        for attr in &key.attributes {
            let slot = match changes.get(attr) {
                Some(change) => change.clone(),
                None => self.read(*attr, rank)?,
            };
            slots.push(slot);
        }
        Ok(KeyTuple::from_slots(slots.iter().map(Option::as_ref)))
    }

    /// Plan `keys` for a write of `changes` to `rank`. The record must exist
    /// in each key's class once the write is done.
    pub fn plan_keys(&self, rank: Rank, keys: &[KeyId], changes: &Changes) -> EngineResult<Vec<KeyPlan>> {
        let unchanged = Changes::new();
        let mut plans = Vec::with_capacity(keys.len());
        for id in keys {
            let key = self.schema.key(*id)?;
            let old = if self.exists_in(rank, key.of_class)? {
                self.key_tuple(key, rank, &unchanged)?
            } else {
                None
            };
            let new = self.key_tuple(key, rank, changes)?;
            if let Some(tuple) = &new {
                if new != old {
                    if let Some(existing) = self.index.lookup(*id, tuple) {
                        if existing != rank {
                            return Err(self.duplicate(key, tuple, existing));
                        }
                    }
                }
            }
            plans.push(KeyPlan { key: *id, old, new });
        }
        Ok(plans)
    }

    /// Keys among `keys` whose class currently holds `rank`.
    pub fn live_keys(&self, rank: Rank, keys: Vec<KeyId>) -> EngineResult<Vec<KeyId>> {
        let mut live = Vec::with_capacity(keys.len());
        for id in keys {
            if self.exists_in(rank, self.schema.key(id)?.of_class)? {
                live.push(id);
            }
        }
        Ok(live)
    }

    pub fn apply_keys(&mut self, rank: Rank, plans: Vec<KeyPlan>) -> EngineResult<()> {
        for plan in plans {
            if plan.old == plan.new {
                continue;
            }
            if let Some(old) = plan.old {
                self.index.remove(plan.key, old, rank);
            }
            if let Some(new) = plan.new {
                self.index.insert(plan.key, new, rank)?;
            }
        }
        Ok(())
    }

    /// Stage removal of `rank`'s entries for the keys declared on `class`.
    pub fn unindex(&mut self, rank: Rank, class: ClassId) -> EngineResult<()> {
        let unchanged = Changes::new();
        for id in self.schema.keys_of_class(class) {
            let key = self.schema.key(id)?;
            if let Some(tuple) = self.key_tuple(key, rank, &unchanged)? {
                self.index.remove(id, tuple, rank);
            }
        }
        Ok(())
    }

    /// Index every live instance of the key's class, failing on values
    /// already shared by two records.
    pub fn build_index(&self, key: KeyId) -> EngineResult<UniqueIndex> {
        let def = self.schema.key(key)?;
        let state = self.schema.state_attribute(def.of_class)?;
        let unchanged = Changes::new();
        let mut pairs = Vec::new();
        for rank in self.store.ranks(StoreId::from(state))? {
            if let Some(tuple) = self.key_tuple(def, rank, &unchanged)? {
                pairs.push((tuple, rank));
            }
        }
        UniqueIndex::rebuild(key, pairs).map_err(|err| match err {
            obase_index::IndexError::Duplicate { tuple, existing, .. } => EngineError::DuplicateKey {
                key: self.key_label(def),
                class: self.schema.class_name(def.of_class),
                values: tuple,
                existing,
            },
        })
    }

    pub fn key_label(&self, key: &KeyDef) -> String {
        let names: Vec<String> = key
            .attributes
            .iter()
            .map(|a| {
                self.schema
                    .attribute(*a)
                    .map_or_else(|_| a.to_string(), |d| d.name.clone())
            })
            .collect();
        format!("key({})", names.join(", "))
    }

    fn duplicate(&self, key: &KeyDef, tuple: &KeyTuple, existing: Rank) -> EngineError {
        EngineError::DuplicateKey {
            key: self.key_label(key),
            class: self.schema.class_name(key.of_class),
            values: tuple.to_string(),
            existing,
        }
    }
}
