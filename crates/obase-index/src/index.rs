//! Committed uniqueness indexes.
//!
//! A [`UniqueIndex`] maps each key tuple to the single rank holding it. The
//! [`IndexSet`] owns one index per key and is only changed by applying
//! [`IndexOp`]s produced by a successful operation.

use std::collections::{BTreeMap, HashMap};

use obase_types::{KeyId, Rank};
use tracing::{debug, warn};

use crate::entry::KeyTuple;
use crate::error::{IndexError, IndexResult};

/// The tuple-to-rank map of one uniqueness key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueIndex {
    key: KeyId,
    entries: BTreeMap<KeyTuple, Rank>,
}

impl UniqueIndex {
    pub fn new(key: KeyId) -> Self {
        Self {
            key,
            entries: BTreeMap::new(),
        }
    }

    /// Build an index from existing `(tuple, rank)` pairs. Fails on the
    /// first tuple held by two different ranks.
    pub fn rebuild<I>(key: KeyId, pairs: I) -> IndexResult<Self>
    where
        I: IntoIterator<Item = (KeyTuple, Rank)>,
    {
        let mut index = Self::new(key);
        for (tuple, rank) in pairs {
            index.insert(tuple, rank)?;
        }
        debug!(%key, entries = index.len(), "index rebuilt");
        Ok(index)
    }

    pub fn key(&self) -> KeyId {
        self.key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, tuple: &KeyTuple) -> Option<Rank> {
        self.entries.get(tuple).copied()
    }

    /// Map `tuple` to `rank`. Re-inserting a rank's own tuple is a no-op.
    pub fn insert(&mut self, tuple: KeyTuple, rank: Rank) -> IndexResult<()> {
        match self.entries.get(&tuple) {
            Some(existing) if *existing != rank => Err(IndexError::Duplicate {
                key: self.key,
                tuple: tuple.to_string(),
                existing: *existing,
            }),
            _ => {
                self.entries.insert(tuple, rank);
                Ok(())
            }
        }
    }

    /// Remove `tuple` if it is held by `rank`. Returns whether it was.
    pub fn remove(&mut self, tuple: &KeyTuple, rank: Rank) -> bool {
        if self.entries.get(tuple) == Some(&rank) {
            self.entries.remove(tuple);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyTuple, &Rank)> {
        self.entries.iter()
    }
}

/// One pending change to an [`IndexSet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexOp {
    Insert { key: KeyId, tuple: KeyTuple, rank: Rank },
    Remove { key: KeyId, tuple: KeyTuple, rank: Rank },
    /// Add (or replace) a whole index.
    Install(UniqueIndex),
    /// Discard a whole index.
    Drop(KeyId),
}

/// Every uniqueness index of a database.
#[derive(Clone, Debug, Default)]
pub struct IndexSet {
    indexes: HashMap<KeyId, UniqueIndex>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn get(&self, key: KeyId) -> Option<&UniqueIndex> {
        self.indexes.get(&key)
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.indexes.contains_key(&key)
    }

    pub fn lookup(&self, key: KeyId, tuple: &KeyTuple) -> Option<Rank> {
        self.indexes.get(&key).and_then(|index| index.lookup(tuple))
    }

    pub fn install(&mut self, index: UniqueIndex) {
        self.indexes.insert(index.key(), index);
    }

    pub fn drop_index(&mut self, key: KeyId) -> Option<UniqueIndex> {
        self.indexes.remove(&key)
    }

    /// Apply the ops of a committed operation, in order.
    ///
    /// Ops were checked when staged, so a conflicting insert here means the
    /// staged view and this set disagree; the later op wins and a warning
    /// is logged.
    pub fn apply(&mut self, ops: Vec<IndexOp>) {
        for op in ops {
            match op {
                IndexOp::Insert { key, tuple, rank } => {
                    let Some(index) = self.indexes.get_mut(&key) else {
                        warn!(%key, "insert into missing index skipped");
                        continue;
                    };
                    if let Some(existing) = index.lookup(&tuple) {
                        if existing != rank {
                            warn!(%key, %tuple, %existing, %rank, "index entry overwritten");
                            index.remove(&tuple, existing);
                        }
                    }
                    let _ = index.insert(tuple, rank);
                }
                IndexOp::Remove { key, tuple, rank } => {
                    if let Some(index) = self.indexes.get_mut(&key) {
                        index.remove(&tuple, rank);
                    }
                }
                IndexOp::Install(index) => self.install(index),
                IndexOp::Drop(key) => {
                    self.drop_index(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obase_types::Scalar;

    fn key(n: u64) -> KeyId {
        KeyId::new(Rank::new(n))
    }

    fn tuple(s: &str) -> KeyTuple {
        KeyTuple::new(vec![Scalar::Str(s.to_string())])
    }

    #[test]
    fn insert_rejects_other_rank() {
        let mut index = UniqueIndex::new(key(1));
        index.insert(tuple("Ann"), Rank::new(10)).unwrap();
        index.insert(tuple("Ann"), Rank::new(10)).unwrap();
        let err = index.insert(tuple("Ann"), Rank::new(11)).unwrap_err();
        assert_eq!(
            err,
            IndexError::Duplicate {
                key: key(1),
                tuple: "(\"Ann\")".into(),
                existing: Rank::new(10),
            }
        );
    }

    #[test]
    fn remove_only_own_entry() {
        let mut index = UniqueIndex::new(key(1));
        index.insert(tuple("Ann"), Rank::new(10)).unwrap();
        assert!(!index.remove(&tuple("Ann"), Rank::new(11)));
        assert!(index.remove(&tuple("Ann"), Rank::new(10)));
        assert!(index.is_empty());
    }

    #[test]
    fn rebuild_detects_existing_duplicates() {
        let ok = UniqueIndex::rebuild(
            key(2),
            vec![(tuple("a"), Rank::new(1)), (tuple("b"), Rank::new(2))],
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(UniqueIndex::rebuild(
            key(2),
            vec![(tuple("a"), Rank::new(1)), (tuple("a"), Rank::new(2))],
        )
        .is_err());
    }

    #[test]
    fn apply_runs_ops_in_order() {
        let mut set = IndexSet::new();
        set.apply(vec![
            IndexOp::Install(UniqueIndex::new(key(3))),
            IndexOp::Insert { key: key(3), tuple: tuple("x"), rank: Rank::new(5) },
            IndexOp::Remove { key: key(3), tuple: tuple("x"), rank: Rank::new(5) },
            IndexOp::Insert { key: key(3), tuple: tuple("x"), rank: Rank::new(6) },
        ]);
        assert_eq!(set.lookup(key(3), &tuple("x")), Some(Rank::new(6)));
        set.apply(vec![IndexOp::Drop(key(3))]);
        assert!(!set.contains(key(3)));
        assert_eq!(set.lookup(key(3), &tuple("x")), None);
    }
}
