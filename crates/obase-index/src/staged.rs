//! Pending index changes.
//!
//! A [`StagedIndex`] records the index changes of one in-flight operation
//! over a read-only [`IndexSet`]. Lookups see the base set with every
//! staged op replayed on top, so later checks in the same operation observe
//! earlier writes. Dropping the stage discards everything.

use obase_types::{KeyId, Rank};

use crate::entry::KeyTuple;
use crate::error::{IndexError, IndexResult};
use crate::index::{IndexOp, IndexSet, UniqueIndex};

pub struct StagedIndex<'a> {
    base: &'a IndexSet,
    ops: Vec<IndexOp>,
}

impl<'a> StagedIndex<'a> {
    pub fn new(base: &'a IndexSet) -> Self {
        Self {
            base,
            ops: Vec::new(),
        }
    }

    /// Returns `true` if an index for `key` exists in the staged view.
    #[cfg(test)]
    pub(crate) fn has_index(&self, key: KeyId) -> bool {
        let mut present = self.base.contains(key);
        for op in &self.ops {
            match op {
                IndexOp::Install(index) if index.key() == key => present = true,
                IndexOp::Drop(k) if *k == key => present = false,
                _ => {}
            }
        }
        present
    }

    /// The rank holding `tuple` under `key` in the staged view.
    pub fn lookup(&self, key: KeyId, tuple: &KeyTuple) -> Option<Rank> {
        let mut holder = self.base.lookup(key, tuple);
        for op in &self.ops {
            match op {
                IndexOp::Insert { key: k, tuple: t, rank } if *k == key && t == tuple => {
                    holder = Some(*rank);
                }
                IndexOp::Remove { key: k, tuple: t, rank } if *k == key && t == tuple => {
                    if holder == Some(*rank) {
                        holder = None;
                    }
                }
                IndexOp::Install(index) if index.key() == key => holder = index.lookup(tuple),
                IndexOp::Drop(k) if *k == key => holder = None,
                _ => {}
            }
        }
        holder
    }

    /// Returns `true` if `rank` may hold `tuple` under `key`.
    #[cfg(test)]
    pub(crate) fn admits(&self, key: KeyId, tuple: &KeyTuple, rank: Rank) -> bool {
        self.lookup(key, tuple).map_or(true, |holder| holder == rank)
    }

    /// Stage `tuple -> rank`, failing if another rank holds the tuple.
    pub fn insert(&mut self, key: KeyId, tuple: KeyTuple, rank: Rank) -> IndexResult<()> {
        if let Some(existing) = self.lookup(key, &tuple) {
            if existing != rank {
                return Err(IndexError::Duplicate {
                    key,
                    tuple: tuple.to_string(),
                    existing,
                });
            }
        }
        self.ops.push(IndexOp::Insert { key, tuple, rank });
        Ok(())
    }

    /// Stage removal of `tuple` if it is held by `rank`.
    pub fn remove(&mut self, key: KeyId, tuple: KeyTuple, rank: Rank) {
        self.ops.push(IndexOp::Remove { key, tuple, rank });
    }

    pub fn install(&mut self, index: UniqueIndex) {
        self.ops.push(IndexOp::Install(index));
    }

    pub fn drop_index(&mut self, key: KeyId) {
        self.ops.push(IndexOp::Drop(key));
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.ops.len()
    }

    /// The staged ops, ready for [`IndexSet::apply`].
    pub fn into_ops(self) -> Vec<IndexOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obase_types::Scalar;
    use proptest::prelude::*;

    fn key(n: u64) -> KeyId {
        KeyId::new(Rank::new(n))
    }

    fn tuple(n: i64) -> KeyTuple {
        KeyTuple::new(vec![Scalar::Int(n)])
    }

    fn base() -> IndexSet {
        let mut set = IndexSet::new();
        let index = UniqueIndex::rebuild(key(1), vec![(tuple(1), Rank::new(100))]).unwrap();
        set.install(index);
        set
    }

    #[test]
    fn staged_writes_are_visible_but_base_untouched() {
        let set = base();
        let mut stage = StagedIndex::new(&set);
        stage.insert(key(1), tuple(2), Rank::new(200)).unwrap();
        assert_eq!(stage.lookup(key(1), &tuple(2)), Some(Rank::new(200)));
        assert!(stage.insert(key(1), tuple(2), Rank::new(201)).is_err());
        assert_eq!(set.lookup(key(1), &tuple(2)), None);
    }

    #[test]
    fn remove_then_reinsert_by_other_rank() {
        let set = base();
        let mut stage = StagedIndex::new(&set);
        assert!(!stage.admits(key(1), &tuple(1), Rank::new(101)));
        stage.remove(key(1), tuple(1), Rank::new(100));
        stage.insert(key(1), tuple(1), Rank::new(101)).unwrap();
        let ops = stage.into_ops();

        let mut set = set;
        set.apply(ops);
        assert_eq!(set.lookup(key(1), &tuple(1)), Some(Rank::new(101)));
    }

    #[test]
    fn dropped_index_admits_anything() {
        let set = base();
        let mut stage = StagedIndex::new(&set);
        stage.drop_index(key(1));
        assert!(!stage.has_index(key(1)));
        assert!(stage.admits(key(1), &tuple(1), Rank::new(7)));
    }

    proptest! {
        /// Applying staged ops yields exactly what the staged view showed.
        #[test]
        fn applied_matches_staged_view(
            ops in proptest::collection::vec((0i64..4, 0u64..4, any::<bool>()), 0..40)
        ) {
            let set = base();
            let mut stage = StagedIndex::new(&set);
            for (t, r, insert) in ops {
                let rank = Rank::new(100 + r);
                if insert {
                    let _ = stage.insert(key(1), tuple(t), rank);
                } else {
                    stage.remove(key(1), tuple(t), rank);
                }
            }
            let view: Vec<Option<Rank>> = (0..4).map(|t| stage.lookup(key(1), &tuple(t))).collect();
            let mut applied = set.clone();
            applied.apply(stage.into_ops());
            let after: Vec<Option<Rank>> = (0..4).map(|t| applied.lookup(key(1), &tuple(t))).collect();
            prop_assert_eq!(view, after);
        }
    }
}
