//! Buffered writes over another [`SlotStore`].
//!
//! A [`Transaction`] answers reads from its own buffer first and from the
//! base store otherwise, so code running inside it sees its own writes.
//! Nothing reaches the base store until [`Transaction::commit`]; dropping
//! the transaction discards the buffer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use obase_types::{Rank, StoreId, StoredValue};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{SlotStore, SlotWrite};

type Pending = BTreeMap<(StoreId, Rank), Option<StoredValue>>;

/// A write buffer layered over a base store.
pub struct Transaction<'s> {
    base: &'s dyn SlotStore,
    pending: RwLock<Pending>,
}

impl<'s> Transaction<'s> {
    /// Begin buffering writes over `base`.
    pub fn new(base: &'s dyn SlotStore) -> Self {
        Self {
            base,
            pending: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of buffered slot writes.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> StoreResult<usize> {
        Ok(self.read_pending()?.len())
    }

    /// Flush every buffered write to the base store as one batch.
    ///
    /// Returns the number of slots written.
    pub fn commit(self) -> StoreResult<usize> {
        let pending = self
            .pending
            .into_inner()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let writes: Vec<SlotWrite> = pending
            .into_iter()
            .map(|((store, rank), value)| SlotWrite { store, rank, value })
            .collect();
        self.base.write_batch(&writes)?;
        debug!(writes = writes.len(), "transaction committed");
        Ok(writes.len())
    }

    /// Discard every buffered write. Returns how many were dropped.
    #[cfg(test)]
    pub(crate) fn rollback(self) -> usize {
        let dropped = self.pending.read().map(|p| p.len()).unwrap_or(0);
        debug!(dropped, "transaction rolled back");
        dropped
    }

    fn read_pending(&self) -> StoreResult<RwLockReadGuard<'_, Pending>> {
        self.pending
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_pending(&self) -> StoreResult<RwLockWriteGuard<'_, Pending>> {
        self.pending
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

fn store_range(
    pending: &Pending,
    store: StoreId,
) -> impl Iterator<Item = (Rank, &Option<StoredValue>)> {
    pending
        .range((store, Rank::new(0))..=(store, Rank::NULL))
        .map(|((_, rank), value)| (*rank, value))
}

impl SlotStore for Transaction<'_> {
    fn get(&self, store: StoreId, rank: Rank) -> StoreResult<Option<StoredValue>> {
        if let Some(value) = self.read_pending()?.get(&(store, rank)) {
            return Ok(value.clone());
        }
        self.base.get(store, rank)
    }

    fn put(&self, store: StoreId, rank: Rank, value: Option<StoredValue>) -> StoreResult<()> {
        self.write_pending()?.insert((store, rank), value);
        Ok(())
    }

    fn find(&self, store: StoreId, needle: &StoredValue) -> StoreResult<BTreeSet<Rank>> {
        let mut found = self.base.find(store, needle)?;
        let pending = self.read_pending()?;
        for (rank, value) in store_range(&pending, store) {
            match value {
                Some(value) if value.contains(needle) => {
                    found.insert(rank);
                }
                _ => {
                    found.remove(&rank);
                }
            }
        }
        Ok(found)
    }

    fn ranks(&self, store: StoreId) -> StoreResult<BTreeSet<Rank>> {
        let mut ranks = self.base.ranks(store)?;
        let pending = self.read_pending()?;
        for (rank, value) in store_range(&pending, store) {
            if value.is_some() {
                ranks.insert(rank);
            } else {
                ranks.remove(&rank);
            }
        }
        Ok(ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySlotStore;

    fn sid(n: u64) -> StoreId {
        StoreId::new(n)
    }

    fn r(n: u64) -> Rank {
        Rank::new(n)
    }

    #[test]
    fn reads_see_buffered_writes() {
        let base = InMemorySlotStore::new();
        base.put(sid(1), r(1), Some(StoredValue::Int(1))).unwrap();

        let txn = Transaction::new(&base);
        txn.put(sid(1), r(1), Some(StoredValue::Int(2))).unwrap();
        txn.put(sid(1), r(2), Some(StoredValue::Int(3))).unwrap();

        assert_eq!(txn.get(sid(1), r(1)).unwrap(), Some(StoredValue::Int(2)));
        assert_eq!(txn.get(sid(1), r(2)).unwrap(), Some(StoredValue::Int(3)));
        // Base untouched until commit.
        assert_eq!(base.get(sid(1), r(1)).unwrap(), Some(StoredValue::Int(1)));
        assert_eq!(base.get(sid(1), r(2)).unwrap(), None);
    }

    #[test]
    fn commit_flushes_everything() {
        let base = InMemorySlotStore::new();
        base.put(sid(1), r(1), Some(StoredValue::Int(1))).unwrap();

        let txn = Transaction::new(&base);
        txn.put(sid(1), r(1), None).unwrap();
        txn.put(sid(2), r(5), Some(StoredValue::Str("x".into()))).unwrap();
        assert_eq!(txn.pending_len().unwrap(), 2);
        assert_eq!(txn.commit().unwrap(), 2);

        assert_eq!(base.get(sid(1), r(1)).unwrap(), None);
        assert_eq!(base.get(sid(2), r(5)).unwrap(), Some(StoredValue::Str("x".into())));
    }

    #[test]
    fn rollback_discards() {
        let base = InMemorySlotStore::new();
        let txn = Transaction::new(&base);
        txn.put(sid(1), r(1), Some(StoredValue::Int(1))).unwrap();
        assert_eq!(txn.rollback(), 1);
        assert!(base.is_empty().unwrap());
    }

    #[test]
    fn find_and_ranks_merge_buffer_with_base() {
        let base = InMemorySlotStore::new();
        let target = StoredValue::Rank(r(9));
        base.put(sid(1), r(1), Some(target.clone())).unwrap();
        base.put(sid(1), r(2), Some(target.clone())).unwrap();

        let txn = Transaction::new(&base);
        txn.put(sid(1), r(1), None).unwrap();
        txn.put(sid(1), r(2), Some(StoredValue::Rank(r(8)))).unwrap();
        txn.put(sid(1), r(3), Some(StoredValue::List(vec![target.clone()])))
            .unwrap();

        let found: Vec<_> = txn.find(sid(1), &target).unwrap().into_iter().collect();
        assert_eq!(found, vec![r(3)]);
        let ranks: Vec<_> = txn.ranks(sid(1)).unwrap().into_iter().collect();
        assert_eq!(ranks, vec![r(2), r(3)]);
    }

    #[test]
    fn nested_transactions_commit_into_parent() {
        let base = InMemorySlotStore::new();
        let outer = Transaction::new(&base);
        {
            let inner = Transaction::new(&outer);
            inner.put(sid(1), r(1), Some(StoredValue::Int(7))).unwrap();
            inner.commit().unwrap();
        }
        assert_eq!(outer.get(sid(1), r(1)).unwrap(), Some(StoredValue::Int(7)));
        assert!(base.is_empty().unwrap());
        outer.commit().unwrap();
        assert_eq!(base.get(sid(1), r(1)).unwrap(), Some(StoredValue::Int(7)));
    }
}
