use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use obase_types::{Rank, StoreId, StoredValue};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{SlotStore, SlotWrite};

type Slots = HashMap<StoreId, BTreeMap<Rank, StoredValue>>;

/// In-memory, HashMap-based slot store.
///
/// Intended for tests and embedding. All slots are held in memory behind a
/// `RwLock`; batches are applied under a single write lock, so a batch is
/// never observed half-applied.
pub struct InMemorySlotStore {
    slots: RwLock<Slots>,
}

impl InMemorySlotStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild a store from bytes produced by [`snapshot`](Self::snapshot).
    pub fn restore(bytes: &[u8]) -> StoreResult<Self> {
        let slots: Slots =
            bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        debug!(maps = slots.len(), "slot store restored");
        Ok(Self {
            slots: RwLock::new(slots),
        })
    }

    /// Serialize every slot into a single byte buffer.
    pub fn snapshot(&self) -> StoreResult<Vec<u8>> {
        let slots = self.read_slots()?;
        bincode::serialize(&*slots).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Total number of present slots across all maps.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_slots()?.values().map(BTreeMap::len).sum())
    }

    /// Returns `true` if no slot is present.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every slot.
    pub fn clear(&self) -> StoreResult<()> {
        self.write_slots()?.clear();
        Ok(())
    }

    fn read_slots(&self) -> StoreResult<RwLockReadGuard<'_, Slots>> {
        self.slots
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_slots(&self) -> StoreResult<RwLockWriteGuard<'_, Slots>> {
        self.slots
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

fn apply(slots: &mut Slots, store: StoreId, rank: Rank, value: Option<StoredValue>) {
    match value {
        Some(value) => {
            slots.entry(store).or_default().insert(rank, value);
        }
        None => {
            if let Some(map) = slots.get_mut(&store) {
                map.remove(&rank);
                if map.is_empty() {
                    slots.remove(&store);
                }
            }
        }
    }
}

impl Default for InMemorySlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotStore for InMemorySlotStore {
    fn get(&self, store: StoreId, rank: Rank) -> StoreResult<Option<StoredValue>> {
        let slots = self.read_slots()?;
        Ok(slots.get(&store).and_then(|map| map.get(&rank)).cloned())
    }

    fn put(&self, store: StoreId, rank: Rank, value: Option<StoredValue>) -> StoreResult<()> {
        let mut slots = self.write_slots()?;
        apply(&mut slots, store, rank, value);
        Ok(())
    }

    fn find(&self, store: StoreId, needle: &StoredValue) -> StoreResult<BTreeSet<Rank>> {
        let slots = self.read_slots()?;
        Ok(slots
            .get(&store)
            .map(|map| {
                map.iter()
                    .filter(|(_, value)| value.contains(needle))
                    .map(|(rank, _)| *rank)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn ranks(&self, store: StoreId) -> StoreResult<BTreeSet<Rank>> {
        let slots = self.read_slots()?;
        Ok(slots
            .get(&store)
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default())
    }

    fn write_batch(&self, writes: &[SlotWrite]) -> StoreResult<()> {
        let mut slots = self.write_slots()?;
        for write in writes {
            apply(&mut slots, write.store, write.rank, write.value.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemorySlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or(0);
        f.debug_struct("InMemorySlotStore")
            .field("slot_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u64) -> StoreId {
        StoreId::new(n)
    }

    fn r(n: u64) -> Rank {
        Rank::new(n)
    }

    // -----------------------------------------------------------------------
    // Core get / put
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = InMemorySlotStore::new();
        store.put(sid(1), r(10), Some(StoredValue::Int(5))).unwrap();
        assert_eq!(store.get(sid(1), r(10)).unwrap(), Some(StoredValue::Int(5)));
        assert_eq!(store.get(sid(1), r(11)).unwrap(), None);
        assert_eq!(store.get(sid(2), r(10)).unwrap(), None);
    }

    #[test]
    fn put_none_removes_slot() {
        let store = InMemorySlotStore::new();
        store.put(sid(1), r(10), Some(StoredValue::Int(5))).unwrap();
        store.put(sid(1), r(10), None).unwrap();
        assert_eq!(store.get(sid(1), r(10)).unwrap(), None);
        assert!(store.is_empty().unwrap());
        assert!(store.ranks(sid(1)).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Value lookup
    // -----------------------------------------------------------------------

    #[test]
    fn find_matches_scalars_and_sequence_members() {
        let store = InMemorySlotStore::new();
        let target = StoredValue::Rank(r(7));
        store.put(sid(3), r(1), Some(target.clone())).unwrap();
        store
            .put(
                sid(3),
                r(2),
                Some(StoredValue::List(vec![StoredValue::Rank(r(6)), target.clone()])),
            )
            .unwrap();
        store.put(sid(3), r(3), Some(StoredValue::Rank(r(8)))).unwrap();

        let found = store.find(sid(3), &target).unwrap();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![r(1), r(2)]);
        assert!(store.find(sid(4), &target).unwrap().is_empty());
    }

    #[test]
    fn ranks_are_sorted() {
        let store = InMemorySlotStore::new();
        for n in [9, 2, 5] {
            store.put(sid(1), r(n), Some(StoredValue::Int(0))).unwrap();
        }
        let ranks: Vec<_> = store.ranks(sid(1)).unwrap().into_iter().collect();
        assert_eq!(ranks, vec![r(2), r(5), r(9)]);
    }

    // -----------------------------------------------------------------------
    // Batches and snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn write_batch_applies_in_order() {
        let store = InMemorySlotStore::new();
        store
            .write_batch(&[
                SlotWrite { store: sid(1), rank: r(1), value: Some(StoredValue::Int(1)) },
                SlotWrite { store: sid(1), rank: r(1), value: Some(StoredValue::Int(2)) },
                SlotWrite { store: sid(1), rank: r(2), value: Some(StoredValue::Int(3)) },
                SlotWrite { store: sid(1), rank: r(2), value: None },
            ])
            .unwrap();
        assert_eq!(store.get(sid(1), r(1)).unwrap(), Some(StoredValue::Int(2)));
        assert_eq!(store.get(sid(1), r(2)).unwrap(), None);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn snapshot_and_restore() {
        let store = InMemorySlotStore::new();
        let when = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store.put(sid(1), r(1), Some(StoredValue::Str("Ann".into()))).unwrap();
        store.put(sid(2), r(1), Some(StoredValue::Time(when))).unwrap();
        store
            .put(sid(3), r(4), Some(StoredValue::List(vec![StoredValue::Rank(r(1))])))
            .unwrap();

        let bytes = store.snapshot().unwrap();
        let restored = InMemorySlotStore::restore(&bytes).unwrap();
        assert_eq!(restored.len().unwrap(), 3);
        assert_eq!(
            restored.get(sid(1), r(1)).unwrap(),
            Some(StoredValue::Str("Ann".into()))
        );
        assert_eq!(restored.get(sid(2), r(1)).unwrap(), Some(StoredValue::Time(when)));
    }

    #[test]
    fn restore_rejects_garbage() {
        let err = InMemorySlotStore::restore(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn clear_removes_all() {
        let store = InMemorySlotStore::default();
        store.put(sid(1), r(1), Some(StoredValue::Int(1))).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn debug_format() {
        let store = InMemorySlotStore::new();
        store.put(sid(1), r(1), Some(StoredValue::Int(1))).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemorySlotStore"));
        assert!(debug.contains("slot_count"));
    }
}
