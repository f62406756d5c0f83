use std::collections::BTreeSet;

use obase_types::{Rank, StoreId, StoredValue};

use crate::error::StoreResult;

/// One buffered slot write. `value: None` removes the slot.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotWrite {
    pub store: StoreId,
    pub rank: Rank,
    pub value: Option<StoredValue>,
}

/// Keyed value storage consumed by the engine.
///
/// All implementations must satisfy these invariants:
/// - A slot written with `Some(v)` reads back `Some(v)` until overwritten.
/// - A slot written with `None` reads back `None` and is no longer listed by
///   [`ranks`](SlotStore::ranks) or [`find`](SlotStore::find).
/// - [`write_batch`](SlotStore::write_batch) is the atomic commit boundary:
///   backends that can fail part-way must apply all writes or none.
pub trait SlotStore: Send + Sync {
    /// Read one slot. Returns `Ok(None)` if it is absent.
    fn get(&self, store: StoreId, rank: Rank) -> StoreResult<Option<StoredValue>>;

    /// Write one slot; `None` removes it.
    fn put(&self, store: StoreId, rank: Rank, value: Option<StoredValue>) -> StoreResult<()>;

    /// Ranks whose slot in `store` equals `needle` or is a sequence holding it.
    fn find(&self, store: StoreId, needle: &StoredValue) -> StoreResult<BTreeSet<Rank>>;

    /// Every rank with a present slot in `store`.
    fn ranks(&self, store: StoreId) -> StoreResult<BTreeSet<Rank>>;

    /// Apply several writes as one unit.
    ///
    /// Default implementation calls `put()` for each write. Backends may
    /// override to make the batch atomic or cheaper.
    fn write_batch(&self, writes: &[SlotWrite]) -> StoreResult<()> {
        for write in writes {
            self.put(write.store, write.rank, write.value.clone())?;
        }
        Ok(())
    }
}
