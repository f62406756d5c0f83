//! Reference-count auditing.
//!
//! Recounts every stored reference and compares the totals with the
//! counters kept in state slots. Any difference, including a reference to a
//! record that no longer exists in the range class, is a drift.

use std::fmt;

use obase_schema::Schema;
use obase_store::SlotStore;
use obase_types::{ClassId, Rank, StoreId};

use crate::error::EngineResult;

/// A counter that disagrees with the references actually stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceDrift {
    pub class: ClassId,
    pub rank: Rank,
    /// The stored counter; `None` if the segment is absent.
    pub stored: Option<i64>,
    pub counted: u64,
}

impl fmt::Display for ReferenceDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stored {
            Some(stored) => write!(
                f,
                "{} in {}: counter {stored}, {} references",
                self.rank, self.class, self.counted
            ),
            None => write!(
                f,
                "{} in {}: absent but referenced {} times",
                self.rank, self.class, self.counted
            ),
        }
    }
}

pub(crate) fn audit(schema: &Schema, store: &dyn SlotStore) -> EngineResult<Vec<ReferenceDrift>> {
    let mut counted = schema.tally_references(store)?;
    let mut drift = Vec::new();

    for class in schema.classes() {
        let Some(state) = class.state_attribute() else {
            continue;
        };
        for rank in store.ranks(StoreId::from(state))? {
            let stored = schema.state_of(store, rank, class.id)?;
            let references = counted.remove(&(class.id, rank)).unwrap_or(0);
            if stored != Some(references as i64) {
                drift.push(ReferenceDrift {
                    class: class.id,
                    rank,
                    stored,
                    counted: references,
                });
            }
        }
    }

    for ((class, rank), references) in counted {
        drift.push(ReferenceDrift {
            class,
            rank,
            stored: None,
            counted: references,
        });
    }
    Ok(drift)
}
