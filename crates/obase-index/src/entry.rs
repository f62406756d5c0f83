//! Key tuples.

use std::fmt;

use serde::{Deserialize, Serialize};

use obase_types::{Scalar, StoredValue};

/// The scalarized values of a key's attributes, in key order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyTuple(Vec<Scalar>);

impl KeyTuple {
    pub fn new(components: Vec<Scalar>) -> Self {
        Self(components)
    }

    /// Build a tuple from stored slot values. Returns `None` when any
    /// component is NULL: such records are not indexed.
    pub fn from_slots<'a, I>(slots: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<&'a StoredValue>>,
    {
        slots
            .into_iter()
            .map(|slot| slot.map(Scalar::from))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    pub fn components(&self) -> &[Scalar] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}
