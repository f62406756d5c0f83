use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rank::Rank;
use crate::value::StoredValue;

/// An `f64` with a total order (IEEE 754 `totalOrder`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TotalF64(pub f64);

impl PartialEq for TotalF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF64 {}

impl PartialOrd for TotalF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for TotalF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// A stored value reduced to a totally ordered, hashable form.
///
/// Scalars are the components of uniqueness-index tuples and the unit of
/// bounds comparison. Object references are already reduced to their rank.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    Real(TotalF64),
    Time(DateTime<Utc>),
    Str(String),
    Rank(Rank),
    List(Vec<Scalar>),
}

impl From<&StoredValue> for Scalar {
    fn from(value: &StoredValue) -> Self {
        match value {
            StoredValue::Int(v) => Scalar::Int(*v),
            StoredValue::Real(v) => Scalar::Real(TotalF64(*v)),
            StoredValue::Time(v) => Scalar::Time(*v),
            StoredValue::Str(v) => Scalar::Str(v.clone()),
            StoredValue::Rank(r) => Scalar::Rank(*r),
            StoredValue::List(items) => Scalar::List(items.iter().map(Scalar::from).collect()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Real(v) => write!(f, "{}", v.0),
            Scalar::Time(v) => write!(f, "{}", v.to_rfc3339()),
            Scalar::Str(v) => write!(f, "{v:?}"),
            Scalar::Rank(r) => write!(f, "#{r}"),
            Scalar::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
