use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable integer identity of a record.
///
/// Ranks are allocated from a single monotonically increasing sequence and
/// are never reused. The maximum value is reserved as the NULL mark, so a
/// NULL rank sorts after every real one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(u64);

impl Rank {
    /// The NULL mark.
    pub const NULL: Rank = Rank(u64::MAX);

    /// The first rank handed out by a fresh sequence.
    pub const FIRST: Rank = Rank(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// The rank following this one in the sequence.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Rank(NULL)")
        } else {
            write!(f, "Rank({})", self.0)
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NULL")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for Rank {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

macro_rules! rank_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Rank);

        impl $name {
            pub const fn new(rank: Rank) -> Self {
                Self(rank)
            }

            /// The rank of the schema object this id names.
            pub const fn rank(self) -> Rank {
                self.0
            }
        }

        impl From<Rank> for $name {
            fn from(rank: Rank) -> Self {
                Self(rank)
            }
        }

        impl From<$name> for Rank {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

rank_id!(
    /// Identity of a class. Classes are records of the `Class` meta-class.
    ClassId,
    "class"
);

rank_id!(
    /// Identity of an attribute. Attributes are records of the `Attribute`
    /// meta-class; each attribute owns one backing-store map.
    AttrId,
    "attr"
);

rank_id!(
    /// Identity of a uniqueness key. Keys are records of the `Key` meta-class.
    KeyId,
    "key"
);

/// Identifier of one durable map in the backing store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(u64);

impl StoreId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<AttrId> for StoreId {
    fn from(attr: AttrId) -> Self {
        Self(attr.rank().get())
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_rank_sorts_last() {
        assert!(Rank::new(0) < Rank::NULL);
        assert!(Rank::new(u64::MAX - 1) < Rank::NULL);
        assert!(Rank::NULL.is_null());
        assert!(!Rank::FIRST.is_null());
    }

    #[test]
    fn next_is_monotonic() {
        let r = Rank::new(41);
        assert_eq!(r.next(), Rank::new(42));
        assert!(r < r.next());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Rank::new(7).to_string(), "7");
        assert_eq!(Rank::NULL.to_string(), "NULL");
        assert_eq!(ClassId::new(Rank::new(3)).to_string(), "class#3");
        assert_eq!(format!("{:?}", AttrId::new(Rank::new(9))), "attr#9");
    }

    #[test]
    fn store_id_follows_attribute_rank() {
        let attr = AttrId::new(Rank::new(12));
        assert_eq!(StoreId::from(attr), StoreId::new(12));
    }

    #[test]
    fn serde_roundtrip() {
        let id = KeyId::new(Rank::new(5));
        let json = serde_json::to_string(&id).unwrap();
        let parsed: KeyId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
