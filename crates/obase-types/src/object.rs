use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::rank::{ClassId, Rank};

/// A record identity viewed through one class.
///
/// The same underlying record can be viewed through any class of its
/// specialization tree. Equality therefore ignores the viewing class:
/// casting an object up or down its hierarchy yields an equal object.
///
/// A rank is never shared between trees, so two live objects with the same
/// rank are the same record in the same tree, whatever root was current
/// when each handle was made. The cached root only tells NULL objects of
/// different trees apart.
///
/// Ordering is by rank, so objects of one tree sort by rank and a NULL
/// object (rank [`Rank::NULL`]) sorts after every live one.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Object {
    class: ClassId,
    root: ClassId,
    rank: Rank,
}

impl Object {
    /// An object of `class` (whose specialization root is `root`).
    pub const fn new(class: ClassId, root: ClassId, rank: Rank) -> Self {
        Self { class, root, rank }
    }

    /// The NULL object of `class`.
    pub const fn null(class: ClassId, root: ClassId) -> Self {
        Self::new(class, root, Rank::NULL)
    }

    /// The class this object is viewed through.
    pub const fn class(&self) -> ClassId {
        self.class
    }

    /// The root of the viewing class's tree when this handle was made. A
    /// later reparenting can move the class to another tree.
    pub const fn root(&self) -> ClassId {
        self.root
    }

    pub const fn rank(&self) -> Rank {
        self.rank
    }

    pub const fn is_null(&self) -> bool {
        self.rank.is_null()
    }

    /// The same record viewed through another class of the same tree.
    pub const fn viewed_as(&self, class: ClassId) -> Self {
        Self::new(class, self.root, self.rank)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && (!self.is_null() || self.root == other.root)
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank.hash(state);
        if self.is_null() {
            self.root.hash(state);
        }
    }
}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Object {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank).then_with(|| {
            if self.is_null() {
                self.root.cmp(&other.root)
            } else {
                Ordering::Equal
            }
        })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({}@{})", self.rank, self.class)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.rank, self.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn class(n: u64) -> ClassId {
        ClassId::new(Rank::new(n))
    }

    #[test]
    fn cast_objects_compare_equal() {
        let root = class(1);
        let person = Object::new(root, root, Rank::new(10));
        let employee = person.viewed_as(class(2));
        assert_eq!(person, employee);
        assert_eq!(employee.class(), class(2));

        let mut set = HashSet::new();
        set.insert(person);
        assert!(set.contains(&employee));
    }

    #[test]
    fn nulls_of_different_trees_are_distinct() {
        let a = Object::null(class(1), class(1));
        let b = Object::null(class(5), class(5));
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a, Object::null(class(2), class(1)));
    }

    #[test]
    fn stale_root_keeps_identity() {
        // A handle made before its class was detached still names the record.
        let before = Object::new(class(2), class(1), Rank::new(10));
        let after = Object::new(class(2), class(2), Rank::new(10));
        assert_eq!(before, after);
        assert_eq!(before.cmp(&after), Ordering::Equal);

        let mut set = HashSet::new();
        set.insert(before);
        assert!(set.contains(&after));
    }

    #[test]
    fn null_sorts_greatest() {
        let root = class(1);
        let live = Object::new(root, root, Rank::new(u64::MAX - 1));
        let null = Object::null(class(3), root);
        assert!(null.is_null());
        assert!(live < null);
    }

    proptest! {
        #[test]
        fn equality_iff_same_rank(
            r1 in 0u64..50, r2 in 0u64..50,
            t1 in 1u64..4, t2 in 1u64..4,
            v1 in 1u64..10, v2 in 1u64..10,
            null1 in any::<bool>(), null2 in any::<bool>(),
        ) {
            let rank = |r, null: bool| if null { Rank::NULL } else { Rank::new(r) };
            let a = Object::new(class(v1), class(t1), rank(r1, null1));
            let b = Object::new(class(v2), class(t2), rank(r2, null2));
            let expected = match (null1, null2) {
                (true, true) => t1 == t2,
                (false, false) => r1 == r2,
                _ => false,
            };
            prop_assert_eq!(a == b, expected);
            prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
        }

        #[test]
        fn ordering_by_rank_within_tree(r1 in 0u64..1000, r2 in 0u64..1000) {
            let root = class(1);
            let a = Object::new(root, root, Rank::new(r1));
            let b = Object::new(class(2), root, Rank::new(r2));
            prop_assert_eq!(a.cmp(&b), r1.cmp(&r2));
        }
    }
}
