//! Attribute definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use obase_types::{AttrId, ClassId, StoreId};

/// How many values an attribute holds per record.
///
/// `max: Some(1)` is single-valued; anything else is multi-valued and
/// `max: None` is unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    pub min: u32,
    pub max: Option<u32>,
}

impl Cardinality {
    /// Optional single value (the default).
    pub const fn single() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Exactly one value.
    pub const fn required() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Any number of values.
    pub const fn many() -> Self {
        Self { min: 0, max: None }
    }

    /// Between `min` and `max` values.
    pub const fn range(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    pub const fn is_multi(&self) -> bool {
        !matches!(self.max, Some(1))
    }

    /// Returns `true` if a sequence of `len` values satisfies the bounds.
    pub fn admits(&self, len: usize) -> bool {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        len >= self.min && self.max.map_or(true, |max| len <= max)
    }

    /// Returns `true` if the bounds can be satisfied at all.
    pub fn is_consistent(&self) -> bool {
        self.max.map_or(true, |max| max >= 1 && max >= self.min)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}..{}]", self.min, max),
            None => write!(f, "[{}..*]", self.min),
        }
    }
}

/// Who may see an attribute. Recorded for callers; the engine only hides
/// state attributes from name resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
    Hidden,
}

impl Visibility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
            Visibility::Hidden => "hidden",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "protected" => Ok(Visibility::Protected),
            "private" => Ok(Visibility::Private),
            "hidden" => Ok(Visibility::Hidden),
            other => Err(format!("unknown visibility {other:?}")),
        }
    }
}

/// A registered attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub id: AttrId,
    pub name: String,
    /// Owning class; fixed at creation.
    pub domain: ClassId,
    pub range: ClassId,
    pub card: Cardinality,
    pub visibility: Visibility,
    /// `true` for the hidden state attribute of a tuple class.
    pub is_state: bool,
}

impl AttributeDef {
    /// The backing-store map holding this attribute's values.
    pub fn store(&self) -> StoreId {
        StoreId::from(self.id)
    }

    pub fn is_multi(&self) -> bool {
        self.card.is_multi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_is_default() {
        let card = Cardinality::default();
        assert!(!card.is_multi());
        assert_eq!(card, Cardinality::single());
    }

    #[test]
    fn admits_respects_bounds() {
        let card = Cardinality::range(1, Some(3));
        assert!(card.is_multi());
        assert!(!card.admits(0));
        assert!(card.admits(1));
        assert!(card.admits(3));
        assert!(!card.admits(4));
        assert!(Cardinality::many().admits(1000));
    }

    #[test]
    fn consistency() {
        assert!(Cardinality::range(2, None).is_consistent());
        assert!(!Cardinality::range(3, Some(2)).is_consistent());
        assert!(!Cardinality::range(0, Some(0)).is_consistent());
    }

    #[test]
    fn visibility_parse() {
        assert_eq!("hidden".parse::<Visibility>().unwrap(), Visibility::Hidden);
        assert!("secret".parse::<Visibility>().is_err());
        assert_eq!(Cardinality::many().to_string(), "[0..*]");
    }
}
