//! Uniqueness key definitions.

use serde::{Deserialize, Serialize};

use obase_types::{AttrId, ClassId, KeyId};

/// A uniqueness constraint over one or more attributes of `of_class`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDef {
    pub id: KeyId,
    pub of_class: ClassId,
    /// Ordered key attributes; each belongs to `of_class` or an ancestor.
    pub attributes: Vec<AttrId>,
}

impl KeyDef {
    pub fn covers(&self, attr: AttrId) -> bool {
        self.attributes.contains(&attr)
    }
}
