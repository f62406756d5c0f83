//! Attribute-name resolution.
//!
//! A name is looked up among the attributes of every class in the context
//! class's specialization tree, not just its ancestors, so a name declared
//! only on a subclass still resolves from the root. When several classes
//! declare the name, the closest declaration on the context class's
//! ancestor chain wins.

use obase_types::{AttrId, ClassId};

use crate::error::{SchemaError, SchemaResult};
use crate::registry::Schema;

impl Schema {
    /// Resolve `name` to an attribute relative to `context`.
    ///
    /// 1. Candidates are the non-state attributes named `name` whose domain
    ///    is in the same tree as `context`.
    /// 2. None is [`SchemaError::NoSuchAttribute`]; exactly one is the answer.
    /// 3. Otherwise walk from `context` up to the root. The first level that
    ///    declares exactly one candidate wins. A level declaring several, or
    ///    running off the root, is [`SchemaError::AmbiguousAttribute`].
    pub fn resolve(&self, name: &str, context: ClassId) -> SchemaResult<AttrId> {
        let root = self.root_of(context)?;
        let mut candidates = Vec::new();
        for attr in self.attributes_named(name) {
            let domain = self.attribute(attr)?.domain;
            if self.root_of(domain)? == root {
                candidates.push(attr);
            }
        }

        match candidates.as_slice() {
            [] => Err(SchemaError::NoSuchAttribute {
                name: name.to_string(),
                class: self.class_name(context),
            }),
            [only] => Ok(*only),
            _ => {
                let ambiguous = || SchemaError::AmbiguousAttribute {
                    name: name.to_string(),
                    class: self.class_name(context),
                    candidates: candidates.len(),
                };
                for level in self.ancestors(context)? {
                    let mut at_level = Vec::new();
                    for attr in &candidates {
                        if self.attribute(*attr)?.domain == level {
                            at_level.push(*attr);
                        }
                    }
                    match at_level.as_slice() {
                        [] => continue,
                        [found] => return Ok(*found),
                        _ => return Err(ambiguous()),
                    }
                }
                Err(ambiguous())
            }
        }
    }
}
