//! Differ - Compare a declared resource with its last observed state
//!
//! Update handlers issue one targeted remote call per independently mutable
//! attribute, so they need to know exactly which attributes changed.

use std::collections::BTreeSet;

use crate::resource::{Resource, State};
use crate::schema::ResourceSchema;

/// Set of attribute names whose declared value differs from the observed one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    changed: BTreeSet<String>,
}

impl Changes {
    pub fn has_change(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    pub fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_change(n))
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }
}

/// Compute which configurable attributes changed between `from` and `to`
///
/// Computed attributes are ignored. Values are compared after the attribute's
/// normalization, if any. An attribute that is observed but no longer declared
/// counts as changed (it is being unset).
pub fn diff(schema: &ResourceSchema, from: &State, to: &Resource) -> Changes {
    let mut changed = BTreeSet::new();

    for (name, attr) in &schema.attributes {
        if attr.computed {
            continue;
        }
        match (from.attributes.get(name), to.attributes.get(name)) {
            (Some(current), Some(desired)) if attr.equivalent(current, desired) => {}
            (None, None) => {}
            _ => {
                changed.insert(name.clone());
            }
        }
    }

    Changes { changed }
}
