//! Change detection between two variable maps.

use crate::upsd::VarMap;

/// Entries of `new` that are absent from `old` or carry a different value.
pub fn diff(old: &VarMap, new: &VarMap) -> VarMap {
    new.iter()
        .filter(|(name, value)| old.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Names present in `old` but missing from `new`.
pub fn removed(old: &VarMap, new: &VarMap) -> Vec<String> {
    old.keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect()
}
