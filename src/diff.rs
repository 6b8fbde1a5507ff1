//! Classifies binding changes between two snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::namespace::Snapshot;
use crate::types::TypeDef;
use crate::value::Value;

lazy_static! {
    // _, __, ___   _i, _ii, _iii   _i1, _i2   _1, _2
    static ref INTERACTIVE_ARTIFACT: Regex = Regex::new(r"^(?:_+|_i+|_i\d+|_\d+)$").unwrap();
}

/// Names the evaluation environment produces by itself. They never take
/// part in a diff, are never cleared on a context switch and always live in
/// the interactive tier.
pub fn is_interactive_artifact(name: &str) -> bool {
    name.is_empty() || INTERACTIVE_ARTIFACT.is_match(name)
}

#[derive(Debug, Default)]
pub struct Diff {
    pub added: BTreeMap<String, Value>,
    pub updated: BTreeMap<String, (Value, Value)>,
    pub removed: BTreeSet<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
    /// Updated bindings where both the old and the new value are types.
    pub fn type_updates(&self) -> impl Iterator<Item = (&str, &Arc<TypeDef>, &Arc<TypeDef>)> {
        self.updated.iter().filter_map(|(name, (old, new))| {
            Some((name.as_str(), old.as_type()?, new.as_type()?))
        })
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut lines = Vec::new();
        if !self.added.is_empty() {
            let names: Vec<&str> = self.added.keys().map(String::as_str).collect();
            lines.push(format!("added: {}", names.join(", ")));
        }
        if !self.updated.is_empty() {
            let names: Vec<&str> = self.updated.keys().map(String::as_str).collect();
            lines.push(format!("updated: {}", names.join(", ")));
        }
        if !self.removed.is_empty() {
            let names: Vec<&str> = self.removed.iter().map(String::as_str).collect();
            lines.push(format!("removed: {}", names.join(", ")));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

pub fn diff(before: &Snapshot, after: &Snapshot) -> Diff {
    let mut result = Diff::default();
    for (name, value) in after.iter() {
        if is_interactive_artifact(name) {
            continue;
        }
        match before.get(name) {
            None => {
                result.added.insert(name.clone(), value.clone());
            }
            Some(previous) if !previous.is(value) => {
                result
                    .updated
                    .insert(name.clone(), (previous.clone(), value.clone()));
            }
            Some(_) => (),
        }
    }
    for (name, _) in before.iter() {
        if !is_interactive_artifact(name) && !after.contains(name) {
            result.removed.insert(name.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names() {
        for name in ["", "_", "__", "___", "_i", "_ii", "_iii", "_i7", "_12"] {
            assert!(is_interactive_artifact(name), "{name:?} is an artifact");
        }
        for name in ["x", "_x", "_private", "__name__", "_i_x", "_1a", "i1"] {
            assert!(!is_interactive_artifact(name), "{name:?} is not an artifact");
        }
    }
}
