//! The module table: every context namespace loaded in the process.
//!
//! It doubles as the alias registry the propagator scans, so a namespace
//! becomes visible to propagation the moment it is registered here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::namespace::{NameHasher, NamespaceKind, NamespaceRef};
use crate::value::Value;

/// The context interactive evaluation starts in.
pub const MAIN_MODULE: &str = "__main__";
/// Binding holding a namespace's own logical name.
pub const NAME_BINDING: &str = "__name__";
/// Source file extension looked up on the module path.
pub const SOURCE_EXTENSION: &str = "lv";

pub struct ModuleTable {
    modules: RwLock<HashMap<String, NamespaceRef, NameHasher>>,
    search_path: Vec<PathBuf>,
}

impl ModuleTable {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        let table = Self {
            modules: RwLock::new(HashMap::default()),
            search_path,
        };
        table.register(MAIN_MODULE);
        table
    }

    pub fn main(&self) -> NamespaceRef {
        self.register(MAIN_MODULE)
    }

    pub fn get(&self, name: &str) -> Option<NamespaceRef> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the namespace registered under `name`, creating an empty
    /// context namespace for it first if necessary.
    pub fn register(&self, name: &str) -> NamespaceRef {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        modules
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(module = name, "registering context namespace");
                let ns = NamespaceRef::new(name, NamespaceKind::Context);
                ns.set(NAME_BINDING, Value::str(name));
                ns
            })
            .clone()
    }

    pub fn remove(&self, name: &str) -> Option<NamespaceRef> {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn namespaces(&self) -> Vec<NamespaceRef> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// First `<dir>/<name>.lv` that exists on the search path.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return None;
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(format!("{name}.{SOURCE_EXTENSION}")))
            .find(|candidate| candidate.is_file())
    }
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
