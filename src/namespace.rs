//! Namespaces, snapshots and the [`Scope`] seam evaluators bind through.

use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use seahash::SeaHasher;

use crate::value::Value;

pub type NameHasher = BuildHasherDefault<SeaHasher>;
pub type Bindings = HashMap<String, Value, NameHasher>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceKind {
    /// REPL-scoped bindings: result history, input history, compat names.
    Interactive,
    /// Bindings of one logical module.
    Context,
}

struct NamespaceInner {
    name: String,
    kind: NamespaceKind,
    bindings: RwLock<Bindings>,
}

/// Shared handle to a namespace. Clones refer to the same bindings, which
/// is what lets the module table and the layered view hold one module's
/// namespace at the same time.
#[derive(Clone)]
pub struct NamespaceRef(Arc<NamespaceInner>);

impl NamespaceRef {
    pub fn new(name: impl Into<String>, kind: NamespaceKind) -> Self {
        Self(Arc::new(NamespaceInner {
            name: name.into(),
            kind,
            bindings: RwLock::new(Bindings::default()),
        }))
    }
    pub fn name(&self) -> &str {
        &self.0.name
    }
    pub fn kind(&self) -> NamespaceKind {
        self.0.kind
    }
    pub fn same(&self, other: &NamespaceRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Bindings> {
        self.0.bindings.read().unwrap_or_else(PoisonError::into_inner)
    }
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Bindings> {
        self.0.bindings.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }
    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.write().insert(name.into(), value)
    }
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.write().remove(name)
    }
    pub fn len(&self) -> usize {
        self.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.read().clone())
    }

    /// Rebinds every binding identical to `old` so that it holds `new`.
    /// Returns the names that were rebound.
    pub fn rebind_identical(&self, old: &Value, new: &Value) -> Vec<String> {
        let mut bindings = self.write();
        let mut rebound = Vec::new();
        for (name, value) in bindings.iter_mut() {
            if value.is(old) {
                *value = new.clone();
                rebound.push(name.clone());
            }
        }
        rebound
    }

    /// Removes every binding for which `keep` answers false.
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut bindings = self.write();
        let mut removed = Vec::new();
        bindings.retain(|name, _| {
            let kept = keep(name);
            if !kept {
                removed.push(name.clone());
            }
            kept
        });
        removed
    }
}

impl fmt::Debug for NamespaceRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // bindings may refer back to this namespace, so they are not printed
        write!(f, "NamespaceRef({:?}, {:?})", self.0.name, self.0.kind)
    }
}

// ------------- Snapshot -------------
/// Immutable copy of a namespace's bindings taken at one instant.
#[derive(Clone, Default)]
pub struct Snapshot {
    bindings: Bindings,
}
impl Snapshot {
    pub fn new(bindings: Bindings) -> Self {
        Self { bindings }
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Snapshot").field("names", &names).finish()
    }
}

// ------------- Scope -------------
/// Where an evaluator reads and writes global bindings.
///
/// Implemented by a raw [`NamespaceRef`] (detached evaluation against one
/// module) and by [`crate::layered::LayeredNamespace`] (interactive
/// evaluation).
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
    fn bind(&self, name: &str, value: Value);
    fn unbind(&self, name: &str) -> bool;
    /// The namespace functions defined in this scope close over.
    fn globals(&self) -> NamespaceRef;
    /// Interactive scopes receive input and result history bindings.
    fn is_interactive(&self) -> bool {
        false
    }
}

impl Scope for NamespaceRef {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
    fn bind(&self, name: &str, value: Value) {
        self.set(name, value);
    }
    fn unbind(&self, name: &str) -> bool {
        self.remove(name).is_some()
    }
    fn globals(&self) -> NamespaceRef {
        self.clone()
    }
}
