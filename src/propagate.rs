//! Repoints aliases of a replaced value.
//!
//! After `from foo import get` another module holds its own binding to the
//! function object `foo.get` had at import time. When `foo.get` is
//! redefined, every such alias is rebound to the new object.

use tracing::debug;

use crate::modules::ModuleTable;
use crate::namespace::NamespaceRef;
use crate::value::Value;

/// Every namespace the propagator scans: the module table plus secondary
/// namespaces (the interactive tier, a context that is not in the table).
pub struct AliasRegistry<'m> {
    modules: &'m ModuleTable,
    secondary: Vec<NamespaceRef>,
}

impl<'m> AliasRegistry<'m> {
    pub fn new(modules: &'m ModuleTable) -> Self {
        Self {
            modules,
            secondary: Vec::new(),
        }
    }
    pub fn with(mut self, namespace: &NamespaceRef) -> Self {
        self.secondary.push(namespace.clone());
        self
    }
    /// Every namespace once, even when it is reachable twice.
    pub fn namespaces(&self) -> Vec<NamespaceRef> {
        let mut all: Vec<NamespaceRef> = Vec::new();
        for ns in self.modules.namespaces().into_iter().chain(self.secondary.iter().cloned()) {
            if !all.iter().any(|known| known.same(&ns)) {
                all.push(ns);
            }
        }
        all
    }
}

/// A binding that was rebound, as `(namespace, name)`.
pub type Rebinding = (String, String);

/// Rebinds every binding identical to `old` so that it holds `new`.
///
/// Values without identity are left alone: a scalar changing from `1` to
/// `2` says nothing about other bindings that happen to hold `1`.
pub fn propagate(old: &Value, new: &Value, registry: &AliasRegistry) -> Vec<Rebinding> {
    if !old.has_identity() || old.is(new) {
        return Vec::new();
    }
    let mut rebound = Vec::new();
    for ns in registry.namespaces() {
        for name in ns.rebind_identical(old, new) {
            debug!(namespace = ns.name(), binding = %name, "alias rebound");
            rebound.push((ns.name().to_owned(), name));
        }
    }
    rebound
}
