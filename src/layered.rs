//! Two-tier namespace resolver used for interactive evaluation.
//!
//! The interactive tier is fixed for the life of the view and holds REPL
//! artifacts (history slots and the active context's name). The context tier
//! is the namespace of the currently active module and is swapped by
//! [`LayeredNamespace::switch_context`].

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::diff::is_interactive_artifact;
use crate::modules::NAME_BINDING;
use crate::namespace::{Bindings, NamespaceRef, Scope, Snapshot};
use crate::value::{Module, Value};

/// Interactive binding holding the active context's module handle.
pub const MODULE_BINDING: &str = "__module__";

pub struct LayeredNamespace {
    interactive: NamespaceRef,
    context: NamespaceRef,
    logical_name: String,
    // interactive bindings that survive a context switch
    protected: BTreeSet<String>,
}

impl LayeredNamespace {
    /// Builds the view. Whatever the interactive namespace already holds is
    /// protected from clearing on later switches.
    pub fn new(interactive: NamespaceRef, context: NamespaceRef) -> Self {
        let mut protected: BTreeSet<String> = interactive.names().into_iter().collect();
        protected.insert(NAME_BINDING.to_owned());
        protected.insert(MODULE_BINDING.to_owned());
        let view = Self {
            interactive,
            logical_name: context.name().to_owned(),
            context,
            protected,
        };
        view.announce_context();
        view
    }

    pub fn interactive(&self) -> &NamespaceRef {
        &self.interactive
    }
    pub fn context(&self) -> &NamespaceRef {
        &self.context
    }
    /// The name the active context is known by in prompts and diagnostics.
    pub fn context_name(&self) -> &str {
        &self.logical_name
    }

    pub fn read(&self, name: &str) -> Option<Value> {
        if is_interactive_artifact(name) {
            return self.interactive.get(name);
        }
        self.context.get(name).or_else(|| self.interactive.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read(name).is_some()
    }

    pub fn write(&self, name: &str, value: Value) {
        if is_interactive_artifact(name) {
            self.interactive.set(name, value);
        } else if self.context.contains(name) {
            self.context.set(name, value);
        } else if self.interactive.contains(name) {
            self.interactive.set(name, value);
        } else {
            self.context.set(name, value);
        }
    }

    /// Removes `name` from both tiers.
    pub fn delete(&self, name: &str) -> bool {
        let from_context = self.context.remove(name).is_some();
        let from_interactive = self.interactive.remove(name).is_some();
        from_context || from_interactive
    }

    /// Interactive bindings overlaid with the context's.
    pub fn snapshot(&self) -> Snapshot {
        let mut merged: Bindings = Bindings::default();
        for tier in [&self.interactive, &self.context] {
            let snap = tier.snapshot();
            for (name, value) in snap.iter() {
                merged.insert(name.clone(), value.clone());
            }
        }
        Snapshot::new(merged)
    }

    /// Makes `ns` the context tier, known as `logical_name` from now on.
    ///
    /// Interactive bindings that are neither artifacts nor protected are
    /// cleared first so reads cannot fall through to names left over from
    /// the previous context. Returns the cleared names.
    pub fn switch_context(&mut self, ns: NamespaceRef, logical_name: &str) -> Vec<String> {
        let protected = &self.protected;
        let cleared = self
            .interactive
            .retain(|name| is_interactive_artifact(name) || protected.contains(name));
        if !cleared.is_empty() {
            debug!(names = ?cleared, "interactive bindings cleared");
        }
        info!(from = self.logical_name.as_str(), to = logical_name, "switching context");
        self.context = ns;
        self.logical_name = logical_name.to_owned();
        self.announce_context();
        cleared
    }

    fn announce_context(&self) {
        self.interactive
            .set(NAME_BINDING, Value::str(&self.logical_name));
        self.interactive
            .set(MODULE_BINDING, Value::Module(Module::new(self.context.clone())));
    }
}

impl Scope for LayeredNamespace {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.read(name)
    }
    fn bind(&self, name: &str, value: Value) {
        self.write(name, value);
    }
    fn unbind(&self, name: &str) -> bool {
        self.delete(name)
    }
    fn globals(&self) -> NamespaceRef {
        self.context.clone()
    }
    fn is_interactive(&self) -> bool {
        true
    }
}
