//! Type definitions and live instances.
//!
//! An [`Instance`] never binds its type statically. It holds its attribute
//! record plus a mutable cell pointing at a [`TypeDef`], and every lookup
//! goes through that cell. Migrating an instance is therefore just a matter
//! of swapping the cell's target with [`Instance::retag`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::EvalError;
use crate::namespace::Bindings;
use crate::value::Value;

static NEXT_TYPE: AtomicU64 = AtomicU64::new(1);
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

// ------------- TypeDef -------------
pub struct TypeDef {
    id: u64,
    name: String,
    parents: Vec<Arc<TypeDef>>,
    members: Bindings,
    slots: Option<Vec<String>>,
}

impl TypeDef {
    pub fn new(
        name: impl Into<String>,
        parents: Vec<Arc<TypeDef>>,
        members: Bindings,
        slots: Option<Vec<String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TYPE.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            parents,
            members,
            slots,
        })
    }
    /// A fresh type with this type's name, own members and slots but
    /// different parents.
    pub fn with_parents(&self, parents: Vec<Arc<TypeDef>>) -> Arc<Self> {
        Self::new(
            self.name.clone(),
            parents,
            self.members.clone(),
            self.slots.clone(),
        )
    }
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn parents(&self) -> &[Arc<TypeDef>] {
        &self.parents
    }
    pub fn members(&self) -> &Bindings {
        &self.members
    }
    pub fn slots(&self) -> Option<&[String]> {
        self.slots.as_deref()
    }
    pub fn own(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// Resolves a member on this type, then on its ancestors in order.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.members.get(name) {
            return Some(value.clone());
        }
        self.parents.iter().find_map(|parent| parent.lookup(name))
    }

    /// Linearized ancestor chain, nearest first, without duplicates.
    pub fn ancestors(&self) -> Vec<Arc<TypeDef>> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut pending: Vec<Arc<TypeDef>> = self.parents.iter().rev().cloned().collect();
        while let Some(class) = pending.pop() {
            if seen.insert(class.id) {
                pending.extend(class.parents.iter().rev().cloned());
                chain.push(class);
            }
        }
        chain
    }

    /// True when `other` is this very type or one of its ancestors.
    pub fn descends_from(&self, other: &TypeDef) -> bool {
        self.id == other.id || self.parents.iter().any(|p| p.descends_from(other))
    }

    /// Slot names declared anywhere on the chain, or `None` for an open record.
    pub fn allowed_slots(&self) -> Option<HashSet<String>> {
        let mut allowed: Option<HashSet<String>> =
            self.slots.as_ref().map(|slots| slots.iter().cloned().collect());
        for parent in &self.parents {
            if let Some(inherited) = parent.allowed_slots() {
                allowed.get_or_insert_with(HashSet::new).extend(inherited);
            }
        }
        allowed
    }

    /// Shape check used before migrating: open records always match, two
    /// slotted types must declare the same slots.
    pub fn same_shape(&self, other: &TypeDef) -> bool {
        match (&self.slots, &other.slots) {
            (Some(mine), Some(theirs)) => {
                let mine: HashSet<&String> = mine.iter().collect();
                let theirs: HashSet<&String> = theirs.iter().collect();
                mine == theirs
            }
            _ => true,
        }
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parents: Vec<&str> = self.parents.iter().map(|p| p.name()).collect();
        f.debug_struct("TypeDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parents", &parents)
            .finish()
    }
}

// ------------- Instance -------------
pub struct Instance {
    id: u64,
    class: RwLock<Arc<TypeDef>>,
    attrs: RwLock<Bindings>,
}

impl Instance {
    // Instances are created through InstanceRegistry::instantiate so that
    // the migrator can find them later.
    pub(crate) fn new(class: Arc<TypeDef>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            class: RwLock::new(class),
            attrs: RwLock::new(Bindings::default()),
        })
    }
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn class(&self) -> Arc<TypeDef> {
        Arc::clone(&self.class.read().unwrap_or_else(PoisonError::into_inner))
    }
    /// Points the instance at another type and returns the previous one.
    pub fn retag(&self, class: Arc<TypeDef>) -> Arc<TypeDef> {
        let mut cell = self.class.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *cell, class)
    }
    pub fn own_attr(&self, name: &str) -> Option<Value> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
    /// Own attribute first, then the current type's chain.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.own_attr(name).or_else(|| self.class().lookup(name))
    }
    pub fn set_attr(&self, name: &str, value: Value) -> Result<(), EvalError> {
        let class = self.class();
        if let Some(allowed) = class.allowed_slots() {
            if !allowed.contains(name) {
                return Err(EvalError::new(format!(
                    "AttributeError: '{}' has no slot '{}'",
                    class.name(),
                    name
                )));
            }
        }
        self.attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), value);
        Ok(())
    }
    pub fn remove_attr(&self, name: &str) -> Option<Value> {
        self.attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }
    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("class", &self.class().name())
            .field("attrs", &self.attr_names())
            .finish()
    }
}
