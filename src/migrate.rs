//! Moves live instances of a redefined type onto the new definition.
//!
//! Instances of exactly the old type are simply retagged. An instance of a
//! subtype `S` keeps the members `S` defines itself but must inherit from
//! the new definition, so it is retagged to a synthesized `S'` whose chain
//! has the old type replaced by the new one. Intermediate types between `S`
//! and the old type are rebuilt the same way, otherwise the old type would
//! still be reachable through them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::registry::InstanceRegistry;
use crate::types::TypeDef;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Instances moved onto a new type descriptor.
    pub retagged: usize,
    /// Subtypes rebuilt on top of the new definition.
    pub synthesized: usize,
    /// Set when the pair was not compatible and nothing was touched.
    pub skipped: Option<String>,
}

/// Checks whether `new` may replace `old` for live instances.
pub fn compatibility(old: &TypeDef, new: &TypeDef) -> Result<(), String> {
    if old.name() != new.name() {
        return Err(format!(
            "type '{}' was rebound to a different type '{}'",
            old.name(),
            new.name()
        ));
    }
    if !old.same_shape(new) {
        return Err(format!("slots of '{}' changed", old.name()));
    }
    Ok(())
}

pub fn migrate(
    old: &Arc<TypeDef>,
    new: &Arc<TypeDef>,
    instances: &InstanceRegistry,
) -> MigrationReport {
    let mut report = MigrationReport::default();
    if Arc::ptr_eq(old, new) {
        return report;
    }
    if let Err(reason) = compatibility(old, new) {
        warn!(%reason, "migration skipped");
        report.skipped = Some(reason);
        return report;
    }

    let mut rebuilt: HashMap<u64, Arc<TypeDef>> = HashMap::new();
    for instance in instances.instances_of(old) {
        let current = instance.class();
        let target = rebase(&current, old, new, &mut rebuilt);
        if !Arc::ptr_eq(&current, &target) {
            instance.retag(target);
            report.retagged += 1;
        }
    }
    report.synthesized = rebuilt.len();
    instances.reindex();
    info!(
        class = old.name(),
        from = old.id(),
        to = new.id(),
        retagged = report.retagged,
        synthesized = report.synthesized,
        "instances migrated"
    );
    report
}

// The type to use in place of `class` once `old` is replaced by `new`.
fn rebase(
    class: &Arc<TypeDef>,
    old: &Arc<TypeDef>,
    new: &Arc<TypeDef>,
    rebuilt: &mut HashMap<u64, Arc<TypeDef>>,
) -> Arc<TypeDef> {
    if Arc::ptr_eq(class, old) {
        return Arc::clone(new);
    }
    if !class.descends_from(old) {
        return Arc::clone(class);
    }
    if let Some(done) = rebuilt.get(&class.id()) {
        return Arc::clone(done);
    }
    let parents = class
        .parents()
        .iter()
        .map(|parent| rebase(parent, old, new, rebuilt))
        .collect();
    let replacement = class.with_parents(parents);
    debug!(class = class.name(), from = class.id(), to = replacement.id(), "subtype rebuilt");
    rebuilt.insert(class.id(), Arc::clone(&replacement));
    replacement
}
