//! Wraps every evaluation unit with snapshot, diff, migration and
//! propagation.
//!
//! One unit walks through the [`Phase`]s in order. Nothing after
//! `DelegateEval` can fail, so a unit either reconciles completely or fails
//! inside the evaluator before any diffing started.

use std::cmp::Reverse;

use tracing::{debug, info, warn};

use crate::diff::{Diff, diff};
use crate::error::{LiveloadError, Result};
use crate::layered::LayeredNamespace;
use crate::migrate::{MigrationReport, migrate};
use crate::namespace::{NamespaceKind, NamespaceRef, Snapshot};
use crate::propagate::{AliasRegistry, Rebinding, propagate};
use crate::runtime::{Evaluator, Runtime};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SnapshotBefore,
    DelegateEval,
    SnapshotAfter,
    Diff,
    MigrateTypes,
    PropagateAliases,
    Commit,
}

/// Commands handled by the orchestrator itself. They navigate rather than
/// mutate, so they are exempt from diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `%in <context>`
    Switch(&'a str),
    /// `%trace`
    Trace,
}

impl<'a> Command<'a> {
    pub fn parse(code: &'a str) -> Option<Self> {
        let line = code.trim();
        if let Some(rest) = line.strip_prefix("%in ") {
            return Some(Command::Switch(rest.trim()));
        }
        if line == "%trace" || line == "%debug-module" {
            return Some(Command::Trace);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Switched(String),
    Trace(bool),
}

#[derive(Debug, Clone)]
pub struct TypeMigration {
    pub name: String,
    pub report: MigrationReport,
}

#[derive(Debug, Default)]
pub struct UnitOutcome {
    pub value: Value,
    pub diff: Diff,
    pub migrations: Vec<TypeMigration>,
    pub rebound: Vec<Rebinding>,
    pub control: Option<Control>,
    /// Whether trace output was on for this unit.
    pub traced: bool,
}

impl UnitOutcome {
    fn control(control: Control) -> Self {
        Self {
            control: Some(control),
            ..Self::default()
        }
    }
    /// Human readable trace lines for this unit.
    pub fn trace_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .diff
            .to_string()
            .lines()
            .map(str::to_owned)
            .collect();
        for migration in &self.migrations {
            let report = &migration.report;
            lines.push(match &report.skipped {
                Some(reason) => format!("migration of {} skipped: {reason}", migration.name),
                None => format!(
                    "migrated {}: {} instance(s) retagged, {} subtype(s) rebuilt",
                    migration.name, report.retagged, report.synthesized
                ),
            });
        }
        for (namespace, name) in &self.rebound {
            lines.push(format!("rebound {namespace}.{name}"));
        }
        lines
    }
}

pub struct Orchestrator {
    evaluator: Box<dyn Evaluator>,
    runtime: Runtime,
    view: LayeredNamespace,
    trace: bool,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(evaluator: Box<dyn Evaluator>, runtime: Runtime) -> Self {
        let interactive = NamespaceRef::new("<interactive>", NamespaceKind::Interactive);
        let view = LayeredNamespace::new(interactive, runtime.modules.main());
        Self {
            evaluator,
            runtime,
            view,
            trace: false,
            phase: Phase::Idle,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
    pub fn view(&self) -> &LayeredNamespace {
        &self.view
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn trace(&self) -> bool {
        self.trace
    }
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }
    pub fn context_name(&self) -> &str {
        self.view.context_name()
    }

    /// Makes the loaded module `name` the active context.
    pub fn switch(&mut self, name: &str) -> Result<()> {
        let ns = self
            .runtime
            .modules
            .get(name)
            .ok_or_else(|| LiveloadError::ContextNotFound(name.to_owned()))?;
        self.view.switch_context(ns, name);
        Ok(())
    }

    /// Runs one unit of code.
    ///
    /// With `target` naming a context other than the active one the unit is
    /// evaluated detached, directly against that module's namespace.
    pub fn run_unit(&mut self, code: &str, target: Option<&str>) -> Result<UnitOutcome> {
        match Command::parse(code) {
            Some(Command::Switch(name)) => {
                self.switch(name)?;
                return Ok(UnitOutcome::control(Control::Switched(name.to_owned())));
            }
            Some(Command::Trace) => {
                self.trace = !self.trace;
                info!(trace = self.trace, "trace output toggled");
                return Ok(UnitOutcome::control(Control::Trace(self.trace)));
            }
            None => (),
        }

        let detached = match target {
            Some(name) if name != self.view.context_name() => Some(
                self.runtime
                    .modules
                    .get(name)
                    .ok_or_else(|| LiveloadError::ContextNotFound(name.to_owned()))?,
            ),
            _ => None,
        };

        self.phase = Phase::SnapshotBefore;
        let before = self.snapshot(detached.as_ref());

        self.phase = Phase::DelegateEval;
        let evaluated = match &detached {
            Some(ns) => self.evaluator.evaluate(code, ns, &self.runtime),
            None => self.evaluator.evaluate(code, &self.view, &self.runtime),
        };
        let value = match evaluated {
            Ok(value) => value,
            Err(e) => {
                self.phase = Phase::Idle;
                warn!(error = %e, context = self.target_name(detached.as_ref()), "evaluation failed");
                return Err(e.into());
            }
        };

        self.phase = Phase::SnapshotAfter;
        let after = self.snapshot(detached.as_ref());

        self.phase = Phase::Diff;
        let changes = diff(&before, &after);

        self.phase = Phase::MigrateTypes;
        // a subtype has strictly more ancestors than any type it descends
        // from, so this puts redefined subtypes ahead of their redefined bases
        let mut type_updates: Vec<_> = changes.type_updates().collect();
        type_updates.sort_by_key(|(_, old, _)| Reverse(old.ancestors().len()));
        let migrations: Vec<TypeMigration> = type_updates
            .into_iter()
            .map(|(name, old, new)| TypeMigration {
                name: name.to_owned(),
                report: migrate(old, new, &self.runtime.instances),
            })
            .collect();

        self.phase = Phase::PropagateAliases;
        let mut registry = AliasRegistry::new(&self.runtime.modules)
            .with(self.view.interactive())
            .with(self.view.context());
        if let Some(ns) = &detached {
            registry = registry.with(ns);
        }
        let rebound: Vec<Rebinding> = changes
            .updated
            .values()
            .flat_map(|(old, new)| propagate(old, new, &registry))
            .collect();

        self.phase = Phase::Commit;
        let target_ns = detached.unwrap_or_else(|| self.view.context().clone());
        commit(&target_ns, &changes);
        self.phase = Phase::Idle;

        let outcome = UnitOutcome {
            value,
            diff: changes,
            migrations,
            rebound,
            control: None,
            traced: self.trace,
        };
        if self.trace {
            for line in outcome.trace_lines() {
                info!(context = target_ns.name(), "{line}");
            }
        } else if !outcome.diff.is_empty() {
            debug!(
                context = target_ns.name(),
                added = outcome.diff.added.len(),
                updated = outcome.diff.updated.len(),
                removed = outcome.diff.removed.len(),
                "unit reconciled"
            );
        }
        Ok(outcome)
    }

    fn snapshot(&self, detached: Option<&NamespaceRef>) -> Snapshot {
        match detached {
            Some(ns) => ns.snapshot(),
            None => self.view.snapshot(),
        }
    }

    fn target_name<'s>(&'s self, detached: Option<&'s NamespaceRef>) -> &'s str {
        detached.map_or_else(|| self.view.context_name(), |ns| ns.name())
    }
}

// Makes the context namespace hold every binding the unit produced, even
// the ones that landed in the interactive tier.
fn commit(target: &NamespaceRef, changes: &Diff) {
    for (name, value) in &changes.added {
        if !target.get(name).is_some_and(|current| current.is(value)) {
            target.set(name.clone(), value.clone());
        }
    }
    for (name, (_, new)) in &changes.updated {
        if !target.get(name).is_some_and(|current| current.is(new)) {
            target.set(name.clone(), new.clone());
        }
    }
    for name in &changes.removed {
        target.remove(name);
    }
}
