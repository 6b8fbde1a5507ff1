//! Liveload – a live-reload evaluation engine for long-running interactive sessions.
//!
//! Liveload lets a user redefine functions and types inside a running
//! process without losing live state. Every unit of code (a REPL line, a
//! pasted file, a remote request) is wrapped as follows:
//! * The bindings of the target namespace are snapshotted before and after
//!   the unit runs ([`namespace::Snapshot`]).
//! * The two snapshots are compared by *identity* ([`diff::diff`]), giving
//!   added, updated and removed names.
//! * For every updated name whose old and new value are both types, all live
//!   instances of the old type are retagged to the new one
//!   ([`migrate::migrate`]). Subtypes are rebuilt on top of the new type so
//!   the old definition is unreachable from any live instance.
//! * Every other binding in the process that still refers to an old object
//!   is rebound to its replacement ([`propagate::propagate`]), so aliases
//!   like `from foo import get` pick up the new definition.
//!
//! ## Modules
//! * [`namespace`] – shared namespaces, snapshots and the [`namespace::Scope`] seam.
//! * [`layered`] – the two-tier interactive view (REPL artifacts over the active context).
//! * [`modules`] – the table of loaded contexts, which doubles as the alias registry.
//! * [`types`] / [`registry`] – type definitions, instances with an indirect
//!   type cell, and the weak type-indexed instance registry.
//! * [`orchestrator`] – the per-unit phase machine.
//! * [`executor`] – the single thread every unit is serialized onto.
//! * [`server`] – the optional HTTP control surface.
//! * [`script`] – the `.lv` scripting language the engine ships with.
//! * [`settings`] – layered configuration.
//!
//! ## Quick Start
//! ```
//! use liveload::{Orchestrator, Runtime, ScriptEvaluator, Value};
//! let mut engine = Orchestrator::new(Box::new(ScriptEvaluator::new()), Runtime::default());
//! engine.run_unit("class Foo { fn get(self) { return 'old' } }\nfoo = Foo()", None).unwrap();
//! engine.run_unit("class Foo { fn get(self) { return 'new' } }", None).unwrap();
//! let outcome = engine.run_unit("foo.get()", None).unwrap();
//! assert_eq!(outcome.value, Value::str("new"));
//! ```
//!
//! ## Status
//! Migration is deliberately conservative: when the redefined type changes
//! its name or its declared slots, instances keep their old type and the
//! skip is reported in the unit's trace output.

pub mod diff;
pub mod error;
pub mod executor;
pub mod layered;
pub mod migrate;
pub mod modules;
pub mod namespace;
pub mod orchestrator;
pub mod propagate;
pub mod registry;
pub mod runtime;
pub mod script;
pub mod server;
pub mod settings;
pub mod types;
pub mod value;

pub use error::{EvalError, LiveloadError, Result};
pub use executor::{EngineHandle, EngineStatus, Executor};
pub use orchestrator::{Orchestrator, UnitOutcome};
pub use runtime::{Evaluator, Runtime};
pub use script::ScriptEvaluator;
pub use value::Value;
