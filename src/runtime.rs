//! Process-wide state shared by the orchestrator and its evaluator.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::EvalError;
use crate::modules::ModuleTable;
use crate::namespace::Scope;
use crate::registry::InstanceRegistry;
use crate::value::Value;

#[derive(Clone)]
pub struct Runtime {
    pub modules: Arc<ModuleTable>,
    pub instances: Arc<InstanceRegistry>,
}

impl Runtime {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            modules: Arc::new(ModuleTable::new(search_path)),
            instances: Arc::new(InstanceRegistry::new()),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Evaluates one unit of code against a scope.
///
/// The orchestrator never looks inside the code: it snapshots the scope
/// around this call and reconciles whatever changed.
pub trait Evaluator: Send {
    fn evaluate(
        &mut self,
        code: &str,
        scope: &dyn Scope,
        runtime: &Runtime,
    ) -> Result<Value, EvalError>;
}
