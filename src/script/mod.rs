//! The `.lv` scripting language: grammar, syntax tree, builtins and the
//! interpreter that implements [`crate::runtime::Evaluator`].

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod parser;

pub use interp::{MAX_DEPTH, ScriptEvaluator};
pub use parser::parse_program;
