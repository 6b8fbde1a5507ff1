//! Runtime values held by namespace bindings.
//!
//! A [`Value`] is an opaque handle. Scalars (`nil`, booleans, integers and
//! strings) are immutable and carry no identity of their own. Every other
//! variant wraps a shared allocation, and two such values are *identical*
//! only when they point at the same allocation. The differ and the
//! propagator work exclusively with identity, see [`Value::is`].

use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;
use crate::namespace::NamespaceRef;
use crate::script::ast::FnDecl;
use crate::types::{Instance, TypeDef};

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Func(Arc<Function>),
    Builtin(Builtin),
    Type(Arc<TypeDef>),
    Instance(Arc<Instance>),
    Method(Arc<BoundMethod>),
    Module(Module),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(text.as_ref()))
    }
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    /// Identity test. Scalars compare by value, everything else by allocation.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => a.namespace.same(&b.namespace),
            _ => false,
        }
    }

    /// Whether the value is a heap object whose identity can be aliased.
    pub fn has_identity(&self) -> bool {
        !matches!(
            self,
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Str(_)
        )
    }

    /// Structural equality as seen by the `==` operator.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            _ => self.is(other),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "nil".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Func(_) => "function".into(),
            Value::Builtin(_) => "builtin".into(),
            Value::Type(_) => "type".into(),
            Value::Instance(instance) => instance.class().name().to_owned(),
            Value::Method(_) => "method".into(),
            Value::Module(_) => "module".into(),
        }
    }

    pub fn as_type(&self) -> Option<&Arc<TypeDef>> {
        match self {
            Value::Type(class) => Some(class),
            _ => None,
        }
    }

    /// Printable form used by the REPL, strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                let shown: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", shown.join(", "))
            }
            Value::Func(func) => write!(f, "<fn {}>", func.name()),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Type(class) => write!(f, "<type {}>", class.name()),
            Value::Instance(instance) => {
                write!(f, "<{} instance #{}>", instance.class().name(), instance.id())
            }
            Value::Method(method) => write!(
                f,
                "<method {} of {}>",
                method.function.name(),
                method.receiver.type_name()
            ),
            Value::Module(module) => write!(f, "<module {}>", module.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

// ------------- Function -------------
/// A user-defined function. It closes over the namespace of the context it
/// was defined in, so global names are resolved at call time.
pub struct Function {
    decl: Arc<FnDecl>,
    defaults: Vec<Option<Value>>,
    globals: NamespaceRef,
}
impl Function {
    pub fn new(decl: Arc<FnDecl>, defaults: Vec<Option<Value>>, globals: NamespaceRef) -> Self {
        Self {
            decl,
            defaults,
            globals,
        }
    }
    pub fn name(&self) -> &str {
        &self.decl.name
    }
    pub fn decl(&self) -> &FnDecl {
        &self.decl
    }
    pub fn defaults(&self) -> &[Option<Value>] {
        &self.defaults
    }
    pub fn globals(&self) -> &NamespaceRef {
        &self.globals
    }
}

pub type NativeFn = fn(&[Value]) -> Result<Value, EvalError>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
}

/// A function looked up through an instance, with the instance as receiver.
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Arc<Function>,
}

#[derive(Clone)]
pub struct Module {
    pub name: Arc<str>,
    pub namespace: NamespaceRef,
}
impl Module {
    pub fn new(namespace: NamespaceRef) -> Self {
        Self {
            name: Arc::from(namespace.name()),
            namespace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_lists_are_not_identical() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert!(a.equals(&b));
        assert!(!a.is(&b));
        assert!(a.is(&a.clone()));
    }

    #[test]
    fn scalars_have_no_identity() {
        assert!(Value::Int(3).is(&Value::Int(3)));
        assert!(Value::str("x").is(&Value::str("x")));
        assert!(!Value::Int(3).has_identity());
        assert!(Value::list(vec![]).has_identity());
    }
}
