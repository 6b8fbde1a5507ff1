//! Tree-walking interpreter for the scripting language.

use std::sync::Arc;

use tracing::{debug, info};

use super::ast::{BinOp, ClassDecl, Expr, FnDecl, Stmt, Target};
use super::builtins;
use super::parser::parse_program;
use crate::error::EvalError;
use crate::namespace::{Bindings, NamespaceRef, Scope};
use crate::runtime::{Evaluator, Runtime};
use crate::types::TypeDef;
use crate::value::{BoundMethod, Function, Module, Value};

/// Deepest call nesting allowed before a unit fails with a recursion error.
pub const MAX_DEPTH: usize = 128;

/// The [`Evaluator`] for `.lv` source.
///
/// Interactive scopes additionally receive input and result history
/// bindings (`_i`, `_`, `_i3`, `_3`, ...) the way a notebook shell does.
#[derive(Debug, Default)]
pub struct ScriptEvaluator {
    execution_count: u64,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    // `_i` holds the previous input, `_i00` and `_i<N>` the current one.
    fn record_input(&mut self, scope: &dyn Scope, code: &str) {
        self.execution_count += 1;
        shift(scope, ["_iii", "_ii", "_i"]);
        if let Some(previous) = scope.lookup("_i00") {
            scope.bind("_i", previous);
        }
        let input = Value::str(code);
        scope.bind("_i00", input.clone());
        scope.bind(&format!("_i{}", self.execution_count), input);
    }

    fn record_result(&self, scope: &dyn Scope, value: &Value) {
        if matches!(value, Value::Nil) {
            return;
        }
        shift(scope, ["___", "__", "_"]);
        scope.bind("_", value.clone());
        scope.bind(&format!("_{}", self.execution_count), value.clone());
    }
}

// Moves each slot's value one position towards the oldest slot.
fn shift(scope: &dyn Scope, [oldest, middle, newest]: [&str; 3]) {
    if let Some(value) = scope.lookup(middle) {
        scope.bind(oldest, value);
    }
    if let Some(value) = scope.lookup(newest) {
        scope.bind(middle, value);
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(
        &mut self,
        code: &str,
        scope: &dyn Scope,
        runtime: &Runtime,
    ) -> Result<Value, EvalError> {
        let program = parse_program(code)?;
        let interactive = scope.is_interactive();
        if interactive {
            self.record_input(scope, code);
        }
        let value = Interpreter::new(runtime).run(&program, scope)?;
        if interactive {
            self.record_result(scope, &value);
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Module,
    Function,
    Class,
}

struct Frame<'s> {
    kind: FrameKind,
    scope: &'s dyn Scope,
    // unused in module frames, which bind straight into the scope
    locals: Bindings,
    slots: Option<Vec<String>>,
}

impl<'s> Frame<'s> {
    fn new(kind: FrameKind, scope: &'s dyn Scope) -> Self {
        Self {
            kind,
            scope,
            locals: Bindings::default(),
            slots: None,
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if self.kind != FrameKind::Module {
            if let Some(value) = self.locals.get(name) {
                return Some(value.clone());
            }
        }
        self.scope.lookup(name).or_else(|| builtins::lookup(name))
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.kind {
            FrameKind::Module => self.scope.bind(name, value),
            _ => {
                self.locals.insert(name.to_owned(), value);
            }
        }
    }

    fn unbind(&mut self, name: &str) -> bool {
        match self.kind {
            FrameKind::Module => self.scope.unbind(name),
            _ => self.locals.remove(name).is_some(),
        }
    }
}

enum Flow {
    Next(Value),
    Return(Value),
}

pub(crate) struct Interpreter<'r> {
    runtime: &'r Runtime,
    depth: usize,
}

impl<'r> Interpreter<'r> {
    pub(crate) fn new(runtime: &'r Runtime) -> Self {
        Self { runtime, depth: 0 }
    }

    /// Runs a program at module level and returns the value of its last
    /// statement.
    pub(crate) fn run(&mut self, program: &[Stmt], scope: &dyn Scope) -> Result<Value, EvalError> {
        let mut frame = Frame::new(FrameKind::Module, scope);
        match self.exec_block(program, &mut frame)? {
            Flow::Next(value) | Flow::Return(value) => Ok(value),
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], frame: &mut Frame) -> Result<Flow, EvalError> {
        let mut last = Value::Nil;
        for stmt in stmts {
            match self.exec(stmt, frame)? {
                Flow::Next(value) => last = value,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Next(last))
    }

    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Expr(expr) => return Ok(Flow::Next(self.eval(expr, frame)?)),
            Stmt::Assign { target, value } => {
                let value = self.eval(value, frame)?;
                self.assign(target, value, frame)?;
            }
            Stmt::FnDef(decl) => {
                let function = self.define_function(decl, frame)?;
                frame.bind(&decl.name, function);
            }
            Stmt::ClassDef(decl) => {
                let class = self.define_class(decl, frame)?;
                frame.bind(&decl.name, Value::Type(class));
            }
            Stmt::Import { module, alias } => {
                let ns = self.load_module(module)?;
                frame.bind(alias.as_deref().unwrap_or(module), Value::Module(Module::new(ns)));
            }
            Stmt::ImportFrom { module, names } => {
                let ns = self.load_module(module)?;
                for (name, alias) in names {
                    let value = ns.get(name).ok_or_else(|| {
                        EvalError::new(format!(
                            "ImportError: cannot import name '{name}' from '{module}'"
                        ))
                    })?;
                    frame.bind(alias.as_deref().unwrap_or(name), value);
                }
            }
            Stmt::Del(target) => self.delete(target, frame)?,
            Stmt::Return(expr) => {
                if frame.kind != FrameKind::Function {
                    return Err(EvalError::new("SyntaxError: 'return' outside function"));
                }
                let value = match expr {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, frame)?.truthy() {
                    return self.exec_block(then, frame);
                } else if let Some(otherwise) = otherwise {
                    return self.exec_block(otherwise, frame);
                }
            }
            Stmt::Slots(names) => {
                if frame.kind != FrameKind::Class {
                    return Err(EvalError::new("SyntaxError: 'slots' outside class body"));
                }
                frame.slots.get_or_insert_with(Vec::new).extend(names.iter().cloned());
            }
        }
        Ok(Flow::Next(Value::Nil))
    }

    fn assign(&mut self, target: &Target, value: Value, frame: &mut Frame) -> Result<(), EvalError> {
        match target {
            Target::Name(name) => {
                frame.bind(name, value);
                Ok(())
            }
            Target::Attr(object, name) => match self.eval(object, frame)? {
                Value::Instance(instance) => instance.set_attr(name, value),
                Value::Module(module) => {
                    module.namespace.set(name.clone(), value);
                    Ok(())
                }
                Value::Type(class) => Err(EvalError::new(format!(
                    "TypeError: cannot set '{name}' on type '{}', redefine the class instead",
                    class.name()
                ))),
                other => Err(EvalError::new(format!(
                    "AttributeError: '{}' object attributes are read-only",
                    other.type_name()
                ))),
            },
        }
    }

    fn delete(&mut self, target: &Target, frame: &mut Frame) -> Result<(), EvalError> {
        match target {
            Target::Name(name) => {
                if frame.unbind(name) {
                    Ok(())
                } else {
                    Err(not_defined(name))
                }
            }
            Target::Attr(object, name) => {
                let object = self.eval(object, frame)?;
                let removed = match &object {
                    Value::Instance(instance) => instance.remove_attr(name).is_some(),
                    Value::Module(module) => module.namespace.remove(name).is_some(),
                    _ => false,
                };
                if removed {
                    Ok(())
                } else {
                    Err(no_attribute(&object, name))
                }
            }
        }
    }

    fn define_function(&mut self, decl: &Arc<FnDecl>, frame: &Frame) -> Result<Value, EvalError> {
        let defaults = decl
            .params
            .iter()
            .map(|param| param.default.as_ref().map(|expr| self.eval(expr, frame)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Func(Arc::new(Function::new(
            decl.clone(),
            defaults,
            frame.scope.globals(),
        ))))
    }

    fn define_class(&mut self, decl: &ClassDecl, frame: &Frame) -> Result<Arc<TypeDef>, EvalError> {
        let mut parents = Vec::with_capacity(decl.bases.len());
        for base in &decl.bases {
            match self.eval(base, frame)? {
                Value::Type(class) => parents.push(class),
                other => {
                    return Err(EvalError::new(format!(
                        "TypeError: cannot derive '{}' from a '{}' value",
                        decl.name,
                        other.type_name()
                    )));
                }
            }
        }
        let mut body = Frame::new(FrameKind::Class, frame.scope);
        self.exec_block(&decl.body, &mut body)?;
        debug!(class = decl.name.as_str(), members = body.locals.len(), "class defined");
        Ok(TypeDef::new(decl.name.clone(), parents, body.locals, body.slots))
    }

    // Returns the loaded module's namespace, loading it from the module path
    // on first use.
    fn load_module(&mut self, name: &str) -> Result<NamespaceRef, EvalError> {
        let runtime = self.runtime;
        let modules = &runtime.modules;
        if let Some(ns) = modules.get(name) {
            return Ok(ns);
        }
        let path = modules
            .locate(name)
            .ok_or_else(|| EvalError::new(format!("ImportError: no module named '{name}'")))?;
        let source = std::fs::read_to_string(&path).map_err(|e| {
            EvalError::new(format!("ImportError: cannot read {}: {e}", path.display()))
        })?;
        info!(module = name, path = %path.display(), "loading module");
        let ns = modules.register(name);
        let loaded = parse_program(&source).and_then(|program| self.run(&program, &ns));
        match loaded {
            Ok(_) => Ok(ns),
            Err(e) => {
                modules.remove(name);
                Err(e.within(format!("while importing {name} ({})", path.display())))
            }
        }
    }

    fn eval(&mut self, expr: &Expr, frame: &Frame) -> Result<Value, EvalError> {
        Ok(match expr {
            Expr::Nil => Value::Nil,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Str(s) => Value::str(s),
            Expr::List(items) => Value::list(
                items
                    .iter()
                    .map(|item| self.eval(item, frame))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Name(name) => frame.lookup(name).ok_or_else(|| not_defined(name))?,
            Expr::Attr(object, name) => {
                let object = self.eval(object, frame)?;
                get_attr(&object, name)?
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let callee = self.eval(callee, frame)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, arg)| Ok((name.clone(), self.eval(arg, frame)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                self.call(&callee, args, kwargs)?
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                binary(*op, &lhs, &rhs)?
            }
            Expr::Not(inner) => Value::Bool(!self.eval(inner, frame)?.truthy()),
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                if lhs.truthy() { self.eval(rhs, frame)? } else { lhs }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                if lhs.truthy() { lhs } else { self.eval(rhs, frame)? }
            }
        })
    }

    fn call(
        &mut self,
        callee: &Value,
        mut args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        match callee {
            Value::Func(function) => self.call_function(function, args, kwargs),
            Value::Method(method) => {
                args.insert(0, method.receiver.clone());
                self.call_function(&method.function, args, kwargs)
            }
            Value::Builtin(builtin) => {
                if !kwargs.is_empty() {
                    return Err(EvalError::new(format!(
                        "TypeError: {}() takes no keyword arguments",
                        builtin.name
                    )));
                }
                (builtin.func)(&args)
            }
            Value::Type(class) => {
                let instance = self.runtime.instances.instantiate(class);
                let receiver = Value::Instance(instance);
                match class.lookup("init") {
                    Some(Value::Func(init)) => {
                        args.insert(0, receiver.clone());
                        self.call_function(&init, args, kwargs)?;
                    }
                    _ if !args.is_empty() || !kwargs.is_empty() => {
                        return Err(EvalError::new(format!(
                            "TypeError: {}() takes no arguments",
                            class.name()
                        )));
                    }
                    _ => (),
                }
                Ok(receiver)
            }
            other => Err(EvalError::new(format!(
                "TypeError: '{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::new(
                "RecursionError: maximum call depth exceeded",
            ));
        }
        let globals = function.globals().clone();
        let mut frame = Frame::new(FrameKind::Function, &globals);
        bind_arguments(function, args, kwargs, &mut frame.locals)?;

        self.depth += 1;
        let flow = self.exec_block(&function.decl().body, &mut frame);
        self.depth -= 1;
        match flow {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Next(_)) => Ok(Value::Nil),
            Err(e) => Err(e.within(format!("in {} ({})", function.name(), globals.name()))),
        }
    }
}

fn bind_arguments(
    function: &Function,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    locals: &mut Bindings,
) -> Result<(), EvalError> {
    let params = &function.decl().params;
    if args.len() > params.len() {
        return Err(EvalError::new(format!(
            "TypeError: {}() takes {} positional argument(s) but {} were given",
            function.name(),
            params.len(),
            args.len()
        )));
    }
    for (param, arg) in params.iter().zip(args) {
        locals.insert(param.name.clone(), arg);
    }
    for (name, value) in kwargs {
        if !params.iter().any(|param| param.name == name) {
            return Err(EvalError::new(format!(
                "TypeError: {}() got an unexpected keyword argument '{name}'",
                function.name()
            )));
        }
        if locals.contains_key(&name) {
            return Err(EvalError::new(format!(
                "TypeError: {}() got multiple values for argument '{name}'",
                function.name()
            )));
        }
        locals.insert(name, value);
    }
    for (param, default) in params.iter().zip(function.defaults()) {
        if locals.contains_key(&param.name) {
            continue;
        }
        match default {
            Some(value) => {
                locals.insert(param.name.clone(), value.clone());
            }
            None => {
                return Err(EvalError::new(format!(
                    "TypeError: {}() missing required argument '{}'",
                    function.name(),
                    param.name
                )));
            }
        }
    }
    Ok(())
}

fn get_attr(object: &Value, name: &str) -> Result<Value, EvalError> {
    let found = match object {
        Value::Instance(instance) => instance.own_attr(name).or_else(|| {
            instance.class().lookup(name).map(|member| match member {
                Value::Func(function) => Value::Method(Arc::new(BoundMethod {
                    receiver: object.clone(),
                    function,
                })),
                other => other,
            })
        }),
        Value::Type(class) => class.lookup(name),
        Value::Module(module) => module.namespace.get(name),
        _ => None,
    };
    found.ok_or_else(|| no_attribute(object, name))
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;

    let ordering = |lhs: &Value, rhs: &Value| -> Option<Ordering> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    };
    let unsupported = |symbol: &str| {
        EvalError::new(format!(
            "TypeError: unsupported operand types for {symbol}: '{}' and '{}'",
            lhs.type_name(),
            rhs.type_name()
        ))
    };
    let overflow = || EvalError::new("OverflowError: integer overflow");

    Ok(match op {
        BinOp::Add => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(*b).ok_or_else(overflow)?),
            (Value::Str(a), Value::Str(b)) => Value::str(format!("{a}{b}")),
            (Value::List(a), Value::List(b)) => {
                Value::list(a.iter().chain(b.iter()).cloned().collect())
            }
            _ => return Err(unsupported("+")),
        },
        BinOp::Sub => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_sub(*b).ok_or_else(overflow)?),
            _ => return Err(unsupported("-")),
        },
        BinOp::Eq => Value::Bool(lhs.equals(rhs)),
        BinOp::Ne => Value::Bool(!lhs.equals(rhs)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let symbol = match op {
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                _ => ">=",
            };
            let order = ordering(lhs, rhs).ok_or_else(|| unsupported(symbol))?;
            Value::Bool(match op {
                BinOp::Lt => order.is_lt(),
                BinOp::Le => order.is_le(),
                BinOp::Gt => order.is_gt(),
                _ => order.is_ge(),
            })
        }
    })
}

fn not_defined(name: &str) -> EvalError {
    EvalError::new(format!("NameError: name '{name}' is not defined"))
}

fn no_attribute(object: &Value, name: &str) -> EvalError {
    match object {
        Value::Module(module) => EvalError::new(format!(
            "AttributeError: module '{}' has no attribute '{name}'",
            module.name
        )),
        other => EvalError::new(format!(
            "AttributeError: '{}' object has no attribute '{name}'",
            other.type_name()
        )),
    }
}
