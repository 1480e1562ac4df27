//=============================================
// sciblock/interpreter/mod.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tree-walking interpreter for snippets
// Objective: Execute a parsed snippet against an open namespace while
//            tracking origin-tagged call frames, so every exception
//            carries a traceback that can be filtered by origin
//=============================================

pub mod builtins;
pub mod errors;
pub mod methods;
pub mod ops;
pub mod value;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Literal, LogicalOp, Program, Stmt, StmtKind, Target};

pub use errors::{CompileError, Exception, ExceptionKind, Frame, RuntimeError};
use ops::Subscript;
pub use value::{CallArgs, DictKey, Function, Module, NativeFunction, Scope, Value};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
pub const MODULE_FUNCTION: &str = "<module>";

/// Interpreter state for a single run. Globals are the caller's namespace;
/// they are handed back with [`Interpreter::into_globals`].
pub struct Interpreter {
    origin: Rc<str>,
    globals: HashMap<String, Value>,
    builtins: HashMap<String, Value>,
    scopes: Vec<Rc<Scope>>,
    frames: Vec<Frame>,
    max_call_depth: usize,
    output: String,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut globals: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        globals.sort_unstable();
        f.debug_struct("Interpreter")
            .field("origin", &self.origin)
            .field("globals", &globals)
            .field("frames", &self.frames)
            .field("max_call_depth", &self.max_call_depth)
            .finish_non_exhaustive()
    }
}

//=============================================
//            Section 1: Construction and Entry
//=============================================

impl Interpreter {
    pub fn new(origin: &str, globals: HashMap<String, Value>) -> Self {
        Self {
            origin: Rc::from(origin),
            globals,
            builtins: builtins::builtin_table(),
            scopes: Vec::new(),
            frames: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            output: String::new(),
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth.max(1);
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub fn into_globals(self) -> HashMap<String, Value> {
        self.globals
    }

    /// Text written by `print` since the last call.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Runs a program at module level. Any escaping failure comes back as an
    /// exception with its traceback attached.
    pub fn execute(&mut self, program: &Program) -> Result<(), Exception> {
        self.frames
            .push(Frame::new(self.origin.clone(), MODULE_FUNCTION, 0));
        let outcome = self.exec_block(&program.statements).map_err(|err| {
            let mut exception = err.into_exception();
            if exception.traceback.is_none() {
                exception.traceback = Some(self.frames.clone());
            }
            exception
        });
        self.frames.clear();
        self.scopes.clear();
        outcome
    }

    fn set_line(&mut self, line: usize) {
        if line == 0 {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    /// Snapshots the frame stack into an exception that has none yet.
    fn attach_traceback(&self, err: RuntimeError) -> RuntimeError {
        match err {
            RuntimeError::Raised(mut exception) if exception.traceback.is_none() => {
                exception.traceback = Some(self.frames.clone());
                RuntimeError::Raised(exception)
            }
            other => other,
        }
    }

    fn check_depth(&self) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.max_call_depth {
            return Err(RuntimeError::raise(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        Ok(())
    }
}

//=============================================
//            Section 2: Variables
//=============================================

impl Interpreter {
    fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(value) = self.scopes.last().and_then(|scope| scope.lookup(name)) {
            return Ok(value);
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        self.builtins
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::name_error(name))
    }

    fn store(&mut self, name: &str, value: Value) {
        match self.scopes.last() {
            Some(scope) => {
                scope.vars.borrow_mut().insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Index { object, index } => {
                let container = self.eval(object)?;
                let subscript = self.eval_subscript(index)?;
                ops::set_subscript(&container, &subscript, value)
            }
            Target::Attribute { object, name } => {
                let owner = self.eval(object)?;
                Err(RuntimeError::raise(
                    ExceptionKind::AttributeError,
                    format!(
                        "'{}' object attribute '{}' is read-only",
                        owner.type_name(),
                        name
                    ),
                ))
            }
            Target::Tuple(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() < targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }
}

//=============================================
//            Section 3: Statements
//=============================================

impl Interpreter {
    fn exec_block(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for statement in statements {
            self.exec_stmt(statement)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        self.set_line(stmt.line);
        self.exec_stmt_kind(stmt)
            .map_err(|err| self.attach_traceback(err))
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.eval(expr)?;
                Ok(())
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(())
            }
            StmtKind::AugAssign { target, op, value } => self.exec_aug_assign(target, *op, value),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition)?.is_truthy()? {
                    self.exec_block(then_branch)
                } else {
                    self.exec_block(else_branch)
                }
            }
            StmtKind::While { condition, body } => {
                loop {
                    self.set_line(stmt.line);
                    if !self.eval(condition)?.is_truthy()? {
                        break;
                    }
                    match self.exec_block(body) {
                        Ok(()) | Err(RuntimeError::Continue) => {}
                        Err(RuntimeError::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            StmtKind::For {
                target,
                iterable,
                body,
            } => {
                let items = ops::iterate(&self.eval(iterable)?)?;
                for item in items {
                    self.set_line(stmt.line);
                    self.assign(target, item)?;
                    match self.exec_block(body) {
                        Ok(()) | Err(RuntimeError::Continue) => {}
                        Err(RuntimeError::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            StmtKind::FunctionDef(decl) => {
                let function = self.make_function(decl)?;
                self.store(&decl.name, function);
                Ok(())
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Err(RuntimeError::Return(value))
            }
            StmtKind::Raise(value) => Err(self.exec_raise(value.as_ref())?),
            StmtKind::Assert { condition, message } => {
                if self.eval(condition)?.is_truthy()? {
                    return Ok(());
                }
                let message = match message {
                    Some(expr) => self.eval(expr)?.to_string(),
                    None => String::new(),
                };
                Err(RuntimeError::raise(ExceptionKind::AssertionError, message))
            }
            StmtKind::Import { path, alias } => {
                let canonical = path.join(".");
                let module = self.find_module(&canonical)?;
                match alias {
                    Some(alias) => self.store(alias, module),
                    None => {
                        let root = self.find_module(&path[0])?;
                        self.store(&path[0], root);
                    }
                }
                Ok(())
            }
            StmtKind::ImportFrom { path, names } => {
                let canonical = path.join(".");
                let module = self.find_module(&canonical)?;
                for (name, alias) in names {
                    let member = match methods::attribute(&module, name) {
                        Ok(member) => member,
                        Err(_) => self.find_module(&format!("{}.{}", canonical, name)).map_err(|_| {
                            RuntimeError::raise(
                                ExceptionKind::ImportError,
                                format!("cannot import name '{}' from '{}'", name, canonical),
                            )
                        })?,
                    };
                    self.store(alias.as_ref().unwrap_or(name), member);
                }
                Ok(())
            }
            StmtKind::Break => Err(RuntimeError::Break),
            StmtKind::Continue => Err(RuntimeError::Continue),
            StmtKind::Pass => Ok(()),
        }
    }

    fn exec_aug_assign(&mut self, target: &Target, op: BinaryOp, value: &Expr) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = self.apply_in_place(op, &current, &rhs)?;
                self.store(name, updated);
                Ok(())
            }
            Target::Index { object, index } => {
                let container = self.eval(object)?;
                let subscript = self.eval_subscript(index)?;
                let current = ops::get_subscript(&container, &subscript)?;
                let rhs = self.eval(value)?;
                let updated = self.apply_in_place(op, &current, &rhs)?;
                ops::set_subscript(&container, &subscript, updated)
            }
            other => {
                let current = self.eval_target(other)?;
                let rhs = self.eval(value)?;
                let updated = self.apply_in_place(op, &current, &rhs)?;
                self.assign(other, updated)
            }
        }
    }

    /// `+=` extends lists and updates arrays in place, like the mutable
    /// sequence types it mirrors.
    fn apply_in_place(&mut self, op: BinaryOp, current: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        match (current, op) {
            (Value::List(items), BinaryOp::Add) => {
                let extra = ops::iterate(rhs)?;
                items.borrow_mut().extend(extra);
                Ok(current.clone())
            }
            (Value::Array(data), _) => {
                let result = ops::binary(op, current, rhs)?;
                if let Value::Array(updated) = &result {
                    let updated = updated.borrow();
                    if updated.len() == data.borrow().len() {
                        data.borrow_mut().copy_from_slice(&updated);
                        return Ok(current.clone());
                    }
                }
                Ok(result)
            }
            _ => ops::binary(op, current, rhs),
        }
    }

    fn eval_target(&mut self, target: &Target) -> Result<Value, RuntimeError> {
        match target {
            Target::Name(name) => self.lookup(name),
            Target::Index { object, index } => {
                let container = self.eval(object)?;
                let subscript = self.eval_subscript(index)?;
                ops::get_subscript(&container, &subscript)
            }
            Target::Attribute { object, name } => {
                let owner = self.eval(object)?;
                methods::attribute(&owner, name)
            }
            Target::Tuple(_) => Err(RuntimeError::raise(
                ExceptionKind::SyntaxError,
                "illegal expression for augmented assignment",
            )),
        }
    }

    fn exec_raise(&mut self, value: Option<&Expr>) -> Result<RuntimeError, RuntimeError> {
        let Some(expr) = value else {
            return Ok(RuntimeError::raise(
                ExceptionKind::RuntimeError,
                "No active exception to reraise",
            ));
        };
        match self.eval(expr)? {
            Value::Exception(exception) => Ok(RuntimeError::Raised(Exception::new(
                exception.kind,
                exception.message.clone(),
            ))),
            Value::ExceptionType(kind) => Ok(RuntimeError::raise(kind, "")),
            other => Ok(RuntimeError::type_error(format!(
                "exceptions must derive from BaseException, not '{}'",
                other.type_name()
            ))),
        }
    }

    /// Resolves a canonical module name against the library handles present
    /// in the namespace, including their submodules.
    fn find_module(&self, canonical: &str) -> Result<Value, RuntimeError> {
        fn search(value: &Value, canonical: &str, depth: usize) -> Option<Value> {
            let Value::Module(module) = value else {
                return None;
            };
            if module.name == canonical {
                return Some(value.clone());
            }
            if depth == 0 || !canonical.starts_with(&format!("{}.", module.name)) {
                return None;
            }
            module
                .members
                .values()
                .find_map(|member| search(member, canonical, depth - 1))
        }
        self.globals
            .values()
            .find_map(|value| search(value, canonical, 4))
            .ok_or_else(|| {
                RuntimeError::raise(
                    ExceptionKind::ModuleNotFoundError,
                    format!("No module named '{}'", canonical),
                )
            })
    }
}

//=============================================
//            Section 4: Expressions
//=============================================

impl Interpreter {
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::str(s),
            }),
            ExprKind::Name(name) => {
                self.set_line(expr.line);
                self.lookup(name)
            }
            ExprKind::List(items) => {
                let values = self.eval_all(items)?;
                Ok(Value::list(values))
            }
            ExprKind::Tuple(items) => {
                let values = self.eval_all(items)?;
                Ok(Value::tuple(values))
            }
            ExprKind::Dict(entries) => {
                let mut map = indexmap::IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    self.set_line(expr.line);
                    map.insert(DictKey::from_value(&key)?, value);
                }
                Ok(Value::dict(map))
            }
            ExprKind::Attribute { object, name } => {
                let owner = self.eval(object)?;
                self.set_line(expr.line);
                methods::attribute(&owner, name)
            }
            ExprKind::Call {
                callee,
                args,
                kwargs,
            } => {
                let function = self.eval(callee)?;
                let positional = self.eval_all(args)?;
                let mut keywords = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    keywords.push((name.clone(), self.eval(value)?));
                }
                self.set_line(expr.line);
                self.call_value(&function, positional, keywords)
            }
            ExprKind::Index { object, index } => {
                let container = self.eval(object)?;
                let subscript = self.eval_subscript(index)?;
                self.set_line(expr.line);
                ops::get_subscript(&container, &subscript)
            }
            ExprKind::Slice { .. } => Err(RuntimeError::raise(
                ExceptionKind::SyntaxError,
                "slice outside of subscript",
            )),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                self.set_line(expr.line);
                ops::unary(*op, &value)
            }
            ExprKind::Binary { op, left, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                self.set_line(expr.line);
                ops::binary(*op, &lhs, &rhs)
            }
            ExprKind::Compare { left, links } => {
                let mut lhs = self.eval(left)?;
                let mut result = Value::Bool(true);
                for (n, (op, right)) in links.iter().enumerate() {
                    let rhs = self.eval(right)?;
                    self.set_line(expr.line);
                    result = ops::compare(*op, &lhs, &rhs)?;
                    if n + 1 < links.len() && !result.is_truthy()? {
                        return Ok(result);
                    }
                    lhs = rhs;
                }
                Ok(result)
            }
            ExprKind::Logical { op, left, right } => {
                let lhs = self.eval(left)?;
                let truthy = lhs.is_truthy()?;
                match (op, truthy) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(lhs),
                    _ => self.eval(right),
                }
            }
            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                if self.eval(condition)?.is_truthy()? {
                    self.eval(then_value)
                } else {
                    self.eval(else_value)
                }
            }
            ExprKind::Lambda(decl) => self.make_function(decl),
            ExprKind::ListComp {
                element,
                target,
                iterable,
                conditions,
            } => self.eval_list_comp(element, target, iterable, conditions),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_subscript(&mut self, index: &Expr) -> Result<Subscript, RuntimeError> {
        let ExprKind::Slice { lower, upper, step } = &index.kind else {
            return Ok(Subscript::Item(self.eval(index)?));
        };
        let mut bound = |part: &Option<Box<Expr>>| -> Result<Option<i64>, RuntimeError> {
            let Some(expr) = part else {
                return Ok(None);
            };
            match self.eval(expr)? {
                Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    RuntimeError::type_error(
                        "slice indices must be integers or None or have an __index__ method",
                    )
                }),
            }
        };
        Ok(Subscript::Slice {
            lower: bound(lower)?,
            upper: bound(upper)?,
            step: bound(step)?,
        })
    }

    fn eval_list_comp(
        &mut self,
        element: &Expr,
        target: &Target,
        iterable: &Expr,
        conditions: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let items = ops::iterate(&self.eval(iterable)?)?;
        self.scopes.push(Scope::child_of(self.scopes.last().cloned()));
        let result = self.collect_comprehension(items, element, target, conditions);
        self.scopes.pop();
        result
    }

    fn collect_comprehension(
        &mut self,
        items: Vec<Value>,
        element: &Expr,
        target: &Target,
        conditions: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let mut out = Vec::new();
        'items: for item in items {
            self.assign(target, item)?;
            for condition in conditions {
                if !self.eval(condition)?.is_truthy()? {
                    continue 'items;
                }
            }
            out.push(self.eval(element)?);
        }
        Ok(Value::list(out))
    }

    fn make_function(&mut self, decl: &Rc<FunctionDecl>) -> Result<Value, RuntimeError> {
        let mut defaults = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Function {
            decl: decl.clone(),
            defaults,
            enclosing: self.scopes.last().cloned(),
            origin: self.origin.clone(),
        })))
    }
}

//=============================================
//            Section 5: Calls
//=============================================

impl Interpreter {
    /// Calls any callable value. Library routines use this to invoke snippet
    /// callbacks, which then run in their own snippet frames.
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Native(native) => self.call_native(native, args, kwargs),
            Value::ExceptionType(kind) => {
                let message = match args.as_slice() {
                    [] => String::new(),
                    [single] => single.to_string(),
                    many => Value::tuple(many.to_vec()).repr(),
                };
                Ok(Value::Exception(Rc::new(Exception::new(*kind, message))))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        self.check_depth()?;
        let decl = &function.decl;
        let scope = Scope::child_of(function.enclosing.clone());
        self.bind_parameters(function, &scope, args, kwargs)?;

        self.frames
            .push(Frame::new(function.origin.clone(), decl.name.as_str(), decl.line));
        self.scopes.push(scope);
        let outcome = self.exec_block(&decl.body);
        self.scopes.pop();
        self.frames.pop();

        match outcome {
            Ok(()) => Ok(Value::None),
            Err(RuntimeError::Return(value)) => Ok(value),
            Err(RuntimeError::Raised(exception)) => Err(RuntimeError::Raised(exception)),
            Err(control) => Err(RuntimeError::Raised(control.into_exception())),
        }
    }

    fn bind_parameters(
        &self,
        function: &Function,
        scope: &Scope,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<(), RuntimeError> {
        let decl = &function.decl;
        let params = &decl.params;
        if args.len() > params.len() {
            return Err(RuntimeError::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                decl.name,
                params.len(),
                if params.len() == 1 { "" } else { "s" },
                args.len(),
                if args.len() == 1 { "was" } else { "were" }
            )));
        }
        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(params.len(), None);
        for (name, value) in kwargs {
            let Some(at) = params.iter().position(|param| param.name == name) else {
                return Err(RuntimeError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    decl.name, name
                )));
            };
            if slots[at].is_some() {
                return Err(RuntimeError::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    decl.name, name
                )));
            }
            slots[at] = Some(value);
        }
        let mut missing = Vec::new();
        let mut vars = scope.vars.borrow_mut();
        for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
            match slot.or_else(|| default.clone()) {
                Some(value) => {
                    vars.insert(param.name.clone(), value);
                }
                None => missing.push(format!("'{}'", param.name)),
            }
        }
        if !missing.is_empty() {
            return Err(RuntimeError::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                decl.name,
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                missing.join(" and ")
            )));
        }
        Ok(())
    }

    fn call_native(
        &mut self,
        native: &Rc<NativeFunction>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        self.check_depth()?;
        self.frames
            .push(Frame::new(native.origin.clone(), native.name.clone(), 0));
        let call = CallArgs::new(native.name.clone(), args, kwargs);
        let outcome = (native.func)(self, call).map_err(|err| self.attach_traceback(err));
        self.frames.pop();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    const ORIGIN: &str = "<test_block>";

    fn run(source: &str) -> Result<Interpreter, Exception> {
        let program = parse_source(source).expect("parse");
        let mut interp = Interpreter::new(ORIGIN, HashMap::new());
        interp.execute(&program)?;
        Ok(interp)
    }

    fn global(interp: &Interpreter, name: &str) -> String {
        interp.globals().get(name).expect("global").repr()
    }

    fn snippet_line(exception: &Exception) -> Option<usize> {
        exception
            .traceback
            .as_ref()?
            .iter()
            .rev()
            .find(|frame| &*frame.origin == ORIGIN)
            .map(|frame| frame.line)
    }

    #[test]
    fn test_arithmetic_and_control_flow() {
        let interp = run("total = 0\nfor i in range(5):\n    if i % 2 == 0:\n        continue\n    total += i\n").unwrap();
        assert_eq!(global(&interp, "total"), "4");
    }

    #[test]
    fn test_functions_defaults_and_closures() {
        let source = "def make(k=2):\n    def scale(x):\n        return x * k\n    return scale\n\nf = make()\ny = f(5)\ng = lambda a, b=1: a - b\nz = g(b=3, a=10)\n";
        let interp = run(source).unwrap();
        assert_eq!(global(&interp, "y"), "10");
        assert_eq!(global(&interp, "z"), "7");
    }

    #[test]
    fn test_tuple_unpacking_and_comprehension() {
        let interp = run("a, b = 1, 2\nsq = [x * x for x in range(4) if x != a]\n").unwrap();
        assert_eq!(global(&interp, "b"), "2");
        assert_eq!(global(&interp, "sq"), "[0, 4, 9]");
    }

    #[test]
    fn test_error_line_is_failing_statement() {
        let err = run("x = 1\ny = 2\nz = x / 0\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
        assert_eq!(snippet_line(&err), Some(3));
    }

    #[test]
    fn test_error_inside_helper_reports_helper_line() {
        let err = run("def f(v):\n    return v['missing']\n\nf({})\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
        assert_eq!(err.message, "'missing'");
        assert_eq!(snippet_line(&err), Some(2));
    }

    #[test]
    fn test_native_failure_reports_call_site() {
        let err = run("items = [1, 2]\nvalue = sum(items, 'x')\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TypeError);
        let traceback = err.traceback.as_ref().unwrap();
        assert_eq!(&*traceback.last().unwrap().origin, "builtins");
        assert_eq!(snippet_line(&err), Some(2));
    }

    #[test]
    fn test_recursion_limit() {
        let program = parse_source("def f(n):\n    return f(n + 1)\nf(0)\n").unwrap();
        let mut interp = Interpreter::new(ORIGIN, HashMap::new()).with_max_call_depth(50);
        let err = interp.execute(&program).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::RecursionError);
        assert_eq!(snippet_line(&err), Some(2));
    }

    #[test]
    fn test_raise_and_assert() {
        let err = run("raise ValueError('bad input')\n").unwrap_err();
        assert_eq!(err.to_string(), "ValueError: bad input");
        let err = run("x = 3\nassert x < 2, 'x too big'\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::AssertionError);
        assert_eq!(err.message, "x too big");
        assert_eq!(snippet_line(&err), Some(2));
    }

    #[test]
    fn test_return_outside_function() {
        let err = run("x = 1\nreturn x\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::SyntaxError);
        assert_eq!(snippet_line(&err), Some(2));
    }

    #[test]
    fn test_unknown_import() {
        let err = run("import pandas as pd\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ModuleNotFoundError);
        assert_eq!(err.message, "No module named 'pandas'");
    }

    #[test]
    fn test_multiline_expression_reports_operator_line() {
        let err = run("data = {'a': 1}\ntotal = (1 +\n         data['b'])\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::KeyError);
        assert_eq!(snippet_line(&err), Some(3));
    }

    #[test]
    fn test_integer_limits_never_panic() {
        let interp = run(concat!(
            "q = (-9223372036854775807 - 1) // -1\n",
            "r = (-9223372036854775807 - 1) % -1\n",
            "tail = list(range(9223372036854775800, 9223372036854775807, 5))\n",
            "picked = [1, 2, 3][1::9223372036854775807]\n",
        ))
        .unwrap();
        assert_eq!(global(&interp, "q"), "9.223372036854776e+18");
        assert_eq!(global(&interp, "r"), "0");
        assert_eq!(global(&interp, "tail"), "[9223372036854775800, 9223372036854775805]");
        assert_eq!(global(&interp, "picked"), "[2]");

        let err = run("x = 1\nbig = [1, 2] * 9223372036854775807\n").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);
        assert_eq!(snippet_line(&err), Some(2));
    }

    #[test]
    fn test_print_is_captured() {
        let mut interp = run("print('a', 1)\nprint('b', end='')\n").unwrap();
        assert_eq!(interp.take_output(), "a 1\nb");
    }
}
