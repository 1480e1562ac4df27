//=============================================
// sciblock/executor.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Compile and run a snippet against a caller-owned namespace
// Objective: Register the source, parse, execute, and turn any failure
//            into one diagnostic that names the snippet line at fault
//=============================================

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::interpreter::{CompileError, DEFAULT_MAX_CALL_DEPTH, Exception, Frame, Interpreter, MODULE_FUNCTION, Value};
use crate::parser::parse_source;
use crate::source_registry::SourceRegistry;

pub const LINE_UNAVAILABLE: &str = "line unavailable";

//=============================================
//            Section 1: Namespace
//=============================================

/// Mutable variable environment a snippet reads and writes.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    vars: HashMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

impl Extend<(String, Value)> for Namespace {
    fn extend<T: IntoIterator<Item = (String, Value)>>(&mut self, iter: T) {
        self.vars.extend(iter);
    }
}

impl FromIterator<(String, Value)> for Namespace {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

//=============================================
//            Section 2: Diagnostics
//=============================================

/// The normalized description of one snippet failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDiagnostic {
    pub line_number: Option<usize>,
    pub line_text: String,
    pub exception_kind: String,
    pub exception_message: String,
    pub location_known: bool,
}

impl ExecutionDiagnostic {
    pub fn at_line(line_number: usize, line_text: String, exception: &Exception) -> Self {
        Self {
            line_number: Some(line_number),
            line_text,
            exception_kind: exception.kind.to_string(),
            exception_message: exception.message.clone(),
            location_known: true,
        }
    }

    pub fn unknown_location(exception: &Exception) -> Self {
        Self {
            line_number: None,
            line_text: LINE_UNAVAILABLE.to_string(),
            exception_kind: exception.kind.to_string(),
            exception_message: exception.message.clone(),
            location_known: false,
        }
    }

    pub fn render(&self) -> String {
        match (self.location_known, self.line_number) {
            (true, Some(line)) => format!(
                "Error in code block at line {}: >>> {}\n{}: {}",
                line, self.line_text, self.exception_kind, self.exception_message
            ),
            _ => format!(
                "Error in code block at unknown location: >>> {}\n{}: {}",
                self.line_text, self.exception_kind, self.exception_message
            ),
        }
    }
}

impl fmt::Display for ExecutionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for ExecutionDiagnostic {}

/// Builds the diagnostic for an exception raised by code registered under
/// `virtual_id`: the innermost frame with that origin is the failure site.
pub fn diagnose(registry: &SourceRegistry, virtual_id: &str, exception: &Exception) -> ExecutionDiagnostic {
    let site = exception.traceback.as_deref().and_then(|frames| {
        frames
            .iter()
            .rev()
            .find(|frame| &*frame.origin == virtual_id)
    });
    match site {
        Some(frame) if frame.line > 0 => ExecutionDiagnostic::at_line(
            frame.line,
            registry.resolve_line(virtual_id, frame.line),
            exception,
        ),
        _ => ExecutionDiagnostic::unknown_location(exception),
    }
}

//=============================================
//            Section 3: Executor
//=============================================

/// Runs snippets. Holds no state between calls apart from the process-wide
/// source registry.
#[derive(Debug, Clone)]
pub struct Executor {
    max_call_depth: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Compiles `code` under `virtual_id` and runs it with `namespace` as its
    /// global scope. On success the same namespace comes back, mutated by
    /// the snippet.
    pub fn run<'a>(
        &self,
        virtual_id: &str,
        code: &str,
        namespace: &'a mut Namespace,
    ) -> Result<&'a mut Namespace, ExecutionDiagnostic> {
        let registry = SourceRegistry::global();
        registry.register(virtual_id, code);

        let program = match parse_source(code) {
            Ok(program) => program,
            Err(err) => {
                let compile = CompileError::from(err);
                let mut exception = compile.exception;
                if let Some(line) = compile.line {
                    exception.traceback = Some(vec![Frame::new(virtual_id.into(), MODULE_FUNCTION, line)]);
                }
                let diagnostic = diagnose(registry, virtual_id, &exception);
                warn!(virtual_id, diagnostic = %diagnostic, "snippet failed to compile");
                return Err(diagnostic);
            }
        };
        debug!(virtual_id, statements = program.statements.len(), "compiled snippet");

        let globals = std::mem::take(&mut namespace.vars);
        let mut interp = Interpreter::new(virtual_id, globals).with_max_call_depth(self.max_call_depth);
        let outcome = interp.execute(&program);
        let output = interp.take_output();
        namespace.vars = interp.into_globals();
        if !output.is_empty() {
            debug!(virtual_id, bytes = output.len(), "snippet produced output");
        }

        match outcome {
            Ok(()) => Ok(namespace),
            Err(exception) => {
                let diagnostic = diagnose(registry, virtual_id, &exception);
                warn!(virtual_id, diagnostic = %diagnostic, "snippet raised");
                Err(diagnostic)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ExceptionKind;

    #[test]
    fn test_render_known_and_unknown() {
        let exception = Exception::new(ExceptionKind::ValueError, "bad");
        let known = ExecutionDiagnostic::at_line(3, "x = f()".to_string(), &exception);
        assert_eq!(
            known.to_string(),
            "Error in code block at line 3: >>> x = f()\nValueError: bad"
        );
        let unknown = ExecutionDiagnostic::unknown_location(&exception);
        assert_eq!(
            unknown.to_string(),
            "Error in code block at unknown location: >>> line unavailable\nValueError: bad"
        );
    }

    #[test]
    fn test_diagnose_takes_innermost_snippet_frame() {
        let registry = SourceRegistry::new();
        registry.register("<blk>", "def f():\n    return 1 / 0\nf()\n");
        let mut exception = Exception::new(ExceptionKind::ZeroDivisionError, "division by zero");
        exception.traceback = Some(vec![
            Frame::new("<blk>".into(), MODULE_FUNCTION, 3),
            Frame::new("<blk>".into(), "f", 2),
            Frame::new("numpy".into(), "sum", 0),
        ]);
        let diagnostic = diagnose(&registry, "<blk>", &exception);
        assert_eq!(diagnostic.line_number, Some(2));
        assert_eq!(diagnostic.line_text, "return 1 / 0");
    }

    #[test]
    fn test_diagnose_without_snippet_frames() {
        let registry = SourceRegistry::new();
        let mut exception = Exception::new(ExceptionKind::RuntimeError, "boom");
        exception.traceback = Some(vec![Frame::new("numpy".into(), "sum", 0)]);
        let diagnostic = diagnose(&registry, "<blk>", &exception);
        assert!(!diagnostic.location_known);
        assert_eq!(diagnostic.line_text, LINE_UNAVAILABLE);
    }

    #[test]
    fn test_run_mutates_namespace_in_place() {
        let mut namespace = Namespace::new();
        namespace.insert("a", Value::Int(2));
        let executor = Executor::new();
        let returned = executor
            .run("<executor_unit_ok>", "b = a * 21\n", &mut namespace)
            .unwrap();
        assert!(matches!(returned.get("b"), Some(Value::Int(42))));
        assert!(namespace.contains("a"));
    }

    #[test]
    fn test_run_restores_namespace_on_failure() {
        let mut namespace = Namespace::new();
        namespace.insert("a", Value::Int(2));
        let err = Executor::new()
            .run("<executor_unit_fail>", "b = 1\nc = missing\n", &mut namespace)
            .unwrap_err();
        assert_eq!(err.line_number, Some(2));
        assert_eq!(err.exception_kind, "NameError");
        assert!(namespace.contains("a"));
        assert!(namespace.contains("b"));
    }

    #[test]
    fn test_syntax_error_line() {
        let mut namespace = Namespace::new();
        let err = Executor::new()
            .run("<executor_unit_syntax>", "x = 1\ny = (2 +\n", &mut namespace)
            .unwrap_err();
        assert_eq!(err.exception_kind, "SyntaxError");
        assert!(err.location_known);
    }
}
