//=============================================
// sciblock/interpreter/errors.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Exception model of the snippet interpreter
// Objective: Exception kinds, call frames, raised exceptions and the
//            control-flow signals that unwind evaluation
//=============================================

use std::fmt;
use std::rc::Rc;

use super::value::Value;
use crate::parser::ParseError;

/// Exception kinds the engine raises; snippets raise the same set through
/// the builtin constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Exception,
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    AttributeError,
    AssertionError,
    RecursionError,
    ModuleNotFoundError,
    ImportError,
    RuntimeError,
    NotImplementedError,
    OverflowError,
    MemoryError,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 17] = [
        ExceptionKind::Exception,
        ExceptionKind::SyntaxError,
        ExceptionKind::NameError,
        ExceptionKind::TypeError,
        ExceptionKind::ValueError,
        ExceptionKind::ZeroDivisionError,
        ExceptionKind::IndexError,
        ExceptionKind::KeyError,
        ExceptionKind::AttributeError,
        ExceptionKind::AssertionError,
        ExceptionKind::RecursionError,
        ExceptionKind::ModuleNotFoundError,
        ExceptionKind::ImportError,
        ExceptionKind::RuntimeError,
        ExceptionKind::NotImplementedError,
        ExceptionKind::OverflowError,
        ExceptionKind::MemoryError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::SyntaxError => "SyntaxError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::AssertionError => "AssertionError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExceptionKind::ImportError => "ImportError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::NotImplementedError => "NotImplementedError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::MemoryError => "MemoryError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the active call chain. `origin` is the virtual identifier
/// for snippet code and the canonical module name for library code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub origin: Rc<str>,
    pub function: Rc<str>,
    pub line: usize,
}

impl Frame {
    pub fn new(origin: Rc<str>, function: impl Into<Rc<str>>, line: usize) -> Self {
        Self {
            origin,
            function: function.into(),
            line,
        }
    }
}

/// A raised exception. The traceback is captured once, outermost frame
/// first, at the innermost point the exception surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
    pub traceback: Option<Vec<Frame>>,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: None,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Non-local exits of evaluation. Only `Raised` may escape a run.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    Raised(Exception),
    Return(Value),
    Break,
    Continue,
}

impl RuntimeError {
    pub fn raise(kind: ExceptionKind, message: impl Into<String>) -> Self {
        RuntimeError::Raised(Exception::new(kind, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::IndexError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::raise(
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        )
    }

    pub fn attribute_error(type_name: &str, attribute: &str) -> Self {
        Self::raise(
            ExceptionKind::AttributeError,
            format!("'{}' object has no attribute '{}'", type_name, attribute),
        )
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::ZeroDivisionError, message)
    }

    /// Converts escaped control flow into the exception it stands for.
    pub fn into_exception(self) -> Exception {
        match self {
            RuntimeError::Raised(exception) => exception,
            RuntimeError::Return(_) => {
                Exception::new(ExceptionKind::SyntaxError, "'return' outside function")
            }
            RuntimeError::Break => Exception::new(ExceptionKind::SyntaxError, "'break' outside loop"),
            RuntimeError::Continue => Exception::new(
                ExceptionKind::SyntaxError,
                "'continue' not properly in loop",
            ),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Raised(exception) => write!(f, "{}", exception),
            RuntimeError::Return(value) => write!(f, "return {}", value.repr()),
            RuntimeError::Break => write!(f, "break"),
            RuntimeError::Continue => write!(f, "continue"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<Exception> for RuntimeError {
    fn from(value: Exception) -> Self {
        RuntimeError::Raised(value)
    }
}

/// Syntax failures keep the compiler's reported line.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub exception: Exception,
    pub line: Option<usize>,
}

impl From<ParseError> for CompileError {
    fn from(value: ParseError) -> Self {
        let line = value.position().line;
        CompileError {
            exception: Exception::new(ExceptionKind::SyntaxError, value.message()),
            line: (line > 0).then_some(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ExceptionKind::ALL {
            assert_eq!(ExceptionKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ExceptionKind::from_name("KeyboardInterrupt"), None);
    }

    #[test]
    fn test_escaped_control_flow_becomes_syntax_error() {
        let exception = RuntimeError::Break.into_exception();
        assert_eq!(exception.kind, ExceptionKind::SyntaxError);
        assert_eq!(exception.message, "'break' outside loop");
    }

    #[test]
    fn test_parse_error_keeps_line() {
        let err = crate::parser::parse_source("x = 1\ny = )\n").unwrap_err();
        let compile = CompileError::from(err);
        assert_eq!(compile.line, Some(2));
        assert_eq!(compile.exception.kind, ExceptionKind::SyntaxError);
    }
}
