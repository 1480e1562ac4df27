//=============================================
// sciblock/interpreter/value.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime value model for snippet execution
// Objective: Define values, containers, callables, and conversions to and
//            from JSON used at the host boundary
//=============================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use super::Interpreter;
use super::errors::{Exception, ExceptionKind, RuntimeError};
use crate::ast::FunctionDecl;

//=============================================
//            Section 1: Values
//=============================================

pub type List = Rc<RefCell<Vec<Value>>>;
pub type Dict = Rc<RefCell<IndexMap<DictKey, Value>>>;
pub type FloatArray = Rc<RefCell<Vec<f64>>>;

/// Snippet runtime value types
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(List),
    Tuple(Rc<Vec<Value>>),
    Dict(Dict),
    /// One-dimensional float array with element-wise arithmetic.
    Array(FloatArray),
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
    Module(Rc<Module>),
    Record(Rc<Record>),
    Exception(Rc<Exception>),
    ExceptionType(ExceptionKind),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn array(data: Vec<f64>) -> Self {
        Value::Array(Rc::new(RefCell::new(data)))
    }

    pub fn dict(entries: IndexMap<DictKey, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn record(type_name: &str, fields: IndexMap<String, Value>) -> Self {
        Value::Record(Rc::new(Record {
            type_name: type_name.to_string(),
            fields,
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Array(_) => "ndarray",
            Value::Function(_) => "function",
            Value::Native(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::Record(_) => "object",
            Value::Exception(_) => "exception",
            Value::ExceptionType(_) => "type",
        }
    }

    /// Truthiness; arrays with more than one element are ambiguous.
    pub fn is_truthy(&self) -> Result<bool, RuntimeError> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Array(data) => {
                let data = data.borrow();
                match data.len() {
                    0 => false,
                    1 => data[0] != 0.0,
                    _ => {
                        return Err(RuntimeError::value_error(
                            "The truth value of an array with more than one element is ambiguous. Use a.any() or a.all()",
                        ));
                    }
                }
            }
            _ => true,
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Copies containers recursively so the copy shares no mutable storage
    /// with the original. Callables and modules stay shared.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(items) => Value::list(items.borrow().iter().map(Value::deep_copy).collect()),
            Value::Tuple(items) => Value::tuple(items.iter().map(Value::deep_copy).collect()),
            Value::Dict(entries) => Value::dict(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            Value::Array(data) => Value::array(data.borrow().clone()),
            other => other.clone(),
        }
    }

    /// Python-style `repr()`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote_str(s),
            other => other.render(true),
        }
    }

    fn render(&self, nested: bool) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) if nested => quote_str(s),
            Value::Str(s) => s.to_string(),
            Value::List(items) => format!(
                "[{}]",
                items
                    .borrow()
                    .iter()
                    .map(Value::repr)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Value::Dict(entries) => format!(
                "{{{}}}",
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_value().repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Array(data) => format!(
                "array([{}])",
                data.borrow()
                    .iter()
                    .map(|v| format_float(*v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Function(function) => format!("<function {}>", function.decl.name),
            Value::Native(native) => format!("<built-in function {}>", native.name),
            Value::Module(module) => format!("<module '{}'>", module.name),
            Value::Record(record) => format!(
                "{}({})",
                record.type_name,
                record
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Exception(exception) => {
                format!("{}({})", exception.kind, quote_str(&exception.message))
            }
            Value::ExceptionType(kind) => format!("<class '{}'>", kind),
        }
    }
}

/// `str()` rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Exception(exception) => f.write_str(&exception.message),
            other => f.write_str(&other.render(false)),
        }
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    if !(-4..16).contains(&exponent) {
        let text = format!("{:e}", value);
        return match text.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => text,
        };
    }
    let text = format!("{}", value);
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

//=============================================
//            Section 2: Equality
//=============================================

/// Scalar `==` semantics; containers compare element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (None, None) => true,
        (Str(x), Str(y)) => x == y,
        (List(x), List(y)) => {
            Rc::ptr_eq(x, y) || sequences_equal(&x.borrow(), &y.borrow())
        }
        (Tuple(x), Tuple(y)) => sequences_equal(x, y),
        (Dict(x), Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Array(x), Array(y)) => *x.borrow() == *y.borrow(),
        (Function(x), Function(y)) => Rc::ptr_eq(x, y),
        (Native(x), Native(y)) => Rc::ptr_eq(x, y),
        (Module(x), Module(y)) => Rc::ptr_eq(x, y),
        (Record(x), Record(y)) => Rc::ptr_eq(x, y),
        (Exception(x), Exception(y)) => Rc::ptr_eq(x, y),
        (ExceptionType(x), ExceptionType(y)) => x == y,
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(p), Some(q)) => p == q,
            _ => false,
        },
    }
}

fn sequences_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

//=============================================
//            Section 3: Dictionary Keys
//=============================================

/// Hashable projection of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<DictKey>),
}

impl DictKey {
    pub fn from_value(value: &Value) -> Result<DictKey, RuntimeError> {
        Ok(match value {
            Value::None => DictKey::None,
            Value::Bool(b) => DictKey::Bool(*b),
            Value::Int(n) => DictKey::Int(*n),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => DictKey::Int(*f as i64),
            Value::Float(f) => DictKey::Float(f.to_bits()),
            Value::Str(s) => DictKey::Str(s.clone()),
            Value::Tuple(items) => DictKey::Tuple(
                items
                    .iter()
                    .map(DictKey::from_value)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )));
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            DictKey::None => Value::None,
            DictKey::Bool(b) => Value::Bool(*b),
            DictKey::Int(n) => Value::Int(*n),
            DictKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            DictKey::Str(s) => Value::Str(s.clone()),
            DictKey::Tuple(items) => Value::tuple(items.iter().map(DictKey::to_value).collect()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DictKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

//=============================================
//            Section 4: Callables, Modules, Records
//=============================================

/// A local variable scope of one function invocation; `parent` is the scope
/// the function was defined in.
#[derive(Debug, Default)]
pub struct Scope {
    pub vars: RefCell<HashMap<String, Value>>,
    pub parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn child_of(parent: Option<Rc<Scope>>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }
}

/// A snippet-defined function or lambda.
#[derive(Debug)]
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    /// Evaluated defaults, one slot per parameter.
    pub defaults: Vec<Option<Value>>,
    pub enclosing: Option<Rc<Scope>>,
    pub origin: Rc<str>,
}

pub type NativeFn = dyn Fn(&mut Interpreter, CallArgs) -> Result<Value, RuntimeError>;

/// A host-implemented function. `origin` names the library it belongs to.
pub struct NativeFunction {
    pub name: Rc<str>,
    pub origin: Rc<str>,
    pub func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(origin: &str, name: &str, func: F) -> Value
    where
        F: Fn(&mut Interpreter, CallArgs) -> Result<Value, RuntimeError> + 'static,
    {
        Value::Native(Rc::new(NativeFunction {
            name: Rc::from(name),
            origin: Rc::from(origin),
            func: Box::new(func),
        }))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish()
    }
}

/// A library handle injected into the namespace.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub members: IndexMap<String, Value>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: IndexMap::new(),
        }
    }

    pub fn function<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Interpreter, CallArgs) -> Result<Value, RuntimeError> + 'static,
    {
        let value = NativeFunction::new(&self.name, name, func);
        self.members.insert(name.to_string(), value);
    }

    pub fn constant(&mut self, name: &str, value: Value) {
        self.members.insert(name.to_string(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Module(Rc::new(self))
    }
}

/// Attribute bag returned by library routines (e.g. optimisation results).
#[derive(Debug)]
pub struct Record {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
}

//=============================================
//            Section 5: Call Arguments
//=============================================

/// Positional and keyword arguments of a native call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub function: Rc<str>,
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(function: Rc<str>, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            function,
            positional,
            keywords,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Argument by position, falling back to its keyword name.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword(name))
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&Value, RuntimeError> {
        self.get(index, name).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{}() missing required argument '{}' (pos {})",
                self.function,
                name,
                index + 1
            ))
        })
    }

    pub fn number(&self, index: usize, name: &str) -> Result<f64, RuntimeError> {
        let value = self.required(index, name)?;
        value.as_f64().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{}() argument '{}' must be a number, not '{}'",
                self.function,
                name,
                value.type_name()
            ))
        })
    }

    pub fn number_or(&self, index: usize, name: &str, default: f64) -> Result<f64, RuntimeError> {
        match self.get(index, name) {
            None | Some(Value::None) => Ok(default),
            Some(_) => self.number(index, name),
        }
    }

    pub fn integer(&self, index: usize, name: &str) -> Result<i64, RuntimeError> {
        let value = self.required(index, name)?;
        value.as_int().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ))
        })
    }

    pub fn string(&self, index: usize, name: &str) -> Result<String, RuntimeError> {
        let value = self.required(index, name)?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{}() argument '{}' must be str, not '{}'",
                self.function,
                name,
                value.type_name()
            ))
        })
    }

    /// Rejects surplus positionals and unknown keywords.
    pub fn check(&self, max_positional: usize, keywords: &[&str]) -> Result<(), RuntimeError> {
        if self.positional.len() > max_positional {
            return Err(RuntimeError::type_error(format!(
                "{}() takes at most {} positional arguments but {} were given",
                self.function,
                max_positional,
                self.positional.len()
            )));
        }
        if let Some((unknown, _)) = self
            .keywords
            .iter()
            .find(|(key, _)| !keywords.contains(&key.as_str()))
        {
            return Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.function, unknown
            )));
        }
        Ok(())
    }
}

//=============================================
//            Section 6: JSON Conversion
//=============================================

/// Converts a host JSON value into a runtime value. Arrays of numbers
/// become float arrays.
pub fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::None,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::str(s),
        JsonValue::Array(items) => {
            if !items.is_empty() && items.iter().all(JsonValue::is_number) {
                Value::array(items.iter().filter_map(JsonValue::as_f64).collect())
            } else {
                Value::list(items.iter().map(json_to_value).collect())
            }
        }
        JsonValue::Object(map) => Value::dict(
            map.iter()
                .map(|(k, v)| (DictKey::Str(Rc::from(k.as_str())), json_to_value(v)))
                .collect(),
        ),
    }
}

/// Converts a runtime value into JSON for the host. Non-finite floats map
/// to null; callables and modules to their repr.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::None => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => JsonValue::from(*n),
        Value::Float(f) => float_to_json(*f),
        Value::Str(s) => JsonValue::String(s.to_string()),
        Value::List(items) => JsonValue::Array(items.borrow().iter().map(value_to_json).collect()),
        Value::Tuple(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Array(data) => {
            JsonValue::Array(data.borrow().iter().map(|f| float_to_json(*f)).collect())
        }
        Value::Dict(entries) => JsonValue::Object(
            entries
                .borrow()
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        DictKey::Str(s) => s.to_string(),
                        other => other.to_value().to_string(),
                    };
                    (key, value_to_json(v))
                })
                .collect(),
        ),
        Value::Record(record) => JsonValue::Object(
            record
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        other => JsonValue::String(other.repr()),
    }
}

fn float_to_json(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formatting_matches_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_repr_and_str() {
        let value = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(value.repr(), "[1, 'a', None]");
        assert_eq!(Value::str("a").to_string(), "a");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(Value::array(vec![1.0, 2.5]).repr(), "array([1.0, 2.5])");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy().unwrap());
        assert!(Value::Int(3).is_truthy().unwrap());
        assert!(!Value::str("").is_truthy().unwrap());
        assert!(Value::array(vec![1.0, 2.0]).is_truthy().is_err());
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(!values_equal(&Value::str("1"), &Value::Int(1)));
    }

    #[test]
    fn test_deep_copy_detaches_containers() {
        let inner = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![inner.clone()]);
        let copy = outer.deep_copy();
        if let Value::List(items) = &inner {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(copy.repr(), "[[1]]");
        assert_eq!(outer.repr(), "[[1, 2]]");
    }

    #[test]
    fn test_dict_keys_reject_unhashable() {
        assert!(DictKey::from_value(&Value::list(Vec::new())).is_err());
        assert_eq!(
            DictKey::from_value(&Value::Float(2.0)).unwrap(),
            DictKey::Int(2)
        );
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"x": [1, 2, 3], "name": "run", "meta": {"ok": true}});
        let value = json_to_value(&json);
        match &value {
            Value::Dict(entries) => {
                let entries = entries.borrow();
                assert!(matches!(
                    entries.get(&DictKey::Str(Rc::from("x"))),
                    Some(Value::Array(_))
                ));
            }
            other => panic!("expected dict, found {other:?}"),
        }
        assert_eq!(
            value_to_json(&value),
            serde_json::json!({"x": [1.0, 2.0, 3.0], "name": "run", "meta": {"ok": true}})
        );
    }
}
