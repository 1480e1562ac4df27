//=============================================
// sciblock/interpreter/ops.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Operator semantics for snippet values
// Objective: Arithmetic with float-array broadcasting, comparisons,
//            membership, iteration and subscripting
//=============================================

use std::cmp::Ordering;
use std::rc::Rc;

use super::errors::{ExceptionKind, RuntimeError};
use super::value::{DictKey, Value, values_equal};
use crate::ast::{BinaryOp, CompareOp, UnaryOp};

//=============================================
//            Section 1: Arithmetic
//=============================================

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy()?)),
        (UnaryOp::Negate, Value::Int(n)) => Ok(n
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(*n as f64)))),
        (UnaryOp::Negate, Value::Bool(b)) => Ok(Value::Int(-(*b as i64))),
        (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Negate, Value::Array(data)) => {
            Ok(Value::array(data.borrow().iter().map(|v| -v).collect()))
        }
        (UnaryOp::Plus, Value::Int(_) | Value::Float(_)) => Ok(operand.clone()),
        (UnaryOp::Plus, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (UnaryOp::Plus, Value::Array(data)) => Ok(Value::array(data.borrow().clone())),
        (op, value) => Err(RuntimeError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            match op {
                UnaryOp::Negate => "-",
                UnaryOp::Plus => "+",
                UnaryOp::Not => "not",
            },
            value.type_name()
        ))),
    }
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if matches!(left, Value::Array(_)) || matches!(right, Value::Array(_)) {
        return array_binary(op, left, right);
    }
    match (left, right) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (a, b) = (left.as_int().unwrap_or(0), right.as_int().unwrap_or(0));
            int_binary(op, a, b)
        }
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_)) => {
            let (a, b) = (left.as_f64().unwrap_or(0.0), right.as_f64().unwrap_or(0.0));
            float_binary(op, a, b)
        }
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => {
            Ok(Value::str(format!("{}{}", a, b)))
        }
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if op == BinaryOp::Multiply => {
            let count = repeat_count(s.len(), *n)?;
            Ok(Value::str(s.repeat(count)))
        }
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items))
            if op == BinaryOp::Multiply =>
        {
            let items = items.borrow();
            let count = repeat_count(items.len(), *n)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == BinaryOp::Add => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

/// Upper bound on the length of any sequence the runtime materialises.
pub const MAX_SEQUENCE_LEN: usize = 1 << 26;

/// Repetition count for `seq * n`, rejecting results past the length cap.
fn repeat_count(len: usize, n: i64) -> Result<usize, RuntimeError> {
    let count = usize::try_from(n.max(0)).unwrap_or(usize::MAX);
    if len == 0 || count == 0 {
        return Ok(0);
    }
    match len.checked_mul(count) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(count),
        _ => Err(RuntimeError::raise(
            ExceptionKind::MemoryError,
            "cannot fit repeated sequence into memory",
        )),
    }
}

fn unsupported(symbol: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let promoted = |result: Option<i64>| {
        result
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(apply_float(op, a as f64, b as f64)))
    };
    match op {
        BinaryOp::Add => Ok(promoted(a.checked_add(b))),
        BinaryOp::Subtract => Ok(promoted(a.checked_sub(b))),
        BinaryOp::Multiply => Ok(promoted(a.checked_mul(b))),
        BinaryOp::Divide => {
            if b == 0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinaryOp::FloorDivide => {
            if b == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let Some(mut quotient) = a.checked_div(b) else {
                return float_binary(op, a as f64, b as f64);
            };
            if quotient * b != a && ((a < 0) != (b < 0)) {
                quotient -= 1;
            }
            Ok(Value::Int(quotient))
        }
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(RuntimeError::zero_division("integer modulo by zero"));
            }
            // i64::MIN % -1 is the only overflowing case and its remainder is 0.
            let mut rem = a.checked_rem(b).unwrap_or(0);
            if rem != 0 && ((rem < 0) != (b < 0)) {
                rem += b;
            }
            Ok(Value::Int(rem))
        }
        BinaryOp::Power => {
            if b >= 0 {
                let checked = u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp));
                Ok(promoted(checked))
            } else {
                float_binary(op, a as f64, b as f64)
            }
        }
    }
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Divide if b == 0.0 => Err(RuntimeError::zero_division("float division by zero")),
        BinaryOp::FloorDivide if b == 0.0 => Err(RuntimeError::zero_division(
            "float floor division by zero",
        )),
        BinaryOp::Modulo if b == 0.0 => Err(RuntimeError::zero_division("float modulo")),
        BinaryOp::Power if a == 0.0 && b < 0.0 => Err(RuntimeError::zero_division(
            "0.0 cannot be raised to a negative power",
        )),
        _ => Ok(Value::Float(apply_float(op, a, b))),
    }
}

/// IEEE semantics, used element-wise for arrays.
fn apply_float(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::FloorDivide => (a / b).floor(),
        BinaryOp::Modulo => {
            if b == 0.0 {
                return f64::NAN;
            }
            let rem = a % b;
            if rem != 0.0 && ((rem < 0.0) != (b < 0.0)) {
                rem + b
            } else {
                rem
            }
        }
        BinaryOp::Power => a.powf(b),
    }
}

/// Float view of an array operand; scalars and numeric lists are accepted
/// alongside arrays.
pub fn float_vector(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Array(data) => Some(data.borrow().clone()),
        Value::List(items) => items.borrow().iter().map(Value::as_f64).collect(),
        Value::Tuple(items) => items.iter().map(Value::as_f64).collect(),
        scalar => scalar.as_f64().map(|v| vec![v]),
    }
}

pub fn broadcast(
    left: &[f64],
    right: &[f64],
    f: impl Fn(f64, f64) -> f64,
) -> Result<Vec<f64>, RuntimeError> {
    match (left.len(), right.len()) {
        (n, m) if n == m => Ok(left.iter().zip(right).map(|(a, b)| f(*a, *b)).collect()),
        (1, _) => Ok(right.iter().map(|b| f(left[0], *b)).collect()),
        (_, 1) => Ok(left.iter().map(|a| f(*a, right[0])).collect()),
        (n, m) => Err(RuntimeError::value_error(format!(
            "operands could not be broadcast together with shapes ({},) ({},)",
            n, m
        ))),
    }
}

fn array_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (Some(a), Some(b)) = (float_vector(left), float_vector(right)) else {
        return Err(unsupported(op.symbol(), left, right));
    };
    broadcast(&a, &b, |x, y| apply_float(op, x, y)).map(Value::array)
}

//=============================================
//            Section 2: Comparison
//=============================================

pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        CompareOp::In => contains(right, left).map(Value::Bool),
        CompareOp::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
        CompareOp::Is => Ok(Value::Bool(identical(left, right))),
        CompareOp::IsNot => Ok(Value::Bool(!identical(left, right))),
        _ if matches!(left, Value::Array(_)) || matches!(right, Value::Array(_)) => {
            let (Some(a), Some(b)) = (float_vector(left), float_vector(right)) else {
                return match op {
                    CompareOp::Equal => Ok(Value::Bool(false)),
                    CompareOp::NotEqual => Ok(Value::Bool(true)),
                    _ => Err(not_supported(op, left, right)),
                };
            };
            broadcast(&a, &b, |x, y| {
                let holds = ordering_holds(op, x.partial_cmp(&y));
                if holds { 1.0 } else { 0.0 }
            })
            .map(Value::array)
        }
        CompareOp::Equal => Ok(Value::Bool(values_equal(left, right))),
        CompareOp::NotEqual => Ok(Value::Bool(!values_equal(left, right))),
        _ => Ok(Value::Bool(ordering_holds(op, partial_order(op, left, right)?))),
    }
}

fn ordering_holds(op: CompareOp, ordering: Option<Ordering>) -> bool {
    match (op, ordering) {
        (CompareOp::NotEqual, None) => true,
        (_, None) => false,
        (CompareOp::Equal, Some(o)) => o == Ordering::Equal,
        (CompareOp::NotEqual, Some(o)) => o != Ordering::Equal,
        (CompareOp::Less, Some(o)) => o == Ordering::Less,
        (CompareOp::Greater, Some(o)) => o == Ordering::Greater,
        (CompareOp::LessEqual, Some(o)) => o != Ordering::Greater,
        (CompareOp::GreaterEqual, Some(o)) => o != Ordering::Less,
        _ => false,
    }
}

fn not_supported(op: CompareOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "'{}' not supported between instances of '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/// Ordering for `<`-style comparisons; `None` for unordered floats.
fn partial_order(op: CompareOp, left: &Value, right: &Value) -> Result<Option<Ordering>, RuntimeError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => sequence_order(op, &a.borrow(), &b.borrow()),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_order(op, a, b),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(&y)),
            _ => Err(not_supported(op, left, right)),
        },
    }
}

fn sequence_order(op: CompareOp, a: &[Value], b: &[Value]) -> Result<Option<Ordering>, RuntimeError> {
    for (x, y) in a.iter().zip(b) {
        if !values_equal(x, y) {
            return partial_order(op, x, y);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Total order used by `sorted`, `min` and `max`.
pub fn less_than(left: &Value, right: &Value) -> Result<bool, RuntimeError> {
    Ok(partial_order(CompareOp::Less, left, right)? == Some(Ordering::Less))
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Float(_), Value::Float(_)) => false,
        (a, b) => values_equal(a, b) && !matches!(a, Value::Float(_)),
    }
}

pub fn contains(container: &Value, item: &Value) -> Result<bool, RuntimeError> {
    match container {
        Value::List(items) => Ok(items.borrow().iter().any(|v| values_equal(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Str(text) => match item {
            Value::Str(needle) => Ok(text.contains(needle.as_ref())),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Dict(entries) => {
            let key = DictKey::from_value(item)?;
            Ok(entries.borrow().contains_key(&key))
        }
        Value::Array(data) => Ok(item
            .as_f64()
            .is_some_and(|needle| data.borrow().contains(&needle))),
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

//=============================================
//            Section 3: Iteration and Subscripts
//=============================================

/// Materialises an iterable into its items.
pub fn iterate(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Str(text) => Ok(text.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Dict(entries) => Ok(entries.borrow().keys().map(DictKey::to_value).collect()),
        Value::Array(data) => Ok(data.borrow().iter().map(|v| Value::Float(*v)).collect()),
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

pub fn length(value: &Value) -> Result<usize, RuntimeError> {
    match value {
        Value::List(items) => Ok(items.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Str(text) => Ok(text.chars().count()),
        Value::Dict(entries) => Ok(entries.borrow().len()),
        Value::Array(data) => Ok(data.borrow().len()),
        other => Err(RuntimeError::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

/// An evaluated subscript: a single key or a slice.
#[derive(Debug, Clone)]
pub enum Subscript {
    Item(Value),
    Slice {
        lower: Option<i64>,
        upper: Option<i64>,
        step: Option<i64>,
    },
}

/// Indices selected by a slice over a sequence of `len` items.
pub fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, RuntimeError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut indices = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| clamp(b, 0, len));
        let stop = upper.map_or(len, |b| clamp(b, 0, len));
        let mut i = start;
        while i < stop {
            indices.push(i as usize);
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    } else {
        let start = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
        let mut i = start;
        while i > stop {
            indices.push(i as usize);
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    }
    Ok(indices)
}

fn normalize_index(index: &Value, len: usize, container: &str) -> Result<usize, RuntimeError> {
    let Some(raw) = index.as_int() else {
        return Err(RuntimeError::type_error(format!(
            "{} indices must be integers or slices, not {}",
            container,
            index.type_name()
        )));
    };
    let adjusted = if raw < 0 { raw + len as i64 } else { raw };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(if container == "ndarray" {
            RuntimeError::index_error(format!(
                "index {} is out of bounds for axis 0 with size {}",
                raw, len
            ))
        } else {
            RuntimeError::index_error(format!("{} index out of range", container))
        });
    }
    Ok(adjusted as usize)
}

pub fn get_subscript(object: &Value, subscript: &Subscript) -> Result<Value, RuntimeError> {
    match (object, subscript) {
        (Value::Dict(entries), Subscript::Item(key)) => {
            let dict_key = DictKey::from_value(key)?;
            entries
                .borrow()
                .get(&dict_key)
                .cloned()
                .ok_or_else(|| RuntimeError::raise(ExceptionKind::KeyError, key.repr()))
        }
        (Value::List(items), Subscript::Item(index)) => {
            let items = items.borrow();
            let at = normalize_index(index, items.len(), "list")?;
            Ok(items[at].clone())
        }
        (Value::Tuple(items), Subscript::Item(index)) => {
            let at = normalize_index(index, items.len(), "tuple")?;
            Ok(items[at].clone())
        }
        (Value::Str(text), Subscript::Item(index)) => {
            let chars: Vec<char> = text.chars().collect();
            let at = normalize_index(index, chars.len(), "string")?;
            Ok(Value::str(chars[at].to_string()))
        }
        (Value::Array(data), Subscript::Item(index)) => {
            let data = data.borrow();
            match index {
                Value::Array(_) | Value::List(_) => select(&data, index).map(Value::array),
                _ => {
                    let at = normalize_index(index, data.len(), "ndarray")?;
                    Ok(Value::Float(data[at]))
                }
            }
        }
        (Value::List(items), Subscript::Slice { lower, upper, step }) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), *lower, *upper, *step)?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::Tuple(items), Subscript::Slice { lower, upper, step }) => {
            let picked = slice_indices(items.len(), *lower, *upper, *step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::Str(text), Subscript::Slice { lower, upper, step }) => {
            let chars: Vec<char> = text.chars().collect();
            let picked = slice_indices(chars.len(), *lower, *upper, *step)?;
            Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        (Value::Array(data), Subscript::Slice { lower, upper, step }) => {
            let data = data.borrow();
            let picked = slice_indices(data.len(), *lower, *upper, *step)?;
            Ok(Value::array(picked.into_iter().map(|i| data[i]).collect()))
        }
        (other, _) => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Mask (equal-length 0/1 array) or integer-list selection over an array.
fn select(data: &[f64], selector: &Value) -> Result<Vec<f64>, RuntimeError> {
    match selector {
        Value::Array(mask) => {
            let mask = mask.borrow();
            if mask.len() != data.len() {
                return Err(RuntimeError::index_error(format!(
                    "boolean index did not match indexed array along dimension 0; dimension is {} but corresponding boolean dimension is {}",
                    data.len(),
                    mask.len()
                )));
            }
            Ok(data
                .iter()
                .zip(mask.iter())
                .filter(|(_, keep)| **keep != 0.0)
                .map(|(v, _)| *v)
                .collect())
        }
        Value::List(indices) => indices
            .borrow()
            .iter()
            .map(|index| normalize_index(index, data.len(), "ndarray").map(|at| data[at]))
            .collect(),
        other => Err(RuntimeError::type_error(format!(
            "ndarray indices must be integers or slices, not {}",
            other.type_name()
        ))),
    }
}

pub fn set_subscript(object: &Value, subscript: &Subscript, value: Value) -> Result<(), RuntimeError> {
    match (object, subscript) {
        (Value::Dict(entries), Subscript::Item(key)) => {
            let key = DictKey::from_value(key)?;
            entries.borrow_mut().insert(key, value);
            Ok(())
        }
        (Value::List(items), Subscript::Item(index)) => {
            let mut items = items.borrow_mut();
            let at = normalize_index(index, items.len(), "list")
                .map_err(|_| RuntimeError::index_error("list assignment index out of range"))?;
            items[at] = value;
            Ok(())
        }
        (Value::Array(data), Subscript::Item(index)) => {
            let element = value.as_f64().ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "float() argument must be a number, not '{}'",
                    value.type_name()
                ))
            })?;
            let mut data = data.borrow_mut();
            let at = normalize_index(index, data.len(), "ndarray")?;
            data[at] = element;
            Ok(())
        }
        (Value::List(items), Subscript::Slice { lower, upper, step: None | Some(1) }) => {
            let replacement = iterate(&value)?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let bound = |b: i64| (if b < 0 { b + len } else { b }).clamp(0, len) as usize;
            let start = lower.map_or(0, bound);
            let end = upper.map_or(items.len(), bound).max(start);
            items.splice(start..end, replacement);
            Ok(())
        }
        (Value::Array(data), Subscript::Slice { lower, upper, step }) => {
            let source = float_vector(&value).ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "could not assign '{}' to an array slice",
                    value.type_name()
                ))
            })?;
            let mut data = data.borrow_mut();
            let picked = slice_indices(data.len(), *lower, *upper, *step)?;
            if source.len() != 1 && source.len() != picked.len() {
                return Err(RuntimeError::value_error(format!(
                    "could not broadcast input array from shape ({},) into shape ({},)",
                    source.len(),
                    picked.len()
                )));
            }
            for (n, at) in picked.into_iter().enumerate() {
                data[at] = if source.len() == 1 { source[0] } else { source[n] };
            }
            Ok(())
        }
        (Value::Tuple(_), _) | (Value::Str(_), _) => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            object.type_name()
        ))),
        (other, _) => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(err: RuntimeError) -> ExceptionKind {
        match err {
            RuntimeError::Raised(exception) => exception.kind,
            other => panic!("expected exception, found {other}"),
        }
    }

    #[test]
    fn test_python_division_semantics() {
        assert!(matches!(
            binary(BinaryOp::FloorDivide, &Value::Int(-7), &Value::Int(2)).unwrap(),
            Value::Int(-4)
        ));
        assert!(matches!(
            binary(BinaryOp::Modulo, &Value::Int(-7), &Value::Int(3)).unwrap(),
            Value::Int(2)
        ));
        assert!(matches!(
            binary(BinaryOp::Divide, &Value::Int(1), &Value::Int(2)).unwrap(),
            Value::Float(f) if f == 0.5
        ));
        let err = binary(BinaryOp::Divide, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(kind_of(err), ExceptionKind::ZeroDivisionError);
    }

    #[test]
    fn test_integer_edges_do_not_overflow() {
        let min = Value::Int(i64::MIN);
        let neg_one = Value::Int(-1);
        assert!(matches!(
            binary(BinaryOp::FloorDivide, &min, &neg_one).unwrap(),
            Value::Float(f) if f == 9_223_372_036_854_775_808.0
        ));
        assert!(matches!(
            binary(BinaryOp::Modulo, &min, &neg_one).unwrap(),
            Value::Int(0)
        ));
        assert!(matches!(
            binary(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap(),
            Value::Float(_)
        ));
        assert!(matches!(unary(UnaryOp::Negate, &min).unwrap(), Value::Float(_)));
    }

    #[test]
    fn test_huge_repetition_is_memory_error() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let err = binary(BinaryOp::Multiply, &list, &Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(kind_of(err), ExceptionKind::MemoryError);

        let err = binary(BinaryOp::Multiply, &Value::str("ab"), &Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(kind_of(err), ExceptionKind::MemoryError);

        let empty = binary(BinaryOp::Multiply, &Value::list(Vec::new()), &Value::Int(i64::MAX)).unwrap();
        assert_eq!(empty.repr(), "[]");
        let tripled = binary(BinaryOp::Multiply, &Value::Int(3), &Value::str("x")).unwrap();
        assert_eq!(tripled.repr(), "'xxx'");
    }

    #[test]
    fn test_slice_with_huge_step() {
        assert_eq!(slice_indices(3, Some(1), None, Some(i64::MAX)).unwrap(), vec![1]);
        assert_eq!(slice_indices(3, None, None, Some(i64::MIN)).unwrap(), vec![2]);
    }

    #[test]
    fn test_array_broadcasting() {
        let a = Value::array(vec![1.0, 2.0, 3.0]);
        let doubled = binary(BinaryOp::Multiply, &a, &Value::Int(2)).unwrap();
        assert_eq!(doubled.repr(), "array([2.0, 4.0, 6.0])");

        let b = Value::array(vec![1.0, 2.0]);
        match binary(BinaryOp::Add, &a, &b).unwrap_err() {
            RuntimeError::Raised(exception) => {
                assert_eq!(exception.kind, ExceptionKind::ValueError);
                assert_eq!(
                    exception.message,
                    "operands could not be broadcast together with shapes (3,) (2,)"
                );
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_mixed_type_addition_is_type_error() {
        let err = binary(BinaryOp::Add, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_slices_follow_python_bounds() {
        assert_eq!(slice_indices(5, Some(1), Some(-1), None).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice_indices(4, None, None, Some(-1)).unwrap(), vec![3, 2, 1, 0]);
        assert_eq!(slice_indices(3, Some(10), None, None).unwrap(), Vec::<usize>::new());
        assert!(slice_indices(3, None, None, Some(0)).is_err());
    }

    #[test]
    fn test_mask_selection() {
        let data = Value::array(vec![-1.0, 2.0, -3.0, 4.0]);
        let mask = compare(CompareOp::Greater, &data, &Value::Int(0)).unwrap();
        let picked = get_subscript(&data, &Subscript::Item(mask)).unwrap();
        assert_eq!(picked.repr(), "array([2.0, 4.0])");
    }

    #[test]
    fn test_missing_key_reports_repr() {
        let dict = Value::dict(Default::default());
        let err = get_subscript(&dict, &Subscript::Item(Value::str("a"))).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'a'");
    }

    #[test]
    fn test_list_slice_assignment_splices() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let slice = Subscript::Slice {
            lower: Some(1),
            upper: Some(2),
            step: None,
        };
        set_subscript(&list, &slice, Value::list(vec![Value::Int(7), Value::Int(8)])).unwrap();
        assert_eq!(list.repr(), "[1, 7, 8, 3]");
    }
}
