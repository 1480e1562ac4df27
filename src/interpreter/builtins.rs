//=============================================
// sciblock/interpreter/builtins.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Builtin functions available to every snippet
// Objective: Register the core builtins and exception constructors that
//            name lookup falls back to after locals and globals
//=============================================

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::info;

use super::Interpreter;
use super::errors::{ExceptionKind, RuntimeError};
use super::methods::sort_values;
use super::ops::{self, iterate, less_than};
use super::value::{CallArgs, DictKey, NativeFunction, Value};
use crate::ast::BinaryOp;

pub const ORIGIN: &str = "builtins";
pub const SNIPPET_LOG_TARGET: &str = "sciblock::snippet";

type Builtin = fn(&mut Interpreter, CallArgs) -> Result<Value, RuntimeError>;

fn register(table: &mut HashMap<String, Value>, name: &str, func: Builtin) {
    table.insert(name.to_string(), NativeFunction::new(ORIGIN, name, func));
}

pub fn builtin_table() -> HashMap<String, Value> {
    let mut table = HashMap::new();
    register(&mut table, "print", builtin_print);
    register(&mut table, "len", builtin_len);
    register(&mut table, "range", builtin_range);
    register(&mut table, "abs", builtin_abs);
    register(&mut table, "min", builtin_min);
    register(&mut table, "max", builtin_max);
    register(&mut table, "sum", builtin_sum);
    register(&mut table, "round", builtin_round);
    register(&mut table, "float", builtin_float);
    register(&mut table, "int", builtin_int);
    register(&mut table, "str", builtin_str);
    register(&mut table, "repr", builtin_repr);
    register(&mut table, "bool", builtin_bool);
    register(&mut table, "list", builtin_list);
    register(&mut table, "tuple", builtin_tuple);
    register(&mut table, "dict", builtin_dict);
    register(&mut table, "enumerate", builtin_enumerate);
    register(&mut table, "zip", builtin_zip);
    register(&mut table, "sorted", builtin_sorted);
    register(&mut table, "reversed", builtin_reversed);
    register(&mut table, "any", builtin_any);
    register(&mut table, "all", builtin_all);
    register(&mut table, "map", builtin_map);
    register(&mut table, "filter", builtin_filter);
    register(&mut table, "type", builtin_type);
    for kind in ExceptionKind::ALL {
        table.insert(kind.as_str().to_string(), Value::ExceptionType(kind));
    }
    table
}

//Function: builtin_print
//Purpose: Capture printed text in the run's output buffer and log it
//Inputs: values, optional `sep` and `end` keywords
//Returns: None
fn builtin_print(interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(usize::MAX, &["sep", "end"])?;
    let sep = match args.keyword("sep") {
        Some(Value::Str(sep)) => sep.to_string(),
        _ => " ".to_string(),
    };
    let end = match args.keyword("end") {
        Some(Value::Str(end)) => end.to_string(),
        _ => "\n".to_string(),
    };
    let line = args
        .positional
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(&sep);
    info!(target: SNIPPET_LOG_TARGET, origin = interp.origin(), "{}", line);
    interp.write_output(&line);
    interp.write_output(&end);
    Ok(Value::None)
}

fn builtin_len(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    ops::length(args.required(0, "obj")?).map(|len| Value::Int(len as i64))
}

fn builtin_range(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(3, &[])?;
    let (start, stop, step) = match args.len() {
        0 => {
            return Err(RuntimeError::type_error(
                "range expected at least 1 argument, got 0",
            ));
        }
        1 => (0, args.integer(0, "stop")?, 1),
        2 => (args.integer(0, "start")?, args.integer(1, "stop")?, 1),
        _ => (
            args.integer(0, "start")?,
            args.integer(1, "stop")?,
            args.integer(2, "step")?,
        ),
    };
    if step == 0 {
        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span + i128::from(step).abs() - 1) / i128::from(step).abs()
    };
    if count > ops::MAX_SEQUENCE_LEN as i128 {
        return Err(RuntimeError::raise(
            ExceptionKind::MemoryError,
            format!("range of {} items is too large to materialise", count),
        ));
    }
    let mut items = Vec::with_capacity(count as usize);
    let mut current = Some(start);
    while let Some(value) = current {
        if (step > 0 && value >= stop) || (step < 0 && value <= stop) {
            break;
        }
        items.push(Value::Int(value));
        current = value.checked_add(step);
    }
    Ok(Value::list(items))
}

fn builtin_abs(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.required(0, "x")? {
        Value::Int(n) => Ok(n
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Float((*n as f64).abs()))),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Array(data) => Ok(Value::array(data.borrow().iter().map(|v| v.abs()).collect())),
        other => Err(RuntimeError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn extremum(
    interp: &mut Interpreter,
    args: CallArgs,
    name: &str,
    want_greater: bool,
) -> Result<Value, RuntimeError> {
    args.check(usize::MAX, &["key", "default"])?;
    let candidates = match args.positional.as_slice() {
        [] => {
            return Err(RuntimeError::type_error(format!(
                "{} expected at least 1 argument, got 0",
                name
            )));
        }
        [single] => iterate(single)?,
        many => many.to_vec(),
    };
    let key = args.keyword("key").filter(|key| !key.is_none()).cloned();
    let mut best: Option<(Value, Value)> = None;
    for candidate in candidates {
        let score = match &key {
            Some(func) => interp.call_value(func, vec![candidate.clone()], Vec::new())?,
            None => candidate.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_score, _)) if want_greater => less_than(best_score, &score)?,
            Some((best_score, _)) => less_than(&score, best_score)?,
        };
        if replace {
            best = Some((score, candidate));
        }
    }
    match (best, args.keyword("default")) {
        (Some((_, value)), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(RuntimeError::value_error(format!(
            "{}() arg is an empty sequence",
            name
        ))),
    }
}

fn builtin_min(interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    extremum(interp, args, "min", false)
}

fn builtin_max(interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    extremum(interp, args, "max", true)
}

fn builtin_sum(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["start"])?;
    let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(RuntimeError::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in iterate(args.required(0, "iterable")?)? {
        total = ops::binary(BinaryOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn builtin_round(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["ndigits"])?;
    let number = args.required(0, "number")?;
    let digits = match args.get(1, "ndigits") {
        None | Some(Value::None) => None,
        Some(_) => Some(args.integer(1, "ndigits")?),
    };
    match (number, digits) {
        (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(number.as_int().unwrap_or(0))),
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(RuntimeError::value_error(format!(
                    "cannot convert float {} to integer",
                    Value::Float(*f)
                )));
            }
            Ok(Value::Int(f.round_ties_even() as i64))
        }
        (Value::Float(f), Some(digits)) => {
            let scale = 10f64.powi(digits as i32);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (Value::Array(data), digits) => {
            let scale = 10f64.powi(digits.unwrap_or(0) as i32);
            Ok(Value::array(
                data.borrow()
                    .iter()
                    .map(|v| (v * scale).round_ties_even() / scale)
                    .collect(),
            ))
        }
        (other, _) => Err(RuntimeError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn builtin_float(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.positional.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(text)) => {
            let trimmed = text.trim();
            let parsed = match trimmed.to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" | "+nan" | "-nan" => Some(f64::NAN),
                _ => trimmed.replace('_', "").parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                RuntimeError::value_error(format!(
                    "could not convert string to float: {}",
                    Value::Str(text.clone()).repr()
                ))
            })
        }
        Some(value) => value.as_f64().map(Value::Float).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                value.type_name()
            ))
        }),
    }
}

fn builtin_int(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.positional.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Int(n)) => Ok(Value::Int(*n)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Float(f)) => {
            if f.is_nan() {
                Err(RuntimeError::value_error("cannot convert float NaN to integer"))
            } else if f.is_infinite() {
                Err(RuntimeError::raise(
                    ExceptionKind::ValueError,
                    "cannot convert float infinity to integer",
                ))
            } else {
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Some(Value::Str(text)) => text
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                RuntimeError::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    Value::Str(text.clone()).repr()
                ))
            }),
        Some(other) => Err(RuntimeError::type_error(format!(
            "int() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_str(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    Ok(Value::str(
        args.positional
            .first()
            .map(Value::to_string)
            .unwrap_or_default(),
    ))
}

fn builtin_repr(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    Ok(Value::str(args.required(0, "obj")?.repr()))
}

fn builtin_bool(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.positional.first() {
        None => Ok(Value::Bool(false)),
        Some(value) => Ok(Value::Bool(value.is_truthy()?)),
    }
}

fn builtin_list(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.positional.first() {
        None => Ok(Value::list(Vec::new())),
        Some(value) => Ok(Value::list(iterate(value)?)),
    }
}

fn builtin_tuple(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.positional.first() {
        None => Ok(Value::tuple(Vec::new())),
        Some(value) => Ok(Value::tuple(iterate(value)?)),
    }
}

fn builtin_dict(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &args.keywords.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())?;
    let mut entries = IndexMap::new();
    match args.positional.first() {
        Some(Value::Dict(source)) => {
            entries.extend(source.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(pairs) => {
            for (n, pair) in iterate(pairs)?.into_iter().enumerate() {
                let parts = iterate(&pair)?;
                if parts.len() != 2 {
                    return Err(RuntimeError::value_error(format!(
                        "dictionary update sequence element #{} has length {}; 2 is required",
                        n,
                        parts.len()
                    )));
                }
                entries.insert(DictKey::from_value(&parts[0])?, parts[1].clone());
            }
        }
        None => {}
    }
    for (key, value) in &args.keywords {
        entries.insert(DictKey::Str(Rc::from(key.as_str())), value.clone());
    }
    Ok(Value::dict(entries))
}

fn builtin_enumerate(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["start"])?;
    let start = match args.get(1, "start") {
        Some(_) => args.integer(1, "start")?,
        None => 0,
    };
    let items = iterate(args.required(0, "iterable")?)?;
    Ok(Value::list(
        items
            .into_iter()
            .enumerate()
            .map(|(n, item)| Value::tuple(vec![Value::Int(start + n as i64), item]))
            .collect(),
    ))
}

fn builtin_zip(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(usize::MAX, &[])?;
    let columns = args
        .positional
        .iter()
        .map(iterate)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..rows)
            .map(|row| Value::tuple(columns.iter().map(|column| column[row].clone()).collect()))
            .collect(),
    ))
}

fn builtin_sorted(interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["key", "reverse"])?;
    let items = iterate(args.required(0, "iterable")?)?;
    let reverse = match args.keyword("reverse") {
        Some(flag) => flag.is_truthy()?,
        None => false,
    };
    sort_values(interp, items, args.keyword("key"), reverse).map(Value::list)
}

fn builtin_reversed(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    let mut items = iterate(args.required(0, "sequence")?)?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_any(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    for item in iterate(args.required(0, "iterable")?)? {
        if item.is_truthy()? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn builtin_all(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    for item in iterate(args.required(0, "iterable")?)? {
        if !item.is_truthy()? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn builtin_map(interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(usize::MAX, &[])?;
    let func = args.required(0, "function")?.clone();
    let columns = args.positional[1..]
        .iter()
        .map(iterate)
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(RuntimeError::type_error("map() must have at least two arguments."));
    }
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        let call_args = columns.iter().map(|column| column[row].clone()).collect();
        out.push(interp.call_value(&func, call_args, Vec::new())?);
    }
    Ok(Value::list(out))
}

fn builtin_filter(interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &[])?;
    let func = args.required(0, "function")?.clone();
    let mut out = Vec::new();
    for item in iterate(args.required(1, "iterable")?)? {
        let keep = if func.is_none() {
            item.is_truthy()?
        } else {
            interp
                .call_value(&func, vec![item.clone()], Vec::new())?
                .is_truthy()?
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn builtin_type(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    let value = args.required(0, "object")?;
    let name = match value {
        Value::Exception(exception) => exception.kind.as_str(),
        other => other.type_name(),
    };
    Ok(Value::str(format!("<class '{}'>", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, positional: Vec<Value>) -> Result<Value, RuntimeError> {
        let mut interp = Interpreter::new("<test>", HashMap::new());
        let table = builtin_table();
        let func = table.get(name).expect("builtin").clone();
        interp.call_value(&func, positional, Vec::new())
    }

    #[test]
    fn test_range_and_len() {
        let value = call("range", vec![Value::Int(1), Value::Int(7), Value::Int(2)]).unwrap();
        assert_eq!(value.repr(), "[1, 3, 5]");
        assert!(matches!(call("len", vec![value]).unwrap(), Value::Int(3)));
    }

    #[test]
    fn test_range_near_integer_limits() {
        let start = Value::Int(i64::MAX - 7);
        let value = call("range", vec![start, Value::Int(i64::MAX), Value::Int(5)]).unwrap();
        assert_eq!(
            value.repr(),
            format!("[{}, {}]", i64::MAX - 7, i64::MAX - 2)
        );
        let value = call("range", vec![Value::Int(i64::MIN + 3), Value::Int(i64::MIN), Value::Int(-2)]).unwrap();
        assert_eq!(value.repr(), format!("[{}, {}]", i64::MIN + 3, i64::MIN + 1));

        let err = call("range", vec![Value::Int(i64::MAX)]).unwrap_err();
        assert!(err.to_string().starts_with("MemoryError: "));
    }

    #[test]
    fn test_round_half_to_even() {
        assert!(matches!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2)));
        assert!(matches!(call("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4)));
    }

    #[test]
    fn test_conversion_errors() {
        let err = call("int", vec![Value::str("abc")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
        let err = call("float", vec![Value::list(Vec::new())]).unwrap_err();
        assert!(err.to_string().starts_with("TypeError"));
    }

    #[test]
    fn test_min_max_and_empty() {
        let values = Value::list(vec![Value::Int(3), Value::Float(1.5), Value::Int(2)]);
        assert_eq!(call("min", vec![values.clone()]).unwrap().repr(), "1.5");
        assert_eq!(call("max", vec![values]).unwrap().repr(), "3");
        let err = call("max", vec![Value::list(Vec::new())]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: max() arg is an empty sequence");
    }

    #[test]
    fn test_zip_and_enumerate() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let b = Value::str("xy");
        assert_eq!(call("zip", vec![a.clone(), b]).unwrap().repr(), "[(1, 'x'), (2, 'y')]");
        assert_eq!(
            call("enumerate", vec![a]).unwrap().repr(),
            "[(0, 1), (1, 2), (2, 3)]"
        );
    }

    #[test]
    fn test_exception_constructor_builds_value() {
        let table = builtin_table();
        let mut interp = Interpreter::new("<test>", HashMap::new());
        let ctor = table.get("ValueError").unwrap().clone();
        let value = interp
            .call_value(&ctor, vec![Value::str("bad")], Vec::new())
            .unwrap();
        assert_eq!(value.repr(), "ValueError('bad')");
    }
}
