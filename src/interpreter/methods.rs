//=============================================
// sciblock/interpreter/methods.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Attribute access on snippet values
// Objective: Resolve module members and record fields, and bind the
//            methods of lists, dicts, strings, tuples and float arrays
//=============================================

use std::rc::Rc;

use super::Interpreter;
use super::errors::{ExceptionKind, RuntimeError};
use super::ops::{iterate, less_than};
use super::value::{CallArgs, Dict, DictKey, FloatArray, List, NativeFunction, Value, format_float, values_equal};
use crate::modules::numeric;

const BUILTINS_ORIGIN: &str = "builtins";

pub fn attribute(object: &Value, name: &str) -> Result<Value, RuntimeError> {
    match object {
        Value::Module(module) => module.members.get(name).cloned().ok_or_else(|| {
            RuntimeError::raise(
                ExceptionKind::AttributeError,
                format!("module '{}' has no attribute '{}'", module.name, name),
            )
        }),
        Value::Record(record) => record
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::attribute_error(&record.type_name, name)),
        Value::Array(data) => array_attribute(data, name),
        Value::List(items) => list_method(items, name),
        Value::Dict(entries) => dict_method(entries, name),
        Value::Str(text) => str_method(text, name),
        Value::Tuple(items) => tuple_method(items, name),
        Value::Exception(exception) if name == "args" => {
            Ok(Value::tuple(vec![Value::str(&exception.message)]))
        }
        other => Err(RuntimeError::attribute_error(other.type_name(), name)),
    }
}

fn bound<F>(name: &str, func: F) -> Result<Value, RuntimeError>
where
    F: Fn(&mut Interpreter, CallArgs) -> Result<Value, RuntimeError> + 'static,
{
    Ok(NativeFunction::new(BUILTINS_ORIGIN, name, func))
}

//=============================================
//            Section 1: Sorting
//=============================================

/// Stable merge sort that propagates comparison errors.
pub fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<Vec<Value>, RuntimeError> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = match key {
            Some(Value::None) | None => item.clone(),
            Some(func) => interp.call_value(func, vec![item.clone()], Vec::new())?,
        };
        keyed.push((sort_key, item));
    }
    let sorted = merge_sort(keyed, &|a: &(Value, Value), b: &(Value, Value)| {
        if reverse {
            less_than(&b.0, &a.0)
        } else {
            less_than(&a.0, &b.0)
        }
    })?;
    Ok(sorted.into_iter().map(|(_, item)| item).collect())
}

fn merge_sort<T>(
    mut items: Vec<T>,
    less: &dyn Fn(&T, &T) -> Result<bool, RuntimeError>,
) -> Result<Vec<T>, RuntimeError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right_half = items.split_off(items.len() / 2);
    let left = merge_sort(items, less)?;
    let right = merge_sort(right_half, less)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => less(r, l)?,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        if let Some(item) = next {
            merged.push(item);
        }
    }
    Ok(merged)
}

//=============================================
//            Section 2: Containers
//=============================================

fn list_method(items: &List, name: &str) -> Result<Value, RuntimeError> {
    let items = items.clone();
    match name {
        "append" => bound(name, move |_, args| {
            let value = args.required(0, "object")?.clone();
            items.borrow_mut().push(value);
            Ok(Value::None)
        }),
        "extend" => bound(name, move |_, args| {
            let extra = iterate(args.required(0, "iterable")?)?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }),
        "pop" => bound(name, move |_, args| {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(RuntimeError::index_error("pop from empty list"));
            }
            let raw = match args.get(0, "index") {
                Some(_) => args.integer(0, "index")?,
                None => -1,
            };
            let at = if raw < 0 { raw + items.len() as i64 } else { raw };
            if at < 0 || at >= items.len() as i64 {
                return Err(RuntimeError::index_error("pop index out of range"));
            }
            Ok(items.remove(at as usize))
        }),
        "insert" => bound(name, move |_, args| {
            let raw = args.integer(0, "index")?;
            let value = args.required(1, "object")?.clone();
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let at = (if raw < 0 { raw + len } else { raw }).clamp(0, len);
            items.insert(at as usize, value);
            Ok(Value::None)
        }),
        "index" => bound(name, move |_, args| {
            let needle = args.required(0, "value")?;
            items
                .borrow()
                .iter()
                .position(|v| values_equal(v, needle))
                .map(|at| Value::Int(at as i64))
                .ok_or_else(|| {
                    RuntimeError::value_error(format!("{} is not in list", needle.repr()))
                })
        }),
        "count" => bound(name, move |_, args| {
            let needle = args.required(0, "value")?;
            let count = items.borrow().iter().filter(|v| values_equal(v, needle)).count();
            Ok(Value::Int(count as i64))
        }),
        "reverse" => bound(name, move |_, _| {
            items.borrow_mut().reverse();
            Ok(Value::None)
        }),
        "sort" => bound(name, move |interp, args| {
            args.check(0, &["key", "reverse"])?;
            let reverse = match args.keyword("reverse") {
                Some(flag) => flag.is_truthy()?,
                None => false,
            };
            let current = items.borrow().clone();
            let sorted = sort_values(interp, current, args.keyword("key"), reverse)?;
            *items.borrow_mut() = sorted;
            Ok(Value::None)
        }),
        "clear" => bound(name, move |_, _| {
            items.borrow_mut().clear();
            Ok(Value::None)
        }),
        "copy" => bound(name, move |_, _| Ok(Value::list(items.borrow().clone()))),
        _ => Err(RuntimeError::attribute_error("list", name)),
    }
}

fn tuple_method(items: &Rc<Vec<Value>>, name: &str) -> Result<Value, RuntimeError> {
    let items = items.clone();
    match name {
        "count" => bound(name, move |_, args| {
            let needle = args.required(0, "value")?;
            Ok(Value::Int(
                items.iter().filter(|v| values_equal(v, needle)).count() as i64,
            ))
        }),
        "index" => bound(name, move |_, args| {
            let needle = args.required(0, "value")?;
            items
                .iter()
                .position(|v| values_equal(v, needle))
                .map(|at| Value::Int(at as i64))
                .ok_or_else(|| RuntimeError::value_error("tuple.index(x): x not in tuple"))
        }),
        _ => Err(RuntimeError::attribute_error("tuple", name)),
    }
}

fn dict_method(entries: &Dict, name: &str) -> Result<Value, RuntimeError> {
    let entries = entries.clone();
    match name {
        "keys" => bound(name, move |_, _| {
            Ok(Value::list(entries.borrow().keys().map(DictKey::to_value).collect()))
        }),
        "values" => bound(name, move |_, _| {
            Ok(Value::list(entries.borrow().values().cloned().collect()))
        }),
        "items" => bound(name, move |_, _| {
            Ok(Value::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }),
        "get" => bound(name, move |_, args| {
            let key = DictKey::from_value(args.required(0, "key")?)?;
            let fallback = args.get(1, "default").cloned().unwrap_or(Value::None);
            Ok(entries.borrow().get(&key).cloned().unwrap_or(fallback))
        }),
        "pop" => bound(name, move |_, args| {
            let raw_key = args.required(0, "key")?;
            let key = DictKey::from_value(raw_key)?;
            match (entries.borrow_mut().shift_remove(&key), args.get(1, "default")) {
                (Some(value), _) => Ok(value),
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(RuntimeError::raise(ExceptionKind::KeyError, raw_key.repr())),
            }
        }),
        "update" => bound(name, move |_, args| {
            let mut incoming = Vec::new();
            match args.positional.first() {
                Some(Value::Dict(other)) => {
                    incoming.extend(other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Some(other) => {
                    for pair in iterate(other)? {
                        let parts = iterate(&pair)?;
                        if parts.len() != 2 {
                            return Err(RuntimeError::value_error(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                parts.len()
                            )));
                        }
                        incoming.push((DictKey::from_value(&parts[0])?, parts[1].clone()));
                    }
                }
                None => {}
            }
            for (key, value) in &args.keywords {
                incoming.push((DictKey::Str(Rc::from(key.as_str())), value.clone()));
            }
            entries.borrow_mut().extend(incoming);
            Ok(Value::None)
        }),
        "copy" => bound(name, move |_, _| Ok(Value::dict(entries.borrow().clone()))),
        _ => Err(RuntimeError::attribute_error("dict", name)),
    }
}

//=============================================
//            Section 3: Strings
//=============================================

fn str_method(text: &Rc<str>, name: &str) -> Result<Value, RuntimeError> {
    let text = text.clone();
    match name {
        "upper" => bound(name, move |_, _| Ok(Value::str(text.to_uppercase()))),
        "lower" => bound(name, move |_, _| Ok(Value::str(text.to_lowercase()))),
        "strip" | "lstrip" | "rstrip" => {
            let which = name.to_string();
            bound(name, move |_, args| {
                let chars: Option<Vec<char>> = match args.get(0, "chars") {
                    Some(Value::Str(set)) => Some(set.chars().collect()),
                    _ => None,
                };
                let trim = |c: char| match &chars {
                    Some(set) => set.contains(&c),
                    None => c.is_whitespace(),
                };
                let result = match which.as_str() {
                    "lstrip" => text.trim_start_matches(trim),
                    "rstrip" => text.trim_end_matches(trim),
                    _ => text.trim_matches(trim),
                };
                Ok(Value::str(result))
            })
        }
        "split" => bound(name, move |_, args| {
            let parts: Vec<Value> = match args.get(0, "sep") {
                None | Some(Value::None) => text.split_whitespace().map(Value::str).collect(),
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(RuntimeError::value_error("empty separator"));
                }
                Some(Value::Str(sep)) => text.split(sep.as_ref()).map(Value::str).collect(),
                Some(other) => {
                    return Err(RuntimeError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::list(parts))
        }),
        "join" => bound(name, move |_, args| {
            let mut pieces = Vec::new();
            for (n, item) in iterate(args.required(0, "iterable")?)?.into_iter().enumerate() {
                match item {
                    Value::Str(s) => pieces.push(s.to_string()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            n,
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::str(pieces.join(&*text)))
        }),
        "replace" => bound(name, move |_, args| {
            let old = args.string(0, "old")?;
            let new = args.string(1, "new")?;
            Ok(Value::str(text.replace(&old, &new)))
        }),
        "startswith" => bound(name, move |_, args| {
            Ok(Value::Bool(text.starts_with(&args.string(0, "prefix")?)))
        }),
        "endswith" => bound(name, move |_, args| {
            Ok(Value::Bool(text.ends_with(&args.string(0, "suffix")?)))
        }),
        "find" => bound(name, move |_, args| {
            let needle = args.string(0, "sub")?;
            Ok(Value::Int(match text.find(&needle) {
                Some(byte) => text[..byte].chars().count() as i64,
                None => -1,
            }))
        }),
        "format" => bound(name, move |_, args| format_template(&text, &args).map(Value::str)),
        _ => Err(RuntimeError::attribute_error("str", name)),
    }
}

/// `str.format` with positional, indexed and keyword fields and the
/// `[width][,][.precision][f|e|%|d|s]` subset of format specs.
pub fn format_template(template: &str, args: &CallArgs) -> Result<String, RuntimeError> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    field.push(next);
                }
                if !closed {
                    return Err(RuntimeError::value_error(
                        "expected '}' before end of string",
                    ));
                }
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let value = if name.is_empty() {
                    let value = args.positional.get(auto_index);
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    args.positional.get(index)
                } else {
                    args.keyword(name)
                };
                let value = value.ok_or_else(|| {
                    if name.is_empty() || name.parse::<usize>().is_ok() {
                        RuntimeError::index_error(
                            "Replacement index out of range for positional args tuple",
                        )
                    } else {
                        RuntimeError::raise(ExceptionKind::KeyError, format!("'{}'", name))
                    }
                })?;
                out.push_str(&apply_format_spec(value, spec)?);
            }
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn apply_format_spec(value: &Value, spec: &str) -> Result<String, RuntimeError> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let invalid = || {
        RuntimeError::value_error(format!(
            "Invalid format specifier '{}' for object of type '{}'",
            spec,
            value.type_name()
        ))
    };
    let (body, kind) = match spec.chars().last() {
        Some(c) if c.is_ascii_alphabetic() || c == '%' => (&spec[..spec.len() - 1], Some(c)),
        _ => (spec, None),
    };
    let (width_part, precision) = match body.split_once('.') {
        Some((width, precision)) => (width, Some(precision.parse::<usize>().map_err(|_| invalid())?)),
        None => (body, None),
    };
    let grouping = width_part.ends_with(',');
    let width_text = width_part.trim_end_matches(',');
    let width = if width_text.is_empty() {
        0
    } else {
        width_text.parse::<usize>().map_err(|_| invalid())?
    };

    let number = value.as_f64();
    let rendered = match (kind, number) {
        (Some('f'), Some(x)) => format!("{:.*}", precision.unwrap_or(6), x),
        (Some('%'), Some(x)) => format!("{:.*}%", precision.unwrap_or(6), x * 100.0),
        (Some('e'), Some(x)) => exponent_form(&format!("{:.*e}", precision.unwrap_or(6), x)),
        (Some('d'), Some(_)) => match value.as_int() {
            Some(n) => n.to_string(),
            None => return Err(invalid()),
        },
        (Some('s'), _) => value.to_string(),
        (None, Some(x)) => match precision {
            Some(p) => format_float(significant(x, p)),
            None => value.to_string(),
        },
        (None, None) => value.to_string(),
        _ => return Err(invalid()),
    };
    let rendered = if grouping { group_thousands(&rendered) } else { rendered };
    let padding = width.saturating_sub(rendered.chars().count());
    Ok(if number.is_some() {
        format!("{}{}", " ".repeat(padding), rendered)
    } else {
        format!("{}{}", rendered, " ".repeat(padding))
    })
}

fn significant(value: f64, digits: usize) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits.max(1) as i32 - 1 - magnitude);
    (value * scale).round() / scale
}

fn exponent_form(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text.to_string(),
    }
}

fn group_thousands(text: &str) -> String {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (integer, fraction) = match rest.find('.') {
        Some(dot) => rest.split_at(dot),
        None => (rest, ""),
    };
    let mut grouped = String::new();
    for (n, digit) in integer.chars().enumerate() {
        if n > 0 && (integer.len() - n) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}{}{}", sign, grouped, fraction)
}

//=============================================
//            Section 4: Float Arrays
//=============================================

fn array_attribute(data: &FloatArray, name: &str) -> Result<Value, RuntimeError> {
    let len = data.borrow().len();
    match name {
        "shape" => return Ok(Value::tuple(vec![Value::Int(len as i64)])),
        "size" => return Ok(Value::Int(len as i64)),
        "ndim" => return Ok(Value::Int(1)),
        "dtype" => return Ok(Value::str("float64")),
        "T" => return Ok(Value::Array(data.clone())),
        _ => {}
    }
    let data = data.clone();
    match name {
        "sum" | "mean" | "std" | "min" | "max" | "argmin" | "argmax" | "any" | "all" => {
            let reduction = name.to_string();
            Ok(NativeFunction::new(numeric::ORIGIN, name, move |_, _| {
                numeric::reduce(&reduction, &data.borrow())
            }))
        }
        "cumsum" => Ok(NativeFunction::new(numeric::ORIGIN, name, move |_, _| {
            Ok(Value::array(numeric::cumulative_sum(&data.borrow())))
        })),
        "tolist" => Ok(NativeFunction::new(numeric::ORIGIN, name, move |_, _| {
            Ok(Value::list(data.borrow().iter().map(|v| Value::Float(*v)).collect()))
        })),
        "copy" => Ok(NativeFunction::new(numeric::ORIGIN, name, move |_, _| {
            Ok(Value::array(data.borrow().clone()))
        })),
        _ => Err(RuntimeError::attribute_error("numpy.ndarray", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(positional: Vec<Value>, keywords: Vec<(&str, Value)>) -> CallArgs {
        CallArgs::new(
            Rc::from("format"),
            positional,
            keywords.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        )
    }

    #[test]
    fn test_format_fields_and_specs() {
        let call = args(
            vec![Value::Float(3.14159), Value::Int(42)],
            vec![("name", Value::str("x"))],
        );
        assert_eq!(
            format_template("{name}={:.2f} n={1:5d}|", &call).unwrap(),
            "x=3.14 n=   42|"
        );
        assert_eq!(
            format_template("{:.2e}", &args(vec![Value::Float(12345.678)], vec![])).unwrap(),
            "1.23e+04"
        );
        assert_eq!(
            format_template("{{literal}}", &args(vec![], vec![])).unwrap(),
            "{literal}"
        );
    }

    #[test]
    fn test_format_missing_argument() {
        let err = format_template("{} {}", &args(vec![Value::Int(1)], vec![])).unwrap_err();
        assert!(err.to_string().starts_with("IndexError"));
    }

    #[test]
    fn test_grouping() {
        assert_eq!(group_thousands("1234567.5"), "1,234,567.5");
        assert_eq!(group_thousands("-999"), "-999");
    }

    #[test]
    fn test_unknown_attribute() {
        let err = attribute(&Value::Int(1), "real").unwrap_err();
        assert_eq!(
            err.to_string(),
            "AttributeError: 'int' object has no attribute 'real'"
        );
    }

    #[test]
    fn test_array_shape() {
        let shape = attribute(&Value::array(vec![1.0, 2.0]), "shape").unwrap();
        assert_eq!(shape.repr(), "(2,)");
    }
}
