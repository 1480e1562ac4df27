//=============================================
// sciblock/modules/numeric.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Numerical array library handles
// Objective: Provide the numpy, numpy.random, jax and jax.numpy modules
//            injected into data and plot snippets
//=============================================

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::interpreter::ops::{MAX_SEQUENCE_LEN, broadcast, float_vector};
use crate::interpreter::{CallArgs, ExceptionKind, Interpreter, Module, NativeFunction, RuntimeError, Value};

pub const ORIGIN: &str = "numpy";

//=============================================
//            Section 1: Shared Kernels
//=============================================

/// Whole-array reductions shared by the module functions and array methods.
pub fn reduce(name: &str, data: &[f64]) -> Result<Value, RuntimeError> {
    match name {
        "sum" => Ok(Value::Float(data.iter().sum())),
        "mean" => Ok(Value::Float(mean(data))),
        "std" => Ok(Value::Float(std_dev(data, 0.0))),
        "median" => Ok(Value::Float(median(data))),
        "any" => Ok(Value::Bool(data.iter().any(|v| *v != 0.0))),
        "all" => Ok(Value::Bool(data.iter().all(|v| *v != 0.0))),
        "min" | "max" => {
            if data.is_empty() {
                let full = if name == "min" { "minimum" } else { "maximum" };
                return Err(RuntimeError::value_error(format!(
                    "zero-size array to reduction operation {} which has no identity",
                    full
                )));
            }
            if data.iter().any(|v| v.is_nan()) {
                return Ok(Value::Float(f64::NAN));
            }
            let pick = if name == "min" { f64::min } else { f64::max };
            Ok(Value::Float(data.iter().copied().fold(data[0], pick)))
        }
        "argmin" | "argmax" => {
            if data.is_empty() {
                return Err(RuntimeError::value_error(format!(
                    "attempt to get {} of an empty sequence",
                    name
                )));
            }
            if let Some(at) = data.iter().position(|v| v.is_nan()) {
                return Ok(Value::Int(at as i64));
            }
            let mut best = 0;
            for (index, value) in data.iter().enumerate().skip(1) {
                let better = if name == "argmin" {
                    *value < data[best]
                } else {
                    *value > data[best]
                };
                if better {
                    best = index;
                }
            }
            Ok(Value::Int(best as i64))
        }
        other => Err(RuntimeError::raise(
            ExceptionKind::NotImplementedError,
            format!("reduction '{}' is not supported", other),
        )),
    }
}

pub fn cumulative_sum(data: &[f64]) -> Vec<f64> {
    data.iter()
        .scan(0.0, |total, value| {
            *total += value;
            Some(*total)
        })
        .collect()
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

fn std_dev(data: &[f64], ddof: f64) -> f64 {
    let dof = data.len() as f64 - ddof;
    if dof <= 0.0 {
        return f64::NAN;
    }
    let center = mean(data);
    (data.iter().map(|v| (v - center).powi(2)).sum::<f64>() / dof).sqrt()
}

fn median(data: &[f64]) -> f64 {
    if data.is_empty() || data.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Converts an array-like argument into floats. Nested sequences are
/// rejected since arrays are one-dimensional.
pub fn to_vector(value: &Value) -> Result<Vec<f64>, RuntimeError> {
    if let Some(data) = float_vector(value) {
        return Ok(data);
    }
    let items: Vec<Value> = match value {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.as_ref().clone(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            )));
        }
    };
    for item in &items {
        match item {
            Value::List(_) | Value::Tuple(_) | Value::Array(_) => {
                return Err(RuntimeError::value_error(
                    "only one-dimensional arrays are supported",
                ));
            }
            Value::Str(text) => {
                if text.trim().parse::<f64>().is_err() {
                    return Err(RuntimeError::value_error(format!(
                        "could not convert string to float: {}",
                        item.repr()
                    )));
                }
            }
            _ if item.as_f64().is_none() => {
                return Err(RuntimeError::type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    item.type_name()
                )));
            }
            _ => {}
        }
    }
    Ok(items
        .iter()
        .map(|item| match item {
            Value::Str(text) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
            other => other.as_f64().unwrap_or(f64::NAN),
        })
        .collect())
}

fn vector_arg(args: &CallArgs, index: usize, name: &str) -> Result<Vec<f64>, RuntimeError> {
    to_vector(args.required(index, name)?)
}

/// Size argument: an integer or a one-element tuple.
fn bounded_len(n: u64) -> Result<usize, RuntimeError> {
    match usize::try_from(n) {
        Ok(len) if len <= MAX_SEQUENCE_LEN => Ok(len),
        _ => Err(RuntimeError::raise(
            ExceptionKind::MemoryError,
            format!("Unable to allocate array with {} elements", n),
        )),
    }
}

fn size_arg(value: &Value) -> Result<usize, RuntimeError> {
    let count = match value {
        Value::Tuple(items) if items.len() == 1 => items[0].as_int(),
        Value::List(items) if items.borrow().len() == 1 => items.borrow()[0].as_int(),
        Value::Tuple(_) | Value::List(_) => {
            return Err(RuntimeError::value_error(
                "only one-dimensional arrays are supported",
            ));
        }
        other => other.as_int(),
    };
    match count {
        Some(n) if n >= 0 => bounded_len(n as u64),
        Some(_) => Err(RuntimeError::value_error("negative dimensions are not allowed")),
        None => Err(RuntimeError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))),
    }
}

fn elementwise(args: &CallArgs, f: fn(f64) -> f64) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    match args.required(0, "x")? {
        value @ (Value::Array(_) | Value::List(_) | Value::Tuple(_)) => {
            Ok(Value::array(to_vector(value)?.into_iter().map(f).collect()))
        }
        value => value.as_f64().map(|x| Value::Float(f(x))).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "ufunc '{}' not supported for the input types",
                args.function
            ))
        }),
    }
}

const UNARY_FUNCTIONS: [(&str, fn(f64) -> f64); 12] = [
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("tan", f64::tan),
    ("exp", f64::exp),
    ("log", f64::ln),
    ("log10", f64::log10),
    ("sqrt", f64::sqrt),
    ("abs", f64::abs),
    ("floor", f64::floor),
    ("ceil", f64::ceil),
    ("square", square),
    ("tanh", f64::tanh),
];

fn square(x: f64) -> f64 {
    x * x
}

//=============================================
//            Section 2: Constructors
//=============================================

fn np_array(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["dtype"])?;
    vector_arg(&args, 0, "object").map(Value::array)
}

//Function: np_linspace
//Purpose: Evenly spaced samples over a closed (or half-open) interval
//Inputs: start, stop, num=50, endpoint=True
//Returns: array
fn np_linspace(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(3, &["start", "stop", "num", "endpoint"])?;
    let start = args.number(0, "start")?;
    let stop = args.number(1, "stop")?;
    let num = match args.get(2, "num") {
        Some(value) => size_arg(value)?,
        None => 50,
    };
    let endpoint = match args.keyword("endpoint") {
        Some(flag) => flag.is_truthy()?,
        None => true,
    };
    let divisions = if endpoint { num.saturating_sub(1) } else { num };
    let step = if divisions == 0 {
        0.0
    } else {
        (stop - start) / divisions as f64
    };
    let mut data: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
    if endpoint && num > 1 {
        data[num - 1] = stop;
    }
    Ok(Value::array(data))
}

fn np_arange(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(3, &["start", "stop", "step"])?;
    let (start, stop) = match args.get(1, "stop") {
        Some(Value::None) | None => (0.0, args.number(0, "start")?),
        Some(_) => (args.number(0, "start")?, args.number(1, "stop")?),
    };
    let step = args.number_or(2, "step", 1.0)?;
    if step == 0.0 {
        return Err(RuntimeError::zero_division("division by zero"));
    }
    let count = ((stop - start) / step).ceil();
    if !count.is_finite() {
        return Err(RuntimeError::value_error("arange: cannot compute length"));
    }
    let count = bounded_len(count.max(0.0) as u64)?;
    Ok(Value::array(
        (0..count).map(|i| start + step * i as f64).collect(),
    ))
}

fn filled(args: &CallArgs, fill: f64) -> Result<Value, RuntimeError> {
    let count = size_arg(args.required(0, "shape")?)?;
    Ok(Value::array(vec![fill; count]))
}

fn np_zeros(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["shape", "dtype"])?;
    filled(&args, 0.0)
}

fn np_ones(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["shape", "dtype"])?;
    filled(&args, 1.0)
}

fn np_full(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["shape", "fill_value", "dtype"])?;
    let fill = args.number(1, "fill_value")?;
    filled(&args, fill)
}

//=============================================
//            Section 3: Array Routines
//=============================================

fn module_reduction(args: &CallArgs, name: &str) -> Result<Value, RuntimeError> {
    args.check(1, &["a"])?;
    reduce(name, &vector_arg(args, 0, "a")?)
}

fn np_std(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["a", "ddof"])?;
    let ddof = args.number_or(1, "ddof", 0.0)?;
    Ok(Value::Float(std_dev(&vector_arg(&args, 0, "a")?, ddof)))
}

fn np_dot(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &[])?;
    let a = vector_arg(&args, 0, "a")?;
    let b = vector_arg(&args, 1, "b")?;
    if a.len() != b.len() {
        return Err(RuntimeError::value_error(format!(
            "shapes ({},) and ({},) not aligned: {} (dim 0) != {} (dim 0)",
            a.len(),
            b.len(),
            a.len(),
            b.len()
        )));
    }
    Ok(Value::Float(a.iter().zip(&b).map(|(x, y)| x * y).sum()))
}

fn np_cumsum(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    Ok(Value::array(cumulative_sum(&vector_arg(&args, 0, "a")?)))
}

fn np_diff(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    let data = vector_arg(&args, 0, "a")?;
    Ok(Value::array(data.windows(2).map(|w| w[1] - w[0]).collect()))
}

fn np_concatenate(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    let parts = match args.required(0, "arrays")? {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.as_ref().clone(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "The first input argument needs to be a sequence, not '{}'",
                other.type_name()
            )));
        }
    };
    let mut data = Vec::new();
    for part in &parts {
        data.extend(to_vector(part)?);
    }
    Ok(Value::array(data))
}

fn np_clip(_interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(3, &[])?;
    let low = args.number_or(1, "a_min", f64::NEG_INFINITY)?;
    let high = args.number_or(2, "a_max", f64::INFINITY)?;
    let data = vector_arg(&args, 0, "a")?;
    Ok(Value::array(data.into_iter().map(|v| v.max(low).min(high)).collect()))
}

fn binary_elementwise(args: &CallArgs, f: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    args.check(2, &[])?;
    let a = vector_arg(args, 0, "x1")?;
    let b = vector_arg(args, 1, "x2")?;
    broadcast(&a, &b, f).map(Value::array)
}

//=============================================
//            Section 4: Random Numbers
//=============================================

type SharedRng = Rc<RefCell<StdRng>>;

fn samples(rng: &SharedRng, size: Option<&Value>, mut draw: impl FnMut(&mut StdRng) -> f64) -> Result<Value, RuntimeError> {
    let mut rng = rng.borrow_mut();
    match size {
        None | Some(Value::None) => Ok(Value::Float(draw(&mut rng))),
        Some(size) => {
            let count = size_arg(size)?;
            Ok(Value::array((0..count).map(|_| draw(&mut rng)).collect()))
        }
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn random_module(parent: &str) -> Module {
    let mut module = Module::new(&format!("{}.random", parent));
    let rng: SharedRng = Rc::new(RefCell::new(StdRng::from_entropy()));

    let state = rng.clone();
    module.function("seed", move |_, args| {
        args.check(1, &["seed"])?;
        let seed = args.integer(0, "seed")?;
        *state.borrow_mut() = StdRng::seed_from_u64(seed as u64);
        Ok(Value::None)
    });

    let state = rng.clone();
    module.function("rand", move |_, args| {
        args.check(1, &[])?;
        samples(&state, args.positional.first(), |rng| rng.gen_range(0.0..1.0))
    });

    let state = rng.clone();
    module.function("uniform", move |_, args| {
        args.check(3, &["low", "high", "size"])?;
        let low = args.number_or(0, "low", 0.0)?;
        let high = args.number_or(1, "high", 1.0)?;
        samples(&state, args.get(2, "size"), |rng| {
            low + (high - low) * rng.gen_range(0.0..1.0)
        })
    });

    let state = rng.clone();
    module.function("normal", move |_, args| {
        args.check(3, &["loc", "scale", "size"])?;
        let loc = args.number_or(0, "loc", 0.0)?;
        let scale = args.number_or(1, "scale", 1.0)?;
        if scale < 0.0 {
            return Err(RuntimeError::value_error("scale < 0"));
        }
        samples(&state, args.get(2, "size"), |rng| loc + scale * standard_normal(rng))
    });

    let state = rng;
    module.function("randint", move |_, args| {
        args.check(3, &["low", "high", "size"])?;
        let (low, high) = match args.get(1, "high") {
            None | Some(Value::None) => (0, args.integer(0, "low")?),
            Some(_) => (args.integer(0, "low")?, args.integer(1, "high")?),
        };
        if low >= high {
            return Err(RuntimeError::value_error("low >= high"));
        }
        match args.get(2, "size") {
            None | Some(Value::None) => Ok(Value::Int(state.borrow_mut().gen_range(low..high))),
            Some(size) => samples(&state, Some(size), |rng| rng.gen_range(low..high) as f64),
        }
    });

    module
}

//=============================================
//            Section 5: Module Builders
//=============================================

fn array_namespace(name: &str) -> Module {
    let mut module = Module::new(name);
    module.function("array", np_array);
    module.function("asarray", np_array);
    module.function("linspace", np_linspace);
    module.function("arange", np_arange);
    module.function("zeros", np_zeros);
    module.function("ones", np_ones);
    module.function("full", np_full);
    for (fname, f) in UNARY_FUNCTIONS {
        module.function(fname, move |_, args| elementwise(&args, f));
    }
    for reduction in ["sum", "mean", "median", "min", "max", "argmin", "argmax", "any", "all"] {
        module.function(reduction, move |_, args| module_reduction(&args, reduction));
    }
    module.function("std", np_std);
    module.function("dot", np_dot);
    module.function("cumsum", np_cumsum);
    module.function("diff", np_diff);
    module.function("concatenate", np_concatenate);
    module.function("clip", np_clip);
    module.function("maximum", |_, args| binary_elementwise(&args, f64::max));
    module.function("minimum", |_, args| binary_elementwise(&args, f64::min));
    module.function("power", |_, args| binary_elementwise(&args, f64::powf));
    module.constant("pi", Value::Float(std::f64::consts::PI));
    module.constant("e", Value::Float(std::f64::consts::E));
    module.constant("inf", Value::Float(f64::INFINITY));
    module.constant("nan", Value::Float(f64::NAN));
    module
}

/// The `numpy` handle, including its `random` submodule.
pub fn numpy_module() -> Value {
    let mut module = array_namespace("numpy");
    module.constant("random", random_module("numpy").into_value());
    module.into_value()
}

/// Central-difference derivative of a scalar snippet function.
fn gradient_of(target: Value) -> Value {
    NativeFunction::new("jax", "grad_fn", move |interp, args| {
        args.check(1, &[])?;
        let x = match args.required(0, "x")? {
            Value::Float(x) => *x,
            Value::Int(_) | Value::Bool(_) => {
                return Err(RuntimeError::type_error(
                    "grad requires real-valued inputs (input dtype that is a sub-dtype of np.floating), but got int",
                ));
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "grad requires a scalar float input, got '{}'",
                    other.type_name()
                )));
            }
        };
        let h = 1e-6 * x.abs().max(1.0);
        let mut sample = |at: f64| -> Result<f64, RuntimeError> {
            let value = interp.call_value(&target, vec![Value::Float(at)], Vec::new())?;
            value.as_f64().ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "Gradient only defined for scalar-output functions. Output was {}",
                    value.repr()
                ))
            })
        };
        let forward = sample(x + h)?;
        let backward = sample(x - h)?;
        Ok(Value::Float((forward - backward) / (2.0 * h)))
    })
}

/// The `jax` handle: `jax.numpy` plus the `jit` and `grad` transforms.
pub fn jax_module() -> Value {
    let mut module = Module::new("jax");
    module.constant("numpy", array_namespace("jax.numpy").into_value());
    module.function("jit", |_, args| {
        args.check(1, &[])?;
        Ok(args.required(0, "fun")?.clone())
    });
    module.function("grad", |_, args| {
        args.check(1, &[])?;
        Ok(gradient_of(args.required(0, "fun")?.clone()))
    });
    module.into_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reductions() {
        let data = [3.0, 1.0, 2.0];
        assert!(matches!(reduce("sum", &data).unwrap(), Value::Float(v) if v == 6.0));
        assert!(matches!(reduce("argmin", &data).unwrap(), Value::Int(1)));
        assert!(matches!(reduce("median", &data).unwrap(), Value::Float(v) if v == 2.0));
        assert!(matches!(reduce("std", &[1.0, 3.0]).unwrap(), Value::Float(v) if v == 1.0));
        assert!(reduce("max", &[]).is_err());
        assert!(matches!(reduce("mean", &[]).unwrap(), Value::Float(v) if v.is_nan()));
    }

    #[test]
    fn test_oversized_shapes_are_memory_errors() {
        let err = size_arg(&Value::Int(i64::MAX)).unwrap_err();
        assert!(err.to_string().starts_with("MemoryError: Unable to allocate"));
        assert_eq!(size_arg(&Value::tuple(vec![Value::Int(4)])).unwrap(), 4);
    }

    #[test]
    fn test_cumulative_sum() {
        assert_eq!(cumulative_sum(&[1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
        assert!(cumulative_sum(&[]).is_empty());
    }

    #[test]
    fn test_to_vector_rejects_nested() {
        let nested = Value::list(vec![Value::list(vec![Value::Int(1)])]);
        assert!(to_vector(&nested).is_err());
        let text = Value::list(vec![Value::str("2.5")]);
        assert_eq!(to_vector(&text).unwrap(), vec![2.5]);
        let bad = Value::list(vec![Value::str("x")]);
        assert!(to_vector(&bad).is_err());
    }

    #[test]
    fn test_module_names() {
        match numpy_module() {
            Value::Module(module) => {
                assert_eq!(module.name, "numpy");
                assert!(matches!(module.members.get("random"), Some(Value::Module(m)) if m.name == "numpy.random"));
            }
            other => panic!("expected module, found {other:?}"),
        }
        match jax_module() {
            Value::Module(module) => {
                assert!(matches!(module.members.get("numpy"), Some(Value::Module(m)) if m.name == "jax.numpy"));
            }
            other => panic!("expected module, found {other:?}"),
        }
    }
}
