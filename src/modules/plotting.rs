//=============================================
// sciblock/modules/plotting.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Plotting library handles
// Objective: Provide matplotlib and matplotlib.pyplot whose calls draw into
//            a shared plotting surface
//=============================================

use indexmap::IndexMap;
use tracing::warn;

use super::numeric::to_vector;
use crate::interpreter::{CallArgs, ExceptionKind, Interpreter, Module, NativeFunction, RuntimeError, Value};
use crate::surface::{LineStyle, PlotSurface, Series, SeriesKind};

pub const PYPLOT: &str = "matplotlib.pyplot";
const AXES: &str = "matplotlib.axes";

type PlotFn = fn(&PlotSurface, &mut Interpreter, CallArgs) -> Result<Value, RuntimeError>;

/// Wraps a plotting routine so it draws into `surface`.
fn bind(surface: &PlotSurface, origin: &str, name: &str, func: PlotFn) -> Value {
    let surface = surface.clone();
    NativeFunction::new(origin, name, move |interp, args| func(&surface, interp, args))
}

//=============================================
//            Section 1: Format Strings
//=============================================

/// Parsed matplotlib format string such as `"r--"` or `"bo"`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LineFormat {
    pub color: Option<String>,
    pub marker: Option<char>,
    pub line_style: Option<LineStyle>,
}

pub fn parse_format(fmt: &str) -> Result<LineFormat, RuntimeError> {
    let mut format = LineFormat::default();
    let chars: Vec<char> = fmt.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        if two == "--" || two == "-." {
            format.line_style = Some(if two == "--" {
                LineStyle::Dashed
            } else {
                LineStyle::DashDot
            });
            i += 2;
            continue;
        }
        match chars[i] {
            '-' => format.line_style = Some(LineStyle::Solid),
            ':' => format.line_style = Some(LineStyle::Dotted),
            c @ ('b' | 'g' | 'r' | 'c' | 'm' | 'y' | 'k' | 'w') => format.color = Some(c.to_string()),
            c @ ('o' | '.' | 's' | '^' | 'x' | '+' | '*' | 'd') => format.marker = Some(c),
            other => {
                return Err(RuntimeError::value_error(format!(
                    "'{}' is not a valid format string (unrecognized character '{}')",
                    fmt, other
                )));
            }
        }
        i += 1;
    }
    Ok(format)
}

fn parse_line_style(text: &str) -> Result<LineStyle, RuntimeError> {
    Ok(match text {
        "-" | "solid" => LineStyle::Solid,
        "--" | "dashed" => LineStyle::Dashed,
        ":" | "dotted" => LineStyle::Dotted,
        "-." | "dashdot" => LineStyle::DashDot,
        "" | " " | "None" | "none" => LineStyle::None,
        other => {
            return Err(RuntimeError::value_error(format!(
                "{} is not a valid value for ls",
                Value::str(other).repr()
            )));
        }
    })
}

//=============================================
//            Section 2: Argument Helpers
//=============================================

fn optional_string(args: &CallArgs, name: &str) -> Option<String> {
    args.keyword(name).and_then(Value::as_str).map(str::to_string)
}

fn is_array_like(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::List(_) | Value::Tuple(_))
}

fn same_length(x: &[f64], y: &[f64]) -> Result<(), RuntimeError> {
    if x.len() != y.len() {
        return Err(RuntimeError::value_error(format!(
            "x and y must have same first dimension, but have shapes ({},) and ({},)",
            x.len(),
            y.len()
        )));
    }
    Ok(())
}

fn index_axis(len: usize) -> Vec<f64> {
    (0..len).map(|i| i as f64).collect()
}

/// Limits given as `(low, high)`, `[low, high]`, or two positionals.
fn limits(args: &CallArgs) -> Result<Option<(f64, f64)>, RuntimeError> {
    match args.positional.as_slice() {
        [] => {
            let low = args.keyword("left").or_else(|| args.keyword("bottom"));
            let high = args.keyword("right").or_else(|| args.keyword("top"));
            match (low.and_then(Value::as_f64), high.and_then(Value::as_f64)) {
                (Some(low), Some(high)) => Ok(Some((low, high))),
                _ => Ok(None),
            }
        }
        [pair] if is_array_like(pair) => {
            let values = to_vector(pair)?;
            match values.as_slice() {
                [low, high] => Ok(Some((*low, *high))),
                _ => Err(RuntimeError::value_error("limits must be a pair of numbers")),
            }
        }
        _ => Ok(Some((args.number(0, "left")?, args.number(1, "right")?))),
    }
}

fn line_record(label: Option<&str>) -> Value {
    let mut fields = IndexMap::new();
    fields.insert(
        "label".to_string(),
        label.map(Value::str).unwrap_or(Value::None),
    );
    Value::record("Line2D", fields)
}

//=============================================
//            Section 3: Drawing
//=============================================

//Function: plot
//Purpose: Draw one or more line series from [x], y, [fmt] groups
//Inputs: positional groups, label/color/linestyle/marker keywords
//Returns: list of Line2D records
fn plot(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(
        usize::MAX,
        &["label", "color", "c", "linestyle", "ls", "marker", "linewidth", "lw", "alpha"],
    )?;
    let mut groups = Vec::new();
    let mut rest = args.positional.as_slice();
    while !rest.is_empty() {
        let first = to_vector(&rest[0])?;
        rest = &rest[1..];
        let (x, y) = match rest.first() {
            Some(next) if is_array_like(next) => {
                rest = &rest[1..];
                (first, to_vector(next)?)
            }
            _ => (index_axis(first.len()), first),
        };
        let format = match rest.first() {
            Some(Value::Str(fmt)) => {
                rest = &rest[1..];
                parse_format(fmt)?
            }
            _ => LineFormat::default(),
        };
        same_length(&x, &y)?;
        groups.push((x, y, format));
    }

    let label = optional_string(&args, "label");
    let color = optional_string(&args, "color").or_else(|| optional_string(&args, "c"));
    let line_style = match optional_string(&args, "linestyle").or_else(|| optional_string(&args, "ls")) {
        Some(style) => Some(parse_line_style(&style)?),
        None => None,
    };
    let marker = optional_string(&args, "marker").and_then(|m| m.chars().next());

    let mut lines = Vec::with_capacity(groups.len());
    for (x, y, format) in groups {
        let mut series = Series::new(SeriesKind::Line, x, y);
        series.label = label.clone();
        series.color = color.clone().or(format.color);
        series.marker = marker.or(format.marker);
        series.line_style = match (line_style, format.line_style, series.marker) {
            (Some(style), _, _) | (None, Some(style), _) => style,
            (None, None, Some(_)) if format.marker.is_some() => LineStyle::None,
            _ => LineStyle::Solid,
        };
        surface.add_series(series);
        lines.push(line_record(label.as_deref()));
    }
    Ok(Value::list(lines))
}

fn scatter(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(3, &["x", "y", "s", "c", "color", "marker", "label", "alpha"])?;
    let x = to_vector(args.required(0, "x")?)?;
    let y = to_vector(args.required(1, "y")?)?;
    if x.len() != y.len() {
        return Err(RuntimeError::value_error("x and y must be the same size"));
    }
    let size = args.number_or(2, "s", 36.0)?;
    let mut series = Series::new(SeriesKind::Scatter { size }, x, y);
    series.label = optional_string(&args, "label");
    series.color = optional_string(&args, "color").or_else(|| optional_string(&args, "c"));
    series.marker = optional_string(&args, "marker").and_then(|m| m.chars().next());
    surface.add_series(series);
    Ok(Value::None)
}

fn bar(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(3, &["x", "height", "width", "color", "label", "alpha"])?;
    let x_arg = args.required(0, "x")?;
    let height = to_vector(args.required(1, "height")?)?;
    let width = args.number_or(2, "width", 0.8)?;
    let labels: Option<Vec<String>> = match x_arg {
        Value::List(items) if items.borrow().iter().all(|item| matches!(item, Value::Str(_))) && !items.borrow().is_empty() => {
            Some(items.borrow().iter().map(Value::to_string).collect())
        }
        Value::Tuple(items) if items.iter().all(|item| matches!(item, Value::Str(_))) && !items.is_empty() => {
            Some(items.iter().map(Value::to_string).collect())
        }
        _ => None,
    };
    let x = match &labels {
        Some(labels) => index_axis(labels.len()),
        None => to_vector(x_arg)?,
    };
    let height = if height.len() == 1 && x.len() > 1 {
        vec![height[0]; x.len()]
    } else {
        height
    };
    if x.len() != height.len() {
        return Err(RuntimeError::value_error(format!(
            "shape mismatch: objects cannot be broadcast to a single shape. Mismatch is between arg 0 with shape ({},) and arg 1 with shape ({},).",
            x.len(),
            height.len()
        )));
    }
    let mut series = Series::new(SeriesKind::Bar { width }, x, height);
    series.label = optional_string(&args, "label");
    series.color = optional_string(&args, "color");
    series.categories = labels;
    surface.add_series(series);
    Ok(Value::None)
}

/// Equal-width histogram counts and bin edges.
pub fn histogram(data: &[f64], bins: usize) -> (Vec<f64>, Vec<f64>) {
    let bins = bins.max(1);
    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    let (mut low, mut high) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if finite.is_empty() {
        low = 0.0;
        high = 1.0;
    } else if low == high {
        low -= 0.5;
        high += 0.5;
    }
    let width = (high - low) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| low + width * i as f64).collect();
    let mut counts = vec![0.0; bins];
    for value in finite {
        let index = (((value - low) / width).floor() as usize).min(bins - 1);
        counts[index] += 1.0;
    }
    (counts, edges)
}

fn hist(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["x", "bins", "color", "label", "alpha", "edgecolor"])?;
    let data = to_vector(args.required(0, "x")?)?;
    let bins = match args.get(1, "bins") {
        None | Some(Value::None) => 10,
        Some(value) => match value.as_int() {
            Some(n) if n > 0 => n as usize,
            _ => {
                return Err(RuntimeError::value_error(
                    "`bins` must be a positive integer",
                ));
            }
        },
    };
    let (counts, edges) = histogram(&data, bins);
    let width = edges[1] - edges[0];
    let centers: Vec<f64> = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let mut series = Series::new(SeriesKind::Bar { width }, centers, counts.clone());
    series.label = optional_string(&args, "label");
    series.color = optional_string(&args, "color");
    surface.add_series(series);
    Ok(Value::tuple(vec![
        Value::array(counts),
        Value::array(edges),
        Value::list(Vec::new()),
    ]))
}

//=============================================
//            Section 4: Decoration and State
//=============================================

fn text_arg(args: &CallArgs, name: &str) -> Result<String, RuntimeError> {
    Ok(args.required(0, name)?.to_string())
}

fn title(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["label", "fontsize", "loc"])?;
    let text = text_arg(&args, "label")?;
    surface.with(|figure| figure.title = Some(text));
    Ok(Value::None)
}

fn xlabel(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["xlabel", "fontsize"])?;
    let text = text_arg(&args, "xlabel")?;
    surface.with(|figure| figure.xlabel = Some(text));
    Ok(Value::None)
}

fn ylabel(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["ylabel", "fontsize"])?;
    let text = text_arg(&args, "ylabel")?;
    surface.with(|figure| figure.ylabel = Some(text));
    Ok(Value::None)
}

fn legend(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(0, &["loc", "fontsize", "frameon"])?;
    let labelled = surface.with(|figure| {
        figure.legend = true;
        figure.series.iter().any(|series| series.label.is_some())
    });
    if !labelled {
        warn!("No artists with labels found to put in legend.");
    }
    Ok(Value::None)
}

fn grid(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["visible", "which", "axis", "alpha", "linestyle"])?;
    let visible = match args.get(0, "visible") {
        None | Some(Value::None) => true,
        Some(flag) => flag.is_truthy()?,
    };
    surface.with(|figure| figure.grid = visible);
    Ok(Value::None)
}

fn xlim(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["left", "right"])?;
    if let Some(range) = limits(&args)? {
        surface.with(|figure| figure.xlim = Some(range));
    }
    let (low, high) = surface.snapshot().bounds().0;
    Ok(Value::tuple(vec![Value::Float(low), Value::Float(high)]))
}

fn ylim(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["bottom", "top"])?;
    if let Some(range) = limits(&args)? {
        surface.with(|figure| figure.ylim = Some(range));
    }
    let (low, high) = surface.snapshot().bounds().1;
    Ok(Value::tuple(vec![Value::Float(low), Value::Float(high)]))
}

fn figure_size(args: &CallArgs) -> Result<Option<(f64, f64)>, RuntimeError> {
    match args.keyword("figsize") {
        None | Some(Value::None) => Ok(None),
        Some(value) => match to_vector(value)?.as_slice() {
            [w, h] if *w > 0.0 && *h > 0.0 => Ok(Some((*w, *h))),
            _ => Err(RuntimeError::value_error(
                "figure size must be two positive numbers",
            )),
        },
    }
}

/// Starts a new current figure, replacing whatever was drawn before.
fn figure(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &["num", "figsize", "dpi"])?;
    let size = figure_size(&args)?;
    surface.clear();
    if let Some(size) = size {
        surface.with(|figure| figure.size = size);
    }
    Ok(figure_record(surface))
}

fn clear(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(1, &[])?;
    surface.clear();
    Ok(Value::None)
}

fn no_op(_surface: &PlotSurface, _interp: &mut Interpreter, _args: CallArgs) -> Result<Value, RuntimeError> {
    Ok(Value::None)
}

fn gca(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(0, &[])?;
    Ok(axes_record(surface))
}

fn subplots(surface: &PlotSurface, _interp: &mut Interpreter, args: CallArgs) -> Result<Value, RuntimeError> {
    args.check(2, &["nrows", "ncols", "figsize", "dpi"])?;
    let nrows = args.get(0, "nrows").and_then(Value::as_int).unwrap_or(1);
    let ncols = args.get(1, "ncols").and_then(Value::as_int).unwrap_or(1);
    if nrows != 1 || ncols != 1 {
        return Err(RuntimeError::raise(
            ExceptionKind::NotImplementedError,
            "subplots supports a single axes only",
        ));
    }
    let size = figure_size(&args)?;
    surface.clear();
    if let Some(size) = size {
        surface.with(|figure| figure.size = size);
    }
    Ok(Value::tuple(vec![figure_record(surface), axes_record(surface)]))
}

fn figure_record(surface: &PlotSurface) -> Value {
    let mut fields = IndexMap::new();
    fields.insert("suptitle".to_string(), bind(surface, PYPLOT, "suptitle", title));
    fields.insert("tight_layout".to_string(), bind(surface, PYPLOT, "tight_layout", no_op));
    fields.insert("savefig".to_string(), bind(surface, PYPLOT, "savefig", no_op));
    Value::record("Figure", fields)
}

/// Object-oriented view of the same surface, as returned by `subplots`.
fn axes_record(surface: &PlotSurface) -> Value {
    let methods: [(&str, PlotFn); 12] = [
        ("plot", plot),
        ("scatter", scatter),
        ("bar", bar),
        ("hist", hist),
        ("set_title", title),
        ("set_xlabel", xlabel),
        ("set_ylabel", ylabel),
        ("legend", legend),
        ("grid", grid),
        ("set_xlim", xlim),
        ("set_ylim", ylim),
        ("clear", clear),
    ];
    let fields = methods
        .into_iter()
        .map(|(name, func)| (name.to_string(), bind(surface, AXES, name, func)))
        .collect();
    Value::record("Axes", fields)
}

//=============================================
//            Section 5: Module Builders
//=============================================

/// `matplotlib.pyplot` bound to `surface`.
pub fn pyplot_module(surface: &PlotSurface) -> Module {
    let functions: [(&str, PlotFn); 21] = [
        ("figure", figure),
        ("plot", plot),
        ("scatter", scatter),
        ("bar", bar),
        ("hist", hist),
        ("title", title),
        ("suptitle", title),
        ("xlabel", xlabel),
        ("ylabel", ylabel),
        ("legend", legend),
        ("grid", grid),
        ("xlim", xlim),
        ("ylim", ylim),
        ("clf", clear),
        ("cla", clear),
        ("close", clear),
        ("show", no_op),
        ("tight_layout", no_op),
        ("savefig", no_op),
        ("subplots", subplots),
        ("gca", gca),
    ];
    let mut module = Module::new(PYPLOT);
    for (name, func) in functions {
        module.members.insert(name.to_string(), bind(surface, PYPLOT, name, func));
    }
    module
}

/// `matplotlib` with its `pyplot` submodule.
pub fn matplotlib_module(surface: &PlotSurface) -> Value {
    let mut module = Module::new("matplotlib");
    module.constant("pyplot", pyplot_module(surface).into_value());
    module.into_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        let format = parse_format("r--").unwrap();
        assert_eq!(format.color.as_deref(), Some("r"));
        assert_eq!(format.line_style, Some(LineStyle::Dashed));
        let format = parse_format("bo").unwrap();
        assert_eq!(format.marker, Some('o'));
        assert_eq!(format.line_style, None);
        assert!(parse_format("q").is_err());
    }

    #[test]
    fn test_histogram_counts_include_last_edge() {
        let (counts, edges) = histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(edges, vec![0.0, 2.0, 4.0]);
        assert_eq!(counts, vec![2.0, 3.0]);
    }

    #[test]
    fn test_histogram_of_constant_data() {
        let (counts, edges) = histogram(&[5.0, 5.0], 1);
        assert_eq!(edges, vec![4.5, 5.5]);
        assert_eq!(counts, vec![2.0]);
    }
}
