//==============================================
// File: tests/blocks.rs
//==============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Integration tests for the data and plot blocks
// Objective: Exercise result contracts, library handles and image capture
//            end to end
//==============================================

use sciblock::interpreter::Value;
use sciblock::interpreter::value::{json_to_value, value_to_json};
use sciblock::{BlockError, ContractViolation, DataBlock, Fields, PlotBlock, PlotSurface, SurfaceLifecycle};
use serde_json::json;

fn produce(virtual_id: &str, prior: &Fields, code: &str) -> Fields {
    DataBlock::new()
        .with_virtual_id(virtual_id)
        .produce_data(prior, code)
        .unwrap_or_else(|err| panic!("snippet failed:\n{err}"))
}

fn as_json(fields: &Fields) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect(),
    )
}

fn number(fields: &Fields, name: &str) -> f64 {
    fields
        .get(name)
        .and_then(Value::as_f64)
        .unwrap_or_else(|| panic!("{name} is not a number: {:?}", fields.get(name)))
}

#[test]
fn result_mapping_is_returned_exactly() {
    let fields = produce("<blocks_exact>", &Fields::new(), "result = {'a': 1, 'b': 2}\n");
    assert_eq!(as_json(&fields), json!({"a": 1, "b": 2}));
}

#[test]
fn unset_result_is_distinct_from_runtime_failure() {
    let err = DataBlock::new()
        .with_virtual_id("<blocks_unset>")
        .produce_data(&Fields::new(), "x = np.pi\n")
        .unwrap_err();
    assert!(matches!(err, BlockError::Contract(ContractViolation::ResultUnset)));
    assert!(err.diagnostic().is_none());
    assert!(err
        .to_string()
        .starts_with("The code did not set the result variable."));
}

#[test]
fn prior_fields_are_not_mutated() {
    let mut prior = Fields::new();
    prior.insert("samples".to_string(), json_to_value(&json!([1, 2, 3])));
    prior.insert("tags".to_string(), json_to_value(&json!(["a"])));
    let code = "samples[0] = 100.0\ntags.append('b')\nresult = {'first': samples[0], 'tags': tags}\n";
    let fields = produce("<blocks_prior>", &prior, code);
    assert_eq!(as_json(&fields), json!({"first": 100.0, "tags": ["a", "b"]}));
    assert_eq!(value_to_json(&prior["samples"]), json!([1.0, 2.0, 3.0]));
    assert_eq!(value_to_json(&prior["tags"]), json!(["a"]));
}

#[test]
fn numeric_handles_compute() {
    let code = concat!(
        "x = np.linspace(0, 1, 11)\n",
        "y = x ** 2\n",
        "mask = y > 0.5\n",
        "result = {\n",
        "    'total': float(np.sum(y)),\n",
        "    'count': int(len(y[mask])),\n",
        "    'peak': y.max(),\n",
        "    'mean': np.mean([1, 2, 3]),\n",
        "}\n",
    );
    let fields = produce("<blocks_numeric>", &Fields::new(), code);
    assert!((number(&fields, "total") - 3.85).abs() < 1e-9);
    assert_eq!(number(&fields, "count"), 3.0);
    assert!((number(&fields, "peak") - 1.0).abs() < 1e-12);
    assert_eq!(number(&fields, "mean"), 2.0);
}

#[test]
fn seeded_random_is_reproducible() {
    let code = "np.random.seed(7)\na = np.random.normal(0, 1, 4)\nnp.random.seed(7)\nb = np.random.normal(0, 1, 4)\nresult = {'same': bool((a == b).all()), 'n': len(a)}\n";
    let fields = produce("<blocks_random>", &Fields::new(), code);
    assert_eq!(as_json(&fields), json!({"same": true, "n": 4}));
}

#[test]
fn scipy_routines() {
    let code = concat!(
        "from scipy import optimize, integrate\n",
        "best = optimize.minimize_scalar(lambda x: (x - 1.5) ** 2, bounds=(0, 4))\n",
        "root = optimize.brentq(lambda x: x ** 3 - 8, 0, 5)\n",
        "area, err = integrate.quad(np.sin, 0, np.pi)\n",
        "fit = optimize.minimize(lambda p: (p[0] - 1) ** 2 + (p[1] + 1) ** 2, [0.0, 0.0])\n",
        "result = {'x': best.x, 'ok': best.success, 'root': root, 'area': area, 'p0': fit.x[0]}\n",
    );
    let fields = produce("<blocks_scipy>", &Fields::new(), code);
    assert!((number(&fields, "x") - 1.5).abs() < 1e-5);
    assert!(matches!(fields["ok"], Value::Bool(true)));
    assert!((number(&fields, "root") - 2.0).abs() < 1e-9);
    assert!((number(&fields, "area") - 2.0).abs() < 1e-7);
    assert!((number(&fields, "p0") - 1.0).abs() < 1e-2);
}

#[test]
fn brentq_rejects_matching_signs() {
    let err = DataBlock::new()
        .with_virtual_id("<blocks_brentq>")
        .produce_data(
            &Fields::new(),
            "r = scipy.optimize.brentq(lambda x: x * x + 1, -1, 1)\n",
        )
        .unwrap_err();
    let diagnostic = err.diagnostic().expect("execution failure");
    assert_eq!(diagnostic.line_number, Some(1));
    assert_eq!(diagnostic.exception_kind, "ValueError");
}

#[test]
fn jax_gradient() {
    let code = "g = jax.grad(lambda x: x ** 3)\nresult = {'slope': g(2.0), 'c': jnp.cos(0.0)}\n";
    let fields = produce("<blocks_jax>", &Fields::new(), code);
    assert!((number(&fields, "slope") - 12.0).abs() < 1e-4);
    assert_eq!(number(&fields, "c"), 1.0);
}

#[test]
fn plot_yields_exactly_one_image() {
    let block = PlotBlock::new()
        .with_virtual_id("<blocks_plot>")
        .with_surface(PlotSurface::new());
    let code = concat!(
        "x = np.linspace(0, 2 * np.pi, 50)\n",
        "plt.plot(x, np.sin(x), 'r--', label='sin')\n",
        "plt.scatter([1, 2], [0.5, -0.5])\n",
        "plt.title('Wave')\n",
        "plt.legend()\n",
    );
    let output = block.produce_plot(&Fields::new(), code).unwrap();
    let json = serde_json::to_value(&output).unwrap();
    let object = json.as_object().unwrap();
    assert_eq!(object.keys().collect::<Vec<_>>(), ["image"]);
    let svg = String::from_utf8(output.image.data.clone()).unwrap();
    assert!(svg.contains("Wave"));
    assert!(svg.contains("stroke-dasharray"));
    assert_eq!(block.surface().snapshot().series.len(), 2);
}

#[test]
fn plot_failure_reports_snippet_line() {
    let block = PlotBlock::new()
        .with_virtual_id("<blocks_plot_fail>")
        .with_surface(PlotSurface::new());
    let err = block
        .produce_plot(&Fields::new(), "plt.title('ok')\nplt.plot([1, 2, 3], [1, 2])\n")
        .unwrap_err();
    let diagnostic = err.diagnostic().expect("execution failure");
    assert_eq!(diagnostic.line_number, Some(2));
    assert!(diagnostic
        .exception_message
        .contains("x and y must have same first dimension"));
}

#[test]
fn subplots_and_bar_chart() {
    let surface = PlotSurface::new();
    let block = PlotBlock::new()
        .with_virtual_id("<blocks_subplots>")
        .with_surface(surface.clone())
        .with_lifecycle(SurfaceLifecycle::Accumulate);
    let code = concat!(
        "import matplotlib.pyplot as pyplot\n",
        "fig, ax = pyplot.subplots(figsize=(4, 3))\n",
        "ax.bar(['a', 'b', 'c'], [3, 1, 2])\n",
        "ax.set_xlabel('group')\n",
    );
    block.produce_plot(&Fields::new(), code).unwrap();
    let figure = surface.snapshot();
    assert_eq!(figure.size, (4.0, 3.0));
    assert_eq!(figure.xlabel.as_deref(), Some("group"));
    assert_eq!(
        figure.series[0].categories.as_deref(),
        Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
    );
}
