//==============================================
// File: tests/diagnostics.rs
//==============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Integration tests for failure localisation
// Objective: Check that every failure names the snippet line at fault,
//            never a library-internal location
//==============================================

use sciblock::interpreter::Value;
use sciblock::{BlockError, DataBlock, ExecutionDiagnostic, Executor, Fields, Namespace, SourceRegistry};

fn data_failure(virtual_id: &str, code: &str) -> ExecutionDiagnostic {
    match DataBlock::new()
        .with_virtual_id(virtual_id)
        .produce_data(&Fields::new(), code)
    {
        Err(BlockError::Execution(diagnostic)) => diagnostic,
        Err(other) => panic!("expected an execution failure, got {other}"),
        Ok(fields) => panic!("expected a failure, got {} fields", fields.len()),
    }
}

#[test]
fn runtime_error_reports_exact_line() {
    let code = "a = 1\nb = 2\nc = a / 0\nresult = {'c': c}\n";
    let diagnostic = data_failure("<diag_line>", code);
    assert_eq!(
        diagnostic.to_string(),
        "Error in code block at line 3: >>> c = a / 0\nZeroDivisionError: division by zero"
    );
    assert!(diagnostic.location_known);
}

#[test]
fn indented_line_text_is_stripped() {
    let code = "total = 0\nfor i in range(3):\n    total += missing\nresult = {'t': total}\n";
    let diagnostic = data_failure("<diag_indented>", code);
    assert_eq!(diagnostic.line_number, Some(3));
    assert_eq!(diagnostic.line_text, "total += missing");
    assert_eq!(diagnostic.exception_kind, "NameError");
    assert_eq!(diagnostic.exception_message, "name 'missing' is not defined");
}

#[test]
fn library_failure_reports_call_site() {
    let code = concat!(
        "x = np.linspace(0, 1, 5)\n",
        "y = np.zeros(3)\n",
        "\n",
        "z = np.dot(x, y)\n",
        "result = {'z': z}\n",
    );
    let diagnostic = data_failure("<diag_library>", code);
    assert_eq!(diagnostic.line_number, Some(4));
    assert_eq!(diagnostic.line_text, "z = np.dot(x, y)");
    assert_eq!(diagnostic.exception_kind, "ValueError");
    assert!(diagnostic.exception_message.contains("not aligned"));
}

#[test]
fn broadcast_failure_reports_operator_line() {
    let code = "a = np.array([1, 2, 3])\nb = np.array([1, 2])\nc = a + b\n";
    let diagnostic = data_failure("<diag_broadcast>", code);
    assert_eq!(diagnostic.line_number, Some(3));
    assert_eq!(
        diagnostic.exception_message,
        "operands could not be broadcast together with shapes (3,) (2,)"
    );
}

#[test]
fn helper_function_failure_reports_innermost_line() {
    let code = concat!(
        "def scale(values, factor):\n",
        "    if factor == 0:\n",
        "        raise ValueError('factor must be non-zero')\n",
        "    return [v * factor for v in values]\n",
        "\n",
        "result = {'scaled': scale([1, 2], 0)}\n",
    );
    let diagnostic = data_failure("<diag_helper>", code);
    assert_eq!(diagnostic.line_number, Some(3));
    assert_eq!(
        diagnostic.line_text,
        "raise ValueError('factor must be non-zero')"
    );
    assert_eq!(diagnostic.exception_kind, "ValueError");
    assert_eq!(diagnostic.exception_message, "factor must be non-zero");
}

#[test]
fn callback_failure_inside_optimizer_reports_callback_line() {
    let code = concat!(
        "from scipy.optimize import minimize_scalar\n",
        "def objective(x):\n",
        "    return (x - 2) ** 2 + undefined_offset\n",
        "best = minimize_scalar(objective, bounds=(0, 5))\n",
        "result = {'x': best.x}\n",
    );
    let diagnostic = data_failure("<diag_callback>", code);
    assert_eq!(diagnostic.line_number, Some(3));
    assert_eq!(diagnostic.exception_kind, "NameError");
}

#[test]
fn syntax_error_is_diagnosed() {
    let diagnostic = data_failure("<diag_syntax>", "x = 1\ny = (2 +\n");
    assert_eq!(diagnostic.exception_kind, "SyntaxError");
    assert_eq!(diagnostic.line_number, Some(2));
    assert_eq!(diagnostic.line_text, "y = (2 +");
    assert!(diagnostic.to_string().starts_with("Error in code block at line 2: >>> y = (2 +\nSyntaxError: "));
}

#[test]
fn bad_indentation_is_a_syntax_error() {
    let diagnostic = data_failure("<diag_indent>", "x = 1\n    y = 2\n");
    assert_eq!(diagnostic.exception_kind, "SyntaxError");
}

#[test]
fn reused_virtual_id_never_shows_stale_lines() {
    let block = DataBlock::new().with_virtual_id("<diag_reuse>");
    let first = block
        .produce_data(&Fields::new(), "first_line = 1\nboom = 1 / 0\n")
        .unwrap_err();
    assert!(first.to_string().contains("boom = 1 / 0"));

    let second = block
        .produce_data(&Fields::new(), "x = [1, 2]\ny = x[5]\n")
        .unwrap_err();
    let text = second.to_string();
    assert_eq!(
        text,
        "Error in code block at line 2: >>> y = x[5]\nIndexError: list index out of range"
    );
    assert!(!text.contains("boom"));
    assert_eq!(
        SourceRegistry::global().resolve_line("<diag_reuse>", 1),
        "x = [1, 2]"
    );
}

#[test]
fn missing_module_import() {
    let diagnostic = data_failure("<diag_import>", "import pandas as pd\n");
    assert_eq!(diagnostic.exception_kind, "ModuleNotFoundError");
    assert_eq!(diagnostic.exception_message, "No module named 'pandas'");
    assert_eq!(diagnostic.line_number, Some(1));
}

#[test]
fn unbounded_recursion_is_reported() {
    let code = "def down(n):\n    return down(n + 1)\ndown(0)\n";
    let mut namespace = Namespace::new();
    let diagnostic = Executor::new()
        .with_max_call_depth(50)
        .run("<diag_recursion>", code, &mut namespace)
        .unwrap_err();
    assert_eq!(diagnostic.exception_kind, "RecursionError");
    assert_eq!(diagnostic.line_number, Some(2));
}

#[test]
fn executor_returns_mutated_namespace() {
    let mut namespace = Namespace::new();
    namespace.insert("seed", Value::Int(4));
    let returned = Executor::new()
        .run("<diag_namespace>", "seed += 1\nsquared = seed ** 2\n", &mut namespace)
        .unwrap();
    assert!(matches!(returned.get("squared"), Some(Value::Int(25))));
    assert!(matches!(namespace.get("seed"), Some(Value::Int(5))));
}

#[test]
fn diagnostic_serialises_to_json() {
    let diagnostic = data_failure("<diag_json>", "raise RuntimeError('nope')\n");
    let json = serde_json::to_value(&diagnostic).unwrap();
    assert_eq!(json["line_number"], 1);
    assert_eq!(json["exception_kind"], "RuntimeError");
    assert_eq!(json["exception_message"], "nope");
    assert_eq!(json["location_known"], true);
}

#[test]
fn integer_limits_report_instead_of_panicking() {
    let code = concat!(
        "q = (-9223372036854775807 - 1) // -1\n",
        "tail = list(range(9223372036854775800, 9223372036854775807, 5))\n",
        "result = {'q': q, 'n': len(tail)}\n",
    );
    let fields = DataBlock::new()
        .with_virtual_id("<diag_int_limits>")
        .produce_data(&Fields::new(), code)
        .unwrap();
    assert!(matches!(fields["n"], Value::Int(2)));
    assert!(matches!(fields["q"], Value::Float(q) if q == 9_223_372_036_854_775_808.0));

    let diagnostic = data_failure("<diag_repeat>", "x = [1, 2]\ny = x * 9223372036854775807\n");
    assert_eq!(diagnostic.exception_kind, "MemoryError");
    assert_eq!(diagnostic.line_number, Some(2));
}
