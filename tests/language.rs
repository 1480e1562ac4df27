//==============================================
// File: tests/language.rs
//==============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Smoke tests for the snippet language
// Objective: Run small programs through the executor and inspect the
//            resulting namespace
//==============================================

use sciblock::interpreter::value::value_to_json;
use sciblock::stdlib_registry::HandleRegistry;
use sciblock::{Executor, Namespace};
use serde_json::{Value as JsonValue, json};

fn run(code: &str) -> Namespace {
    let mut namespace: Namespace = HandleRegistry::for_data().into_iter().collect();
    if let Err(diagnostic) = Executor::new().run("<language>", code, &mut namespace) {
        panic!("snippet failed:\n{diagnostic}");
    }
    namespace
}

fn get(namespace: &Namespace, name: &str) -> JsonValue {
    value_to_json(namespace.get(name).unwrap_or_else(|| panic!("{name} unset")))
}

#[test]
fn comprehensions_and_lambdas() {
    let ns = run(concat!(
        "squares = [n * n for n in range(6) if n % 2 == 0]\n",
        "lookup = dict(zip(['a', 'b'], [1, 2]))\n",
        "double = lambda x: x * 2\n",
        "mapped = list(map(double, [1, 2, 3]))\n",
        "ordered = sorted([3, 1, 2], reverse=True)\n",
    ));
    assert_eq!(get(&ns, "squares"), json!([0, 4, 16]));
    assert_eq!(get(&ns, "lookup"), json!({"a": 1, "b": 2}));
    assert_eq!(get(&ns, "mapped"), json!([2, 4, 6]));
    assert_eq!(get(&ns, "ordered"), json!([3, 2, 1]));
}

#[test]
fn control_flow_and_functions() {
    let ns = run(concat!(
        "def fib(n):\n",
        "    a, b = 0, 1\n",
        "    for _ in range(n):\n",
        "        a, b = b, a + b\n",
        "    return a\n",
        "\n",
        "count = 0\n",
        "while True:\n",
        "    count += 1\n",
        "    if count >= 4:\n",
        "        break\n",
        "value = fib(10)\n",
        "kind = 'big' if value > 50 else 'small'\n",
    ));
    assert_eq!(get(&ns, "value"), json!(55));
    assert_eq!(get(&ns, "count"), json!(4));
    assert_eq!(get(&ns, "kind"), json!("big"));
}

#[test]
fn assertions_raise_with_message() {
    let mut namespace = Namespace::new();
    let diagnostic = Executor::new()
        .run("<language_assert>", "x = 3\nassert x < 2, 'x too large'\n", &mut namespace)
        .unwrap_err();
    assert_eq!(diagnostic.exception_kind, "AssertionError");
    assert_eq!(diagnostic.exception_message, "x too large");
    assert_eq!(diagnostic.line_number, Some(2));
}

#[test]
fn strings_and_formatting() {
    let ns = run(concat!(
        "name = 'world'\n",
        "greeting = 'hello {}!'.format(name)\n",
        "fixed = '{:.2f}'.format(3.14159)\n",
        "parts = 'a,b,c'.split(',')\n",
        "joined = '-'.join(parts).upper()\n",
    ));
    assert_eq!(get(&ns, "greeting"), json!("hello world!"));
    assert_eq!(get(&ns, "fixed"), json!("3.14"));
    assert_eq!(get(&ns, "joined"), json!("A-B-C"));
}

#[test]
fn imports_bind_library_handles() {
    let ns = run(concat!(
        "import numpy as np\n",
        "from scipy.optimize import brentq\n",
        "from numpy import linspace\n",
        "root = brentq(lambda x: x - 0.25, 0, 1)\n",
        "grid = linspace(0, 1, 3)\n",
    ));
    assert!((ns.get("root").and_then(|v| v.as_f64()).unwrap() - 0.25).abs() < 1e-10);
    assert_eq!(get(&ns, "grid"), json!([0.0, 0.5, 1.0]));
}

#[test]
fn array_arithmetic_and_masks() {
    let ns = run(concat!(
        "import numpy as np\n",
        "a = np.arange(5)\n",
        "b = a * 2 + 1\n",
        "evens = a[a % 2 == 0]\n",
        "total = np.cumsum([1, 2, 3])\n",
        "a[0] = 10\n",
    ));
    assert_eq!(get(&ns, "b"), json!([1.0, 3.0, 5.0, 7.0, 9.0]));
    assert_eq!(get(&ns, "evens"), json!([0.0, 2.0, 4.0]));
    assert_eq!(get(&ns, "total"), json!([1.0, 3.0, 6.0]));
    assert_eq!(get(&ns, "a"), json!([10.0, 1.0, 2.0, 3.0, 4.0]));
}
