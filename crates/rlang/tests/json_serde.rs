//! JSON bridge tests for `rlang::json`.
//!
//! JSON mapping: bidirectional for null/bool/int/float/string/array; a JSON
//! object round-trips one-way into a named tuple (there is no dedicated map
//! value kind to send it back to, `spec.md` §3). Functions, modules, types,
//! and scopes have no JSON form at all.

use rlang::json::{from_json, to_json};
use rlang::value::Value;

#[test]
fn json_input_primitives() {
    assert!(matches!(from_json(&serde_json::from_str("42").unwrap()), Value::Int(42)));
    assert!(matches!(from_json(&serde_json::from_str("2.5").unwrap()), Value::Float(f) if f == 2.5));
    assert!(matches!(from_json(&serde_json::from_str(r#""hello""#).unwrap()), Value::String(s) if *s.borrow() == "hello"));
    assert!(matches!(from_json(&serde_json::from_str("true").unwrap()), Value::Bool(true)));
    assert!(matches!(from_json(&serde_json::from_str("null").unwrap()), Value::Null));
}

#[test]
fn json_input_nested_object_becomes_named_tuple_of_array() {
    let json = serde_json::from_str(r#"{"outer": [1, 2, 3]}"#).unwrap();
    let value = from_json(&json);
    let Value::Tuple(outer) = value else { panic!("expected a tuple") };
    assert_eq!(outer.names.as_deref(), Some(&["outer".to_string()][..]));
    let Value::Tuple(inner) = &outer.elements[0] else { panic!("expected a nested tuple") };
    assert!(matches!(inner.get(1), Some(Value::Int(2))));
}

#[test]
fn json_output_primitives() {
    assert_eq!(to_json(&Value::Int(42)).unwrap().to_string(), "42");
    assert_eq!(to_json(&Value::Float(1.5)).unwrap().to_string(), "1.5");
    assert_eq!(to_json(&Value::string("hi")).unwrap().to_string(), r#""hi""#);
    assert_eq!(to_json(&Value::Bool(true)).unwrap().to_string(), "true");
    assert_eq!(to_json(&Value::Null).unwrap().to_string(), "null");
}

#[test]
fn json_output_tuple_becomes_array() {
    let tuple = Value::Tuple(std::rc::Rc::new(rlang::value::TupleValue::positional(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
    ])));
    assert_eq!(to_json(&tuple).unwrap().to_string(), "[1,2,3]");
}

#[test]
fn functions_and_scopes_have_no_json_output() {
    let env = rlang::Env::new(None);
    assert_eq!(to_json(&Value::Scope(env)), None);
}
