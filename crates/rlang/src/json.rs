//! JSON conversion for the value kinds that have a natural JSON shape.
//!
//! Not every [`Value`] round-trips: functions, modules, types, and scopes
//! have no JSON representation and are rejected. `Null`/`Int`/`Float`/`Bool`/
//! `String` map to their obvious counterparts, and a `Tuple` becomes a JSON
//! array (its optional field names are dropped — JSON arrays have no slot
//! for them). This mirrors the host-value bridge the teacher crate tests
//! against its own object model.

use serde_json::Value as Json;

use crate::value::{TupleValue, Value};

/// Converts a [`Value`] to [`serde_json::Value`], or `None` if `value` has no
/// JSON representation (a function, module, type, scope, variant, optional,
/// or pattern instance).
#[must_use]
pub fn to_json(value: &Value) -> Option<Json> {
    match value {
        Value::Null => Some(Json::Null),
        Value::Int(i) => Some(Json::Number((*i).into())),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number),
        Value::Bool(b) => Some(Json::Bool(*b)),
        Value::String(s) => Some(Json::String(s.borrow().clone())),
        Value::Tuple(t) => {
            let items = t.elements.iter().map(to_json).collect::<Option<Vec<_>>>()?;
            Some(Json::Array(items))
        }
        Value::Variant(_)
        | Value::Function(_)
        | Value::BuiltinFn(_)
        | Value::PatternInstance(_)
        | Value::Scope(_)
        | Value::Module(_)
        | Value::Type(_)
        | Value::Optional(_) => None,
    }
}

/// Converts a [`serde_json::Value`] into a runtime [`Value`]. JSON objects
/// become a named tuple (field order follows the object's iteration order);
/// there is no dedicated "map" value kind to target instead (`spec.md` §3).
#[must_use]
pub fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::string(s.clone()),
        Json::Array(items) => {
            let elements = items.iter().map(from_json).collect();
            Value::Tuple(std::rc::Rc::new(TupleValue::positional(elements)))
        }
        Json::Object(map) => {
            let mut names = Vec::with_capacity(map.len());
            let mut elements = Vec::with_capacity(map.len());
            for (k, v) in map {
                names.push(k.clone());
                elements.push(from_json(v));
            }
            Value::Tuple(std::rc::Rc::new(TupleValue { elements, names: Some(names) }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip() {
        for v in [Value::Null, Value::Int(42), Value::Bool(true), Value::string("hi")] {
            let j = to_json(&v).unwrap();
            let back = from_json(&j);
            assert_eq!(to_json(&back), Some(j));
        }
    }

    #[test]
    fn tuple_becomes_json_array() {
        let t = Value::Tuple(std::rc::Rc::new(TupleValue::positional(vec![Value::Int(1), Value::Int(2)])));
        let j = to_json(&t).unwrap();
        assert_eq!(j, serde_json::json!([1, 2]));
    }

    #[test]
    fn object_becomes_named_tuple() {
        let j = serde_json::json!({"x": 1, "y": 2});
        let v = from_json(&j);
        match v {
            Value::Tuple(t) => {
                assert_eq!(t.names.as_deref(), Some(&["x".to_string(), "y".to_string()][..]));
                assert!(matches!(t.elements[0], Value::Int(1)));
            }
            _ => panic!("expected a tuple"),
        }
    }

    #[test]
    fn function_has_no_json_form() {
        let env = crate::env::Env::new(None);
        assert_eq!(to_json(&Value::Scope(env)), None);
    }
}
