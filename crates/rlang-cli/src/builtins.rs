//! The flat built-in function registry (`spec.md` §6).
//!
//! `spec.md` scopes this out of the core crate as an external collaborator:
//! "the set of built-in functions ... which is a flat registry populated at
//! startup". Every entry here is a plain `fn(&[Value]) -> Result<Value,
//! String>` — the shape `rlang::value::BuiltinImpl` already expects — bound
//! into the global environment by `register` before the CLI evaluates
//! anything.

use std::io::Write;
use std::rc::Rc;

use rlang::env::Env;
use rlang::value::{BuiltinFnValue, TypeValue, Value};

type BResult = Result<Value, String>;

/// Registers every built-in under its name in `env` (`spec.md` §6's list).
pub fn register(env: &Env) {
    let entries: &[(&str, fn(&[Value]) -> BResult)] = &[
        ("print", print),
        ("println", println_),
        ("input", input),
        ("int", int),
        ("float", float),
        ("string", string),
        ("bool", bool_),
        ("is_null", is_null),
        ("is_int", is_int),
        ("is_float", is_float),
        ("is_string", is_string),
        ("type_of", type_of),
        ("type", type_),
        ("abs", abs),
        ("sqrt", sqrt),
        ("pow", pow),
        ("floor", floor),
        ("ceil", ceil),
        ("min", min),
        ("max", max),
        ("len", len),
        ("substr", substr),
        ("concat", concat),
        ("assert", assert),
    ];
    for (name, func) in entries.iter().copied() {
        env.def(name, Value::BuiltinFn(Rc::new(BuiltinFnValue { name: name.to_string(), func })));
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn as_f64(v: &Value) -> Result<f64, String> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(format!("expected a number, found a value of type '{}'", other.type_name())),
    }
}

// ---- I/O -------------------------------------------------------------

fn print(args: &[Value]) -> BResult {
    let line: Vec<String> = args.iter().map(Value::display_string).collect();
    println!("{}", line.join(" "));
    Ok(Value::Null)
}

/// Distinct entry point from `print` for callers that want the familiar
/// `println` spelling; both append exactly one trailing newline (§6) — see
/// DESIGN.md for why the two aren't differentiated further.
fn println_(args: &[Value]) -> BResult {
    print(args)
}

fn input(_args: &[Value]) -> BResult {
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(|e| e.to_string())?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Value::string(line))
}

// ---- conversions -------------------------------------------------------

fn int(args: &[Value]) -> BResult {
    let v = arg(args, 0);
    match &v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Null => Ok(Value::Int(0)),
        Value::String(s) => s
            .borrow()
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("cannot convert '{}' to an integer", s.borrow())),
        other => Err(format!("cannot convert a value of type '{}' to an integer", other.type_name())),
    }
}

fn float(args: &[Value]) -> BResult {
    let v = arg(args, 0);
    match &v {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Null => Ok(Value::Float(0.0)),
        Value::String(s) => s
            .borrow()
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("cannot convert '{}' to a float", s.borrow())),
        other => Err(format!("cannot convert a value of type '{}' to a float", other.type_name())),
    }
}

fn string(args: &[Value]) -> BResult {
    Ok(Value::string(arg(args, 0).display_string()))
}

fn bool_(args: &[Value]) -> BResult {
    Ok(Value::Bool(arg(args, 0).truthy()))
}

// ---- type predicates ----------------------------------------------------

fn is_null(args: &[Value]) -> BResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Null)))
}

fn is_int(args: &[Value]) -> BResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Int(_))))
}

fn is_float(args: &[Value]) -> BResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Float(_))))
}

fn is_string(args: &[Value]) -> BResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::String(_))))
}

fn type_of(args: &[Value]) -> BResult {
    let v = arg(args, 0);
    let name = match &v {
        Value::PatternInstance(p) => p.borrow().def.name.clone(),
        other => other.type_name().to_string(),
    };
    Ok(Value::string(name))
}

fn type_(args: &[Value]) -> BResult {
    Ok(TypeValue::describe(&arg(args, 0)))
}

// ---- numeric ------------------------------------------------------------

fn abs(args: &[Value]) -> BResult {
    match arg(args, 0) {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(format!("abs() expects a number, found a value of type '{}'", other.type_name())),
    }
}

fn sqrt(args: &[Value]) -> BResult {
    Ok(Value::Float(as_f64(&arg(args, 0))?.sqrt()))
}

fn pow(args: &[Value]) -> BResult {
    let base = arg(args, 0);
    let exp = arg(args, 1);
    if let (Value::Int(b), Value::Int(e)) = (&base, &exp) {
        if *e >= 0 {
            return Ok(Value::Int(b.wrapping_pow(*e as u32)));
        }
    }
    Ok(Value::Float(as_f64(&base)?.powf(as_f64(&exp)?)))
}

fn floor(args: &[Value]) -> BResult {
    Ok(Value::Float(as_f64(&arg(args, 0))?.floor()))
}

fn ceil(args: &[Value]) -> BResult {
    Ok(Value::Float(as_f64(&arg(args, 0))?.ceil()))
}

fn min(args: &[Value]) -> BResult {
    numeric_fold(args, "min", |a, b| a.min(b), |a, b| a.min(b))
}

fn max(args: &[Value]) -> BResult {
    numeric_fold(args, "max", |a, b| a.max(b), |a, b| a.max(b))
}

fn numeric_fold(
    args: &[Value],
    name: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> BResult {
    if args.is_empty() {
        return Err(format!("{name}() needs at least one argument"));
    }
    let all_int = args.iter().all(|v| matches!(v, Value::Int(_)));
    if all_int {
        let mut acc = match &args[0] {
            Value::Int(i) => *i,
            _ => unreachable!("checked by all_int"),
        };
        for v in &args[1..] {
            if let Value::Int(i) = v {
                acc = int_op(acc, *i);
            }
        }
        Ok(Value::Int(acc))
    } else {
        let mut acc = as_f64(&args[0])?;
        for v in &args[1..] {
            acc = float_op(acc, as_f64(v)?);
        }
        Ok(Value::Float(acc))
    }
}

// ---- string / tuple ------------------------------------------------------

fn len(args: &[Value]) -> BResult {
    match arg(args, 0) {
        Value::String(s) => Ok(Value::Int(s.borrow().chars().count() as i64)),
        Value::Tuple(t) => Ok(Value::Int(t.elements.len() as i64)),
        other => Err(format!("len() expects a string or tuple, found a value of type '{}'", other.type_name())),
    }
}

/// `substr(s, start, len)` with the clamping rules from `spec.md` §8:
/// negative `start` clamps to 0, `start` past the end yields empty, `start +
/// len` past the end truncates, and negative `len` clamps to 0.
fn substr(args: &[Value]) -> BResult {
    let s = match arg(args, 0) {
        Value::String(s) => s.borrow().clone(),
        other => return Err(format!("substr() expects a string, found a value of type '{}'", other.type_name())),
    };
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len() as i64;
    let raw_start = match arg(args, 1) {
        Value::Int(i) => i,
        other => return Err(format!("substr() expects an integer start, found '{}'", other.type_name())),
    };
    let raw_len = match arg(args, 2) {
        Value::Int(i) => i,
        other => return Err(format!("substr() expects an integer length, found '{}'", other.type_name())),
    };
    let start = raw_start.max(0).min(n);
    let len = raw_len.max(0);
    let end = (start + len).min(n);
    let slice: String = chars[start as usize..end as usize].iter().collect();
    Ok(Value::string(slice))
}

fn concat(args: &[Value]) -> BResult {
    let mut out = String::new();
    for v in args {
        match v {
            Value::String(s) => out.push_str(&s.borrow()),
            other => return Err(format!("concat() expects strings, found a value of type '{}'", other.type_name())),
        }
    }
    Ok(Value::string(out))
}

// ---- assertion ------------------------------------------------------------

/// `assert(false[, msg])` terminates the process (`spec.md` §6) — the one
/// built-in that does not return to the evaluator on failure.
fn assert(args: &[Value]) -> BResult {
    let cond = arg(args, 0);
    if cond.truthy() {
        return Ok(Value::Null);
    }
    match arg(args, 1) {
        Value::Null => eprintln!("assertion failed"),
        msg => eprintln!("assertion failed: {}", msg.display_string()),
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_clamps_negative_start() {
        let result = substr(&[Value::string("hello"), Value::Int(-3), Value::Int(3)]).unwrap();
        assert!(matches!(result, Value::String(s) if *s.borrow() == "hel"));
    }

    #[test]
    fn substr_truncates_past_end() {
        let result = substr(&[Value::string("hi"), Value::Int(0), Value::Int(10)]).unwrap();
        assert!(matches!(result, Value::String(s) if *s.borrow() == "hi"));
    }

    #[test]
    fn substr_start_past_end_is_empty() {
        let result = substr(&[Value::string("hi"), Value::Int(5), Value::Int(2)]).unwrap();
        assert!(matches!(result, Value::String(s) if s.borrow().is_empty()));
    }

    #[test]
    fn substr_clamps_negative_length() {
        let result = substr(&[Value::string("hello"), Value::Int(1), Value::Int(-4)]).unwrap();
        assert!(matches!(result, Value::String(s) if s.borrow().is_empty()));
    }

    #[test]
    fn min_max_stay_integral_for_integer_args() {
        assert!(matches!(min(&[Value::Int(3), Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(1)));
        assert!(matches!(max(&[Value::Int(3), Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3)));
    }

    #[test]
    fn min_promotes_to_float_if_any_operand_is_float() {
        let result = min(&[Value::Int(3), Value::Float(1.5)]).unwrap();
        assert!(matches!(result, Value::Float(f) if f == 1.5));
    }

    #[test]
    fn len_counts_chars_not_bytes() {
        assert!(matches!(len(&[Value::string("abc")]).unwrap(), Value::Int(3)));
    }

    #[test]
    fn type_of_reports_pattern_name() {
        assert!(matches!(type_of(&[Value::Int(1)]).unwrap(), Value::String(s) if *s.borrow() == "int"));
    }
}
