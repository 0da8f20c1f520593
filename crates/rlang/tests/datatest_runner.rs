//! Fixture-driven end-to-end tests (`spec.md` §8 worked examples).
//!
//! Each `.lang` fixture under `tests/fixtures/` carries its expected outcome
//! as a comment on the LAST line:
//!
//! - `# Return=value` — the program's last top-level expression, via
//!   `Display`, must equal `value`
//! - `# Error=substring` — running the program must fail, with the error
//!   message containing `substring`
//! - `# ParseError=substring` — parsing must fail, with the error message
//!   containing `substring`
//!
//! This mirrors the expectation-comment convention the teacher crate's own
//! fixture harness uses, adapted to this language's three outcomes instead
//! of Python's five.

use std::error::Error;
use std::fs;
use std::path::Path;

use rlang::{Interpreter, Parser};

#[derive(Debug)]
enum Expectation {
    Return(String),
    Error(String),
    ParseError(String),
}

fn parse_fixture(content: &str) -> (String, Expectation) {
    let lines: Vec<&str> = content.lines().collect();
    assert!(!lines.is_empty(), "empty fixture file");

    let last_line = *lines.last().unwrap();
    let code = lines[..lines.len() - 1].join("\n");

    let expectation = if let Some(expected) = last_line.strip_prefix("# Return=") {
        Expectation::Return(expected.to_string())
    } else if let Some(expected) = last_line.strip_prefix("# Error=") {
        Expectation::Error(expected.to_string())
    } else if let Some(expected) = last_line.strip_prefix("# ParseError=") {
        Expectation::ParseError(expected.to_string())
    } else {
        panic!("invalid expectation comment (must be the last line): {last_line}");
    };

    (code, expectation)
}

fn run_fixture_test(path: &Path) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let (code, expectation) = parse_fixture(&content);
    let name = path.display().to_string();

    let parser = match Parser::new(&code) {
        Ok(p) => p,
        Err(e) => {
            match expectation {
                Expectation::ParseError(expected) => {
                    assert!(e.to_string().contains(&expected), "[{name}] parse error mismatch: {e}");
                }
                other => panic!("[{name}] unexpected lex/parse error, expected {other:?}: {e}"),
            }
            return Ok(());
        }
    };
    let (program, parse_err) = parser.parse_program();
    if let Some(e) = parse_err {
        match expectation {
            Expectation::ParseError(expected) => {
                assert!(e.to_string().contains(&expected), "[{name}] parse error mismatch: {e}");
            }
            other => panic!("[{name}] unexpected parse error, expected {other:?}: {e}"),
        }
        return Ok(());
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut interp = Interpreter::new(base_dir);
    rlang_test_builtins::register(interp.global_env());

    match interp.run_value(&program) {
        Ok(value) => match expectation {
            Expectation::Return(expected) => {
                assert_eq!(value.to_string(), expected, "[{name}] return value mismatch");
            }
            other => panic!("[{name}] program returned normally, expected {other:?}"),
        },
        Err(e) => match expectation {
            Expectation::Error(expected) => {
                assert!(e.to_string().contains(&expected), "[{name}] runtime error mismatch: {e}");
            }
            other => panic!("[{name}] unexpected runtime error, expected {other:?}: {e}"),
        },
    }
    Ok(())
}

/// A minimal subset of the CLI's built-in registry, just large enough for
/// the fixtures below (`len`, `type_of`) — pulling in the real `rlang-cli`
/// crate here would invert the workspace's dependency direction.
mod rlang_test_builtins {
    use std::rc::Rc;

    use rlang::env::Env;
    use rlang::value::{BuiltinFnValue, Value};

    pub fn register(env: &Env) {
        def(env, "len", |args| match args.first() {
            Some(Value::String(s)) => Ok(Value::Int(s.borrow().chars().count() as i64)),
            Some(Value::Tuple(t)) => Ok(Value::Int(t.elements.len() as i64)),
            _ => Err("len() expects a string or tuple".to_string()),
        });
        def(env, "type_of", |args| {
            let name = match args.first() {
                Some(Value::PatternInstance(p)) => p.borrow().def.name.clone(),
                Some(v) => v.type_name().to_string(),
                None => "null".to_string(),
            };
            Ok(Value::string(name))
        });
    }

    fn def(env: &Env, name: &str, func: fn(&[Value]) -> Result<Value, String>) {
        env.def(name, Value::BuiltinFn(Rc::new(BuiltinFnValue { name: name.to_string(), func })));
    }
}

datatest_stable::harness!(run_fixture_test, "tests/fixtures", r"^.*\.lang$");
