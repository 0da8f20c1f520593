//! `rlang` — the core token stream, AST, parser, value model, environment,
//! evaluator, and module loader for a small expression-oriented language
//! (`spec.md` §1-§4).
//!
//! This crate is deliberately silent: it never writes to stdout/stderr and
//! never reaches for `std::process::exit`. The built-in function registry,
//! argument parsing, file reading, and the REPL loop are the external
//! collaborator's job (`spec.md` §6) — see the `rlang-cli` crate.

pub mod ast;
pub mod env;
pub mod error;
pub mod eval;
pub mod json;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod signal;
pub mod token;
pub mod value;

pub use ast::Node;
pub use env::Env;
pub use error::{LexError, ParseError, Pos, RlangError, RuntimeError};
pub use eval::Interpreter;
pub use parser::Parser;
pub use signal::Signal;
pub use value::Value;

/// Parses `source` to a `Program` node, surfacing the first parse error (if
/// any) as `Err`. Thin wrapper over `Parser::new`/`parse_program` for callers
/// that don't need best-effort recovery themselves.
pub fn parse(source: &str) -> Result<Node, RlangError> {
    let parser = Parser::new(source)?;
    let (program, err) = parser.parse_program();
    match err {
        Some(e) => Err(e.into()),
        None => Ok(program),
    }
}

/// Parses and evaluates `source` against a fresh global environment rooted
/// at `base_dir` (used to resolve `import`s), returning the interpreter so
/// callers can inspect bindings afterward.
pub fn run_source(source: &str, base_dir: impl Into<std::path::PathBuf>) -> Result<Interpreter, RlangError> {
    let program = parse(source)?;
    let mut interp = Interpreter::new(base_dir);
    interp.run(&program)?;
    Ok(interp)
}

/// Reads, parses, and evaluates the `.lang` file at `path`. The module loader
/// resolves `import`s relative to the file's parent directory (`spec.md`
/// §4.5, §6).
pub fn run_file(path: &std::path::Path) -> Result<Interpreter, RlangError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        RlangError::Runtime(RuntimeError::new(Pos::start(), format!("cannot read '{}': {e}", path.display())))
    })?;
    let base_dir = path.parent().map(std::path::Path::to_path_buf).unwrap_or_default();
    run_source(&source, base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_source_evaluates_arithmetic() {
        let interp = run_source("var x = 1 + 2 * 3", std::env::temp_dir()).expect("runs");
        assert!(matches!(interp.global_env().lookup("x"), Some(Value::Int(7))));
    }

    #[test]
    fn parse_surfaces_first_error() {
        let err = parse("var =").unwrap_err();
        assert!(matches!(err, RlangError::Parse(_)));
    }

    #[test]
    fn run_file_reports_missing_file() {
        let missing = std::env::temp_dir().join("rlang-lib-test-does-not-exist.lang");
        let err = run_file(&missing).unwrap_err();
        assert!(matches!(err, RlangError::Runtime(_)));
    }
}
