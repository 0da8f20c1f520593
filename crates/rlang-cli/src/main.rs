//! `rlang` command-line entry point (`spec.md` §6): interactive REPL,
//! `rlang file.lang` to run a file, `-h`/`--help`, `-v`/`--version`.
//!
//! Argument handling is hand-rolled over `std::env::args`, matching the
//! teacher crate's `monty-cli`, which reaches for neither `clap` nor any
//! other argument-parsing crate.

mod builtins;
mod repl;

use std::process::ExitCode;

use rlang::{Interpreter, Parser};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
Usage: rlang [options] [file.lang]

Options:
  -h, --help       print this help message
  -v, --version    print the version and exit

With no file, starts an interactive REPL (type 'exit' to quit).
";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("-h" | "--help") => {
            print!("{USAGE}");
            ExitCode::SUCCESS
        }
        Some("-v" | "--version") => {
            println!("rlang {VERSION}");
            ExitCode::SUCCESS
        }
        Some(path) => run_file(path),
        None => repl::run(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };

    let parser = match Parser::new(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let (program, parse_err) = parser.parse_program();
    if let Some(e) = parse_err {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let base_dir = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
    let mut interp = Interpreter::new(base_dir);
    builtins::register(interp.global_env());

    if let Err(e) = interp.run(&program) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    for msg in interp.loader.diagnostics.drain(..) {
        eprintln!("{msg}");
    }
    ExitCode::SUCCESS
}
