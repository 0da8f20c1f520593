//! Line-at-a-time interactive REPL (`spec.md` §6).
//!
//! Each input line is tokenized and parsed as its own program, then
//! evaluated against the interpreter's persistent global environment, so
//! `var`/`fn`/`pat` declarations on one line are visible to the next. The
//! last top-level statement's value is printed when it isn't `null`. Typing
//! `exit` quits; end-of-input (Ctrl-D) quits too.

use std::io::Write;

use rlang::value::Value;
use rlang::{Interpreter, Parser};

use crate::builtins;

const PROMPT: &str = "> ";

pub fn run() -> std::process::ExitCode {
    let mut interp = Interpreter::new(std::env::current_dir().unwrap_or_default());
    builtins::register(interp.global_env());

    let stdin = std::io::stdin();
    loop {
        print!("{PROMPT}");
        if std::io::stdout().flush().is_err() {
            break;
        }
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }
        let trimmed = line.trim();
        if trimmed == "exit" {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }
        eval_line(&mut interp, &line);
    }
    std::process::ExitCode::SUCCESS
}

fn eval_line(interp: &mut Interpreter, line: &str) {
    let parser = match Parser::new(line) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    let (program, parse_err) = parser.parse_program();
    if let Some(e) = parse_err {
        eprintln!("{e}");
        return;
    }
    match interp.run_value(&program) {
        Ok(Value::Null) => {}
        Ok(v) => println!("{v}"),
        Err(e) => eprintln!("{e}"),
    }
    for msg in interp.loader.diagnostics.drain(..) {
        eprintln!("{msg}");
    }
}
