//! Error types shared by the tokenizer, parser, and evaluator.
//!
//! Every diagnostic carries a [`Pos`] so the CLI can render `line:column:
//! message` the way `spec.md` §7 requires. None of these types reach for
//! `thiserror`; like the teacher crate, they hand-roll `Display`.

use std::fmt;

/// One-based source location (line, column), carried by every token and AST
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The position a program starts at.
    #[must_use]
    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Failure while turning source bytes into tokens: unknown byte, unterminated
/// string or block comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub pos: Pos,
    pub message: String,
}

impl LexError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self { pos, message: message.into() }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: lex error: {}", self.pos, self.message)
    }
}

impl std::error::Error for LexError {}

/// Failure while building the AST: unexpected token, missing punctuation,
/// `::` with no initializer, `pub import`, and so on. The parser records
/// only the *first* of these (`spec.md` §4.2, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub pos: Pos,
    pub message: String,
}

impl ParseError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self { pos, message: message.into() }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: parse error: {}", self.pos, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { pos: e.pos, message: e.message }
    }
}

/// Failure while evaluating the AST: undefined variable, missing member,
/// division by zero, type mismatch, not callable, and so on. This is the
/// `Error` arm of the evaluator's control-flow signal (`spec.md` §4.3),
/// expressed idiomatically as the `Err` side of `Result` rather than as a
/// fifth `Signal` variant — see DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub pos: Pos,
    pub message: String,
}

impl RuntimeError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self { pos, message: message.into() }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: runtime error: {}", self.pos, self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Umbrella error covering every stage, returned by the crate's top-level
/// `run_source`/`run_file` entry points.
#[derive(Debug, Clone)]
pub enum RlangError {
    Lex(LexError),
    Parse(ParseError),
    Runtime(RuntimeError),
}

impl fmt::Display for RlangError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlangError::Lex(e) => write!(f, "{e}"),
            RlangError::Parse(e) => write!(f, "{e}"),
            RlangError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RlangError {}

impl From<LexError> for RlangError {
    fn from(e: LexError) -> Self {
        RlangError::Lex(e)
    }
}

impl From<ParseError> for RlangError {
    fn from(e: ParseError) -> Self {
        RlangError::Parse(e)
    }
}

impl From<RuntimeError> for RlangError {
    fn from(e: RuntimeError) -> Self {
        RlangError::Runtime(e)
    }
}
