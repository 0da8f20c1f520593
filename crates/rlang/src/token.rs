//! Token kinds produced by the [`crate::lexer::Lexer`] (`spec.md` §3, §4.1).

use crate::error::Pos;

/// A single lexical unit: kind, literal source text, and source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub pos: Pos,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, pos: Pos) -> Self {
        Self { kind, lexeme: lexeme.into(), pos }
    }

    /// Whether this token belongs to the statement-ending set from the
    /// newline rule (`spec.md` §4.1): literal, identifier, `null`, a closing
    /// bracket of any kind, `>`, or `break`/`yield`/`return`.
    #[must_use]
    pub fn is_statement_ending(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Ident(_)
                | TokenKind::Null
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Gt
                | TokenKind::Break
                | TokenKind::Yield
                | TokenKind::Return
        )
    }
}

/// The closed set of token kinds from `spec.md` §3.
#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    /// A double-quoted string lexed right after `fn` — a custom operator
    /// name, not a string literal (`spec.md` §4.1).
    CustomOp(String),
    Ident(String),

    // Keywords
    Fn,
    Var,
    Pat,
    Import,
    Pub,
    For,
    While,
    Switch,
    Case,
    Default,
    Break,
    Yield,
    Return,
    Copy,
    Move,
    Null,
    As,
    Of,
    Static,
    Const,
    Constexpr,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    ColonColon,
    Arrow,
    Dot,
    Question,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Shl,
    Shr,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Bang,
    Tilde,

    /// Emitted only when the newline rule (§4.1) decides a run of newlines
    /// terminates the current statement.
    Newline,
    Eof,
}

impl TokenKind {
    /// Maps a scanned identifier to its keyword kind, or `None` if it's a
    /// plain identifier.
    #[must_use]
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "fn" => TokenKind::Fn,
            "var" => TokenKind::Var,
            "pat" => TokenKind::Pat,
            "import" => TokenKind::Import,
            "pub" => TokenKind::Pub,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "yield" => TokenKind::Yield,
            "return" => TokenKind::Return,
            "copy" => TokenKind::Copy,
            "move" => TokenKind::Move,
            "null" => TokenKind::Null,
            "as" => TokenKind::As,
            "of" => TokenKind::Of,
            "static" => TokenKind::Static,
            "const" => TokenKind::Const,
            "constexpr" => TokenKind::Constexpr,
            _ => return None,
        })
    }
}
