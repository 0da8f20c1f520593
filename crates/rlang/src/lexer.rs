//! Context-sensitive tokenizer (`spec.md` §4.1).
//!
//! The single subtle contract here is the newline rule: a newline is only
//! ever turned into a [`TokenKind::Newline`] when all three bracket depths
//! are zero *and* the last consumed real token could end a statement. Bracket
//! depth and "last real token" are only updated when a token is actually
//! consumed via [`Lexer::next`] — [`Lexer::peek`] lexes and buffers a token
//! without touching either, so a caller can look ahead without perturbing the
//! newline decision for tokens it hasn't committed to yet.

use crate::error::{LexError, Pos};
use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a [u8],
    byte_pos: usize,
    line: u32,
    column: u32,
    paren_depth: u32,
    bracket_depth: u32,
    brace_depth: u32,
    last_real: Option<TokenKind>,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            byte_pos: 0,
            line: 1,
            column: 1,
            paren_depth: 0,
            bracket_depth: 0,
            brace_depth: 0,
            last_real: None,
            peeked: None,
        }
    }

    /// Returns the same token the next `next()` call would return, without
    /// consuming it or updating bracket-depth / last-real-token state.
    pub fn peek(&mut self) -> Result<Token, LexError> {
        if self.peeked.is_none() {
            let tok = self.lex_one()?;
            self.peeked = Some(tok);
        }
        Ok(self.peeked.clone().expect("just populated"))
    }

    /// Returns the next token, consuming it and applying its effect on
    /// bracket depth / last-real-token.
    pub fn next(&mut self) -> Result<Token, LexError> {
        let tok = match self.peeked.take() {
            Some(t) => t,
            None => self.lex_one()?,
        };
        self.apply(&tok);
        Ok(tok)
    }

    /// A lightweight, bit-for-bit snapshot of internal state, for the
    /// parser's speculative template-instantiation backtracking (§4.2).
    #[must_use]
    pub fn save_state(&self) -> LexerState {
        LexerState {
            byte_pos: self.byte_pos,
            line: self.line,
            column: self.column,
            paren_depth: self.paren_depth,
            bracket_depth: self.bracket_depth,
            brace_depth: self.brace_depth,
            last_real: self.last_real.clone(),
            peeked: self.peeked.clone(),
        }
    }

    pub fn restore_state(&mut self, state: LexerState) {
        self.byte_pos = state.byte_pos;
        self.line = state.line;
        self.column = state.column;
        self.paren_depth = state.paren_depth;
        self.bracket_depth = state.bracket_depth;
        self.brace_depth = state.brace_depth;
        self.last_real = state.last_real;
        self.peeked = state.peeked;
    }

    fn apply(&mut self, tok: &Token) {
        match tok.kind {
            TokenKind::LParen => self.paren_depth += 1,
            TokenKind::RParen => self.paren_depth = self.paren_depth.saturating_sub(1),
            TokenKind::LBracket => self.bracket_depth += 1,
            TokenKind::RBracket => self.bracket_depth = self.bracket_depth.saturating_sub(1),
            TokenKind::LBrace => self.brace_depth += 1,
            TokenKind::RBrace => self.brace_depth = self.brace_depth.saturating_sub(1),
            _ => {}
        }
        if !matches!(tok.kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.last_real = Some(tok.kind.clone());
        }
    }

    fn should_emit_newline(&self) -> bool {
        self.paren_depth == 0
            && self.bracket_depth == 0
            && self.brace_depth == 0
            && self
                .last_real
                .as_ref()
                .is_some_and(Self::is_statement_ending_kind)
    }

    fn is_statement_ending_kind(kind: &TokenKind) -> bool {
        matches!(
            kind,
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

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn at_eof(&self) -> bool {
        self.byte_pos >= self.src.len()
    }

    fn byte(&self, offset: usize) -> u8 {
        self.src.get(self.byte_pos + offset).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let b = self.byte(0);
        self.byte_pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        b
    }

    /// Lexes the next *real* token (skipping whitespace/comments and
    /// resolving the newline rule), without mutating depth / last-real
    /// state. Pure with respect to that state: it only reads it.
    fn lex_one(&mut self) -> Result<Token, LexError> {
        loop {
            self.skip_spaces_and_comments()?;
            if self.at_eof() {
                return Ok(Token::new(TokenKind::Eof, "", self.pos()));
            }
            if matches!(self.byte(0), b'\n' | b'\r') {
                let pos = self.pos();
                self.consume_newline_run();
                if self.should_emit_newline() {
                    return Ok(Token::new(TokenKind::Newline, "\n", pos));
                }
                continue;
            }
            break;
        }

        let pos = self.pos();
        let c = self.byte(0);
        if c.is_ascii_digit() {
            return self.lex_number(pos);
        }
        if c == b'\'' || c == b'"' {
            return self.lex_string(pos, c);
        }
        if c == b'_' || c.is_ascii_alphabetic() {
            return self.lex_ident_or_keyword(pos);
        }
        self.lex_punct(pos)
    }

    fn skip_spaces_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.byte(0) {
                b' ' | b'\t' => {
                    self.advance();
                }
                b'/' if self.byte(1) == b'/' => {
                    while !self.at_eof() && self.byte(0) != b'\n' {
                        self.advance();
                    }
                }
                b'/' if self.byte(1) == b'*' => {
                    let start_pos = self.pos();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while !self.at_eof() {
                        if self.byte(0) == b'*' && self.byte(1) == b'/' {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        return Err(LexError::new(start_pos, "unterminated block comment"));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Consumes one or more consecutive newlines (and any interleaved
    /// whitespace/comments) as a single run, so a blank line never produces
    /// more than one candidate `Newline` token.
    fn consume_newline_run(&mut self) {
        loop {
            match self.byte(0) {
                b'\r' => {
                    self.advance();
                }
                b'\n' => {
                    self.advance();
                }
                b' ' | b'\t' => {
                    self.advance();
                }
                b'/' if self.byte(1) == b'/' => {
                    while !self.at_eof() && self.byte(0) != b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.byte_pos;
        while self.byte(0).is_ascii_digit() {
            self.advance();
        }
        let mut is_float = false;
        if self.byte(0) == b'.' && self.byte(1).is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.byte(0).is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.byte(0), b'e' | b'E') {
            let save = self.byte_pos;
            let save_line = self.line;
            let save_col = self.column;
            self.advance();
            if matches!(self.byte(0), b'+' | b'-') {
                self.advance();
            }
            if self.byte(0).is_ascii_digit() {
                is_float = true;
                while self.byte(0).is_ascii_digit() {
                    self.advance();
                }
            } else {
                self.byte_pos = save;
                self.line = save_line;
                self.column = save_col;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.byte_pos])
            .expect("ascii digits are valid utf8");
        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| LexError::new(pos, format!("invalid float literal '{text}'")))?;
            Ok(Token::new(TokenKind::Float(v), text, pos))
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| LexError::new(pos, format!("invalid integer literal '{text}'")))?;
            Ok(Token::new(TokenKind::Int(v), text, pos))
        }
    }

    fn lex_string(&mut self, pos: Pos, quote: u8) -> Result<Token, LexError> {
        let start = self.byte_pos;
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            if self.at_eof() {
                return Err(LexError::new(pos, "unterminated string literal"));
            }
            let b = self.byte(0);
            if b == quote {
                self.advance();
                break;
            }
            if b == b'\\' {
                self.advance();
                let esc = self.advance();
                out.push(match esc {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'\\' => '\\',
                    b'\'' => '\'',
                    b'"' => '"',
                    other => other as char,
                });
                continue;
            }
            // collect a full utf-8 scalar, not just one byte
            let ch_start = self.byte_pos;
            let len = utf8_len(b);
            for _ in 0..len {
                self.advance();
            }
            let s = std::str::from_utf8(&self.src[ch_start..self.byte_pos])
                .map_err(|_| LexError::new(pos, "invalid utf-8 in string literal"))?;
            out.push_str(s);
        }
        let lexeme = std::str::from_utf8(&self.src[start..self.byte_pos])
            .unwrap_or_default()
            .to_string();
        if quote == b'"' && matches!(self.last_real, Some(TokenKind::Fn)) {
            Ok(Token::new(TokenKind::CustomOp(out), lexeme, pos))
        } else {
            Ok(Token::new(TokenKind::Str(out), lexeme, pos))
        }
    }

    fn lex_ident_or_keyword(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.byte_pos;
        while matches!(self.byte(0), b'_') || self.byte(0).is_ascii_alphanumeric() {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.byte_pos])
            .expect("ascii identifier is valid utf8")
            .to_string();
        let kind = TokenKind::keyword(&text).unwrap_or_else(|| TokenKind::Ident(text.clone()));
        Ok(Token::new(kind, text, pos))
    }

    fn lex_punct(&mut self, pos: Pos) -> Result<Token, LexError> {
        let two = (self.byte(0), self.byte(1));
        macro_rules! two_char {
            ($kind:expr) => {{
                self.advance();
                self.advance();
                let lexeme: String = [two.0 as char, two.1 as char].iter().collect();
                return Ok(Token::new($kind, lexeme, pos));
            }};
        }
        match two {
            (b'<', b'<') => two_char!(TokenKind::Shl),
            (b'>', b'>') => two_char!(TokenKind::Shr),
            (b'<', b'=') => two_char!(TokenKind::LtEq),
            (b'>', b'=') => two_char!(TokenKind::GtEq),
            (b'=', b'=') => two_char!(TokenKind::EqEq),
            (b'!', b'=') => two_char!(TokenKind::NotEq),
            (b'&', b'&') => two_char!(TokenKind::AmpAmp),
            (b'|', b'|') => two_char!(TokenKind::PipePipe),
            (b':', b':') => two_char!(TokenKind::ColonColon),
            (b'-', b'>') => two_char!(TokenKind::Arrow),
            _ => {}
        }
        let c = self.advance();
        let kind = match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'.' => TokenKind::Dot,
            b'?' => TokenKind::Question,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'=' => TokenKind::Eq,
            b'<' => TokenKind::Lt,
            b'>' => TokenKind::Gt,
            b'&' => TokenKind::Amp,
            b'|' => TokenKind::Pipe,
            b'^' => TokenKind::Caret,
            b'!' => TokenKind::Bang,
            b'~' => TokenKind::Tilde,
            other => {
                return Err(LexError::new(
                    pos,
                    format!("unexpected byte 0x{other:02x}"),
                ))
            }
        };
        Ok(Token::new(kind, (c as char).to_string(), pos))
    }
}

/// Opaque snapshot produced by [`Lexer::save_state`].
#[derive(Clone)]
pub struct LexerState {
    byte_pos: usize,
    line: u32,
    column: u32,
    paren_depth: u32,
    bracket_depth: u32,
    brace_depth: u32,
    last_real: Option<TokenKind>,
    peeked: Option<Token>,
}

fn utf8_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else if first_byte & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lx = Lexer::new(src);
        let mut out = vec![];
        loop {
            let t = lx.next().expect("lex ok");
            if matches!(t.kind, TokenKind::Eof) {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn newline_suppressed_inside_parens() {
        let toks = kinds("(\n1 +\n2\n)\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::LParen,
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::RParen,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn newline_emitted_after_statement_ending_token() {
        let toks = kinds("x\ny\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Newline,
                TokenKind::Ident("y".into()),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn newline_suppressed_mid_binary_expr() {
        let toks = kinds("1 +\n2\n");
        assert_eq!(
            toks,
            vec![TokenKind::Int(1), TokenKind::Plus, TokenKind::Int(2), TokenKind::Newline]
        );
    }

    #[test]
    fn custom_operator_literal_after_fn() {
        let toks = kinds("fn \"+\"(a, b)");
        assert_eq!(toks[0], TokenKind::Fn);
        assert_eq!(toks[1], TokenKind::CustomOp("+".to_string()));
    }

    #[test]
    fn plain_double_quoted_string_elsewhere() {
        let toks = kinds("var x = \"hi\"");
        assert!(toks.contains(&TokenKind::Str("hi".to_string())));
    }

    #[test]
    fn float_requires_digit_after_dot() {
        let toks = kinds("1.5 2.");
        assert_eq!(toks[0], TokenKind::Float(1.5));
        // '2.' has no digit after the dot: stays Int(2) followed by Dot.
        assert_eq!(toks[1], TokenKind::Int(2));
        assert_eq!(toks[2], TokenKind::Dot);
    }

    #[test]
    fn exponent_without_dot_selects_float() {
        let toks = kinds("1e3");
        assert_eq!(toks[0], TokenKind::Float(1000.0));
    }

    #[test]
    fn peek_does_not_disturb_newline_decision() {
        let mut lx = Lexer::new("x\ny");
        let p1 = lx.peek().unwrap();
        let p2 = lx.peek().unwrap();
        assert_eq!(p1, p2);
        let n1 = lx.next().unwrap();
        assert_eq!(n1.kind, TokenKind::Ident("x".into()));
        let n2 = lx.next().unwrap();
        assert_eq!(n2.kind, TokenKind::Newline);
    }

    #[test]
    fn bracket_depth_balances() {
        let mut lx = Lexer::new("([{}])");
        loop {
            let t = lx.next().unwrap();
            if matches!(t.kind, TokenKind::Eof) {
                break;
            }
        }
        assert_eq!(lx.paren_depth, 0);
        assert_eq!(lx.bracket_depth, 0);
        assert_eq!(lx.brace_depth, 0);
    }
}
