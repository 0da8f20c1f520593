//! Recursive-descent parser (`spec.md` §4.2).
//!
//! One token of lookahead (`self.cur`) plus a second token of lookahead
//! reachable through `self.lexer.peek()` (used only to disambiguate a named
//! tuple element `ident : expr` from a bare identifier expression). Template
//! instantiation at a postfix position is the one place the parser
//! backtracks: it snapshots the lexer's full state and its own `cur` token,
//! attempts `< type_ann (, type_ann)* >`, and rolls back bit-for-bit on any
//! failure (`spec.md` §4.2, §9).
//!
//! On the first error the parser records line, column, and message, then
//! resynchronizes at the next statement separator and keeps going — the
//! caller always gets a full (if partially garbled) `Program` node back
//! alongside the optional first error, per `spec.md` §4.2 and §7.

use crate::ast::{Literal, Node, NodeKind};
use crate::error::{ParseError, Pos};
use crate::lexer::{Lexer, LexerState};
use crate::token::{Token, TokenKind};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    error: Option<ParseError>,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> PResult<Self> {
        let mut lexer = Lexer::new(source);
        let cur = lexer.next()?;
        Ok(Self { lexer, cur, error: None })
    }

    /// Parses the whole program, returning the `Program` node and the first
    /// error encountered (if any) — parsing never aborts early.
    pub fn parse_program(mut self) -> (Node, Option<ParseError>) {
        let mut program = Node::new(NodeKind::Program, Pos::start());
        self.skip_separators();
        while !self.at_eof() {
            match self.parse_statement() {
                Ok(stmt) => program.children.push(stmt),
                Err(e) => {
                    self.record_error(e);
                    self.recover();
                }
            }
            self.skip_separators();
        }
        (program, self.error)
    }

    // ---- token plumbing ----------------------------------------------

    fn at_eof(&self) -> bool {
        matches!(self.cur.kind, TokenKind::Eof)
    }

    fn bump(&mut self) -> PResult<Token> {
        let next = self.lexer.next()?;
        Ok(std::mem::replace(&mut self.cur, next))
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.cur.kind == kind {
            self.bump()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<String> {
        match self.cur.kind.clone() {
            TokenKind::Ident(name) => {
                self.bump()?;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        ParseError::new(
            self.cur.pos,
            format!("expected {what}, found '{}'", self.cur.lexeme),
        )
    }

    fn record_error(&mut self, e: ParseError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    /// Skips tokens until the next statement boundary so parsing can
    /// continue best-effort after an error.
    fn recover(&mut self) {
        while !matches!(
            self.cur.kind,
            TokenKind::Semicolon | TokenKind::Newline | TokenKind::Eof | TokenKind::RBrace
        ) {
            if self.bump().is_err() {
                break;
            }
        }
        if matches!(self.cur.kind, TokenKind::Semicolon | TokenKind::Newline) {
            let _ = self.bump();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.cur.kind, TokenKind::Semicolon | TokenKind::Newline) {
            if self.bump().is_err() {
                break;
            }
        }
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.cur.kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        )
    }

    // ---- statements -----------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Node> {
        self.skip_separators();
        let pos = self.cur.pos;
        match self.cur.kind.clone() {
            TokenKind::Fn => self.parse_fn_decl(false),
            TokenKind::Pub => {
                self.bump()?;
                match self.cur.kind.clone() {
                    TokenKind::Fn => self.parse_fn_decl(true),
                    TokenKind::Var => self.parse_var_decl(true),
                    TokenKind::Pat => self.parse_pat_decl(true),
                    TokenKind::Import => {
                        self.record_error(ParseError::new(pos, "pub import is not allowed"));
                        self.parse_import_decl()
                    }
                    _ => Err(self.unexpected("'fn', 'var', or 'pat' after 'pub'")),
                }
            }
            TokenKind::Var => self.parse_var_decl(false),
            TokenKind::Pat => self.parse_pat_decl(false),
            TokenKind::Import => self.parse_import_decl(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::LBrace => self.parse_scope(),
            TokenKind::Break => {
                self.bump()?;
                Ok(Node::new(NodeKind::Break, pos))
            }
            TokenKind::Yield => {
                self.bump()?;
                let mut node = Node::new(NodeKind::Yield, pos);
                if self.starts_expression() {
                    node.init = Some(Box::new(self.parse_expression()?));
                }
                Ok(node)
            }
            TokenKind::Return => {
                self.bump()?;
                let mut node = Node::new(NodeKind::Return, pos);
                if self.starts_expression() {
                    node.init = Some(Box::new(self.parse_expression()?));
                }
                Ok(node)
            }
            _ => self.parse_expression(),
        }
    }

    fn parse_scope(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut stmts = vec![];
        self.skip_separators();
        while !matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            self.skip_separators();
        }
        self.expect_kind(TokenKind::RBrace, "'}'")?;
        Ok(Node::new(NodeKind::Scope, pos).with_children(stmts))
    }

    fn parse_annotation_tail(&mut self, node: &mut Node) -> PResult<()> {
        if self.cur.kind == TokenKind::ColonColon {
            self.bump()?;
            self.parse_attrs_into(node)?;
            if self.cur.kind != TokenKind::Eq {
                self.record_error(ParseError::new(
                    self.cur.pos,
                    "type omitted with '::' but no '=' initializer",
                ));
            }
        } else if self.cur.kind == TokenKind::Colon {
            self.bump()?;
            let ty = self.parse_type_ref()?;
            node.type_ann = Some(Box::new(ty));
            if self.cur.kind == TokenKind::ColonColon {
                self.bump()?;
                self.parse_attrs_into(node)?;
            }
        }
        if self.cur.kind == TokenKind::Eq {
            self.bump()?;
            let init = self.parse_expression()?;
            node.init = Some(Box::new(init));
        }
        Ok(())
    }

    fn parse_attrs_into(&mut self, node: &mut Node) -> PResult<()> {
        loop {
            match self.cur.kind {
                TokenKind::Static => {
                    node.is_static = true;
                    self.bump()?;
                }
                TokenKind::Const => {
                    node.is_const = true;
                    self.bump()?;
                }
                TokenKind::Constexpr => {
                    node.is_constexpr = true;
                    self.bump()?;
                }
                _ => break,
            }
            if self.cur.kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse_type_ref(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        let name = self.expect_ident("a type name")?;
        let mut node = Node::new(NodeKind::TypeAnn, pos).with_name(name);
        if self.cur.kind == TokenKind::Lt {
            self.bump()?;
            let mut args = vec![];
            loop {
                args.push(self.parse_type_ref()?);
                if self.cur.kind == TokenKind::Comma {
                    self.bump()?;
                } else {
                    break;
                }
            }
            self.expect_kind(TokenKind::Gt, "'>' to close template argument list")?;
            node.tmpl = Some(args);
        }
        Ok(node)
    }

    fn parse_var_decl(&mut self, is_pub: bool) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'var'
        let name = self.expect_ident("a variable name")?;
        let mut node = Node::new(NodeKind::VarDecl, pos).with_name(name);
        node.is_pub = is_pub;
        self.parse_annotation_tail(&mut node)?;
        Ok(node)
    }

    fn parse_template_decl_params(&mut self) -> PResult<Vec<Node>> {
        self.bump()?; // '<'
        let mut params = vec![];
        loop {
            let pos = self.cur.pos;
            let name = self.expect_ident("a template parameter name")?;
            params.push(Node::new(NodeKind::Param, pos).with_name(name));
            if self.cur.kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect_kind(TokenKind::Gt, "'>' to close template parameter list")?;
        Ok(params)
    }

    fn parse_params(&mut self) -> PResult<Vec<Node>> {
        let mut params = vec![];
        if self.cur.kind == TokenKind::RParen {
            return Ok(params);
        }
        loop {
            let pos = self.cur.pos;
            let qualifier = match self.cur.kind {
                TokenKind::Copy => {
                    self.bump()?;
                    Some("copy")
                }
                TokenKind::Move => {
                    self.bump()?;
                    Some("move")
                }
                _ => None,
            };
            let name = self.expect_ident("a parameter name")?;
            let mut node = Node::new(NodeKind::Param, pos).with_name(name);
            if let Some(q) = qualifier {
                node.op = Some(q.to_string());
            }
            self.parse_annotation_tail(&mut node)?;
            params.push(node);
            if self.cur.kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        Ok(params)
    }

    fn parse_return_tuple(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.expect_kind(TokenKind::LParen, "'(' to start a return tuple")?;
        let mut fields = vec![];
        if self.cur.kind != TokenKind::RParen {
            loop {
                let fpos = self.cur.pos;
                let name = self.expect_ident("a return field name")?;
                let mut f = Node::new(NodeKind::TypeAnn, fpos).with_name(name);
                self.parse_annotation_tail(&mut f)?;
                fields.push(f);
                if self.cur.kind == TokenKind::Comma {
                    self.bump()?;
                } else {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::RParen, "')' to close a return tuple")?;
        Ok(Node::new(NodeKind::Tuple, pos).with_children(fields))
    }

    fn parse_fn_decl(&mut self, is_pub: bool) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'fn'
        let tmpl = if self.cur.kind == TokenKind::Lt {
            Some(self.parse_template_decl_params()?)
        } else {
            None
        };
        let name = match self.cur.kind.clone() {
            TokenKind::Ident(n) => {
                self.bump()?;
                n
            }
            TokenKind::CustomOp(n) => {
                self.bump()?;
                n
            }
            _ => return Err(self.unexpected("a function name or a quoted operator name")),
        };
        let mut node = Node::new(NodeKind::FnDecl, pos).with_name(name);
        node.is_pub = is_pub;
        node.tmpl = tmpl;
        self.expect_kind(TokenKind::LParen, "'(' to start a parameter list")?;
        node.children = self.parse_params()?;
        self.expect_kind(TokenKind::RParen, "')' to close a parameter list")?;
        if self.cur.kind == TokenKind::Colon {
            self.bump()?;
            let ty = if self.cur.kind == TokenKind::LParen {
                self.parse_return_tuple()?
            } else {
                self.parse_type_ref()?
            };
            node.type_ann = Some(Box::new(ty));
            if self.cur.kind == TokenKind::ColonColon {
                self.bump()?;
                self.parse_attrs_into(&mut node)?;
            }
        } else if self.cur.kind == TokenKind::ColonColon {
            self.bump()?;
            self.parse_attrs_into(&mut node)?;
        }
        if self.cur.kind == TokenKind::LBrace {
            node.body = Some(Box::new(self.parse_scope()?));
        }
        Ok(node)
    }

    fn parse_pat_decl(&mut self, is_pub: bool) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'pat'
        let tmpl = if self.cur.kind == TokenKind::Lt {
            Some(self.parse_template_decl_params()?)
        } else {
            None
        };
        let name = self.expect_ident("a pattern name")?;
        let mut node = Node::new(NodeKind::PatDecl, pos).with_name(name);
        node.is_pub = is_pub;
        node.tmpl = tmpl;
        if self.cur.kind == TokenKind::Colon {
            self.bump()?;
            loop {
                let base = self.parse_ident_node()?;
                node.children.push(base);
                if self.cur.kind == TokenKind::Pipe {
                    self.bump()?;
                } else {
                    break;
                }
            }
        }
        if self.cur.kind == TokenKind::ColonColon {
            self.bump()?;
            self.parse_attrs_into(&mut node)?;
        }
        node.body = Some(Box::new(self.parse_scope()?));
        Ok(node)
    }

    fn parse_ident_node(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        let name = self.expect_ident("an identifier")?;
        Ok(Node::new(NodeKind::Ident, pos).with_name(name))
    }

    fn parse_import_decl(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'import'
        let mut parts = vec![self.expect_ident("a module path segment")?];
        while self.cur.kind == TokenKind::Dot {
            self.bump()?;
            parts.push(self.expect_ident("a module path segment")?);
        }
        let mut node = Node::new(NodeKind::ImportDecl, pos).with_name(parts.join("."));
        if self.cur.kind == TokenKind::As {
            self.bump()?;
            node.op = Some(self.expect_ident("an alias")?);
        }
        if self.cur.kind == TokenKind::Of {
            self.bump()?;
            if self.cur.kind == TokenKind::LBrace {
                self.bump()?;
                loop {
                    node.children.push(self.parse_import_item()?);
                    if self.cur.kind == TokenKind::Comma {
                        self.bump()?;
                    } else {
                        break;
                    }
                }
                self.expect_kind(TokenKind::RBrace, "'}' to close an import item list")?;
            } else {
                node.children.push(self.parse_import_item()?);
            }
        }
        Ok(node)
    }

    fn parse_import_item(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        let name = self.expect_ident("an import item name")?;
        let mut node = Node::new(NodeKind::ImportItem, pos).with_name(name);
        if self.cur.kind == TokenKind::As {
            self.bump()?;
            node.op = Some(self.expect_ident("an alias")?);
        }
        Ok(node)
    }

    /// `for NAME of RANGE { body }`. The spec's fixed keyword list has no
    /// `in`; `of` is the keyword it already carries for iteration-flavored
    /// syntax (reused from `import ... of`), so the loop header spells
    /// "for x of range" — see DESIGN.md.
    fn parse_for(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'for'
        let name = self.expect_ident("a loop variable name")?;
        self.expect_kind(TokenKind::Of, "'of'")?;
        let range = self.parse_expression()?;
        let body = self.parse_scope()?;
        Ok(Node::new(NodeKind::For, pos).with_name(name).with_cond(range).with_body(body))
    }

    /// `while [cond] { body } [while cond2]` — leading condition, trailing
    /// condition, or both, per `spec.md` §4.3's While description.
    fn parse_while(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'while'
        let cond = if self.cur.kind != TokenKind::LBrace {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_scope()?;
        let alt = if self.cur.kind == TokenKind::While {
            self.bump()?;
            Some(self.parse_expression()?)
        } else {
            None
        };
        let mut node = Node::new(NodeKind::While, pos).with_body(body);
        if let Some(c) = cond {
            node = node.with_cond(c);
        }
        if let Some(a) = alt {
            node = node.with_alt(a);
        }
        Ok(node)
    }

    fn parse_switch(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // 'switch'
        self.expect_kind(TokenKind::LParen, "'(' after switch")?;
        let tag = self.parse_expression()?;
        self.expect_kind(TokenKind::RParen, "')' after switch tag")?;
        self.expect_kind(TokenKind::LBrace, "'{' to start switch body")?;
        let mut cases = vec![];
        self.skip_separators();
        while self.cur.kind != TokenKind::RBrace {
            let case_pos = self.cur.pos;
            let mut case = Node::new(NodeKind::Case, case_pos);
            if self.cur.kind == TokenKind::Default {
                self.bump()?;
            } else if self.cur.kind == TokenKind::Case {
                self.bump()?;
                let cond = self.parse_expression()?;
                case = case.with_cond(cond);
            } else {
                return Err(self.unexpected("'case' or 'default'"));
            }
            self.expect_kind(TokenKind::Colon, "':' after case label")?;
            let body = self.parse_case_body()?;
            case = case.with_body(body);
            cases.push(case);
            self.skip_separators();
        }
        self.expect_kind(TokenKind::RBrace, "'}' to close switch body")?;
        Ok(Node::new(NodeKind::Switch, pos).with_cond(tag).with_children(cases))
    }

    fn parse_case_body(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        let mut stmts = vec![];
        self.skip_separators();
        while !matches!(
            self.cur.kind,
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace
        ) {
            stmts.push(self.parse_statement()?);
            self.skip_separators();
        }
        Ok(Node::new(NodeKind::Block, pos).with_children(stmts))
    }

    // ---- expressions: precedence low -> high ----------------------------

    fn parse_expression(&mut self) -> PResult<Node> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Node> {
        let left = self.parse_ternary()?;
        if self.cur.kind == TokenKind::Eq {
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_assignment()?;
            return Ok(Node::new(NodeKind::Assign, pos).with_children(vec![left, right]));
        }
        Ok(left)
    }

    fn parse_ternary(&mut self) -> PResult<Node> {
        let cond = self.parse_logical_or()?;
        if self.cur.kind == TokenKind::Question {
            let pos = self.cur.pos;
            self.bump()?;
            let then_branch = self.parse_expression()?;
            let mut node = Node::new(NodeKind::Optional, pos)
                .with_cond(cond)
                .with_body(then_branch);
            if self.cur.kind == TokenKind::Colon {
                self.bump()?;
                let else_branch = self.parse_expression()?;
                node = node.with_alt(else_branch);
            }
            return Ok(node);
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> PResult<Node> {
        let mut left = self.parse_logical_and()?;
        while self.cur.kind == TokenKind::PipePipe {
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_logical_and()?;
            left = Node::new(NodeKind::BinOp, pos).with_op("||").with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Node> {
        let mut left = self.parse_bit_or()?;
        while self.cur.kind == TokenKind::AmpAmp {
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_bit_or()?;
            left = Node::new(NodeKind::BinOp, pos).with_op("&&").with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> PResult<Node> {
        let mut left = self.parse_bit_xor()?;
        while self.cur.kind == TokenKind::Pipe {
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_bit_xor()?;
            left = Node::new(NodeKind::BinOp, pos).with_op("|").with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self) -> PResult<Node> {
        let mut left = self.parse_bit_and()?;
        while self.cur.kind == TokenKind::Caret {
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_bit_and()?;
            left = Node::new(NodeKind::BinOp, pos).with_op("^").with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> PResult<Node> {
        let mut left = self.parse_equality()?;
        while self.cur.kind == TokenKind::Amp {
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_equality()?;
            left = Node::new(NodeKind::BinOp, pos).with_op("&").with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Node> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::EqEq => "==",
                TokenKind::NotEq => "!=",
                _ => break,
            };
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_relational()?;
            left = Node::new(NodeKind::BinOp, pos).with_op(op).with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Node> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Lt => "<",
                TokenKind::Gt => ">",
                TokenKind::LtEq => "<=",
                TokenKind::GtEq => ">=",
                _ => break,
            };
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_shift()?;
            left = Node::new(NodeKind::BinOp, pos).with_op(op).with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Node> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Shl => "<<",
                TokenKind::Shr => ">>",
                _ => break,
            };
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_additive()?;
            left = Node::new(NodeKind::BinOp, pos).with_op(op).with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Node> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => break,
            };
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_multiplicative()?;
            left = Node::new(NodeKind::BinOp, pos).with_op(op).with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Node> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Percent => "%",
                _ => break,
            };
            let pos = self.cur.pos;
            self.bump()?;
            let right = self.parse_unary()?;
            left = Node::new(NodeKind::BinOp, pos).with_op(op).with_children(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        let kind = match self.cur.kind {
            TokenKind::Minus => Some(("-", NodeKind::UnOp)),
            TokenKind::Bang => Some(("!", NodeKind::UnOp)),
            TokenKind::Tilde => Some(("~", NodeKind::UnOp)),
            TokenKind::Copy => Some(("copy", NodeKind::Copy)),
            TokenKind::Move => Some(("move", NodeKind::Move)),
            _ => None,
        };
        if let Some((op, node_kind)) = kind {
            self.bump()?;
            let operand = self.parse_unary()?;
            let mut node = Node::new(node_kind, pos).with_child(operand);
            if node_kind == NodeKind::UnOp {
                node = node.with_op(op);
            }
            return Ok(node);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Node> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.cur.kind {
                TokenKind::Dot => {
                    let pos = self.cur.pos;
                    self.bump()?;
                    let name = self.expect_ident("a member name")?;
                    expr = Node::new(NodeKind::Member, pos).with_name(name).with_init(expr);
                }
                TokenKind::LParen => {
                    let pos = self.cur.pos;
                    self.bump()?;
                    let args = self.parse_arg_list(TokenKind::RParen)?;
                    self.expect_kind(TokenKind::RParen, "')' to close a call")?;
                    expr = Node::new(NodeKind::Call, pos).with_init(expr).with_children(args);
                }
                TokenKind::LBracket => {
                    let pos = self.cur.pos;
                    self.bump()?;
                    let index = self.parse_expression()?;
                    self.expect_kind(TokenKind::RBracket, "']' to close an index")?;
                    expr = Node::new(NodeKind::Index, pos).with_init(expr).with_child(index);
                }
                TokenKind::Lt => {
                    if let Some(node) = self.try_template_instantiation(&expr)? {
                        expr = node;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arg_list(&mut self, terminator: TokenKind) -> PResult<Vec<Node>> {
        let mut args = vec![];
        if self.cur.kind == terminator {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.cur.kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        Ok(args)
    }

    /// Speculatively parses `< type_ann (, type_ann)* >` at a postfix
    /// position, snapshotting the lexer (and the parser's own `cur` token)
    /// first and restoring them bit-for-bit on any failure, per §4.2/§9.
    fn try_template_instantiation(&mut self, base: &Node) -> PResult<Option<Node>> {
        let saved_cur = self.cur.clone();
        let saved_lexer: LexerState = self.lexer.save_state();
        let pos = self.cur.pos;
        match self.attempt_template_args() {
            Ok(args) => Ok(Some(
                Node::new(NodeKind::TemplateInst, pos).with_init(base.clone()).with_tmpl(args),
            )),
            Err(_) => {
                self.cur = saved_cur;
                self.lexer.restore_state(saved_lexer);
                Ok(None)
            }
        }
    }

    fn attempt_template_args(&mut self) -> PResult<Vec<Node>> {
        self.bump()?; // '<'
        let mut args = vec![self.parse_type_ref()?];
        while self.cur.kind == TokenKind::Comma {
            self.bump()?;
            args.push(self.parse_type_ref()?);
        }
        self.expect_kind(TokenKind::Gt, "'>'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        match self.cur.kind.clone() {
            TokenKind::Int(v) => {
                self.bump()?;
                Ok(Node::new(NodeKind::IntLit, pos).with_literal(Literal::Int(v)))
            }
            TokenKind::Float(v) => {
                self.bump()?;
                Ok(Node::new(NodeKind::FloatLit, pos).with_literal(Literal::Float(v)))
            }
            TokenKind::Str(s) => {
                self.bump()?;
                Ok(Node::new(NodeKind::StrLit, pos).with_literal(Literal::Str(s)))
            }
            TokenKind::Null => {
                self.bump()?;
                Ok(Node::new(NodeKind::NullLit, pos))
            }
            TokenKind::Ident(name) => {
                self.bump()?;
                Ok(Node::new(NodeKind::Ident, pos).with_name(name))
            }
            TokenKind::LParen => self.parse_paren_or_tuple(),
            TokenKind::LBrace => self.parse_scope(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Lt => {
                // `<Type,...>(args...)` template-apply primary form.
                self.bump()?;
                let mut tmpl = vec![self.parse_type_ref()?];
                while self.cur.kind == TokenKind::Comma {
                    self.bump()?;
                    tmpl.push(self.parse_type_ref()?);
                }
                self.expect_kind(TokenKind::Gt, "'>'")?;
                self.expect_kind(TokenKind::LParen, "'(' after template argument list")?;
                let args = self.parse_arg_list(TokenKind::RParen)?;
                self.expect_kind(TokenKind::RParen, "')'")?;
                Ok(Node::new(NodeKind::TemplateInst, pos).with_tmpl(tmpl).with_children(args))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// Parses one tuple element. An `ident : expr` prefix is the
    /// disambiguating named form from §4.2; it's recognized with a second
    /// token of lookahead through the lexer's own peek, since the parser's
    /// `cur` is already the identifier.
    fn parse_tuple_element(&mut self) -> PResult<Node> {
        if let TokenKind::Ident(name) = self.cur.kind.clone() {
            if self.lexer.peek()?.kind == TokenKind::Colon {
                let pos = self.cur.pos;
                self.bump()?; // ident
                self.bump()?; // ':'
                let value = self.parse_expression()?;
                return Ok(Node::new(NodeKind::Param, pos).with_name(name).with_init(value));
            }
        }
        self.parse_expression()
    }

    /// A parenthesized expression is a tuple iff it has a top-level comma or
    /// its first element used the named `ident : expr` form; otherwise a
    /// single `(expr)` is just the inner expression (§4.2).
    fn parse_paren_or_tuple(&mut self) -> PResult<Node> {
        let pos = self.cur.pos;
        self.bump()?; // '('
        if self.cur.kind == TokenKind::RParen {
            self.bump()?;
            return Ok(Node::new(NodeKind::Tuple, pos));
        }
        let first = self.parse_tuple_element()?;
        let first_is_named = first.kind == NodeKind::Param;
        let mut elements = vec![first];
        let mut saw_comma = false;
        while self.cur.kind == TokenKind::Comma {
            saw_comma = true;
            self.bump()?;
            if self.cur.kind == TokenKind::RParen {
                break;
            }
            elements.push(self.parse_tuple_element()?);
        }
        self.expect_kind(TokenKind::RParen, "')' to close a parenthesized expression")?;
        if saw_comma || first_is_named {
            Ok(Node::new(NodeKind::Tuple, pos).with_children(elements))
        } else {
            Ok(elements.into_iter().next().expect("at least one element"))
        }
    }
}

impl Node {
    #[must_use]
    fn with_tmpl(mut self, tmpl: Vec<Node>) -> Self {
        self.tmpl = Some(tmpl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Node {
        let p = Parser::new(src).expect("lex ok");
        let (prog, err) = p.parse_program();
        assert!(err.is_none(), "unexpected parse error: {err:?}");
        prog
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let prog = parse_ok("print(1 + 2 * 3)");
        assert_eq!(prog.children.len(), 1);
        let call = &prog.children[0];
        assert_eq!(call.kind, NodeKind::Call);
        let arg = &call.children[0];
        assert_eq!(arg.kind, NodeKind::BinOp);
        assert_eq!(arg.op.as_deref(), Some("+"));
        assert_eq!(arg.children[1].kind, NodeKind::BinOp);
        assert_eq!(arg.children[1].op.as_deref(), Some("*"));
    }

    #[test]
    fn parses_function_with_named_return() {
        let prog = parse_ok("fn sq(x:i32):(r:i32) { r = x * x }");
        let f = &prog.children[0];
        assert_eq!(f.kind, NodeKind::FnDecl);
        assert_eq!(f.name.as_deref(), Some("sq"));
        let ret = f.type_ann.as_ref().unwrap();
        assert_eq!(ret.kind, NodeKind::Tuple);
        assert_eq!(ret.children[0].name.as_deref(), Some("r"));
    }

    #[test]
    fn parses_pattern_with_base() {
        let prog = parse_ok("pat P : Base1 | Base2 { pub var a:i32 }");
        let p = &prog.children[0];
        assert_eq!(p.kind, NodeKind::PatDecl);
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.children[0].name.as_deref(), Some("Base1"));
    }

    #[test]
    fn ternary_binds_after_comparison() {
        let prog = parse_ok("var x = a < b ? c : d");
        let init = prog.children[0].init.as_ref().unwrap();
        assert_eq!(init.kind, NodeKind::Optional);
        let cond = init.cond.as_ref().unwrap();
        assert_eq!(cond.kind, NodeKind::BinOp);
        assert_eq!(cond.op.as_deref(), Some("<"));
    }

    #[test]
    fn single_paren_is_not_a_tuple() {
        let prog = parse_ok("var x = (1 + 2)");
        let init = prog.children[0].init.as_ref().unwrap();
        assert_eq!(init.kind, NodeKind::BinOp);
    }

    #[test]
    fn comma_makes_a_tuple() {
        let prog = parse_ok("var x = (1, 2)");
        let init = prog.children[0].init.as_ref().unwrap();
        assert_eq!(init.kind, NodeKind::Tuple);
        assert_eq!(init.children.len(), 2);
    }

    #[test]
    fn named_tuple_element_disambiguates() {
        let prog = parse_ok("var x = (a: 1)");
        let init = prog.children[0].init.as_ref().unwrap();
        assert_eq!(init.kind, NodeKind::Tuple);
        assert_eq!(init.children[0].kind, NodeKind::Param);
    }

    #[test]
    fn less_than_after_failed_template_is_comparison() {
        let prog = parse_ok("var x = a < b");
        let init = prog.children[0].init.as_ref().unwrap();
        assert_eq!(init.kind, NodeKind::BinOp);
        assert_eq!(init.op.as_deref(), Some("<"));
    }

    #[test]
    fn smart_newline_inside_parens_reparses_as_one_expr() {
        let prog = parse_ok("var x = (\n  1 +\n  2 +\n  3\n)\nprint(x)");
        assert_eq!(prog.children.len(), 2);
    }

    #[test]
    fn colon_colon_without_initializer_records_error() {
        let p = Parser::new("var x::static").expect("lex ok");
        let (_, err) = p.parse_program();
        assert!(err.is_some());
        assert!(err.unwrap().message.contains("initializer"));
    }

    #[test]
    fn pub_import_records_error_but_still_parses() {
        let p = Parser::new("pub import util of dbl").expect("lex ok");
        let (prog, err) = p.parse_program();
        assert!(err.is_some());
        assert_eq!(prog.children[0].kind, NodeKind::ImportDecl);
    }

    #[test]
    fn switch_case_default() {
        let prog = parse_ok(
            "fn cls(n:i32):(s:string) { s = switch (n % 2) { case 0: { yield \"even\" } break; default: { yield \"odd\" } break } }",
        );
        let f = &prog.children[0];
        let body = f.body.as_ref().unwrap();
        let assign = &body.children[0];
        let switch = &assign.children[1];
        assert_eq!(switch.kind, NodeKind::Switch);
        assert_eq!(switch.children.len(), 2);
        assert!(switch.children[0].cond.is_some());
        assert!(switch.children[1].cond.is_none());
    }
}
