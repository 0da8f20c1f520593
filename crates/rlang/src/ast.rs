//! The tagged AST (`spec.md` §3).
//!
//! Every node shares one shape: a kind tag, a source position, a
//! variable-length child list, and a handful of optional named slots. This
//! mirrors the spec's own description ("Every node carries source
//! line/column, a variable-length child list ... plus optional slots") rather
//! than a per-kind enum of structs — the evaluator and parser lean on the
//! uniform shape (e.g. `Scope`/`Block` both just walk `children`).

use crate::error::Pos;

/// The closed set of AST node kinds from `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    Program,
    FnDecl,
    VarDecl,
    PatDecl,
    ImportDecl,
    ImportItem,
    Ident,
    IntLit,
    FloatLit,
    StrLit,
    NullLit,
    BinOp,
    UnOp,
    Call,
    Member,
    Index,
    Tuple,
    Scope,
    TemplateInst,
    For,
    While,
    Switch,
    Case,
    Break,
    Yield,
    Return,
    Optional,
    Copy,
    Move,
    Assign,
    TemplateDecl,
    Param,
    TypeAnn,
    Block,
}

/// A literal payload carried directly on a node (`IntLit`/`FloatLit`/`StrLit`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

/// One AST node. See module docs for why this is a single struct rather than
/// an enum-per-kind.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: Pos,
    pub children: Vec<Node>,
    pub name: Option<String>,
    pub op: Option<String>,
    pub type_ann: Option<Box<Node>>,
    pub init: Option<Box<Node>>,
    pub body: Option<Box<Node>>,
    pub cond: Option<Box<Node>>,
    pub alt: Option<Box<Node>>,
    pub tmpl: Option<Vec<Node>>,
    pub is_pub: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_constexpr: bool,
    pub is_variadic: bool,
    pub literal: Option<Literal>,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind, pos: Pos) -> Self {
        Self {
            kind,
            pos,
            children: Vec::new(),
            name: None,
            op: None,
            type_ann: None,
            init: None,
            body: None,
            cond: None,
            alt: None,
            tmpl: None,
            is_pub: false,
            is_static: false,
            is_const: false,
            is_constexpr: false,
            is_variadic: false,
            literal: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    #[must_use]
    pub fn with_literal(mut self, lit: Literal) -> Self {
        self.literal = Some(lit);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Node) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    #[must_use]
    pub fn with_cond(mut self, cond: Node) -> Self {
        self.cond = Some(Box::new(cond));
        self
    }

    #[must_use]
    pub fn with_alt(mut self, alt: Node) -> Self {
        self.alt = Some(Box::new(alt));
        self
    }

    #[must_use]
    pub fn with_init(mut self, init: Node) -> Self {
        self.init = Some(Box::new(init));
        self
    }

    #[must_use]
    pub fn with_type_ann(mut self, ann: Node) -> Self {
        self.type_ann = Some(Box::new(ann));
        self
    }
}
