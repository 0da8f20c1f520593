//! The runtime value model (`spec.md` §3).
//!
//! `Null`/`Int`/`Float`/`Bool` are inline payloads; everything else is
//! `Rc`-boxed, so `Value::clone()` is exactly the "refcount bump" the spec's
//! ownership model describes, and a value's last `Rc` going out of scope is
//! its release — no separate refcount field is hand-rolled anywhere (`spec.md`
//! §9 design notes: "share immutable strings and pattern definitions through
//! a reference-counted smart pointer").

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Node;
use crate::env::Env;

/// A runtime value. See `spec.md` §3 for the full kind list.
#[derive(Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Owned, mutable-on-the-heap UTF-8 bytes (§4.1).
    String(Rc<RefCell<String>>),
    Tuple(Rc<TupleValue>),
    Variant(Rc<VariantValue>),
    Function(Rc<FunctionValue>),
    BuiltinFn(Rc<BuiltinFnValue>),
    PatternInstance(Rc<RefCell<PatternInstance>>),
    Scope(Env),
    Module(Rc<ModuleValue>),
    Type(Rc<TypeValue>),
    Optional(Rc<OptionalValue>),
}

/// An ordered sequence of values with an optional parallel names array
/// (`spec.md` §3 invariant: either no names, or exactly `elements.len()`
/// names, individually possibly empty for unnamed positions).
#[derive(Debug)]
pub struct TupleValue {
    pub elements: Vec<Value>,
    pub names: Option<Vec<String>>,
}

impl TupleValue {
    #[must_use]
    pub fn positional(elements: Vec<Value>) -> Self {
        Self { elements, names: None }
    }

    /// Index with Python/spec-style negative wraparound: `t[-1] == t[len-1]`.
    pub fn get(&self, index: i64) -> Option<&Value> {
        let len = self.elements.len() as i64;
        let idx = if index < 0 { index + len } else { index };
        if idx < 0 || idx >= len {
            None
        } else {
            self.elements.get(idx as usize)
        }
    }

    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        let names = self.names.as_ref()?;
        let idx = names.iter().position(|n| n == name)?;
        self.elements.get(idx)
    }
}

#[derive(Debug)]
pub struct VariantValue {
    pub tag: String,
    pub payload: Value,
}

/// A user-declared function: a pointer to its `FnDecl` AST node plus the
/// environment it closed over, plus a display name (`spec.md` §3).
pub struct FunctionValue {
    pub name: String,
    pub decl: Rc<Node>,
    pub closure: Env,
}

pub type BuiltinImpl = fn(&[Value]) -> Result<Value, String>;

pub struct BuiltinFnValue {
    pub name: String,
    pub func: BuiltinImpl,
}

/// The shared descriptor of a pattern: name, field names, and optional
/// method environment. Held by every instance of that pattern via `Rc`;
/// `Rc::strong_count` *is* the refcount `spec.md` §3 asks for, so there is no
/// separate counter field.
pub struct PatDef {
    pub name: String,
    pub field_names: Vec<String>,
    pub methods: Option<Env>,
}

impl PatDef {
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.field_names.len()
    }
}

/// One instantiated pattern: a reference to its shared `PatDef` plus ordered
/// field values. `PatternInstance.field_count == PatDef.field_count`
/// (`spec.md` §3 invariant) is maintained at construction time in `eval.rs`.
pub struct PatternInstance {
    pub def: Rc<PatDef>,
    pub fields: Vec<Value>,
}

impl PatternInstance {
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.def.field_names.iter().position(|n| n == name)
    }
}

/// The top-level environment of a loaded file, or the method environment of
/// a pattern, wrapped as a value and exposed through member access
/// (`spec.md` glossary: "Module").
pub struct ModuleValue {
    pub name: String,
    pub env: Env,
    pub pat_def: Option<Rc<PatDef>>,
}

/// A first-class type name, optionally backed by a pattern (`spec.md` §3,
/// and the `type()` builtin in §6).
pub struct TypeValue {
    pub name: String,
    pub pattern: Option<Rc<PatDef>>,
}

/// The ternary-expression result: a payload plus a present flag. Truthiness
/// for `Optional` is exactly the present flag (`spec.md` glossary).
pub struct OptionalValue {
    pub payload: Value,
    pub present: bool,
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(RefCell::new(s.into())))
    }

    #[must_use]
    pub fn tuple(elements: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(TupleValue::positional(elements)))
    }

    #[must_use]
    pub fn named_tuple(elements: Vec<Value>, names: Vec<String>) -> Self {
        Value::Tuple(Rc::new(TupleValue { elements, names: Some(names) }))
    }

    /// Truthiness (`spec.md` glossary): null/0/0.0/false/empty-string are
    /// false; `Optional` is its own present flag; everything else is true.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::String(s) => !s.borrow().is_empty(),
            Value::Optional(o) => o.present,
            _ => true,
        }
    }

    /// Value equality for `==`/`!=` (`spec.md` §4.3): identical kind compares
    /// payloads; mixed int/float compares numerically; null equals null;
    /// otherwise unequal.
    #[must_use]
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.elements.len() == b.elements.len()
                    && a.elements.iter().zip(b.elements.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Value::Optional(a), Value::Optional(b)) => {
                a.present == b.present && (!a.present || a.payload.value_eq(&b.payload))
            }
            (Value::PatternInstance(a), Value::PatternInstance(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The name `type_of`/`type()` report (`spec.md` §6).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::Variant(_) => "variant",
            Value::Function(_) => "function",
            Value::BuiltinFn(_) => "builtin",
            // The pattern's own name (not "pattern_instance") is what
            // `type()`/`type_of` should report; see `TypeValue::describe`.
            Value::PatternInstance(_) => "pattern_instance",
            Value::Scope(_) => "scope",
            Value::Module(_) => "module",
            Value::Type(_) => "type",
            Value::Optional(_) => "optional",
        }
    }

    /// The conversion the `string(v)` builtin and string concatenation use.
    #[must_use]
    pub fn display_string(&self) -> String {
        format!("{self}")
    }

    /// `copy` expression semantics (`spec.md` §4.3): deep-copy primitives
    /// (trivial — they're inline), shallow-copy (refcount bump) everything
    /// else. Since `Clone` on every composite variant here is exactly an
    /// `Rc::clone`, plain `.clone()` already implements this rule; this
    /// method exists to name the operation at call sites.
    #[must_use]
    pub fn copied(&self) -> Value {
        self.clone()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{}", s.borrow()),
            Value::Tuple(t) => {
                write!(f, "(")?;
                for (i, v) in t.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(names) = &t.names {
                        if let Some(n) = names.get(i).filter(|n| !n.is_empty()) {
                            write!(f, "{n}: ")?;
                        }
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Variant(v) => write!(f, "{}({})", v.tag, v.payload),
            Value::Function(func) => write!(f, "<fn {}>", func.name),
            Value::BuiltinFn(b) => write!(f, "<builtin {}>", b.name),
            Value::PatternInstance(p) => {
                let p = p.borrow();
                write!(f, "{}(", p.def.name)?;
                for (i, v) in p.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Scope(_) => write!(f, "<scope>"),
            Value::Module(m) => write!(f, "<module {}>", m.name),
            Value::Type(t) => write!(f, "<type {}>", t.name),
            Value::Optional(o) => {
                if o.present {
                    write!(f, "{}", o.payload)
                } else {
                    write!(f, "null")
                }
            }
        }
    }
}

impl TypeValue {
    /// The `type(v)` builtin's result shape: `name`, `is_pat`, `fields`
    /// (`spec.md` §6, expanded in SPEC_FULL.md §C).
    #[must_use]
    pub fn describe(v: &Value) -> Value {
        let (name, pattern) = match v {
            Value::PatternInstance(p) => {
                let p = p.borrow();
                (p.def.name.clone(), Some(p.def.clone()))
            }
            other => (other.type_name().to_string(), None),
        };
        let is_pat = pattern.is_some();
        let field_names: Vec<String> = pattern
            .as_ref()
            .map(|p| p.field_names.clone())
            .unwrap_or_default();
        let fields_tuple = Value::named_tuple(
            field_names.iter().map(|n| Value::string(n.clone())).collect(),
            field_names.clone(),
        );
        Value::named_tuple(
            vec![Value::string(name.clone()), Value::Bool(is_pat), fields_tuple],
            vec!["name".to_string(), "is_pat".to_string(), "fields".to_string()],
        )
    }
}
