//! The tree-walking evaluator (`spec.md` §4.3).
//!
//! `eval` returns `Result<(Value, Signal), RuntimeError>`: `Signal` carries
//! the four non-error control-flow outcomes a node's evaluation can ask its
//! caller to act on (see `signal.rs`); an actual failure takes the ordinary
//! `Err` path instead of a fifth signal variant. `Interpreter` owns the
//! global environment and the module loader, so an `import` inside a module
//! recurses through `eval_program` as a plain `&mut self` call — nested
//! imports just use the Rust call stack, no re-entrant borrow anywhere.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{Literal, Node, NodeKind};
use crate::env::Env;
use crate::error::{Pos, RuntimeError};
use crate::module::ModuleLoader;
use crate::signal::Signal;
use crate::value::{
    FunctionValue, ModuleValue, OptionalValue, PatDef, PatternInstance, TypeValue, Value,
};

pub struct Interpreter {
    pub global: Env,
    pub loader: ModuleLoader,
}

impl Interpreter {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { global: Env::new(None), loader: ModuleLoader::new(base_dir) }
    }

    #[must_use]
    pub fn global_env(&self) -> &Env {
        &self.global
    }

    /// Runs a parsed top-level program in the interpreter's global scope.
    pub fn run(&mut self, program: &Node) -> Result<(), RuntimeError> {
        let global = self.global.clone();
        self.eval_program(program, &global)
    }

    /// Like [`Interpreter::run`], but returns the last top-level statement's
    /// value instead of discarding it — the REPL (`spec.md` §6: "print last
    /// expression's non-null value") is the one caller that needs this.
    pub fn run_value(&mut self, program: &Node) -> Result<Value, RuntimeError> {
        let global = self.global.clone();
        let (value, _signal) = self.eval_block_children(&program.children, &global)?;
        Ok(value)
    }

    /// Walks a `Program` (or a loaded module's top-level statements) in
    /// `env` without wrapping it in an extra child frame — module top levels
    /// bind directly into the environment the caller hands them.
    pub fn eval_program(&mut self, program: &Node, env: &Env) -> Result<(), RuntimeError> {
        self.eval_block_children(&program.children, env)?;
        Ok(())
    }

    fn eval_block_children(
        &mut self,
        children: &[Node],
        env: &Env,
    ) -> Result<(Value, Signal), RuntimeError> {
        let mut last = Value::Null;
        for child in children {
            let (v, sig) = self.eval(child, env)?;
            last = v;
            if !sig.is_none() {
                return Ok((last, sig));
            }
        }
        Ok((last, Signal::None))
    }

    /// The core recursive dispatch, one arm per `NodeKind` (`spec.md` §3,
    /// §4.3).
    pub fn eval(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        match node.kind {
            NodeKind::Program | NodeKind::Block => self.eval_block_children(&node.children, env),

            NodeKind::Scope => {
                let child_env = Env::new(Some(env.clone()));
                self.eval_block_children(&node.children, &child_env)
            }

            NodeKind::FnDecl => {
                let name = node.name.clone().unwrap_or_default();
                let func = Value::Function(Rc::new(FunctionValue {
                    name: name.clone(),
                    decl: Rc::new(node.clone()),
                    closure: env.clone(),
                }));
                env.def(name, func);
                Ok((Value::Null, Signal::None))
            }

            NodeKind::VarDecl => {
                let name = node.name.clone().unwrap_or_default();
                let value = match &node.init {
                    Some(init) => {
                        let (v, sig) = self.eval(init, env)?;
                        if !sig.is_none() {
                            return Ok((v, sig));
                        }
                        v
                    }
                    None => Value::Null,
                };
                env.def(name, value);
                Ok((Value::Null, Signal::None))
            }

            NodeKind::PatDecl => self.eval_pat_decl(node, env),

            NodeKind::ImportDecl => self.eval_import_decl(node, env),

            NodeKind::Ident => {
                let name = node.name.clone().unwrap_or_default();
                match env.lookup(&name) {
                    Some(v) => Ok((v, Signal::None)),
                    None => Err(RuntimeError::new(node.pos, format!("undefined variable '{name}'"))),
                }
            }

            NodeKind::IntLit => match &node.literal {
                Some(Literal::Int(v)) => Ok((Value::Int(*v), Signal::None)),
                _ => Err(RuntimeError::new(node.pos, "malformed integer literal")),
            },
            NodeKind::FloatLit => match &node.literal {
                Some(Literal::Float(v)) => Ok((Value::Float(*v), Signal::None)),
                _ => Err(RuntimeError::new(node.pos, "malformed float literal")),
            },
            NodeKind::StrLit => match &node.literal {
                // A fresh heap string every evaluation, never shared with the
                // literal node itself (`spec.md` §4.1: string bodies are
                // "duplicated on evaluation").
                Some(Literal::Str(s)) => Ok((Value::string(s.clone()), Signal::None)),
                _ => Err(RuntimeError::new(node.pos, "malformed string literal")),
            },
            NodeKind::NullLit => Ok((Value::Null, Signal::None)),

            NodeKind::BinOp => self.eval_binop(node, env),
            NodeKind::UnOp => self.eval_unop(node, env),

            NodeKind::Call => self.eval_call(node, env),
            NodeKind::Member => self.eval_member(node, env),
            NodeKind::Index => self.eval_index(node, env),
            NodeKind::Assign => self.eval_assign(node, env),
            NodeKind::Tuple => self.eval_tuple(node, env),

            NodeKind::Optional => self.eval_optional(node, env),
            NodeKind::Copy => {
                let (v, sig) = self.eval(&node.children[0], env)?;
                Ok((v.copied(), sig))
            }
            NodeKind::Move => self.eval_move(node, env),

            NodeKind::For => self.eval_for(node, env),
            NodeKind::While => self.eval_while(node, env),
            NodeKind::Switch => self.eval_switch(node, env),

            NodeKind::Break => Ok((Value::Null, Signal::Break)),
            NodeKind::Yield => self.eval_signal_with_value(node, env, Signal::Yield),
            NodeKind::Return => self.eval_signal_with_value(node, env, Signal::Return),

            NodeKind::TemplateInst | NodeKind::TemplateDecl => Err(RuntimeError::new(
                node.pos,
                "templates are parsed but not monomorphized at runtime",
            )),

            // Structural-only node kinds: always consumed by a parent (a
            // function's `children`, a return tuple's `type_ann`, an
            // `ImportDecl`'s item list) before the evaluator ever reaches
            // them directly. Present only so the match stays exhaustive.
            NodeKind::Case | NodeKind::Param | NodeKind::TypeAnn | NodeKind::ImportItem => {
                Ok((Value::Null, Signal::None))
            }
        }
    }

    fn eval_signal_with_value(
        &mut self,
        node: &Node,
        env: &Env,
        signal: Signal,
    ) -> Result<(Value, Signal), RuntimeError> {
        match &node.init {
            Some(expr) => {
                let (v, sig) = self.eval(expr, env)?;
                if sig.is_none() {
                    Ok((v, signal))
                } else {
                    Ok((v, sig))
                }
            }
            None => Ok((Value::Null, signal)),
        }
    }

    // ---- functions --------------------------------------------------

    fn call_function(
        &mut self,
        f: &Rc<FunctionValue>,
        args: Vec<Value>,
        pos: Pos,
    ) -> Result<Value, RuntimeError> {
        let call_env = Env::new(Some(f.closure.clone()));
        for (i, param) in f.decl.children.iter().enumerate() {
            let name = param.name.clone().unwrap_or_default();
            let value = args.get(i).cloned().unwrap_or(Value::Null);
            call_env.def(name, value);
        }

        // A `:(name: Type, ...)` return annotation seeds each named field as
        // null in the call environment up front; whichever fields the body
        // assigns are read back out at the end (`spec.md` §4.3's named-return
        // rule — see DESIGN.md).
        let return_fields: Option<Vec<String>> = f.decl.type_ann.as_ref().and_then(|t| {
            if t.kind == NodeKind::Tuple {
                Some(t.children.iter().filter_map(|c| c.name.clone()).collect())
            } else {
                None
            }
        });
        if let Some(fields) = &return_fields {
            for name in fields {
                call_env.def(name.clone(), Value::Null);
            }
        }

        // The body's own Scope node is *not* eval'd generically — that would
        // push a redundant child frame and hide the named-return bindings
        // the function just seeded. Its statements run directly in
        // `call_env`.
        let (last_value, signal) = match &f.decl.body {
            Some(body) => self.eval_block_children(&body.children, &call_env)?,
            None => (Value::Null, Signal::None),
        };

        match signal {
            // Only an explicit `return` overrides the named-return fields
            // with its own value. Every other completion — falling off the
            // end, a stray `break`, or a `yield` that escaped to this
            // boundary unabsorbed by any loop — reads the fields back as
            // they currently stand.
            Signal::Return => Ok(last_value),
            Signal::None | Signal::Break | Signal::Yield => {
                if let Some(fields) = &return_fields {
                    let values: Vec<Value> =
                        fields.iter().map(|n| call_env.get_or_null(n)).collect();
                    Ok(Value::named_tuple(values, fields.clone()))
                } else {
                    Ok(last_value)
                }
            }
        }
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>, pos: Pos) -> Result<Value, RuntimeError> {
        match callee {
            Value::BuiltinFn(b) => (b.func)(&args).map_err(|msg| RuntimeError::new(pos, msg)),
            Value::Function(f) => self.call_function(&f, args, pos),
            Value::Module(m) if m.pat_def.is_some() => {
                let def = m.pat_def.clone().expect("checked is_some above");
                Ok(Value::PatternInstance(Rc::new(RefCell::new(instantiate(&def, args)))))
            }
            Value::Type(t) => self.call_type(&t, args, pos),
            other => Err(RuntimeError::new(
                pos,
                format!("value of type '{}' is not callable", other.type_name()),
            )),
        }
    }

    fn call_type(&self, t: &TypeValue, args: Vec<Value>, pos: Pos) -> Result<Value, RuntimeError> {
        if let Some(def) = &t.pattern {
            return Ok(Value::PatternInstance(Rc::new(RefCell::new(instantiate(def, args)))));
        }
        let input = args.into_iter().next().unwrap_or(Value::Null);
        let name = t.name.as_str();
        if name == "string" {
            Ok(Value::string(input.display_string()))
        } else if name == "bool" {
            Ok(Value::Bool(input.truthy()))
        } else if name.starts_with('f') {
            coerce_float(&input, pos).map(Value::Float)
        } else {
            coerce_int(&input, pos).map(Value::Int)
        }
    }

    // ---- calls, members, indexing, assignment ------------------------

    fn eval_call(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (callee, csig) = self.eval(node.init.as_ref().expect("call has a callee"), env)?;
        if !csig.is_none() {
            return Ok((callee, csig));
        }
        let mut args = Vec::with_capacity(node.children.len());
        for arg_node in &node.children {
            let (v, sig) = self.eval(arg_node, env)?;
            if !sig.is_none() {
                return Ok((v, sig));
            }
            args.push(v);
        }
        let result = self.call_value(callee, args, node.pos)?;
        Ok((result, Signal::None))
    }

    fn eval_member(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (obj, sig) = self.eval(node.init.as_ref().expect("member has an object"), env)?;
        if !sig.is_none() {
            return Ok((obj, sig));
        }
        let field = node.name.clone().unwrap_or_default();
        let value = read_member(&obj, &field, node.pos)?;
        Ok((value, Signal::None))
    }

    fn eval_index(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (obj, sig) = self.eval(node.init.as_ref().expect("index has an object"), env)?;
        if !sig.is_none() {
            return Ok((obj, sig));
        }
        let (idx, isig) = self.eval(&node.children[0], env)?;
        if !isig.is_none() {
            return Ok((idx, isig));
        }
        let result = match (&obj, &idx) {
            (Value::Tuple(t), Value::Int(i)) => t
                .get(*i)
                .cloned()
                .ok_or_else(|| RuntimeError::new(node.pos, "tuple index out of range"))?,
            _ => return Err(RuntimeError::new(node.pos, "unsupported index operation")),
        };
        Ok((result, Signal::None))
    }

    fn eval_assign(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let target = &node.children[0];
        let rhs = &node.children[1];
        let (value, sig) = self.eval(rhs, env)?;
        match target.kind {
            NodeKind::Ident => {
                let name = target.name.clone().unwrap_or_default();
                env.set(&name, value.clone());
            }
            NodeKind::Member => {
                let (obj, osig) = self.eval(target.init.as_ref().expect("member has an object"), env)?;
                if !osig.is_none() {
                    return Ok((obj, osig));
                }
                let field = target.name.clone().unwrap_or_default();
                assign_member(&obj, &field, value.clone(), target.pos)?;
            }
            NodeKind::Index => {
                return Err(RuntimeError::new(node.pos, "index assignment is not supported"));
            }
            _ => return Err(RuntimeError::new(node.pos, "invalid assignment target")),
        }
        Ok((value, sig))
    }

    fn eval_tuple(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let mut elements = Vec::with_capacity(node.children.len());
        let mut names: Vec<String> = Vec::with_capacity(node.children.len());
        let mut any_named = false;
        for child in &node.children {
            let (value, name) = match child.kind {
                // `ident: expr` — the parser's disambiguating named form.
                NodeKind::Param => {
                    let (v, sig) = self.eval(child.init.as_ref().expect("param has a value"), env)?;
                    if !sig.is_none() {
                        return Ok((v, sig));
                    }
                    (v, child.name.clone().unwrap_or_default())
                }
                // `ident = expr` — a tuple element written as an assignment
                // expression also names its slot (`spec.md` §4.3). Evaluated
                // through the ordinary `Assign` arm so the side effect (and
                // non-identifier targets) behave exactly as they would
                // anywhere else.
                NodeKind::Assign => {
                    let (v, sig) = self.eval(child, env)?;
                    if !sig.is_none() {
                        return Ok((v, sig));
                    }
                    let name = if child.children[0].kind == NodeKind::Ident {
                        child.children[0].name.clone().unwrap_or_default()
                    } else {
                        String::new()
                    };
                    (v, name)
                }
                _ => {
                    let (v, sig) = self.eval(child, env)?;
                    if !sig.is_none() {
                        return Ok((v, sig));
                    }
                    (v, String::new())
                }
            };
            if !name.is_empty() {
                any_named = true;
            }
            elements.push(value);
            names.push(name);
        }
        let result =
            if any_named { Value::named_tuple(elements, names) } else { Value::tuple(elements) };
        Ok((result, Signal::None))
    }

    fn eval_optional(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (cond, sig) = self.eval(node.cond.as_ref().expect("ternary has a condition"), env)?;
        if !sig.is_none() {
            return Ok((cond, sig));
        }
        if cond.truthy() {
            let (v, s) = self.eval(node.body.as_ref().expect("ternary has a then-branch"), env)?;
            Ok((Value::Optional(Rc::new(OptionalValue { payload: v, present: true })), s))
        } else if let Some(alt) = &node.alt {
            let (v, s) = self.eval(alt, env)?;
            Ok((Value::Optional(Rc::new(OptionalValue { payload: v, present: true })), s))
        } else {
            Ok((Value::Optional(Rc::new(OptionalValue { payload: Value::Null, present: false })), Signal::None))
        }
    }

    fn eval_move(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let operand = &node.children[0];
        if operand.kind == NodeKind::Ident {
            let name = operand.name.clone().unwrap_or_default();
            Ok((env.remove(&name).unwrap_or(Value::Null), Signal::None))
        } else {
            // No single binding to move out of a non-identifier operand;
            // falls back to ordinary evaluation (`spec.md` §9 default).
            self.eval(operand, env)
        }
    }

    // ---- loops and switch ---------------------------------------------

    fn eval_for(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (range_val, sig) = self.eval(node.cond.as_ref().expect("for has a range"), env)?;
        if !sig.is_none() {
            return Ok((range_val, sig));
        }
        let loop_var = node.name.clone().unwrap_or_default();
        let body = node.body.as_ref().expect("for has a body");
        let items: Vec<Value> = match &range_val {
            Value::Tuple(t) => t.elements.clone(),
            Value::Int(n) => (0..*n).map(Value::Int).collect(),
            _ => {
                return Err(RuntimeError::new(
                    node.pos,
                    "a 'for' loop range must be a tuple or an integer",
                ))
            }
        };
        let mut result = Value::Null;
        for item in items {
            let iter_env = Env::new(Some(env.clone()));
            iter_env.def(loop_var.clone(), item);
            let (v, sig) = self.eval_block_children(&body.children, &iter_env)?;
            match sig {
                Signal::None => {}
                Signal::Yield => result = v,
                Signal::Break => break,
                Signal::Return => return Ok((v, Signal::Return)),
            }
        }
        Ok((result, Signal::None))
    }

    fn eval_while(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let body = node.body.as_ref().expect("while has a body");
        let mut result = Value::Null;
        loop {
            if let Some(cond) = &node.cond {
                let (c, sig) = self.eval(cond, env)?;
                if !sig.is_none() {
                    return Ok((c, sig));
                }
                if !c.truthy() {
                    break;
                }
            }
            let iter_env = Env::new(Some(env.clone()));
            let (v, sig) = self.eval_block_children(&body.children, &iter_env)?;
            match sig {
                Signal::None => {}
                Signal::Yield => result = v,
                Signal::Break => break,
                Signal::Return => return Ok((v, Signal::Return)),
            }
            if let Some(alt) = &node.alt {
                let (c, sig) = self.eval(alt, env)?;
                if !sig.is_none() {
                    return Ok((c, sig));
                }
                if !c.truthy() {
                    break;
                }
            }
        }
        Ok((result, Signal::None))
    }

    fn eval_switch(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (tag, sig) = self.eval(node.cond.as_ref().expect("switch has a tag"), env)?;
        if !sig.is_none() {
            return Ok((tag, sig));
        }
        for case in &node.children {
            let matches = match &case.cond {
                None => true,
                Some(c) => {
                    let (cv, csig) = self.eval(c, env)?;
                    if !csig.is_none() {
                        return Ok((cv, csig));
                    }
                    cv.value_eq(&tag)
                }
            };
            if !matches {
                continue;
            }
            let child_env = Env::new(Some(env.clone()));
            let body = case.body.as_ref().expect("case has a body");
            let (v, bsig) = self.eval(body, &child_env)?;
            return match bsig {
                // A `break` just ends the case; it never escapes a switch.
                Signal::Break => Ok((v, Signal::None)),
                other => Ok((v, other)),
            };
        }
        Ok((Value::Null, Signal::None))
    }

    // ---- pat declarations and modules ---------------------------------

    fn eval_pat_decl(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let body = node.body.as_ref().expect("pat decl has a body");
        let mut field_names: Vec<String> = vec![];
        let mut base_defs: Vec<Rc<PatDef>> = vec![];
        for base_node in &node.children {
            let base_name = base_node.name.clone().unwrap_or_default();
            if let Some(Value::Module(m)) = env.lookup(&base_name) {
                if let Some(def) = &m.pat_def {
                    for fname in &def.field_names {
                        if !field_names.contains(fname) {
                            field_names.push(fname.clone());
                        }
                    }
                    base_defs.push(def.clone());
                }
            }
        }
        for stmt in &body.children {
            if stmt.kind == NodeKind::VarDecl {
                if let Some(n) = &stmt.name {
                    if !field_names.contains(n) {
                        field_names.push(n.clone());
                    }
                }
            }
        }

        let pattern_scope = Env::new(Some(env.clone()));
        // Inherited methods are copied in base order so a derived pattern's
        // own `fn` (evaluated below) can override them by simple rebinding.
        for def in &base_defs {
            if let Some(methods_env) = &def.methods {
                for (name, value) in methods_env.own_bindings() {
                    pattern_scope.def(name, value);
                }
            }
        }
        for stmt in &body.children {
            if matches!(stmt.kind, NodeKind::FnDecl | NodeKind::PatDecl) {
                self.eval(stmt, &pattern_scope)?;
            }
        }

        let name = node.name.clone().unwrap_or_default();
        let def = Rc::new(PatDef { name: name.clone(), field_names, methods: Some(pattern_scope.clone()) });
        let module = Value::Module(Rc::new(ModuleValue {
            name: name.clone(),
            env: pattern_scope,
            pat_def: Some(def),
        }));
        env.def(name, module);
        Ok((Value::Null, Signal::None))
    }

    fn eval_import_decl(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let dotted = node.name.clone().unwrap_or_default();
        let (path, key) = self.loader.resolved_key(&dotted);
        let module_value = match self.loader.cached(&key) {
            Some(v) => v,
            None => match ModuleLoader::parse_source(&path, &dotted) {
                Ok(program) => {
                    let module_env = Env::new(Some(self.global.clone()));
                    match self.eval_program(&program, &module_env) {
                        Ok(()) => {
                            let stem = ModuleLoader::stem(&path, &dotted);
                            let module = Value::Module(Rc::new(ModuleValue {
                                name: stem,
                                env: module_env,
                                pat_def: None,
                            }));
                            self.loader.store(key, module.clone());
                            module
                        }
                        Err(e) => {
                            self.loader.fail(format!("cannot load module '{dotted}': {e}"));
                            Value::Null
                        }
                    }
                }
                Err(msg) => {
                    self.loader.fail(msg);
                    Value::Null
                }
            },
        };
        if node.children.is_empty() {
            let bind_name = node.op.clone().unwrap_or_else(|| dotted.clone());
            env.def(bind_name, module_value);
        } else {
            for item in &node.children {
                let item_name = item.name.clone().unwrap_or_default();
                let value = match &module_value {
                    Value::Module(m) => m.env.get_or_null(&item_name),
                    _ => Value::Null,
                };
                let bind_name = item.op.clone().unwrap_or_else(|| item_name.clone());
                env.def(bind_name, value);
            }
        }
        Ok((Value::Null, Signal::None))
    }

    // ---- binary / unary operators --------------------------------------

    fn eval_binop(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let op = node.op.clone().unwrap_or_default();
        if op == "&&" || op == "||" {
            return self.eval_short_circuit(&op, &node.children[0], &node.children[1], env);
        }
        let (lhs, lsig) = self.eval(&node.children[0], env)?;
        if !lsig.is_none() {
            return Ok((lhs, lsig));
        }
        let (rhs, rsig) = self.eval(&node.children[1], env)?;
        if !rsig.is_none() {
            return Ok((rhs, rsig));
        }
        let lhs = unwrap_optional(lhs);
        let rhs = unwrap_optional(rhs);
        match apply_binop(&op, &lhs, &rhs, node.pos)? {
            Some(v) => Ok((v, Signal::None)),
            // No built-in handling for these operand kinds: fall back to a
            // user-declared `fn "<op>"(a, b)` bound under the operator's own
            // text, the same way any other identifier resolves (`spec.md`
            // §9 open question (c) — see DESIGN.md).
            None => match env.lookup(&op) {
                Some(callee) => {
                    let result = self.call_value(callee, vec![lhs, rhs], node.pos)?;
                    Ok((result, Signal::None))
                }
                None => Err(RuntimeError::new(node.pos, "unsupported binary operation")),
            },
        }
    }

    fn eval_short_circuit(
        &mut self,
        op: &str,
        lhs_node: &Node,
        rhs_node: &Node,
        env: &Env,
    ) -> Result<(Value, Signal), RuntimeError> {
        let (lhs, lsig) = self.eval(lhs_node, env)?;
        if !lsig.is_none() {
            return Ok((lhs, lsig));
        }
        let lhs_truthy = lhs.truthy();
        if (op == "&&" && !lhs_truthy) || (op == "||" && lhs_truthy) {
            return Ok((Value::Bool(op == "||"), Signal::None));
        }
        let (rhs, rsig) = self.eval(rhs_node, env)?;
        if !rsig.is_none() {
            return Ok((rhs, rsig));
        }
        Ok((Value::Bool(rhs.truthy()), Signal::None))
    }

    fn eval_unop(&mut self, node: &Node, env: &Env) -> Result<(Value, Signal), RuntimeError> {
        let (v, sig) = self.eval(&node.children[0], env)?;
        if !sig.is_none() {
            return Ok((v, sig));
        }
        let op = node.op.as_deref().unwrap_or("");
        let v = unwrap_optional(v);
        let result = match (op, &v) {
            ("-", Value::Int(i)) => Value::Int(-i),
            ("-", Value::Float(f)) => Value::Float(-f),
            ("!", _) => Value::Bool(!v.truthy()),
            ("~", Value::Int(i)) => Value::Int(!i),
            _ => {
                return Err(RuntimeError::new(
                    node.pos,
                    format!("unsupported unary operator '{op}' for a value of type '{}'", v.type_name()),
                ))
            }
        };
        Ok((result, Signal::None))
    }
}

fn instantiate(def: &Rc<PatDef>, args: Vec<Value>) -> PatternInstance {
    let mut fields = vec![Value::Null; def.field_count()];
    for (i, v) in args.into_iter().enumerate() {
        if i < fields.len() {
            fields[i] = v;
        }
    }
    PatternInstance { def: def.clone(), fields }
}

fn read_member(obj: &Value, field: &str, pos: Pos) -> Result<Value, RuntimeError> {
    match obj {
        Value::PatternInstance(p) => {
            let p = p.borrow();
            if let Some(i) = p.field_index(field) {
                return Ok(p.fields[i].clone());
            }
            if let Some(methods) = &p.def.methods {
                if let Some(m) = methods.lookup(field) {
                    return Ok(m);
                }
            }
            Err(RuntimeError::new(pos, format!("pattern '{}' has no field or method '{field}'", p.def.name)))
        }
        Value::Tuple(t) => t
            .get_named(field)
            .cloned()
            .ok_or_else(|| RuntimeError::new(pos, format!("tuple has no named element '{field}'"))),
        Value::Scope(e) => {
            e.lookup(field).ok_or_else(|| RuntimeError::new(pos, format!("scope has no member '{field}'")))
        }
        Value::Module(m) => m
            .env
            .lookup(field)
            .ok_or_else(|| RuntimeError::new(pos, format!("module '{}' has no member '{field}'", m.name))),
        other => Err(RuntimeError::new(
            pos,
            format!("value of type '{}' has no member '{field}'", other.type_name()),
        )),
    }
}

fn assign_member(obj: &Value, field: &str, value: Value, pos: Pos) -> Result<(), RuntimeError> {
    match obj {
        Value::PatternInstance(p) => {
            let idx = p.borrow().field_index(field);
            match idx {
                Some(i) => {
                    p.borrow_mut().fields[i] = value;
                    Ok(())
                }
                None => Err(RuntimeError::new(pos, format!("pattern has no field '{field}'"))),
            }
        }
        Value::Scope(e) => {
            e.def(field.to_string(), value);
            Ok(())
        }
        Value::Module(m) => {
            m.env.def(field.to_string(), value);
            Ok(())
        }
        other => Err(RuntimeError::new(
            pos,
            format!("cannot assign a member on a value of type '{}'", other.type_name()),
        )),
    }
}

/// A present ternary result (`spec.md` §4.3's `Optional` value kind) should
/// behave like its payload for arithmetic, comparison, and unary operators —
/// only `truthy()`, `value_eq()`, and display keep the wrapper visible.
fn unwrap_optional(v: Value) -> Value {
    match v {
        Value::Optional(o) if o.present => o.payload.clone(),
        Value::Optional(_) => Value::Null,
        other => other,
    }
}

fn apply_binop(op: &str, lhs: &Value, rhs: &Value, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    match op {
        "+" => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => {
                Ok(Some(Value::string(format!("{}{}", a.borrow(), b.borrow()))))
            }
            _ => numeric_binop(lhs, rhs, |a, b| a.wrapping_add(b), |a, b| a + b),
        },
        "-" => numeric_binop(lhs, rhs, |a, b| a.wrapping_sub(b), |a, b| a - b),
        "*" => numeric_binop(lhs, rhs, |a, b| a.wrapping_mul(b), |a, b| a * b),
        "/" => numeric_div(lhs, rhs, pos),
        "%" => numeric_mod(lhs, rhs, pos),
        "<" | ">" | "<=" | ">=" => compare(op, lhs, rhs),
        "==" => Ok(Some(Value::Bool(lhs.value_eq(rhs)))),
        "!=" => Ok(Some(Value::Bool(!lhs.value_eq(rhs)))),
        "&" | "|" | "^" | "<<" | ">>" => bitwise(op, lhs, rhs),
        _ => Ok(None),
    }
}

fn numeric_binop(
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Option<Value>, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(Value::Int(int_op(*a, *b)))),
        (Value::Float(a), Value::Float(b)) => Ok(Some(Value::Float(float_op(*a, *b)))),
        (Value::Int(a), Value::Float(b)) => Ok(Some(Value::Float(float_op(*a as f64, *b)))),
        (Value::Float(a), Value::Int(b)) => Ok(Some(Value::Float(float_op(*a, *b as f64)))),
        _ => Ok(None),
    }
}

fn numeric_div(lhs: &Value, rhs: &Value, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::new(pos, "division by zero")),
        (Value::Int(a), Value::Int(b)) => Ok(Some(Value::Int(a / b))),
        (Value::Float(a), Value::Float(b)) => Ok(Some(Value::Float(a / b))),
        (Value::Int(a), Value::Float(b)) => Ok(Some(Value::Float(*a as f64 / b))),
        (Value::Float(a), Value::Int(b)) => Ok(Some(Value::Float(a / *b as f64))),
        _ => Ok(None),
    }
}

fn numeric_mod(lhs: &Value, rhs: &Value, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::new(pos, "division by zero")),
        (Value::Int(a), Value::Int(b)) => Ok(Some(Value::Int(a % b))),
        (Value::Float(a), Value::Float(b)) => Ok(Some(Value::Float(a % b))),
        (Value::Int(a), Value::Float(b)) => Ok(Some(Value::Float(*a as f64 % b))),
        (Value::Float(a), Value::Int(b)) => Ok(Some(Value::Float(a % *b as f64))),
        _ => Ok(None),
    }
}

fn compare(op: &str, lhs: &Value, rhs: &Value) -> Result<Option<Value>, RuntimeError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => a.borrow().as_str().partial_cmp(b.borrow().as_str()),
        _ => return Ok(None),
    };
    let Some(ord) = ordering else { return Ok(None) };
    let result = match op {
        "<" => ord.is_lt(),
        ">" => ord.is_gt(),
        "<=" => ord.is_le(),
        ">=" => ord.is_ge(),
        _ => unreachable!("matched only by the relational operators"),
    };
    Ok(Some(Value::Bool(result)))
}

fn bitwise(op: &str, lhs: &Value, rhs: &Value) -> Result<Option<Value>, RuntimeError> {
    let (Value::Int(a), Value::Int(b)) = (lhs, rhs) else { return Ok(None) };
    let result = match op {
        "&" => a & b,
        "|" => a | b,
        "^" => a ^ b,
        "<<" => a.checked_shl(*b as u32).unwrap_or(0),
        ">>" => a.checked_shr(*b as u32).unwrap_or(0),
        _ => unreachable!("matched only by the bitwise operators"),
    };
    Ok(Some(Value::Int(result)))
}

fn coerce_int(v: &Value, pos: Pos) -> Result<i64, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Ok(*f as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => s
            .borrow()
            .trim()
            .parse::<i64>()
            .map_err(|_| RuntimeError::new(pos, format!("cannot convert '{}' to an integer", s.borrow()))),
        Value::Null => Ok(0),
        other => Err(RuntimeError::new(
            pos,
            format!("cannot convert a value of type '{}' to an integer", other.type_name()),
        )),
    }
}

fn coerce_float(v: &Value, pos: Pos) -> Result<f64, RuntimeError> {
    match v {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .borrow()
            .trim()
            .parse::<f64>()
            .map_err(|_| RuntimeError::new(pos, format!("cannot convert '{}' to a float", s.borrow()))),
        Value::Null => Ok(0.0),
        other => Err(RuntimeError::new(
            pos,
            format!("cannot convert a value of type '{}' to a float", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::value::BuiltinFnValue;

    fn run(source: &str) -> (Interpreter, Env) {
        let mut interp = Interpreter::new(std::env::temp_dir());
        let parser = Parser::new(source).expect("lex ok");
        let (program, err) = parser.parse_program();
        assert!(err.is_none(), "unexpected parse error: {err:?}");
        let env = interp.global.clone();
        interp.run(&program).expect("eval ok");
        (interp, env)
    }

    #[test]
    fn arithmetic_follows_precedence() {
        let (_interp, env) = run("var x = 1 + 2 * 3");
        assert!(matches!(env.lookup("x"), Some(Value::Int(7))));
    }

    #[test]
    fn named_return_function_reads_its_own_field() {
        let (_interp, env) = run("fn sq(x:i32):(r:i32) { r = x * x } var result = sq(7)");
        let result = env.lookup("result").unwrap();
        let field = read_member(&result, "r", Pos::start()).unwrap();
        assert!(matches!(field, Value::Int(49)));
    }

    #[test]
    fn explicit_return_wins_over_named_fields() {
        let (_interp, env) = run("fn f(x:i32):(r:i32) { r = 1 return 99 } var result = f(0)");
        let result = env.lookup("result").unwrap();
        assert!(matches!(result, Value::Int(99)));
    }

    #[test]
    fn pattern_instantiation_and_member_access() {
        let (_interp, env) =
            run("pat Point { pub var x:i32 pub var y:i32 } var p = Point(3, 4)");
        let p = env.lookup("p").unwrap();
        let x = read_member(&p, "x", Pos::start()).unwrap();
        let y = read_member(&p, "y", Pos::start()).unwrap();
        assert!(matches!(x, Value::Int(3)));
        assert!(matches!(y, Value::Int(4)));
    }

    #[test]
    fn pattern_method_is_reachable_through_member_lookup() {
        let (mut interp, env) = run(
            "pat Counter { pub var n:i32 fn bump(self):(r:i32) { r = 1 } } var c = Counter(0)",
        );
        let c = env.lookup("c").unwrap();
        let bump = read_member(&c, "bump", Pos::start()).unwrap();
        let result = interp.call_value(bump, vec![c], Pos::start()).unwrap();
        let r = read_member(&result, "r", Pos::start()).unwrap();
        assert!(matches!(r, Value::Int(1)));
    }

    #[test]
    fn switch_with_default_selects_matching_case_via_yield() {
        let (_interp, env) = run(
            "fn cls(n:i32):(s:string) { s = switch (n % 2) { case 0: { yield \"even\" } break; default: { yield \"odd\" } break } } var a = cls(4) var b = cls(3)",
        );
        let a = env.lookup("a").unwrap();
        let b = env.lookup("b").unwrap();
        assert!(matches!(read_member(&a, "s", Pos::start()).unwrap(), Value::String(s) if *s.borrow() == "even"));
        assert!(matches!(read_member(&b, "s", Pos::start()).unwrap(), Value::String(s) if *s.borrow() == "odd"));
    }

    #[test]
    fn for_loop_accumulates_via_yield_and_break() {
        let (_interp, env) =
            run("var total = 0 for i of 5 { total = total + i yield total }");
        assert!(matches!(env.lookup("total"), Some(Value::Int(10))));
    }

    #[test]
    fn break_stops_a_for_loop_after_its_first_iteration() {
        let (_interp, env) = run("var count = 0 for i of 10 { count = count + 1 break }");
        assert!(matches!(env.lookup("count"), Some(Value::Int(1))));
    }

    #[test]
    fn break_preserves_the_accumulated_result_instead_of_the_break_branch() {
        let (_interp, env) = run(
            "var result = { for i of 5 { (i < 3) ? { yield i } : { break } } }",
        );
        assert!(matches!(env.lookup("result"), Some(Value::Int(2))));
    }

    #[test]
    fn ternary_result_is_transparent_to_arithmetic_and_comparison() {
        let (_interp, env) = run("var c = true var x = (c ? 1 : 2) + 3");
        assert!(matches!(env.lookup("x"), Some(Value::Int(4))));
        let (_interp2, env2) = run("var c = false var y = (c ? 1 : 2) < 5");
        assert!(matches!(env2.lookup("y"), Some(Value::Bool(true))));
    }

    #[test]
    fn while_loop_with_trailing_condition_runs_at_least_once() {
        let (_interp, env) = run("var n = 0 while { n = n + 1 } while n < 3");
        assert!(matches!(env.lookup("n"), Some(Value::Int(3))));
    }

    #[test]
    fn logical_and_short_circuits_the_right_operand() {
        let (_interp, env) = run("var touched = 0 fn side():(r:bool) { touched = 1 r = true } var x = false && side().r");
        assert!(matches!(env.lookup("touched"), Some(Value::Int(0))));
        assert!(matches!(env.lookup("x"), Some(Value::Bool(false))));
    }

    #[test]
    fn custom_operator_function_is_dispatched_for_patterns() {
        let mut interp = Interpreter::new(std::env::temp_dir());
        let src = r#"
            pat Vec2 { pub var x:i32 pub var y:i32 }
            fn "+"(a, b):(r) { r = Vec2(a.x + b.x, a.y + b.y) }
            var p = Vec2(1, 2) + Vec2(3, 4)
        "#;
        let parser = Parser::new(src).expect("lex ok");
        let (program, err) = parser.parse_program();
        assert!(err.is_none(), "unexpected parse error: {err:?}");
        let env = interp.global.clone();
        interp.run(&program).expect("eval ok");
        let p = env.lookup("p").unwrap();
        let r = read_member(&p, "r", Pos::start()).unwrap();
        let x = read_member(&r, "x", Pos::start()).unwrap();
        let y = read_member(&r, "y", Pos::start()).unwrap();
        assert!(matches!(x, Value::Int(4)));
        assert!(matches!(y, Value::Int(6)));
    }

    #[test]
    fn move_on_an_identifier_removes_its_binding() {
        let (_interp, env) = run("var a = 5 var b = move a");
        assert!(matches!(env.lookup("b"), Some(Value::Int(5))));
        assert!(env.lookup("a").is_none());
    }

    #[test]
    fn module_import_binds_items_under_their_own_or_aliased_names() {
        let dir = std::env::temp_dir().join(format!("rlang-eval-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        std::fs::write(dir.join("util.lang"), "var answer = 42").expect("write fixture");

        let mut interp = Interpreter::new(&dir);
        let src = "import util of answer as the_answer";
        let parser = Parser::new(src).expect("lex ok");
        let (program, err) = parser.parse_program();
        assert!(err.is_none(), "unexpected parse error: {err:?}");
        let env = interp.global.clone();
        interp.run(&program).expect("eval ok");
        assert!(matches!(env.lookup("the_answer"), Some(Value::Int(42))));
    }

    #[test]
    fn builtin_function_values_are_callable() {
        fn double(args: &[Value]) -> Result<Value, String> {
            match args.first() {
                Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                _ => Err("expected an int".to_string()),
            }
        }
        let mut interp = Interpreter::new(std::env::temp_dir());
        interp.global.def(
            "double".to_string(),
            Value::BuiltinFn(Rc::new(BuiltinFnValue { name: "double".to_string(), func: double })),
        );
        let parser = Parser::new("var x = double(21)").expect("lex ok");
        let (program, err) = parser.parse_program();
        assert!(err.is_none());
        let env = interp.global.clone();
        interp.run(&program).expect("eval ok");
        assert!(matches!(env.lookup("x"), Some(Value::Int(42))));
    }
}
