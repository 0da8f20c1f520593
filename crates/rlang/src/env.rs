//! Lexical environments: a chain of frames linked to a parent (`spec.md` §3,
//! §4.4).
//!
//! Each frame is a small `Vec<(String, Value)>` rather than a hash map — the
//! spec calls a frame "a list of `(name, value)` entries" and states the
//! per-frame invariant "lists each name at most once", which a linear scan
//! satisfies directly and which function/pattern scopes rarely hold more
//! than a handful of bindings for anyway. Frames are reference-counted
//! (`Rc<RefCell<Frame>>`); a closure holding an `Env` keeps its whole parent
//! chain alive, exactly as `spec.md` §9 describes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

struct Frame {
    parent: Option<Env>,
    bindings: Vec<(String, Value)>,
}

/// A reference-counted handle to one frame in the environment chain.
#[derive(Clone)]
pub struct Env(Rc<RefCell<Frame>>);

impl Env {
    #[must_use]
    pub fn new(parent: Option<Env>) -> Self {
        Self(Rc::new(RefCell::new(Frame { parent, bindings: Vec::new() })))
    }

    #[must_use]
    pub fn parent(&self) -> Option<Env> {
        self.0.borrow().parent.clone()
    }

    /// `get(name)`: scan innermost frame outward; `None` means the name is
    /// bound nowhere in the chain. The raw primitive from §4.4 returns null
    /// on a miss — callers that want that leniency use [`Env::get_or_null`];
    /// callers that need to distinguish "bound to null" from "unbound" (the
    /// `Ident` evaluator case in §4.3, which must raise "undefined variable")
    /// use this method directly.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let frame = self.0.borrow();
        if let Some((_, v)) = frame.bindings.iter().rev().find(|(n, _)| n == name) {
            return Some(v.clone());
        }
        frame.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// The `Environment.get` primitive from §4.4: first hit or null.
    #[must_use]
    pub fn get_or_null(&self, name: &str) -> Value {
        self.lookup(name).unwrap_or(Value::Null)
    }

    /// `def(name, value)`: bind in the current frame, replacing any existing
    /// binding for `name` in this frame only (shadowing a parent frame's
    /// binding of the same name is allowed and expected).
    pub fn def(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut frame = self.0.borrow_mut();
        if let Some(slot) = frame.bindings.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            frame.bindings.push((name, value));
        }
    }

    /// `set(name, value)`: replace in the nearest frame that already binds
    /// `name`; if no frame in the chain has it, behaves as `def` in the
    /// current frame.
    pub fn set(&self, name: &str, value: Value) {
        if self.set_existing(name, value.clone()) {
            return;
        }
        self.def(name, value);
    }

    fn set_existing(&self, name: &str, value: Value) -> bool {
        {
            let mut frame = self.0.borrow_mut();
            if let Some(slot) = frame.bindings.iter_mut().find(|(n, _)| n == name) {
                slot.1 = value;
                return true;
            }
        }
        let parent = self.0.borrow().parent.clone();
        match parent {
            Some(p) => p.set_existing(name, value),
            None => false,
        }
    }

    /// A snapshot of this frame's own bindings, not its ancestors'. Backs
    /// pattern-base method inheritance (SPEC_FULL.md §C): a derived pattern
    /// copies each base's own method bindings into its own fresh scope
    /// rather than chaining environments, since a `pat` can list more than
    /// one base and an `Env` only ever has a single parent slot.
    #[must_use]
    pub fn own_bindings(&self) -> Vec<(String, Value)> {
        self.0.borrow().bindings.clone()
    }

    /// Removes `name` from the nearest frame that binds it, returning its
    /// value. Backs the `move` expression's "take ownership" semantics
    /// (SPEC_FULL.md §C): a moved identifier's binding disappears, so a later
    /// read falls through to an enclosing frame or resolves to null exactly
    /// like any other unbound lookup.
    pub fn remove(&self, name: &str) -> Option<Value> {
        {
            let mut frame = self.0.borrow_mut();
            if let Some(idx) = frame.bindings.iter().position(|(n, _)| n == name) {
                return Some(frame.bindings.remove(idx).1);
            }
        }
        let parent = self.0.borrow().parent.clone();
        parent.and_then(|p| p.remove(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_across_frames() {
        let global = Env::new(None);
        global.def("x", Value::Int(1));
        let child = Env::new(Some(global.clone()));
        child.def("x", Value::Int(2));
        assert!(matches!(child.lookup("x"), Some(Value::Int(2))));
        assert!(matches!(global.lookup("x"), Some(Value::Int(1))));
    }

    #[test]
    fn set_finds_enclosing_frame() {
        let global = Env::new(None);
        global.def("x", Value::Int(1));
        let child = Env::new(Some(global.clone()));
        child.set("x", Value::Int(9));
        assert!(matches!(global.lookup("x"), Some(Value::Int(9))));
        assert!(child.0.borrow().bindings.is_empty());
    }

    #[test]
    fn set_with_no_existing_binding_defines_locally() {
        let global = Env::new(None);
        let child = Env::new(Some(global.clone()));
        child.set("y", Value::Int(5));
        assert!(global.lookup("y").is_none());
        assert!(matches!(child.lookup("y"), Some(Value::Int(5))));
    }

    #[test]
    fn unbound_lookup_is_none_not_null() {
        let env = Env::new(None);
        assert!(env.lookup("missing").is_none());
        assert!(matches!(env.get_or_null("missing"), Value::Null));
    }

    #[test]
    fn remove_takes_ownership() {
        let env = Env::new(None);
        env.def("x", Value::Int(7));
        let taken = env.remove("x");
        assert!(matches!(taken, Some(Value::Int(7))));
        assert!(env.lookup("x").is_none());
    }
}
