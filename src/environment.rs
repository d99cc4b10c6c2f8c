use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// Shared handle to a scope. Blocks, calls and closures all hold scopes
/// through this type.
pub type Scope = Rc<RefCell<Environment>>;

/// One lexical scope: its own bindings plus a link to the enclosing scope.
///
/// Links point outward only. The global scope has no enclosing scope.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Scope>,
}

impl Environment {
    /// A fresh global scope.
    #[must_use]
    pub fn global() -> Scope {
        Rc::new(RefCell::new(Self::default()))
    }

    /// A fresh scope nested inside `enclosing`.
    #[must_use]
    pub fn child(enclosing: &Scope) -> Scope {
        Rc::new(RefCell::new(Self {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    /// Bind `name` in this scope. Returns `false` if this scope already
    /// binds it; outer bindings are shadowed, not checked.
    pub fn define(&mut self, name: &str, value: Value) -> bool {
        if self.has_local(name) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        true
    }

    /// Overwrite the nearest existing binding of `name`. Returns `false`
    /// if no scope in the chain binds it.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return true;
        }
        self.enclosing
            .as_ref()
            .is_some_and(|outer| outer.borrow_mut().assign(name, value))
    }

    /// Look `name` up through the chain, innermost first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        self.enclosing
            .as_ref()
            .and_then(|outer| outer.borrow().get(name))
    }

    #[must_use]
    pub fn has_local(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Let go of a scope whose execution has finished.
    ///
    /// A function declared in a scope captures that scope, and the scope
    /// stores the function: an `Rc` cycle. When nothing else refers to the
    /// scope (no escaped closure, no live child scope), the bindings are
    /// cleared so the cycle comes apart.
    pub fn release(scope: Scope) {
        let self_refs = scope
            .borrow()
            .values
            .values()
            .filter(|value| value.is_private_closure_of(&scope))
            .count();

        if Rc::strong_count(&scope) == 1 + self_refs {
            let values = std::mem::take(&mut scope.borrow_mut().values);
            drop(values);
        }
    }

    /// Drop every binding in this scope.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_rejects_duplicate_in_same_scope() {
        let globals = Environment::global();
        assert!(globals.borrow_mut().define("x", Value::Integer(1)));
        assert!(!globals.borrow_mut().define("x", Value::Integer(2)));
        assert_eq!(globals.borrow().get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn child_may_shadow_outer_binding() {
        let globals = Environment::global();
        globals.borrow_mut().define("x", Value::Integer(1));
        let inner = Environment::child(&globals);
        assert!(inner.borrow_mut().define("x", Value::Boolean(true)));
        assert_eq!(inner.borrow().get("x"), Some(Value::Boolean(true)));
        assert_eq!(globals.borrow().get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn assign_walks_outward() {
        let globals = Environment::global();
        globals.borrow_mut().define("x", Value::Integer(1));
        let inner = Environment::child(&globals);
        assert!(inner.borrow_mut().assign("x", Value::Integer(5)));
        assert!(!inner.borrow().has_local("x"));
        assert_eq!(globals.borrow().get("x"), Some(Value::Integer(5)));
    }

    #[test]
    fn assign_does_not_create_bindings() {
        let globals = Environment::global();
        let inner = Environment::child(&globals);
        assert!(!inner.borrow_mut().assign("missing", Value::Nil));
        assert_eq!(inner.borrow().get("missing"), None);
    }

    #[test]
    fn release_keeps_scope_referenced_elsewhere() {
        let globals = Environment::global();
        let inner = Environment::child(&globals);
        inner.borrow_mut().define("y", Value::Integer(3));
        let grandchild = Environment::child(&inner);
        Environment::release(Rc::clone(&inner));
        assert_eq!(grandchild.borrow().get("y"), Some(Value::Integer(3)));
    }
}
