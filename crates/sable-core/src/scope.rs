//! Lexical scope chain for evaluation.
//!
//! Scopes form a persistent parent-linked chain. A lambda captures the
//! scope that was current when its literal evaluated; invoking the closure
//! pushes a child scope holding the parameter bindings. Scopes are never
//! mutated after construction, so sharing them through `Rc` is safe within
//! one evaluation.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

#[derive(Debug)]
pub struct Scope {
    bindings: HashMap<String, Value>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// An empty root scope.
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            bindings: HashMap::new(),
            parent: None,
        })
    }

    /// Root scope seeded from a JSON object's entries. Non-object values
    /// produce an empty scope.
    pub fn from_json(vars: &serde_json::Value) -> Rc<Scope> {
        let mut bindings = HashMap::new();
        if let serde_json::Value::Object(map) = vars {
            for (k, v) in map {
                bindings.insert(k.clone(), Value::from(v));
            }
        }
        Rc::new(Scope {
            bindings,
            parent: None,
        })
    }

    /// Child scope with the given bindings layered over `parent`.
    pub fn child(parent: Rc<Scope>, bindings: HashMap<String, Value>) -> Rc<Scope> {
        Rc::new(Scope {
            bindings,
            parent: Some(parent),
        })
    }

    /// Innermost-first lookup; the first definition wins.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.bindings.get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }
}
