//! Engine-scoped evaluation surface.
//!
//! Keeps builtin registration instance-local (no global singleton), so
//! different hosts can carry different extensions safely. Parse once,
//! evaluate many times: [`Engine::parse`] returns a reusable AST and
//! [`Engine::evaluate_parsed`] runs it against fresh bindings.

use serde_json::Value as JsonValue;

use crate::ast::Expr;
use crate::eval::{EvalError, Evaluator};
use crate::functions::{Builtin, FunctionRegistry};
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::scope::Scope;
use crate::value::Value;
use crate::Error;

pub struct Engine {
    registry: FunctionRegistry,
}

impl Engine {
    /// Engine with the full builtin library preloaded.
    pub fn new() -> Self {
        Self {
            registry: FunctionRegistry::new(),
        }
    }

    /// Register or replace a builtin, typically before first evaluation.
    pub fn register(&mut self, name: impl Into<String>, f: Builtin) -> Option<Builtin> {
        self.registry.register(name, f)
    }

    /// Read-only access to the registry.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Lex and parse a source string into a reusable AST.
    pub fn parse(&self, source: &str) -> Result<Expr, Error> {
        let tokens = tokenize(source)?;
        Ok(Parser::new(tokens).parse()?)
    }

    /// Parse and evaluate in one step against a JSON object of bindings.
    pub fn evaluate(&self, source: &str, vars: &JsonValue) -> Result<Value, Error> {
        let expr = self.parse(source)?;
        Ok(self.evaluate_parsed(&expr, vars)?)
    }

    /// Evaluate an already-parsed expression. A fresh scope is built per
    /// call; scopes never leak across evaluations.
    pub fn evaluate_parsed(&self, expr: &Expr, vars: &JsonValue) -> Result<Value, EvalError> {
        let mut evaluator = Evaluator::new(&self.registry, Scope::from_json(vars));
        evaluator.evaluate(expr)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
