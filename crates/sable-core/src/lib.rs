//! # sable-core
//!
//! Core expression engine for **SABLE** bundle logic: a small dynamically
//! typed expression language with lambdas, higher-order collection
//! operations, pipe filters and string interpolation, evaluated by a
//! tree-walking interpreter over JSON-shaped values.
//!
//! ## Module Roles
//!
//! | Module | Responsibility | Public Entry Points |
//! |---|---|---|
//! | `lexer` | Source text -> token stream | [`tokenize`], [`Lexer`] |
//! | `parser` | Tokens -> AST | [`Parser`], [`parser::parse`] |
//! | `ast` | Expression tree + visitor contract | [`Expr`], [`ExprVisitor`] |
//! | `eval` | Tree evaluator | [`Evaluator`], [`EvalError`] |
//! | `functions` | Builtin registry | [`FunctionRegistry`] |
//! | `printer` | AST -> source rendering | [`AstPrinter`] |
//! | `engine` | Instance-scoped facade | [`Engine`] |
//! | `value` / `scope` | Runtime values and lexical scopes | [`Value`], [`Scope`] |
//!
//! ## Execution Contract
//!
//! 1. Lex and parse once.
//! 2. Evaluate many times against per-call bindings.
//! 3. Every evaluation runs to completion on the calling thread; the only
//!    shared structure is the read-only registry.
//!
//! ## Hello World
//!
//! ```no_run
//! use sable_core::eval_with_vars;
//! use serde_json::json;
//!
//! let out = eval_with_vars(
//!     "user.name == \"John\" and age >= 18",
//!     &json!({"user": {"name": "John"}, "age": 20}),
//! )
//! .expect("eval");
//! assert_eq!(out, sable_core::Value::Bool(true));
//! ```

use std::fmt;

pub mod ast;
pub mod engine;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod scope;
pub mod token;
pub mod value;

pub use ast::{BinaryOp, Expr, ExprVisitor, LogicalOp, UnaryOp};
pub use engine::Engine;
pub use eval::{EvalError, EvalResult, Evaluator};
pub use functions::{Builtin, FunctionRegistry};
pub use lexer::{tokenize, LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use printer::AstPrinter;
pub use scope::Scope;
pub use token::{Token, TokenKind};
pub use value::{LambdaValue, Value};

/// Any failure from the full lex -> parse -> evaluate pipeline.
#[derive(Debug, Clone)]
pub enum Error {
    Lex(LexError),
    Parse(ParseError),
    Eval(EvalError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex(e) => e.fmt(f),
            Error::Parse(e) => e.fmt(f),
            Error::Eval(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<LexError> for Error {
    fn from(e: LexError) -> Self {
        Error::Lex(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Self {
        Error::Eval(e)
    }
}

/// Evaluate a source string with no bindings and the default registry.
pub fn eval(source: &str) -> Result<Value, Error> {
    eval_with_vars(source, &serde_json::Value::Null)
}

/// Evaluate a source string against a JSON object of variable bindings.
pub fn eval_with_vars(source: &str, vars: &serde_json::Value) -> Result<Value, Error> {
    Engine::new().evaluate(source, vars)
}
