//! AST to source rendering.
//!
//! `AstPrinter` is the second consumer of the visitor contract. It emits
//! parentheses only where a child binds looser than its slot requires, so
//! printing a parsed tree and re-parsing the output is stable after one
//! round.

use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprVisitor, LogicalOp, UnaryOp};
use crate::token::Token;
use crate::value::{format_f64, Value};

// Precedence ranks, loosest first. A child whose rank is below its slot's
// minimum gets wrapped in parentheses.
const PREC_LOWEST: u8 = 0;
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_EQUALITY: u8 = 3;
const PREC_COMPARISON: u8 = 4;
const PREC_TERM: u8 = 5;
const PREC_FACTOR: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_POWER: u8 = 8;
const PREC_PIPE: u8 = 9;
const PREC_POSTFIX: u8 = 10;
const PREC_PRIMARY: u8 = 11;

fn prec(expr: &Expr) -> u8 {
    match expr {
        Expr::Conditional { .. } | Expr::Lambda { .. } => PREC_LOWEST,
        Expr::Logical {
            op: LogicalOp::Or, ..
        } => PREC_OR,
        Expr::Logical {
            op: LogicalOp::And, ..
        } => PREC_AND,
        Expr::Binary { op, .. } => match op {
            BinaryOp::Eq | BinaryOp::Ne => PREC_EQUALITY,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => PREC_COMPARISON,
            BinaryOp::Add | BinaryOp::Sub => PREC_TERM,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => PREC_FACTOR,
            BinaryOp::Pow => PREC_POWER,
        },
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Pipe { .. } => PREC_PIPE,
        Expr::Call { .. } | Expr::Member { .. } | Expr::Index { .. } => PREC_POSTFIX,
        Expr::Literal { .. }
        | Expr::Identifier { .. }
        | Expr::Grouping { .. }
        | Expr::Array { .. }
        | Expr::Object { .. }
        | Expr::Interpolation { .. } => PREC_PRIMARY,
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

#[derive(Default)]
pub struct AstPrinter;

impl AstPrinter {
    pub fn new() -> Self {
        Self
    }

    /// Render an expression as parseable source text.
    pub fn print(&mut self, expr: &Expr) -> String {
        self.child(expr, PREC_LOWEST)
    }

    fn child(&mut self, expr: &Expr, min_prec: u8) -> String {
        let rendered = expr.accept(self);
        if prec(expr) < min_prec {
            format!("({rendered})")
        } else {
            rendered
        }
    }

    fn literal_source(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_f64(*f),
            Value::Str(s) => quote_string(s),
            other => other.to_display_string(),
        }
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_identifier_like(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !matches!(name, "true" | "false" | "null" | "and" | "or" | "not")
}

impl ExprVisitor for AstPrinter {
    type Output = String;

    fn visit_literal(&mut self, value: &Value, _token: &Token) -> String {
        self.literal_source(value)
    }

    fn visit_identifier(&mut self, name: &str, _token: &Token) -> String {
        name.to_string()
    }

    fn visit_unary(&mut self, op: UnaryOp, _token: &Token, operand: &Expr) -> String {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        };
        format!("{symbol}{}", self.child(operand, PREC_UNARY))
    }

    fn visit_binary(&mut self, left: &Expr, op: BinaryOp, _token: &Token, right: &Expr) -> String {
        let (left_min, right_min) = match op {
            // Right-associative: the exponent slot re-enters unary.
            BinaryOp::Pow => (PREC_PIPE, PREC_UNARY),
            BinaryOp::Eq | BinaryOp::Ne => (PREC_EQUALITY, PREC_EQUALITY + 1),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                (PREC_COMPARISON, PREC_COMPARISON + 1)
            }
            BinaryOp::Add | BinaryOp::Sub => (PREC_TERM, PREC_TERM + 1),
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (PREC_FACTOR, PREC_FACTOR + 1),
        };
        format!(
            "{} {} {}",
            self.child(left, left_min),
            binary_symbol(op),
            self.child(right, right_min)
        )
    }

    fn visit_logical(
        &mut self,
        left: &Expr,
        op: LogicalOp,
        _token: &Token,
        right: &Expr,
    ) -> String {
        let (symbol, level) = match op {
            LogicalOp::And => ("&&", PREC_AND),
            LogicalOp::Or => ("||", PREC_OR),
        };
        format!(
            "{} {symbol} {}",
            self.child(left, level),
            self.child(right, level + 1)
        )
    }

    fn visit_grouping(&mut self, inner: &Expr) -> String {
        format!("({})", self.child(inner, PREC_LOWEST))
    }

    fn visit_call(&mut self, callee: &Expr, args: &[Expr], _token: &Token) -> String {
        let args: Vec<String> = args
            .iter()
            .map(|a| self.child(a, PREC_LOWEST))
            .collect();
        format!("{}({})", self.child(callee, PREC_POSTFIX), args.join(", "))
    }

    fn visit_member(&mut self, object: &Expr, optional: bool, name: &str, _token: &Token) -> String {
        let op = if optional { "?." } else { "." };
        format!("{}{op}{name}", self.child(object, PREC_POSTFIX))
    }

    fn visit_index(&mut self, object: &Expr, index: &Expr, _token: &Token) -> String {
        format!(
            "{}[{}]",
            self.child(object, PREC_POSTFIX),
            self.child(index, PREC_LOWEST)
        )
    }

    fn visit_conditional(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> String {
        format!(
            "{} ? {} : {}",
            self.child(condition, PREC_OR),
            self.child(then_branch, PREC_LOWEST),
            self.child(else_branch, PREC_LOWEST)
        )
    }

    fn visit_array(&mut self, elements: &[Expr], _token: &Token) -> String {
        let elements: Vec<String> = elements
            .iter()
            .map(|e| self.child(e, PREC_LOWEST))
            .collect();
        format!("[{}]", elements.join(", "))
    }

    fn visit_object(&mut self, entries: &[(Expr, Expr)], _token: &Token) -> String {
        let entries: Vec<String> = entries
            .iter()
            .map(|(key, value)| {
                let key = match key {
                    Expr::Literal {
                        value: Value::Str(s),
                        ..
                    } if is_identifier_like(s) => s.to_string(),
                    Expr::Literal {
                        value: Value::Str(s),
                        ..
                    } => quote_string(s),
                    other => self.child(other, PREC_LOWEST),
                };
                format!("{key}: {}", self.child(value, PREC_LOWEST))
            })
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    fn visit_interpolation(&mut self, parts: &[Expr], _token: &Token) -> String {
        parts
            .iter()
            .map(|p| format!("${{{}}}", self.child(p, PREC_LOWEST)))
            .collect::<Vec<_>>()
            .join("")
    }

    fn visit_pipe(&mut self, value: &Expr, filter: &Expr, _token: &Token) -> String {
        format!(
            "{} | {}",
            self.child(value, PREC_PIPE),
            self.child(filter, PREC_POSTFIX)
        )
    }

    fn visit_lambda(&mut self, params: &[String], body: &Rc<Expr>, _token: &Token) -> String {
        let head = match params {
            [single] => single.clone(),
            _ => format!("({})", params.join(", ")),
        };
        format!("{head} => {}", self.child(body, PREC_LOWEST))
    }
}
