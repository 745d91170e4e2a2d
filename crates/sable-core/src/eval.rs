//! Tree-walking evaluator.
//!
//! The evaluator is an [`ExprVisitor`] producing `Result<Value, EvalError>`.
//! It owns the current scope pointer and borrows the shared
//! [`FunctionRegistry`]; builtins receive the evaluator back so
//! higher-order functions and methods share one closure-invocation
//! primitive.
//!
//! Name resolution order for calls: method (when called on a receiver),
//! then filter (inside a pipe), then registry function (bare identifier).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Expr, ExprVisitor, LogicalOp, UnaryOp};
use crate::functions::{self, Builtin, FunctionRegistry};
use crate::scope::Scope;
use crate::token::Token;
use crate::value::{LambdaValue, Value};

/// Runtime evaluation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvaluationException: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Standard evaluator return type.
pub type EvalResult = Result<Value, EvalError>;

pub struct Evaluator<'a> {
    registry: &'a FunctionRegistry,
    scope: Rc<Scope>,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a FunctionRegistry, scope: Rc<Scope>) -> Self {
        Self { registry, scope }
    }

    /// Evaluate one expression against the current scope.
    pub fn evaluate(&mut self, expr: &Expr) -> EvalResult {
        expr.accept(self)
    }

    /// Invoke a closure: parameters bind positionally, extra arguments are
    /// ignored and missing ones become null. The body runs in a child of
    /// the closure's captured scope, never the caller's.
    pub fn call_lambda(&mut self, lambda: &LambdaValue, args: &[Value]) -> EvalResult {
        let mut bindings = HashMap::with_capacity(lambda.params.len());
        for (i, param) in lambda.params.iter().enumerate() {
            bindings.insert(param.clone(), args.get(i).cloned().unwrap_or(Value::Null));
        }
        let saved = Rc::clone(&self.scope);
        self.scope = Scope::child(Rc::clone(&lambda.captured), bindings);
        let result = self.evaluate(&lambda.body);
        self.scope = saved;
        result
    }

    /// Invoke any callable value: lambdas run their body, function
    /// references dispatch through the registry.
    pub fn call_value(&mut self, callee: &Value, args: &[Value], label: &str) -> EvalResult {
        match callee {
            Value::Lambda(lambda) => {
                let lambda = Rc::clone(lambda);
                self.call_lambda(&lambda, args)
            }
            Value::Function(name) => {
                let f = self.registry.get(name).ok_or_else(|| {
                    EvalError::new(format!("unknown function '{name}'"))
                })?;
                f(args, self)
            }
            other => Err(EvalError::new(format!(
                "'{label}' is not callable (found {})",
                other.type_name()
            ))),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.evaluate(arg)?);
        }
        Ok(out)
    }

    fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> EvalResult {
        let f = method_builtin(receiver, name).ok_or_else(|| {
            EvalError::new(format!(
                "unknown method '{}' on {}",
                name,
                receiver.type_name()
            ))
        })?;
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(receiver.clone());
        argv.extend_from_slice(args);
        f(&argv, self)
    }

    fn apply_filter(&mut self, name: &str, value: Value, extra: &[Value]) -> EvalResult {
        let mut argv = Vec::with_capacity(extra.len() + 1);
        argv.push(value);
        argv.extend_from_slice(extra);
        if let Some(f) = filter_builtin(name) {
            return f(&argv, self);
        }
        if let Some(f) = self.registry.get(name) {
            return f(&argv, self);
        }
        Err(EvalError::new(format!("unknown filter '{name}'")))
    }

    fn member_access(&self, object: &Value, name: &str) -> EvalResult {
        match object {
            Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            Value::Array(items) => match name {
                "length" => Ok(Value::Int(items.len() as i64)),
                "first" => Ok(items.first().cloned().unwrap_or(Value::Null)),
                "last" => Ok(items.last().cloned().unwrap_or(Value::Null)),
                "isEmpty" => Ok(Value::Bool(items.is_empty())),
                "isNotEmpty" => Ok(Value::Bool(!items.is_empty())),
                _ => Err(EvalError::new(format!(
                    "unknown property '{name}' on array"
                ))),
            },
            Value::Str(s) => match name {
                "length" => Ok(Value::Int(s.chars().count() as i64)),
                "isEmpty" => Ok(Value::Bool(s.is_empty())),
                "isNotEmpty" => Ok(Value::Bool(!s.is_empty())),
                _ => Err(EvalError::new(format!(
                    "unknown property '{name}' on string"
                ))),
            },
            Value::Null => Err(EvalError::new(format!(
                "cannot access property '{name}' of null"
            ))),
            other => Err(EvalError::new(format!(
                "cannot access property '{name}' on {}",
                other.type_name()
            ))),
        }
    }
}

impl ExprVisitor for Evaluator<'_> {
    type Output = EvalResult;

    fn visit_literal(&mut self, value: &Value, _token: &Token) -> EvalResult {
        Ok(value.clone())
    }

    fn visit_identifier(&mut self, name: &str, _token: &Token) -> EvalResult {
        if let Some(value) = self.scope.lookup(name) {
            return Ok(value);
        }
        if self.registry.contains(name) {
            return Ok(Value::Function(Rc::from(name)));
        }
        Err(EvalError::new(format!("undefined variable '{name}'")))
    }

    fn visit_unary(&mut self, op: UnaryOp, _token: &Token, operand: &Expr) -> EvalResult {
        let value = self.evaluate(operand)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value {
                Value::Int(n) => match n.checked_neg() {
                    Some(neg) => Ok(Value::Int(neg)),
                    None => Ok(Value::Float(-(n as f64))),
                },
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::new(format!(
                    "unary '-' requires a number, found {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn visit_binary(
        &mut self,
        left: &Expr,
        op: BinaryOp,
        _token: &Token,
        right: &Expr,
    ) -> EvalResult {
        let a = self.evaluate(left)?;
        let b = self.evaluate(right)?;
        match op {
            BinaryOp::Add => add_values(&a, &b),
            BinaryOp::Sub => arith_values("-", &a, &b, |x, y| x - y, i64::checked_sub),
            BinaryOp::Mul => arith_values("*", &a, &b, |x, y| x * y, i64::checked_mul),
            BinaryOp::Div => div_values(&a, &b),
            BinaryOp::Mod => mod_values(&a, &b),
            BinaryOp::Pow => pow_values(&a, &b),
            BinaryOp::Eq => Ok(Value::Bool(a == b)),
            BinaryOp::Ne => Ok(Value::Bool(a != b)),
            BinaryOp::Lt => ordering_of("<", &a, &b).map(|o| Value::Bool(o.is_lt())),
            BinaryOp::Le => ordering_of("<=", &a, &b).map(|o| Value::Bool(!o.is_gt())),
            BinaryOp::Gt => ordering_of(">", &a, &b).map(|o| Value::Bool(o.is_gt())),
            BinaryOp::Ge => ordering_of(">=", &a, &b).map(|o| Value::Bool(!o.is_lt())),
        }
    }

    fn visit_logical(
        &mut self,
        left: &Expr,
        op: LogicalOp,
        _token: &Token,
        right: &Expr,
    ) -> EvalResult {
        let a = self.evaluate(left)?;
        // The result is always a Bool, never the operand itself.
        match op {
            LogicalOp::And => {
                if !a.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let b = self.evaluate(right)?;
                Ok(Value::Bool(b.is_truthy()))
            }
            LogicalOp::Or => {
                if a.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let b = self.evaluate(right)?;
                Ok(Value::Bool(b.is_truthy()))
            }
        }
    }

    fn visit_grouping(&mut self, inner: &Expr) -> EvalResult {
        self.evaluate(inner)
    }

    fn visit_call(&mut self, callee: &Expr, args: &[Expr], _token: &Token) -> EvalResult {
        if let Expr::Member {
            object,
            optional,
            name,
            ..
        } = callee
        {
            let receiver = self.evaluate(object)?;
            if *optional && receiver.is_null() {
                return Ok(Value::Null);
            }
            let argv = self.eval_args(args)?;
            return self.call_method(&receiver, name, &argv);
        }
        if let Expr::Identifier { name, .. } = callee {
            if let Some(value) = self.scope.lookup(name) {
                let argv = self.eval_args(args)?;
                return self.call_value(&value, &argv, name);
            }
            if let Some(f) = self.registry.get(name) {
                let argv = self.eval_args(args)?;
                return f(&argv, self);
            }
            return Err(EvalError::new(format!("unknown function '{name}'")));
        }
        let callee_value = self.evaluate(callee)?;
        let argv = self.eval_args(args)?;
        self.call_value(&callee_value, &argv, "expression")
    }

    fn visit_member(
        &mut self,
        object: &Expr,
        optional: bool,
        name: &str,
        _token: &Token,
    ) -> EvalResult {
        let object = self.evaluate(object)?;
        if optional && object.is_null() {
            return Ok(Value::Null);
        }
        self.member_access(&object, name)
    }

    fn visit_index(&mut self, object: &Expr, index: &Expr, _token: &Token) -> EvalResult {
        let object = self.evaluate(object)?;
        let index = self.evaluate(index)?;
        match &object {
            Value::Array(items) => {
                let i = index.as_i64().ok_or_else(|| {
                    EvalError::new(format!(
                        "array index must be an integer, found {}",
                        index.type_name()
                    ))
                })?;
                if i < 0 || i as usize >= items.len() {
                    return Err(EvalError::new(format!(
                        "index {i} out of range (length {})",
                        items.len()
                    )));
                }
                Ok(items[i as usize].clone())
            }
            Value::Object(map) => {
                let key = match &index {
                    Value::Str(s) => s.to_string(),
                    other => other.to_display_string(),
                };
                Ok(map.get(&key).cloned().unwrap_or(Value::Null))
            }
            Value::Str(s) => {
                let i = index.as_i64().ok_or_else(|| {
                    EvalError::new(format!(
                        "string index must be an integer, found {}",
                        index.type_name()
                    ))
                })?;
                let ch = if i >= 0 {
                    s.chars().nth(i as usize)
                } else {
                    None
                };
                match ch {
                    Some(c) => Ok(Value::string(c.to_string())),
                    None => Err(EvalError::new(format!(
                        "index {i} out of range (length {})",
                        s.chars().count()
                    ))),
                }
            }
            other => Err(EvalError::new(format!(
                "cannot index into {}",
                other.type_name()
            ))),
        }
    }

    fn visit_conditional(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> EvalResult {
        let condition = self.evaluate(condition)?;
        if condition.is_truthy() {
            self.evaluate(then_branch)
        } else {
            self.evaluate(else_branch)
        }
    }

    fn visit_array(&mut self, elements: &[Expr], _token: &Token) -> EvalResult {
        let mut out = Vec::with_capacity(elements.len());
        for element in elements {
            out.push(self.evaluate(element)?);
        }
        Ok(Value::array(out))
    }

    fn visit_object(&mut self, entries: &[(Expr, Expr)], _token: &Token) -> EvalResult {
        let mut map = BTreeMap::new();
        for (key_expr, value_expr) in entries {
            let key = match self.evaluate(key_expr)? {
                Value::Str(s) => s.to_string(),
                other => other.to_display_string(),
            };
            let value = self.evaluate(value_expr)?;
            map.insert(key, value);
        }
        Ok(Value::object(map))
    }

    fn visit_interpolation(&mut self, parts: &[Expr], _token: &Token) -> EvalResult {
        let mut out = String::new();
        for part in parts {
            out.push_str(&self.evaluate(part)?.to_display_string());
        }
        Ok(Value::string(out))
    }

    fn visit_pipe(&mut self, value: &Expr, filter: &Expr, _token: &Token) -> EvalResult {
        let value = self.evaluate(value)?;
        match filter {
            Expr::Identifier { name, .. } => self.apply_filter(name, value, &[]),
            Expr::Call { callee, args, .. } => match callee.as_ref() {
                Expr::Identifier { name, .. } => {
                    let argv = self.eval_args(args)?;
                    self.apply_filter(name, value, &argv)
                }
                _ => Err(EvalError::new("pipe filter must be a name")),
            },
            _ => Err(EvalError::new("pipe filter must be a name or a call")),
        }
    }

    fn visit_lambda(&mut self, params: &[String], body: &Rc<Expr>, _token: &Token) -> EvalResult {
        Ok(Value::Lambda(Rc::new(LambdaValue {
            params: params.to_vec(),
            body: Rc::clone(body),
            captured: Rc::clone(&self.scope),
        })))
    }
}

/// `+` adds numbers, concatenates when either side is a string (null
/// coerces to the empty string), and concatenates arrays.
fn add_values(a: &Value, b: &Value) -> EvalResult {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(match x.checked_add(*y) {
            Some(sum) => Value::Int(sum),
            None => Value::Float(*x as f64 + *y as f64),
        }),
        _ if a.is_number() && b.is_number() => {
            let (x, y) = promote(a, b);
            Ok(Value::Float(x + y))
        }
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            let mut out = a.to_display_string();
            out.push_str(&b.to_display_string());
            Ok(Value::string(out))
        }
        (Value::Array(x), Value::Array(y)) => {
            let mut out = Vec::with_capacity(x.len() + y.len());
            out.extend_from_slice(x);
            out.extend_from_slice(y);
            Ok(Value::array(out))
        }
        _ => Err(EvalError::new(format!(
            "cannot add {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arith_values(
    op: &str,
    a: &Value,
    b: &Value,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> EvalResult {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(match int_op(*x, *y) {
            Some(v) => Value::Int(v),
            None => Value::Float(float_op(*x as f64, *y as f64)),
        }),
        _ if a.is_number() && b.is_number() => {
            let (x, y) = promote(a, b);
            Ok(Value::Float(float_op(x, y)))
        }
        _ => Err(EvalError::new(format!(
            "'{op}' requires numbers, found {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn div_values(a: &Value, b: &Value) -> EvalResult {
    if !a.is_number() || !b.is_number() {
        return Err(EvalError::new(format!(
            "'/' requires numbers, found {} and {}",
            a.type_name(),
            b.type_name()
        )));
    }
    let (x, y) = promote(a, b);
    if y == 0.0 {
        return Err(EvalError::new("division by zero"));
    }
    if let (Value::Int(ix), Value::Int(iy)) = (a, b) {
        if ix % iy == 0 {
            return Ok(Value::Int(ix / iy));
        }
    }
    Ok(Value::Float(x / y))
}

fn mod_values(a: &Value, b: &Value) -> EvalResult {
    if !a.is_number() || !b.is_number() {
        return Err(EvalError::new(format!(
            "'%' requires numbers, found {} and {}",
            a.type_name(),
            b.type_name()
        )));
    }
    let (x, y) = promote(a, b);
    if y == 0.0 {
        return Err(EvalError::new("modulo by zero"));
    }
    if let (Value::Int(ix), Value::Int(iy)) = (a, b) {
        return Ok(Value::Int(ix % iy));
    }
    Ok(Value::Float(x % y))
}

/// `**`: non-negative integer exponents multiply out exactly; anything
/// else goes through the host's float power.
pub(crate) fn pow_values(a: &Value, b: &Value) -> EvalResult {
    if !a.is_number() || !b.is_number() {
        return Err(EvalError::new(format!(
            "'**' requires numbers, found {} and {}",
            a.type_name(),
            b.type_name()
        )));
    }
    if let (Value::Int(base), Value::Int(exp)) = (a, b) {
        if *exp >= 0 {
            let mut acc: i64 = 1;
            let mut overflowed = false;
            for _ in 0..*exp {
                match acc.checked_mul(*base) {
                    Some(next) => acc = next,
                    None => {
                        overflowed = true;
                        break;
                    }
                }
            }
            if !overflowed {
                return Ok(Value::Int(acc));
            }
        }
    }
    let (x, y) = promote(a, b);
    Ok(Value::Float(x.powf(y)))
}

fn promote(a: &Value, b: &Value) -> (f64, f64) {
    (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0))
}

/// Strict ordering: numbers to numbers, strings to strings, instants to
/// instants; anything else is a type error.
fn ordering_of(op: &str, a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    let ordering = match (a, b) {
        _ if a.is_number() && b.is_number() => {
            let (x, y) = promote(a, b);
            x.partial_cmp(&y)
        }
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        _ => {
            return Err(EvalError::new(format!(
                "'{op}' cannot compare {} and {}",
                a.type_name(),
                b.type_name()
            )))
        }
    };
    ordering.ok_or_else(|| EvalError::new(format!("'{op}' comparison is undefined here")))
}

/// Method table keyed by (receiver kind, method name).
fn method_builtin(receiver: &Value, name: &str) -> Option<Builtin> {
    match receiver {
        Value::Str(_) => match name {
            "uppercase" => Some(functions::bi_upper as Builtin),
            "lowercase" => Some(functions::bi_lower),
            "trim" => Some(functions::bi_trim),
            "split" => Some(functions::bi_split),
            "substring" => Some(functions::bi_substring),
            "contains" => Some(functions::bi_contains),
            "startsWith" => Some(functions::bi_starts_with),
            "endsWith" => Some(functions::bi_ends_with),
            "replace" => Some(functions::bi_replace),
            "indexOf" => Some(functions::bi_index_of),
            _ => None,
        },
        Value::Array(_) => match name {
            "join" => Some(functions::bi_join as Builtin),
            "contains" => Some(functions::bi_contains),
            "indexOf" => Some(functions::bi_index_of),
            "map" => Some(functions::bi_map),
            "filter" | "where" => Some(functions::bi_filter),
            "reduce" => Some(functions::bi_reduce),
            "slice" => Some(functions::bi_slice),
            "reverse" => Some(functions::bi_reverse),
            "sort" => Some(functions::bi_sort),
            "find" => Some(functions::bi_find),
            "every" => Some(functions::bi_every),
            "some" | "any" => Some(functions::bi_some),
            _ => None,
        },
        Value::Object(_) => match name {
            "keys" => Some(functions::bi_keys as Builtin),
            "values" => Some(functions::bi_values),
            "entries" => Some(functions::bi_entries),
            "containsKey" => Some(functions::bi_contains_key),
            "containsValue" => Some(functions::bi_contains_value),
            _ => None,
        },
        _ => None,
    }
}

/// Reserved pipe filter names. Unknown names fall back to the registry
/// with the piped value prepended to the arguments.
fn filter_builtin(name: &str) -> Option<Builtin> {
    match name {
        "uppercase" => Some(functions::bi_upper as Builtin),
        "lowercase" => Some(functions::bi_lower),
        "trim" => Some(functions::bi_trim),
        "default" => Some(functions::bi_default),
        "json" => Some(functions::bi_json),
        "length" => Some(functions::bi_length),
        "first" => Some(functions::bi_first),
        "last" => Some(functions::bi_last),
        "reverse" => Some(functions::bi_reverse),
        "sort" => Some(functions::bi_sort),
        "unique" => Some(functions::bi_unique),
        "join" => Some(functions::bi_join),
        "split" => Some(functions::bi_split),
        "slice" => Some(functions::bi_slice),
        "keys" => Some(functions::bi_keys),
        "values" => Some(functions::bi_values),
        "round" => Some(functions::bi_round),
        "abs" => Some(functions::bi_abs),
        "format" => Some(functions::bi_format),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::value::Value;
    use serde_json::json;

    fn eval(source: &str) -> Value {
        crate::eval(source).expect("eval should succeed")
    }

    fn eval_with(source: &str, vars: serde_json::Value) -> Value {
        crate::eval_with_vars(source, &vars).expect("eval should succeed")
    }

    fn eval_err(source: &str) -> String {
        crate::eval(source).expect_err("eval must fail").to_string()
    }

    #[test]
    fn precedence_fixtures() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(eval("2 ** 3 ** 2"), Value::Int(512));
        assert_eq!(eval("!false"), Value::Bool(true));
        assert_eq!(eval("-2 ** 2"), Value::Int(-4));
    }

    #[test]
    fn integer_division_stays_exact_or_widens() {
        assert_eq!(eval("6 / 3"), Value::Int(2));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
    }

    #[test]
    fn division_and_modulo_by_zero_fail() {
        assert!(eval_err("1 / 0").contains("division by zero"));
        assert!(eval_err("1 % 0").contains("modulo by zero"));
        assert!(eval_err("1.5 / 0.0").contains("division by zero"));
    }

    #[test]
    fn plus_concatenates_strings_with_null_as_empty() {
        assert_eq!(eval("\"a\" + 1"), Value::from("a1"));
        assert_eq!(eval("null + \"b\""), Value::from("b"));
        assert_eq!(eval("\"n=\" + 2.5"), Value::from("n=2.5"));
    }

    #[test]
    fn plus_concatenates_arrays() {
        assert_eq!(eval("[1] + [2, 3]"), eval("[1, 2, 3]"));
    }

    #[test]
    fn plus_rejects_mixed_non_addable_types() {
        assert!(eval_err("true + 1").contains("cannot add"));
        assert!(eval_err("null + 1").contains("cannot add"));
    }

    #[test]
    fn logical_operators_return_bool_not_operand() {
        assert_eq!(eval("\"x\" and 5"), Value::Bool(true));
        assert_eq!(eval("0 or \"y\""), Value::Bool(true));
        assert_eq!(eval("1 and 0"), Value::Bool(false));
        assert_eq!(eval("0 or 0"), Value::Bool(false));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        // The right operand would fail if evaluated.
        assert_eq!(eval("false and missingFn()"), Value::Bool(false));
        assert_eq!(eval("true or missingFn()"), Value::Bool(true));
        assert!(eval_err("true and missingFn()").contains("unknown function"));
    }

    #[test]
    fn equality_is_structural_and_null_is_not_zero() {
        assert_eq!(eval("null == null"), Value::Bool(true));
        assert_eq!(eval("null == 0"), Value::Bool(false));
        assert_eq!(eval("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval("[1, {a: 2}] == [1, {a: 2}]"), Value::Bool(true));
        assert_eq!(eval("{a: 1} != {a: 2}"), Value::Bool(true));
    }

    #[test]
    fn comparison_requires_matching_families() {
        assert_eq!(eval("\"abc\" < \"abd\""), Value::Bool(true));
        assert_eq!(eval("2 <= 2"), Value::Bool(true));
        assert!(eval_err("1 < \"2\"").contains("cannot compare"));
    }

    #[test]
    fn member_access_on_objects_and_pseudo_properties() {
        let vars = json!({"user": {"name": "John"}, "items": [1, 2, 3]});
        assert_eq!(eval_with("user.name", vars.clone()), Value::from("John"));
        assert_eq!(eval_with("user.missing", vars.clone()), Value::Null);
        assert_eq!(eval_with("items.length", vars.clone()), Value::Int(3));
        assert_eq!(eval_with("items.first", vars.clone()), Value::Int(1));
        assert_eq!(eval_with("items.last", vars.clone()), Value::Int(3));
        assert_eq!(eval_with("items.isEmpty", vars.clone()), Value::Bool(false));
        assert_eq!(eval_with("\"abc\".length", vars), Value::Int(3));
    }

    #[test]
    fn optional_chaining_short_circuits_on_null() {
        assert_eq!(eval_with("user?.profile?.email", json!({"user": null})), Value::Null);
        assert_eq!(
            eval_with("user?.profile?.email", json!({"user": {"profile": null}})),
            Value::Null
        );
        assert_eq!(
            eval_with(
                "user?.profile?.email",
                json!({"user": {"profile": {"email": "x@y"}}})
            ),
            Value::from("x@y")
        );
    }

    #[test]
    fn optional_call_on_null_receiver_is_null() {
        assert_eq!(eval_with("s?.uppercase()", json!({"s": null})), Value::Null);
        assert_eq!(
            eval_with("s?.uppercase()", json!({"s": "abc"})),
            Value::from("ABC")
        );
    }

    #[test]
    fn plain_member_access_on_null_fails() {
        let err = crate::eval_with_vars("user.name", &json!({"user": null}))
            .expect_err("must fail")
            .to_string();
        assert!(err.contains("of null"));
    }

    #[test]
    fn index_semantics_per_receiver() {
        let vars = json!({"xs": [10, 20], "obj": {"k": 1}, "s": "héllo"});
        assert_eq!(eval_with("xs[1]", vars.clone()), Value::Int(20));
        assert_eq!(eval_with("obj[\"k\"]", vars.clone()), Value::Int(1));
        assert_eq!(eval_with("obj[\"nope\"]", vars.clone()), Value::Null);
        assert_eq!(eval_with("s[1]", vars.clone()), Value::from("é"));
        assert!(crate::eval_with_vars("xs[2]", &vars)
            .expect_err("must fail")
            .to_string()
            .contains("out of range"));
        assert!(crate::eval_with_vars("xs[-1]", &vars)
            .expect_err("must fail")
            .to_string()
            .contains("out of range"));
    }

    #[test]
    fn conditional_evaluates_exactly_one_branch() {
        assert_eq!(eval("true ? 1 : missingFn()"), Value::Int(1));
        assert_eq!(eval("false ? missingFn() : 2"), Value::Int(2));
    }

    #[test]
    fn lambdas_capture_their_defining_scope() {
        let vars = json!({"n": 10, "xs": [1, 2, 3]});
        assert_eq!(
            eval_with("xs.map(x => x + n)", vars),
            eval("[11, 12, 13]")
        );
    }

    #[test]
    fn lambda_missing_args_bind_null_and_extras_are_ignored() {
        // map passes (item, index); a two-param lambda sees both, a
        // one-param lambda ignores the index.
        assert_eq!(
            eval("[10, 20].map((x, i) => x + i)"),
            eval("[10, 21]")
        );
        assert_eq!(
            eval("[1].map((a, b, c) => c == null)"),
            eval("[true]")
        );
    }

    #[test]
    fn bound_lambdas_are_callable_by_name() {
        assert_eq!(eval("(f => f(3))(x => x * 2)"), Value::Int(6));
    }

    #[test]
    fn string_methods_dispatch_by_receiver_kind() {
        assert_eq!(eval("\" a \".trim()"), Value::from("a"));
        assert_eq!(eval("\"a,b\".split(\",\")"), eval("[\"a\", \"b\"]"));
        assert_eq!(eval("\"hello\".substring(1, 3)"), Value::from("el"));
        assert_eq!(eval("\"hello\".indexOf(\"ll\")"), Value::Int(2));
        assert_eq!(eval("\"hello\".replace(\"l\", \"L\")"), Value::from("heLlo"));
        assert!(eval_err("\"abc\".map(x => x)").contains("unknown method"));
    }

    #[test]
    fn array_methods_dispatch_by_receiver_kind() {
        assert_eq!(eval("[3, 1, 2].sort()"), eval("[1, 2, 3]"));
        assert_eq!(eval("[1, 2, 3].reverse()"), eval("[3, 2, 1]"));
        assert_eq!(eval("[1, 2, 3].contains(2)"), Value::Bool(true));
        assert_eq!(eval("[1, 2, 3].where(x => x > 1)"), eval("[2, 3]"));
        assert_eq!(eval("[1, 2, 3].any(x => x == 3)"), Value::Bool(true));
        assert_eq!(eval("[1, 2, 3].every(x => x > 0)"), Value::Bool(true));
        assert_eq!(eval("[1, 2, 3].reduce((a, x) => a + x, 0)"), Value::Int(6));
        assert_eq!(eval("[2, 1].sort((a, b) => b - a)"), eval("[2, 1]"));
    }

    #[test]
    fn object_methods_dispatch_by_receiver_kind() {
        assert_eq!(eval("{b: 1, a: 2}.keys()"), eval("[\"a\", \"b\"]"));
        assert_eq!(eval("{a: 1}.containsKey(\"a\")"), Value::Bool(true));
        assert_eq!(eval("{a: 1}.containsValue(2)"), Value::Bool(false));
    }

    #[test]
    fn higher_order_methods_reject_non_lambda_arguments() {
        assert!(eval_err("[1].map(2)").contains("lambda"));
        assert!(eval_err("[1].filter(\"x\")").contains("lambda"));
    }

    #[test]
    fn pipes_apply_filters_and_fall_back_to_the_registry() {
        assert_eq!(eval("\"abc\" | uppercase"), Value::from("ABC"));
        assert_eq!(eval("[3, 1] | sort | join(\"-\")"), Value::from("1-3"));
        assert_eq!(eval("null | default(5)"), Value::Int(5));
        assert_eq!(eval("[1, 2] | sum"), Value::Int(3));
        assert!(eval_err("1 | noSuchFilter").contains("unknown filter"));
    }

    #[test]
    fn interpolation_concatenates_display_strings() {
        let vars = json!({"name": "Ada", "n": 2.0, "missing": null});
        assert_eq!(eval_with("${name}", vars.clone()), Value::from("Ada"));
        assert_eq!(eval_with("${n}", vars.clone()), Value::from("2"));
        assert_eq!(eval_with("${missing}", vars), Value::from(""));
    }

    #[test]
    fn object_literal_keys_stringify_and_last_duplicate_wins() {
        assert_eq!(eval("{a: 1, \"a\": 2}.values()"), eval("[2]"));
    }

    #[test]
    fn undefined_identifier_fails_with_message() {
        assert!(eval_err("nope").contains("undefined variable 'nope'"));
    }

    #[test]
    fn error_display_matches_contract() {
        assert!(eval_err("1 / 0").starts_with("EvaluationException: "));
    }
}
