//! Runtime value representation.
//!
//! `Int` and `Float` are fully inline; `Str`, `Array` and `Object` use `Rc`
//! so cloning a value never deep-copies a container. The evaluator treats
//! every container as immutable: builtins build new values instead of
//! mutating their arguments.

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Number};

use crate::ast::Expr;
use crate::scope::Scope;

/// A lambda literal closed over its defining scope.
#[derive(Debug, Clone)]
pub struct LambdaValue {
    pub params: Vec<String>,
    pub body: Rc<Expr>,
    pub captured: Rc<Scope>,
}

/// Dynamically-typed runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<BTreeMap<String, Value>>),
    DateTime(DateTime<FixedOffset>),
    Lambda(Rc<LambdaValue>),
    /// Reference to a registered builtin, usable as a first-class value.
    Function(Rc<str>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into().as_str()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(entries))
    }

    /// Observable type name. Integers and floats are one "number" type
    /// from the language's point of view.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::DateTime(_) => "datetime",
            Value::Lambda(_) => "lambda",
            Value::Function(_) => "function",
        }
    }

    /// Truthiness: null and false are falsy, numbers are falsy at zero,
    /// strings/arrays/objects are falsy when empty, everything else is
    /// truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::DateTime(_) | Value::Lambda(_) | Value::Function(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view with Int → Float promotion. `None` for non-numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o.as_ref()),
            _ => None,
        }
    }

    /// The display stringification used by interpolation and `toString`:
    /// null is empty, numbers render shortest-round-trip, containers render
    /// in the canonical JSON style.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_f64(*f),
            Value::Str(s) => s.to_string(),
            Value::Array(_) | Value::Object(_) => {
                sable_canon::canonicalize(&serde_json::Value::from(self.clone()))
            }
            Value::DateTime(dt) => dt.to_rfc3339(),
            Value::Lambda(_) => "<lambda>".to_string(),
            Value::Function(name) => format!("<fn {name}>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

/// Shortest-round-trip float rendering; integral floats drop the point.
pub(crate) fn format_f64(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.0}", f)
    } else {
        f.to_string()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(arr) => {
                Value::Array(Rc::new(arr.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(obj) => {
                let map: BTreeMap<String, Value> =
                    obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                Value::Object(Rc::new(map))
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from(v.clone())
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(Number::from(n)),
            Value::Float(f) => Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Array(arr) => serde_json::Value::Array(
                Rc::try_unwrap(arr)
                    .unwrap_or_else(|rc| (*rc).clone())
                    .into_iter()
                    .map(serde_json::Value::from)
                    .collect(),
            ),
            Value::Object(obj) => {
                let map: Map<String, serde_json::Value> = Rc::try_unwrap(obj)
                    .unwrap_or_else(|rc| (*rc).clone())
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect();
                serde_json::Value::Object(map)
            }
            // Non-JSON shapes stringify so canonicalization stays total.
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Lambda(_) => serde_json::Value::String("<lambda>".to_string()),
            Value::Function(name) => serde_json::Value::String(format!("<fn {name}>")),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        v.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_table() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(!Value::object(BTreeMap::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::from("x").is_truthy());
    }

    #[test]
    fn numeric_equality_promotes_across_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn null_is_only_equal_to_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Int(0));
        assert_ne!(Value::Null, Value::from(""));
        assert_ne!(Value::Null, Value::Bool(false));
    }

    #[test]
    fn deep_structural_equality_for_containers() {
        let a = Value::from(json!({"k": [1, {"n": 2.0}]}));
        let b = Value::from(json!({"k": [1, {"n": 2}]}));
        assert_eq!(a, b);
    }

    #[test]
    fn display_string_renders_null_empty_and_numbers_short() {
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(Value::Float(2.0).to_display_string(), "2");
        assert_eq!(Value::Float(2.5).to_display_string(), "2.5");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
    }

    #[test]
    fn display_string_renders_containers_canonically() {
        let v = Value::from(json!({"b": 1, "a": 2}));
        assert_eq!(v.to_display_string(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn json_round_trip_preserves_shape() {
        let doc = json!({"a": [1, 2.5, "s", null, true], "b": {"c": false}});
        let back = serde_json::Value::from(Value::from(doc.clone()));
        assert_eq!(back, doc);
    }
}
