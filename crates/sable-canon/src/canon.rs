//! Deterministic JSON encoding.
//!
//! The encoder never emits whitespace and always orders object keys by
//! ascending Unicode code point, so the same logical document produces the
//! same bytes regardless of how its maps were built.

use serde_json::{Number, Value};

/// Encode a JSON value into its canonical textual form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

/// Append the canonical encoding of `value` to `out`.
pub fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_quoted(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_quoted(out, key);
                out.push(':');
                write_canonical(out, &map[key.as_str()]);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        out.push_str(&canonical_f64(f));
    } else {
        out.push_str("null");
    }
}

/// Canonical float rendering: non-finite values collapse to `null`, floats
/// that are mathematically integers drop the fractional part, everything
/// else uses the shortest decimal that round-trips.
pub(crate) fn canonical_f64(f: f64) -> String {
    if !f.is_finite() {
        return "null".to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{:.0}", f);
    }
    f.to_string()
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_sort_ascending() {
        let doc = json!({"b": 1, "a": [3, 2, 1], "c": null});
        assert_eq!(canonicalize(&doc), r#"{"a":[3,2,1],"b":1,"c":null}"#);
    }

    #[test]
    fn nested_objects_sort_at_every_level() {
        let doc = json!({"z": {"b": 2, "a": 1}, "a": true});
        assert_eq!(canonicalize(&doc), r#"{"a":true,"z":{"a":1,"b":2}}"#);
    }

    #[test]
    fn arrays_preserve_insertion_order() {
        let doc = json!([3, 1, 2]);
        assert_eq!(canonicalize(&doc), "[3,1,2]");
    }

    #[test]
    fn integral_float_collapses_to_integer_form() {
        let doc = json!({"n": 2.0});
        assert_eq!(canonicalize(&doc), r#"{"n":2}"#);
    }

    #[test]
    fn fractional_float_keeps_shortest_form() {
        let doc = json!(2.5);
        assert_eq!(canonicalize(&doc), "2.5");
    }

    #[test]
    fn strings_escape_quotes_backslashes_and_controls() {
        let doc = json!("a\"b\\c\nd\u{0001}e");
        assert_eq!(canonicalize(&doc), r#""a\"b\\c\nd\u0001e""#);
    }

    #[test]
    fn booleans_and_null_are_lowercase_keywords() {
        assert_eq!(canonicalize(&json!([true, false, null])), "[true,false,null]");
    }

    #[test]
    fn no_whitespace_anywhere() {
        let doc = json!({"a": [1, {"b": "x y"}]});
        assert_eq!(canonicalize(&doc), r#"{"a":[1,{"b":"x y"}]}"#);
    }

    #[test]
    fn canonical_form_is_idempotent_through_reparse() {
        let doc = json!({"b": {"d": 4.0, "c": [1, 2.5, "s"]}, "a": null});
        let first = canonicalize(&doc);
        let reparsed: serde_json::Value =
            serde_json::from_str(&first).expect("canonical output must be valid JSON");
        assert_eq!(canonicalize(&reparsed), first);
    }

    #[test]
    fn large_u64_values_serialize_unsigned() {
        let doc = json!(u64::MAX);
        assert_eq!(canonicalize(&doc), u64::MAX.to_string());
    }
}
