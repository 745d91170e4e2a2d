//! Builtin function registry.
//!
//! One flat name -> fn-pointer table, append-only after construction.
//! Builtins take the evaluated argument list plus the evaluator itself so
//! higher-order functions can invoke lambda arguments through the same
//! primitive the method table uses.
//!
//! Argument handling is lenient where the contract allows it: missing
//! arguments read as null and scalar coercions fall back to zero-like
//! values. Documented invariants (division by zero, unparseable dates,
//! invalid regexes, non-lambda arguments to higher-order functions) fail
//! instead of returning silently wrong data.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use rand::Rng;
use regex::RegexBuilder;

use crate::eval::{pow_values, EvalError, EvalResult, Evaluator};
use crate::value::{LambdaValue, Value};

/// Builtin function signature used by the registry.
pub type Builtin = fn(&[Value], &mut Evaluator<'_>) -> EvalResult;

/// Canonical builtin registry.
///
/// Use [`FunctionRegistry::register`] to add host-specific builtins before
/// evaluation begins; lookup is pure and the table is never mutated by the
/// evaluator.
pub struct FunctionRegistry {
    fns: HashMap<String, Builtin>,
}

impl FunctionRegistry {
    /// Build the default registry with the full builtin library.
    pub fn new() -> Self {
        let mut fns: HashMap<String, Builtin> = HashMap::new();

        // --- strings ---
        fns.insert("length".into(), bi_length as Builtin);
        fns.insert("upper".into(), bi_upper as Builtin);
        fns.insert("lower".into(), bi_lower as Builtin);
        fns.insert("trim".into(), bi_trim as Builtin);
        fns.insert("trimStart".into(), bi_trim_start as Builtin);
        fns.insert("trimEnd".into(), bi_trim_end as Builtin);
        fns.insert("substring".into(), bi_substring as Builtin);
        fns.insert("replace".into(), bi_replace as Builtin);
        fns.insert("replaceAll".into(), bi_replace_all as Builtin);
        fns.insert("split".into(), bi_split as Builtin);
        fns.insert("join".into(), bi_join as Builtin);
        fns.insert("startsWith".into(), bi_starts_with as Builtin);
        fns.insert("endsWith".into(), bi_ends_with as Builtin);
        fns.insert("contains".into(), bi_contains as Builtin);
        fns.insert("indexOf".into(), bi_index_of as Builtin);
        fns.insert("padStart".into(), bi_pad_start as Builtin);
        fns.insert("padEnd".into(), bi_pad_end as Builtin);

        // --- math ---
        fns.insert("abs".into(), bi_abs as Builtin);
        fns.insert("ceil".into(), bi_ceil as Builtin);
        fns.insert("floor".into(), bi_floor as Builtin);
        fns.insert("round".into(), bi_round as Builtin);
        fns.insert("min".into(), bi_min as Builtin);
        fns.insert("max".into(), bi_max as Builtin);
        fns.insert("sum".into(), bi_sum as Builtin);
        fns.insert("avg".into(), bi_avg as Builtin);
        fns.insert("pow".into(), bi_pow as Builtin);
        fns.insert("sqrt".into(), bi_sqrt as Builtin);
        fns.insert("log".into(), bi_log as Builtin);
        fns.insert("sin".into(), bi_sin as Builtin);
        fns.insert("cos".into(), bi_cos as Builtin);
        fns.insert("tan".into(), bi_tan as Builtin);
        fns.insert("random".into(), bi_random as Builtin);
        fns.insert("clamp".into(), bi_clamp as Builtin);

        // --- arrays ---
        fns.insert("first".into(), bi_first as Builtin);
        fns.insert("last".into(), bi_last as Builtin);
        fns.insert("at".into(), bi_at as Builtin);
        fns.insert("slice".into(), bi_slice as Builtin);
        fns.insert("reverse".into(), bi_reverse as Builtin);
        fns.insert("sort".into(), bi_sort as Builtin);
        fns.insert("unique".into(), bi_unique as Builtin);
        fns.insert("flatten".into(), bi_flatten as Builtin);
        fns.insert("map".into(), bi_map as Builtin);
        fns.insert("filter".into(), bi_filter as Builtin);
        fns.insert("reduce".into(), bi_reduce as Builtin);
        fns.insert("find".into(), bi_find as Builtin);
        fns.insert("findIndex".into(), bi_find_index as Builtin);
        fns.insert("every".into(), bi_every as Builtin);
        fns.insert("some".into(), bi_some as Builtin);
        fns.insert("count".into(), bi_count as Builtin);
        fns.insert("groupBy".into(), bi_group_by as Builtin);
        fns.insert("sortBy".into(), bi_sort_by as Builtin);
        fns.insert("pluck".into(), bi_pluck as Builtin);
        fns.insert("zip".into(), bi_zip as Builtin);
        fns.insert("range".into(), bi_range as Builtin);

        // --- objects ---
        fns.insert("keys".into(), bi_keys as Builtin);
        fns.insert("values".into(), bi_values as Builtin);
        fns.insert("entries".into(), bi_entries as Builtin);
        fns.insert("fromEntries".into(), bi_from_entries as Builtin);
        fns.insert("merge".into(), bi_merge as Builtin);
        fns.insert("pick".into(), bi_pick as Builtin);
        fns.insert("omit".into(), bi_omit as Builtin);
        fns.insert("get".into(), bi_get as Builtin);
        fns.insert("has".into(), bi_has as Builtin);

        // --- types ---
        fns.insert("type".into(), bi_type as Builtin);
        fns.insert("isNull".into(), bi_is_null as Builtin);
        fns.insert("isNumber".into(), bi_is_number as Builtin);
        fns.insert("isString".into(), bi_is_string as Builtin);
        fns.insert("isBool".into(), bi_is_bool as Builtin);
        fns.insert("isArray".into(), bi_is_array as Builtin);
        fns.insert("isObject".into(), bi_is_object as Builtin);
        fns.insert("toNumber".into(), bi_to_number as Builtin);
        fns.insert("toString".into(), bi_to_string as Builtin);
        fns.insert("toBool".into(), bi_to_bool as Builtin);
        fns.insert("toArray".into(), bi_to_array as Builtin);

        // --- dates ---
        fns.insert("now".into(), bi_now as Builtin);
        fns.insert("today".into(), bi_today as Builtin);
        fns.insert("parseDate".into(), bi_parse_date as Builtin);
        fns.insert("formatDate".into(), bi_format_date as Builtin);
        fns.insert("addDays".into(), bi_add_days as Builtin);
        fns.insert("addMonths".into(), bi_add_months as Builtin);
        fns.insert("addYears".into(), bi_add_years as Builtin);
        fns.insert("diffDays".into(), bi_diff_days as Builtin);
        fns.insert("year".into(), bi_year as Builtin);
        fns.insert("month".into(), bi_month as Builtin);
        fns.insert("day".into(), bi_day as Builtin);
        fns.insert("hour".into(), bi_hour as Builtin);
        fns.insert("minute".into(), bi_minute as Builtin);
        fns.insert("second".into(), bi_second as Builtin);
        fns.insert("dayOfWeek".into(), bi_day_of_week as Builtin);

        // --- utility ---
        fns.insert("coalesce".into(), bi_coalesce as Builtin);
        fns.insert("default".into(), bi_default as Builtin);
        fns.insert("if".into(), bi_if as Builtin);
        fns.insert("switch".into(), bi_switch as Builtin);
        fns.insert("format".into(), bi_format as Builtin);
        fns.insert("json".into(), bi_json as Builtin);
        fns.insert("parseJson".into(), bi_parse_json as Builtin);

        // --- regex ---
        fns.insert("matches".into(), bi_matches as Builtin);
        fns.insert("regexFind".into(), bi_regex_find as Builtin);
        fns.insert("regexFindAll".into(), bi_regex_find_all as Builtin);
        fns.insert("regexReplace".into(), bi_regex_replace as Builtin);

        Self { fns }
    }

    /// Lookup a builtin by exact, case-sensitive name.
    pub fn get(&self, name: &str) -> Option<Builtin> {
        self.fns.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    /// Register or replace a builtin. Returns the previous handler.
    pub fn register(&mut self, name: impl Into<String>, f: Builtin) -> Option<Builtin> {
        self.fns.insert(name.into(), f)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// === argument helpers ===

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn text_of(v: &Value) -> String {
    v.to_display_string()
}

fn text_arg(args: &[Value], i: usize) -> String {
    text_of(&arg(args, i))
}

fn coerce_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Str(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn coerce_i64(v: &Value) -> i64 {
    match v {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => i64::from(*b),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .unwrap_or_else(|_| s.trim().parse::<f64>().unwrap_or(0.0) as i64),
        _ => 0,
    }
}

fn f64_arg(args: &[Value], i: usize) -> f64 {
    coerce_f64(&arg(args, i))
}

fn i64_arg(args: &[Value], i: usize) -> i64 {
    coerce_i64(&arg(args, i))
}

fn float_to_int_value(f: f64) -> Value {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn array_arg(args: &[Value], i: usize, who: &str) -> Result<Rc<Vec<Value>>, EvalError> {
    match args.get(i) {
        Some(Value::Array(a)) => Ok(Rc::clone(a)),
        Some(other) => Err(EvalError::new(format!(
            "{who} expects an array, found {}",
            other.type_name()
        ))),
        None => Err(EvalError::new(format!("{who} expects an array"))),
    }
}

fn object_arg(
    args: &[Value],
    i: usize,
    who: &str,
) -> Result<Rc<BTreeMap<String, Value>>, EvalError> {
    match args.get(i) {
        Some(Value::Object(o)) => Ok(Rc::clone(o)),
        Some(other) => Err(EvalError::new(format!(
            "{who} expects an object, found {}",
            other.type_name()
        ))),
        None => Err(EvalError::new(format!("{who} expects an object"))),
    }
}

fn lambda_arg(args: &[Value], i: usize, who: &str) -> Result<Rc<LambdaValue>, EvalError> {
    match args.get(i) {
        Some(Value::Lambda(l)) => Ok(Rc::clone(l)),
        Some(other) => Err(EvalError::new(format!(
            "{who} expects a lambda argument, found {}",
            other.type_name()
        ))),
        None => Err(EvalError::new(format!("{who} expects a lambda argument"))),
    }
}

/// Loose comparison used by default sorts: numbers numerically, everything
/// else by display string.
pub(crate) fn compare_loose(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_display_string().cmp(&b.to_display_string()),
    }
}

// === strings ===

pub(crate) fn bi_length(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        Some(Value::Array(a)) => Ok(Value::Int(a.len() as i64)),
        Some(Value::Object(o)) => Ok(Value::Int(o.len() as i64)),
        Some(Value::Null) | None => Ok(Value::Int(0)),
        Some(other) => Err(EvalError::new(format!(
            "length expects a string, array or object, found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn bi_upper(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(text_arg(args, 0).to_uppercase()))
}

pub(crate) fn bi_lower(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(text_arg(args, 0).to_lowercase()))
}

pub(crate) fn bi_trim(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(text_arg(args, 0).trim()))
}

pub(crate) fn bi_trim_start(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(text_arg(args, 0).trim_start()))
}

pub(crate) fn bi_trim_end(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(text_arg(args, 0).trim_end()))
}

pub(crate) fn bi_substring(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len() as i64;
    let start = i64_arg(args, 1).clamp(0, len);
    let end = if args.len() > 2 {
        i64_arg(args, 2).clamp(0, len)
    } else {
        len
    };
    if start >= end {
        return Ok(Value::string(""));
    }
    Ok(Value::string(
        chars[start as usize..end as usize].iter().collect::<String>(),
    ))
}

pub(crate) fn bi_replace(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let from = text_arg(args, 1);
    let to = text_arg(args, 2);
    if from.is_empty() {
        return Ok(Value::string(text));
    }
    Ok(Value::string(text.replacen(&from, &to, 1)))
}

pub(crate) fn bi_replace_all(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let from = text_arg(args, 1);
    let to = text_arg(args, 2);
    if from.is_empty() {
        return Ok(Value::string(text));
    }
    Ok(Value::string(text.replace(&from, &to)))
}

pub(crate) fn bi_split(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    match args.get(1) {
        None | Some(Value::Null) => Ok(Value::array(vec![Value::string(text)])),
        Some(sep) => {
            let sep = text_of(sep);
            if sep.is_empty() {
                return Ok(Value::array(
                    text.chars().map(|c| Value::string(c.to_string())).collect(),
                ));
            }
            Ok(Value::array(
                text.split(&sep).map(Value::string).collect(),
            ))
        }
    }
}

pub(crate) fn bi_join(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "join")?;
    let sep = match args.get(1) {
        None | Some(Value::Null) => ",".to_string(),
        Some(v) => text_of(v),
    };
    let joined = items
        .iter()
        .map(text_of)
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(Value::string(joined))
}

pub(crate) fn bi_starts_with(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(
        text_arg(args, 0).starts_with(&text_arg(args, 1)),
    ))
}

pub(crate) fn bi_ends_with(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(text_arg(args, 0).ends_with(&text_arg(args, 1))))
}

pub(crate) fn bi_contains(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let needle = arg(args, 1);
    let found = match args.first() {
        Some(Value::Str(s)) => s.contains(&text_of(&needle)),
        Some(Value::Array(items)) => items.iter().any(|v| *v == needle),
        _ => false,
    };
    Ok(Value::Bool(found))
}

pub(crate) fn bi_index_of(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let needle = arg(args, 1);
    match args.first() {
        Some(Value::Str(s)) => {
            let pat = text_of(&needle);
            match s.find(&pat) {
                Some(byte_idx) => Ok(Value::Int(s[..byte_idx].chars().count() as i64)),
                None => Ok(Value::Int(-1)),
            }
        }
        Some(Value::Array(items)) => Ok(Value::Int(
            items
                .iter()
                .position(|v| *v == needle)
                .map(|i| i as i64)
                .unwrap_or(-1),
        )),
        _ => Ok(Value::Int(-1)),
    }
}

pub(crate) fn bi_pad_start(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(pad(args, true)))
}

pub(crate) fn bi_pad_end(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(pad(args, false)))
}

fn pad(args: &[Value], at_start: bool) -> String {
    let text = text_arg(args, 0);
    let width = i64_arg(args, 1).max(0) as usize;
    let pad = match args.get(2) {
        None | Some(Value::Null) => " ".to_string(),
        Some(v) => text_of(v),
    };
    let len = text.chars().count();
    if pad.is_empty() || len >= width {
        return text;
    }
    let mut fill = String::new();
    while fill.chars().count() < width - len {
        fill.push_str(&pad);
    }
    let fill: String = fill.chars().take(width - len).collect();
    if at_start {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }
}

// === math ===

pub(crate) fn bi_abs(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(Value::Int(n)) => Ok(n
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Float((*n as f64).abs()))),
        other => Ok(Value::Float(
            other.map(coerce_f64).unwrap_or(0.0).abs(),
        )),
    }
}

pub(crate) fn bi_ceil(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(float_to_int_value(f64_arg(args, 0).ceil()))
}

pub(crate) fn bi_floor(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(float_to_int_value(f64_arg(args, 0).floor()))
}

pub(crate) fn bi_round(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(float_to_int_value(f64_arg(args, 0).round()))
}

/// Variadic or single-array argument lists share one spreading rule.
fn spread_numeric_args(args: &[Value]) -> Vec<Value> {
    if args.len() == 1 {
        if let Some(Value::Array(items)) = args.first() {
            return items.as_ref().clone();
        }
    }
    args.to_vec()
}

pub(crate) fn bi_min(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let candidates = spread_numeric_args(args);
    Ok(candidates
        .iter()
        .filter(|v| !v.is_null())
        .min_by(|a, b| compare_loose(*a, *b))
        .cloned()
        .unwrap_or(Value::Null))
}

pub(crate) fn bi_max(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let candidates = spread_numeric_args(args);
    Ok(candidates
        .iter()
        .filter(|v| !v.is_null())
        .max_by(|a, b| compare_loose(*a, *b))
        .cloned()
        .unwrap_or(Value::Null))
}

pub(crate) fn bi_sum(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let candidates = spread_numeric_args(args);
    let all_int = candidates.iter().all(|v| matches!(v, Value::Int(_)));
    if all_int {
        let mut total: i64 = 0;
        for v in &candidates {
            match total.checked_add(coerce_i64(v)) {
                Some(next) => total = next,
                None => {
                    return Ok(Value::Float(
                        candidates.iter().map(coerce_f64).sum::<f64>(),
                    ))
                }
            }
        }
        return Ok(Value::Int(total));
    }
    Ok(Value::Float(candidates.iter().map(coerce_f64).sum()))
}

pub(crate) fn bi_avg(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let candidates = spread_numeric_args(args);
    if candidates.is_empty() {
        return Ok(Value::Null);
    }
    let total: f64 = candidates.iter().map(coerce_f64).sum();
    Ok(Value::Float(total / candidates.len() as f64))
}

pub(crate) fn bi_pow(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let a = numeric_value(&arg(args, 0));
    let b = numeric_value(&arg(args, 1));
    pow_values(&a, &b)
}

fn numeric_value(v: &Value) -> Value {
    match v {
        Value::Int(_) | Value::Float(_) => v.clone(),
        other => {
            let f = coerce_f64(other);
            if f.fract() == 0.0 {
                Value::Int(f as i64)
            } else {
                Value::Float(f)
            }
        }
    }
}

pub(crate) fn bi_sqrt(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let x = f64_arg(args, 0);
    if x < 0.0 {
        return Err(EvalError::new("sqrt of negative number"));
    }
    Ok(Value::Float(x.sqrt()))
}

pub(crate) fn bi_log(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let x = f64_arg(args, 0);
    if x <= 0.0 {
        return Err(EvalError::new("log of non-positive number"));
    }
    Ok(Value::Float(x.ln()))
}

pub(crate) fn bi_sin(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Float(f64_arg(args, 0).sin()))
}

pub(crate) fn bi_cos(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Float(f64_arg(args, 0).cos()))
}

pub(crate) fn bi_tan(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Float(f64_arg(args, 0).tan()))
}

pub(crate) fn bi_random(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let mut rng = rand::thread_rng();
    match args.len() {
        0 => Ok(Value::Float(rng.gen::<f64>())),
        1 => {
            let max = i64_arg(args, 0);
            if max <= 0 {
                return Ok(Value::Int(0));
            }
            Ok(Value::Int(rng.gen_range(0..max)))
        }
        _ => {
            let min = i64_arg(args, 0);
            let max = i64_arg(args, 1);
            if min >= max {
                return Ok(Value::Int(min));
            }
            Ok(Value::Int(rng.gen_range(min..max)))
        }
    }
}

pub(crate) fn bi_clamp(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let x = f64_arg(args, 0);
    let lo = f64_arg(args, 1);
    let hi = f64_arg(args, 2);
    let clamped = if lo <= hi { x.clamp(lo, hi) } else { x };
    let all_int = args
        .iter()
        .take(3)
        .all(|v| matches!(v, Value::Int(_)));
    if all_int {
        Ok(Value::Int(clamped as i64))
    } else {
        Ok(Value::Float(clamped))
    }
}

// === arrays ===

pub(crate) fn bi_first(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(Value::Array(items)) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

pub(crate) fn bi_last(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(Value::Array(items)) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

pub(crate) fn bi_at(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "at")?;
    let mut index = i64_arg(args, 1);
    if index < 0 {
        index += items.len() as i64;
    }
    if index < 0 || index as usize >= items.len() {
        return Ok(Value::Null);
    }
    Ok(items[index as usize].clone())
}

fn resolve_slice_bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (i + len).max(0)
        } else {
            i.min(len)
        }
    };
    let start = norm(start);
    let end = norm(end.unwrap_or(len));
    if start >= end {
        (0, 0)
    } else {
        (start as usize, end as usize)
    }
}

pub(crate) fn bi_slice(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let start = i64_arg(args, 1);
    let end = args.get(2).filter(|v| !v.is_null()).map(coerce_i64);
    match args.first() {
        Some(Value::Array(items)) => {
            let (a, b) = resolve_slice_bounds(items.len(), start, end);
            Ok(Value::array(items[a..b].to_vec()))
        }
        Some(Value::Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = resolve_slice_bounds(chars.len(), start, end);
            Ok(Value::string(chars[a..b].iter().collect::<String>()))
        }
        Some(other) => Err(EvalError::new(format!(
            "slice expects an array or string, found {}",
            other.type_name()
        ))),
        None => Err(EvalError::new("slice expects an array or string")),
    }
}

pub(crate) fn bi_reverse(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(Value::Array(items)) => {
            let mut out = items.as_ref().clone();
            out.reverse();
            Ok(Value::array(out))
        }
        Some(Value::Str(s)) => Ok(Value::string(s.chars().rev().collect::<String>())),
        Some(other) => Err(EvalError::new(format!(
            "reverse expects an array or string, found {}",
            other.type_name()
        ))),
        None => Err(EvalError::new("reverse expects an array or string")),
    }
}

pub(crate) fn bi_sort(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "sort")?;
    let mut out = items.as_ref().clone();
    match args.get(1) {
        None | Some(Value::Null) => {
            out.sort_by(compare_loose);
            Ok(Value::array(out))
        }
        Some(Value::Lambda(f)) => {
            let f = Rc::clone(f);
            let mut err: Option<EvalError> = None;
            out.sort_by(|a, b| {
                if err.is_some() {
                    return Ordering::Equal;
                }
                match ev.call_lambda(&f, &[a.clone(), b.clone()]) {
                    Ok(v) => {
                        let n = coerce_f64(&v);
                        if n < 0.0 {
                            Ordering::Less
                        } else if n > 0.0 {
                            Ordering::Greater
                        } else {
                            Ordering::Equal
                        }
                    }
                    Err(e) => {
                        err = Some(e);
                        Ordering::Equal
                    }
                }
            });
            match err {
                Some(e) => Err(e),
                None => Ok(Value::array(out)),
            }
        }
        Some(other) => Err(EvalError::new(format!(
            "sort expects a lambda comparator, found {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn bi_unique(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "unique")?;
    let mut out: Vec<Value> = Vec::new();
    for item in items.iter() {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.clone());
        }
    }
    Ok(Value::array(out))
}

pub(crate) fn bi_flatten(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "flatten")?;
    let depth = match args.get(1) {
        None | Some(Value::Null) => 1,
        Some(v) => coerce_i64(v),
    };
    fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: i64) {
        for item in items {
            match item {
                Value::Array(inner) if depth > 0 => flatten_into(out, inner, depth - 1),
                other => out.push(other.clone()),
            }
        }
    }
    let mut out = Vec::new();
    flatten_into(&mut out, &items, depth);
    Ok(Value::array(out))
}

pub(crate) fn bi_map(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "map")?;
    let f = lambda_arg(args, 1, "map")?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        out.push(ev.call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?);
    }
    Ok(Value::array(out))
}

pub(crate) fn bi_filter(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "filter")?;
    let f = lambda_arg(args, 1, "filter")?;
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if ev
            .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
            .is_truthy()
        {
            out.push(item.clone());
        }
    }
    Ok(Value::array(out))
}

pub(crate) fn bi_reduce(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "reduce")?;
    let f = lambda_arg(args, 1, "reduce")?;
    let mut iter = items.iter().enumerate();
    let mut acc = match args.get(2) {
        Some(init) => init.clone(),
        None => match iter.next() {
            Some((_, first)) => first.clone(),
            None => return Ok(Value::Null),
        },
    };
    for (i, item) in iter {
        acc = ev.call_lambda(&f, &[acc, item.clone(), Value::Int(i as i64)])?;
    }
    Ok(acc)
}

pub(crate) fn bi_find(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "find")?;
    let f = lambda_arg(args, 1, "find")?;
    for (i, item) in items.iter().enumerate() {
        if ev
            .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
            .is_truthy()
        {
            return Ok(item.clone());
        }
    }
    Ok(Value::Null)
}

pub(crate) fn bi_find_index(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "findIndex")?;
    let f = lambda_arg(args, 1, "findIndex")?;
    for (i, item) in items.iter().enumerate() {
        if ev
            .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
            .is_truthy()
        {
            return Ok(Value::Int(i as i64));
        }
    }
    Ok(Value::Int(-1))
}

pub(crate) fn bi_every(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "every")?;
    let f = lambda_arg(args, 1, "every")?;
    for (i, item) in items.iter().enumerate() {
        if !ev
            .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
            .is_truthy()
        {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub(crate) fn bi_some(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "some")?;
    let f = lambda_arg(args, 1, "some")?;
    for (i, item) in items.iter().enumerate() {
        if ev
            .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
            .is_truthy()
        {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

pub(crate) fn bi_count(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "count")?;
    match args.get(1) {
        None | Some(Value::Null) => Ok(Value::Int(items.len() as i64)),
        _ => {
            let f = lambda_arg(args, 1, "count")?;
            let mut n = 0i64;
            for (i, item) in items.iter().enumerate() {
                if ev
                    .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
                    .is_truthy()
                {
                    n += 1;
                }
            }
            Ok(Value::Int(n))
        }
    }
}

pub(crate) fn bi_group_by(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "groupBy")?;
    let f = lambda_arg(args, 1, "groupBy")?;
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (i, item) in items.iter().enumerate() {
        let key = ev
            .call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?
            .to_display_string();
        groups.entry(key).or_default().push(item.clone());
    }
    let out: BTreeMap<String, Value> = groups
        .into_iter()
        .map(|(k, v)| (k, Value::array(v)))
        .collect();
    Ok(Value::object(out))
}

pub(crate) fn bi_sort_by(args: &[Value], ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "sortBy")?;
    let f = lambda_arg(args, 1, "sortBy")?;
    let mut keyed = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let key = ev.call_lambda(&f, &[item.clone(), Value::Int(i as i64)])?;
        keyed.push((key, item.clone()));
    }
    keyed.sort_by(|(ka, _), (kb, _)| compare_loose(ka, kb));
    Ok(Value::array(keyed.into_iter().map(|(_, v)| v).collect()))
}

pub(crate) fn bi_pluck(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let items = array_arg(args, 0, "pluck")?;
    let key = text_arg(args, 1);
    let out = items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.get(&key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        })
        .collect();
    Ok(Value::array(out))
}

pub(crate) fn bi_zip(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let a = array_arg(args, 0, "zip")?;
    let b = array_arg(args, 1, "zip")?;
    let out = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| Value::array(vec![x.clone(), y.clone()]))
        .collect();
    Ok(Value::array(out))
}

pub(crate) fn bi_range(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let (start, end, step) = match args.len() {
        0 => (0, 0, 1),
        1 => (0, i64_arg(args, 0), 1),
        2 => (i64_arg(args, 0), i64_arg(args, 1), 1),
        _ => (i64_arg(args, 0), i64_arg(args, 1), i64_arg(args, 2)),
    };
    if step == 0 {
        return Err(EvalError::new("range step must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(Value::Int(i));
        i += step;
    }
    Ok(Value::array(out))
}

// === objects ===

pub(crate) fn bi_keys(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "keys")?;
    Ok(Value::array(
        map.keys().map(|k| Value::string(k.clone())).collect(),
    ))
}

pub(crate) fn bi_values(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "values")?;
    Ok(Value::array(map.values().cloned().collect()))
}

pub(crate) fn bi_entries(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "entries")?;
    Ok(Value::array(
        map.iter()
            .map(|(k, v)| Value::array(vec![Value::string(k.clone()), v.clone()]))
            .collect(),
    ))
}

pub(crate) fn bi_from_entries(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let entries = array_arg(args, 0, "fromEntries")?;
    let mut map = BTreeMap::new();
    for entry in entries.iter() {
        if let Value::Array(pair) = entry {
            if let Some(key) = pair.first() {
                let key = match key {
                    Value::Str(s) => s.to_string(),
                    other => other.to_display_string(),
                };
                map.insert(key, pair.get(1).cloned().unwrap_or(Value::Null));
            }
        }
    }
    Ok(Value::object(map))
}

pub(crate) fn bi_merge(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let mut out = BTreeMap::new();
    for v in args {
        if let Value::Object(map) = v {
            for (k, v) in map.iter() {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(Value::object(out))
}

pub(crate) fn bi_pick(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "pick")?;
    let keys = array_arg(args, 1, "pick")?;
    let mut out = BTreeMap::new();
    for key in keys.iter() {
        let key = text_of(key);
        if let Some(v) = map.get(&key) {
            out.insert(key, v.clone());
        }
    }
    Ok(Value::object(out))
}

pub(crate) fn bi_omit(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "omit")?;
    let keys = array_arg(args, 1, "omit")?;
    let dropped: Vec<String> = keys.iter().map(text_of).collect();
    let mut out = BTreeMap::new();
    for (k, v) in map.iter() {
        if !dropped.iter().any(|d| d == k) {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(Value::object(out))
}

/// Dotted-path segments: `a.b[2].c` walks object keys and array indices.
fn path_segments(path: &str) -> Vec<PathSegment> {
    let mut out = Vec::new();
    let mut key = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !key.is_empty() {
                    out.push(PathSegment::Key(std::mem::take(&mut key)));
                }
            }
            '[' => {
                if !key.is_empty() {
                    out.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d == ']' {
                        chars.next();
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                if let Ok(idx) = digits.trim().parse::<usize>() {
                    out.push(PathSegment::Index(idx));
                }
            }
            c => key.push(c),
        }
    }
    if !key.is_empty() {
        out.push(PathSegment::Key(key));
    }
    out
}

enum PathSegment {
    Key(String),
    Index(usize),
}

fn walk_path(value: &Value, segments: &[PathSegment]) -> Option<Value> {
    let mut current = value.clone();
    for segment in segments {
        current = match (&current, segment) {
            (Value::Object(map), PathSegment::Key(k)) => map.get(k)?.clone(),
            (Value::Array(items), PathSegment::Index(i)) => items.get(*i)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn bi_get(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let source = arg(args, 0);
    let path = text_arg(args, 1);
    let fallback = arg(args, 2);
    Ok(walk_path(&source, &path_segments(&path)).unwrap_or(fallback))
}

pub(crate) fn bi_has(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let source = arg(args, 0);
    let path = text_arg(args, 1);
    Ok(Value::Bool(
        walk_path(&source, &path_segments(&path)).is_some(),
    ))
}

pub(crate) fn bi_contains_key(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "containsKey")?;
    Ok(Value::Bool(map.contains_key(&text_arg(args, 1))))
}

pub(crate) fn bi_contains_value(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let map = object_arg(args, 0, "containsValue")?;
    let needle = arg(args, 1);
    Ok(Value::Bool(map.values().any(|v| *v == needle)))
}

// === types ===

pub(crate) fn bi_type(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(arg(args, 0).type_name()))
}

pub(crate) fn bi_is_null(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(arg(args, 0).is_null()))
}

pub(crate) fn bi_is_number(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(arg(args, 0).is_number()))
}

pub(crate) fn bi_is_string(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Str(_))))
}

pub(crate) fn bi_is_bool(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Bool(_))))
}

pub(crate) fn bi_is_array(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
}

pub(crate) fn bi_is_object(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Object(_))))
}

pub(crate) fn bi_to_number(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(v @ (Value::Int(_) | Value::Float(_))) => Ok(v.clone()),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        Some(Value::Null) | None => Ok(Value::Int(0)),
        Some(Value::Str(s)) => {
            let text = s.trim();
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            match text.parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => Ok(Value::Null),
            }
        }
        Some(_) => Ok(Value::Null),
    }
}

pub(crate) fn bi_to_string(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::string(text_arg(args, 0)))
}

pub(crate) fn bi_to_bool(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        Some(Value::Str(s)) => {
            let norm = s.trim().to_ascii_lowercase();
            Ok(Value::Bool(matches!(
                norm.as_str(),
                "1" | "true" | "yes" | "y" | "on"
            )))
        }
        Some(v) => Ok(Value::Bool(v.is_truthy())),
        None => Ok(Value::Bool(false)),
    }
}

pub(crate) fn bi_to_array(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    match args.first() {
        None | Some(Value::Null) => Ok(Value::array(vec![])),
        Some(v @ Value::Array(_)) => Ok(v.clone()),
        Some(Value::Str(s)) => Ok(Value::array(
            s.chars().map(|c| Value::string(c.to_string())).collect(),
        )),
        Some(other) => Ok(Value::array(vec![other.clone()])),
    }
}

// === dates ===

fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc().fixed_offset());
    }
    None
}

fn date_arg(args: &[Value], i: usize, who: &str) -> Result<DateTime<FixedOffset>, EvalError> {
    match args.get(i) {
        Some(Value::DateTime(dt)) => Ok(*dt),
        Some(Value::Str(s)) => parse_datetime(s)
            .ok_or_else(|| EvalError::new(format!("{who}: unrecognized date '{s}'"))),
        Some(other) => Err(EvalError::new(format!(
            "{who} expects a datetime, found {}",
            other.type_name()
        ))),
        None => Err(EvalError::new(format!("{who} expects a datetime"))),
    }
}

pub(crate) fn bi_now(_args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    Ok(Value::DateTime(Utc::now().fixed_offset()))
}

pub(crate) fn bi_today(_args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let midnight = Utc::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .fixed_offset();
    Ok(Value::DateTime(midnight))
}

pub(crate) fn bi_parse_date(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "parseDate").map(Value::DateTime)
}

/// Translate the `yyyy MM dd HH mm ss` token alphabet into a chrono
/// format string; any other character passes through literally.
fn translate_date_tokens(pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let rest: String = chars[i..].iter().collect();
        if rest.starts_with("yyyy") {
            out.push_str("%Y");
            i += 4;
        } else if rest.starts_with("MM") {
            out.push_str("%m");
            i += 2;
        } else if rest.starts_with("dd") {
            out.push_str("%d");
            i += 2;
        } else if rest.starts_with("HH") {
            out.push_str("%H");
            i += 2;
        } else if rest.starts_with("mm") {
            out.push_str("%M");
            i += 2;
        } else if rest.starts_with("ss") {
            out.push_str("%S");
            i += 2;
        } else if chars[i] == '%' {
            out.push_str("%%");
            i += 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

pub(crate) fn bi_format_date(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let dt = date_arg(args, 0, "formatDate")?;
    let pattern = match args.get(1) {
        None | Some(Value::Null) => "yyyy-MM-dd".to_string(),
        Some(v) => text_of(v),
    };
    let fmt = translate_date_tokens(&pattern);
    Ok(Value::string(dt.format(&fmt).to_string()))
}

pub(crate) fn bi_add_days(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let dt = date_arg(args, 0, "addDays")?;
    let delta = Duration::try_days(i64_arg(args, 1))
        .ok_or_else(|| EvalError::new("addDays: date out of range"))?;
    dt.checked_add_signed(delta)
        .map(Value::DateTime)
        .ok_or_else(|| EvalError::new("addDays: date out of range"))
}

pub(crate) fn bi_add_months(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let dt = date_arg(args, 0, "addMonths")?;
    let months = i64_arg(args, 1);
    shift_months(dt, months).ok_or_else(|| EvalError::new("addMonths: date out of range"))
}

pub(crate) fn bi_add_years(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let dt = date_arg(args, 0, "addYears")?;
    let years = i64_arg(args, 1);
    shift_months(dt, years.saturating_mul(12))
        .ok_or_else(|| EvalError::new("addYears: date out of range"))
}

fn shift_months(dt: DateTime<FixedOffset>, months: i64) -> Option<Value> {
    let magnitude = Months::new(months.unsigned_abs().min(u32::MAX as u64) as u32);
    let shifted = if months >= 0 {
        dt.checked_add_months(magnitude)
    } else {
        dt.checked_sub_months(magnitude)
    };
    shifted.map(Value::DateTime)
}

pub(crate) fn bi_diff_days(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let a = date_arg(args, 0, "diffDays")?;
    let b = date_arg(args, 1, "diffDays")?;
    Ok(Value::Int((a - b).num_days()))
}

pub(crate) fn bi_year(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "year").map(|dt| Value::Int(i64::from(dt.year())))
}

pub(crate) fn bi_month(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "month").map(|dt| Value::Int(i64::from(dt.month())))
}

pub(crate) fn bi_day(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "day").map(|dt| Value::Int(i64::from(dt.day())))
}

pub(crate) fn bi_hour(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "hour").map(|dt| Value::Int(i64::from(dt.hour())))
}

pub(crate) fn bi_minute(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "minute").map(|dt| Value::Int(i64::from(dt.minute())))
}

pub(crate) fn bi_second(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    date_arg(args, 0, "second").map(|dt| Value::Int(i64::from(dt.second())))
}

pub(crate) fn bi_day_of_week(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    // 0 = Sunday .. 6 = Saturday.
    date_arg(args, 0, "dayOfWeek")
        .map(|dt| Value::Int(i64::from(dt.weekday().num_days_from_sunday())))
}

// === utility ===

pub(crate) fn bi_coalesce(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    for v in args {
        if !v.is_null() {
            return Ok(v.clone());
        }
    }
    Ok(Value::Null)
}

pub(crate) fn bi_default(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let v = arg(args, 0);
    if v.is_null() {
        return Ok(arg(args, 1));
    }
    Ok(v)
}

pub(crate) fn bi_if(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    if arg(args, 0).is_truthy() {
        Ok(arg(args, 1))
    } else {
        Ok(arg(args, 2))
    }
}

pub(crate) fn bi_switch(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let subject = arg(args, 0);
    let mut i = 1;
    while i + 1 < args.len() {
        if args[i] == subject {
            return Ok(args[i + 1].clone());
        }
        i += 2;
    }
    // A trailing unpaired argument is the default.
    if i < args.len() {
        return Ok(args[i].clone());
    }
    Ok(Value::Null)
}

pub(crate) fn bi_format(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let mut out = text_arg(args, 0);
    for (i, v) in args.iter().skip(1).enumerate() {
        out = out.replace(&format!("{{{i}}}"), &text_of(v));
    }
    Ok(Value::string(out))
}

pub(crate) fn bi_json(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let json = serde_json::Value::from(arg(args, 0));
    Ok(Value::string(sable_canon::canonicalize(&json)))
}

pub(crate) fn bi_parse_json(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let parsed: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| EvalError::new(format!("parseJson: invalid JSON: {e}")))?;
    Ok(Value::from(parsed))
}

// === regex ===

fn build_regex(pattern: &str, flags: Option<&Value>) -> Result<regex::Regex, EvalError> {
    let mut builder = RegexBuilder::new(pattern);
    if let Some(flags) = flags {
        for ch in text_of(flags).chars() {
            match ch {
                'i' | 'I' => {
                    builder.case_insensitive(true);
                }
                'm' | 'M' => {
                    builder.multi_line(true);
                }
                's' | 'S' => {
                    builder.dot_matches_new_line(true);
                }
                'u' | 'U' => {
                    builder.unicode(true);
                }
                _ => {}
            }
        }
    }
    builder
        .build()
        .map_err(|e| EvalError::new(format!("invalid regex '{pattern}': {e}")))
}

pub(crate) fn bi_matches(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let re = build_regex(&text_arg(args, 1), args.get(2))?;
    Ok(Value::Bool(re.is_match(&text)))
}

pub(crate) fn bi_regex_find(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let re = build_regex(&text_arg(args, 1), args.get(2))?;
    Ok(re
        .find(&text)
        .map(|m| Value::string(m.as_str()))
        .unwrap_or(Value::Null))
}

pub(crate) fn bi_regex_find_all(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let re = build_regex(&text_arg(args, 1), args.get(2))?;
    Ok(Value::array(
        re.find_iter(&text)
            .map(|m| Value::string(m.as_str()))
            .collect(),
    ))
}

pub(crate) fn bi_regex_replace(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
    let text = text_arg(args, 0);
    let re = build_regex(&text_arg(args, 1), args.get(3))?;
    let replacement = text_arg(args, 2);
    Ok(Value::string(
        re.replace_all(&text, replacement.as_str()).into_owned(),
    ))
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
    fn string_family() {
        assert_eq!(eval("upper(\"ab\")"), Value::from("AB"));
        assert_eq!(eval("lower(\"AB\")"), Value::from("ab"));
        assert_eq!(eval("trimStart(\"  a \")"), Value::from("a "));
        assert_eq!(eval("trimEnd(\"  a \")"), Value::from("  a"));
        assert_eq!(eval("substring(\"hello\", 1, 3)"), Value::from("el"));
        assert_eq!(eval("replaceAll(\"aaa\", \"a\", \"b\")"), Value::from("bbb"));
        assert_eq!(eval("replace(\"aaa\", \"a\", \"b\")"), Value::from("baa"));
        assert_eq!(eval("padStart(\"7\", 3, \"0\")"), Value::from("007"));
        assert_eq!(eval("padEnd(\"7\", 3)"), Value::from("7  "));
        assert_eq!(eval("indexOf(\"hello\", \"lo\")"), Value::Int(3));
        assert_eq!(eval("indexOf(\"hello\", \"zz\")"), Value::Int(-1));
        assert_eq!(eval("length(\"héllo\")"), Value::Int(5));
        assert_eq!(eval("length(null)"), Value::Int(0));
    }

    #[test]
    fn math_family() {
        assert_eq!(eval("abs(-3)"), Value::Int(3));
        assert_eq!(eval("ceil(1.2)"), Value::Int(2));
        assert_eq!(eval("floor(1.8)"), Value::Int(1));
        assert_eq!(eval("round(1.5)"), Value::Int(2));
        assert_eq!(eval("min(3, 1, 2)"), Value::Int(1));
        assert_eq!(eval("max([3, 1, 2])"), Value::Int(3));
        assert_eq!(eval("sum([1, 2, 3])"), Value::Int(6));
        assert_eq!(eval("avg([1, 2, 3])"), Value::Float(2.0));
        assert_eq!(eval("pow(2, 10)"), Value::Int(1024));
        assert_eq!(eval("sqrt(9)"), Value::Float(3.0));
        assert_eq!(eval("clamp(15, 0, 10)"), Value::Int(10));
        assert!(eval_err("sqrt(-1)").contains("negative"));
        assert!(eval_err("log(0)").contains("non-positive"));
    }

    #[test]
    fn random_stays_in_range() {
        for _ in 0..20 {
            let v = eval("random(10)");
            let Value::Int(n) = v else {
                panic!("random(10) must be an integer")
            };
            assert!((0..10).contains(&n));
        }
        let v = eval("random()");
        let Value::Float(f) = v else {
            panic!("random() must be a float")
        };
        assert!((0.0..1.0).contains(&f));
    }

    #[test]
    fn array_family() {
        assert_eq!(eval("first([7, 8])"), Value::Int(7));
        assert_eq!(eval("last([7, 8])"), Value::Int(8));
        assert_eq!(eval("first([])"), Value::Null);
        assert_eq!(eval("at([1, 2, 3], -1)"), Value::Int(3));
        assert_eq!(eval("at([1, 2, 3], 9)"), Value::Null);
        assert_eq!(eval("slice([1, 2, 3, 4], 1, 3)"), eval("[2, 3]"));
        assert_eq!(eval("slice(\"hello\", -3)"), Value::from("llo"));
        assert_eq!(eval("unique([1, 2, 1, 3, 2])"), eval("[1, 2, 3]"));
        assert_eq!(eval("flatten([[1, [2]], [3]])"), eval("[1, [2], 3]"));
        assert_eq!(eval("flatten([[1, [2]]], 2)"), eval("[1, 2]"));
        assert_eq!(eval("zip([1, 2], [\"a\", \"b\"])"), eval("[[1, \"a\"], [2, \"b\"]]"));
        assert_eq!(eval("range(3)"), eval("[0, 1, 2]"));
        assert_eq!(eval("range(1, 4)"), eval("[1, 2, 3]"));
        assert_eq!(eval("range(5, 0, -2)"), eval("[5, 3, 1]"));
        assert!(eval_err("range(0, 5, 0)").contains("step"));
    }

    #[test]
    fn higher_order_array_functions() {
        assert_eq!(eval("map([1, 2], x => x * 2)"), eval("[2, 4]"));
        assert_eq!(eval("filter([1, 2, 3], x => x % 2 == 1)"), eval("[1, 3]"));
        assert_eq!(eval("reduce([1, 2, 3], (a, x) => a + x)"), Value::Int(6));
        assert_eq!(eval("reduce([], (a, x) => a + x)"), Value::Null);
        assert_eq!(eval("find([1, 2, 3], x => x > 1)"), Value::Int(2));
        assert_eq!(eval("findIndex([1, 2, 3], x => x > 1)"), Value::Int(1));
        assert_eq!(eval("findIndex([1], x => x > 9)"), Value::Int(-1));
        assert_eq!(eval("count([1, 2, 3], x => x > 1)"), Value::Int(2));
        assert_eq!(eval("count([1, 2, 3])"), Value::Int(3));
        assert_eq!(
            eval("sortBy([{n: 2}, {n: 1}], x => x.n)"),
            eval("[{n: 1}, {n: 2}]")
        );
        assert_eq!(
            eval("groupBy([1, 2, 3, 4], x => x % 2 == 0 ? \"even\" : \"odd\")"),
            eval("{even: [2, 4], odd: [1, 3]}")
        );
        assert_eq!(
            eval("pluck([{a: 1}, {a: 2}, {}], \"a\")"),
            eval("[1, 2, null]")
        );
    }

    #[test]
    fn object_family() {
        assert_eq!(eval("keys({b: 1, a: 2})"), eval("[\"a\", \"b\"]"));
        assert_eq!(eval("values({b: 1, a: 2})"), eval("[2, 1]"));
        assert_eq!(eval("entries({a: 1})"), eval("[[\"a\", 1]]"));
        assert_eq!(eval("fromEntries([[\"a\", 1], [\"b\", 2]])"), eval("{a: 1, b: 2}"));
        assert_eq!(eval("merge({a: 1, b: 1}, {b: 2})"), eval("{a: 1, b: 2}"));
        assert_eq!(eval("pick({a: 1, b: 2}, [\"a\"])"), eval("{a: 1}"));
        assert_eq!(eval("omit({a: 1, b: 2}, [\"a\"])"), eval("{b: 2}"));
        assert_eq!(
            eval_with("get(cfg, \"a.b[1].c\", -1)", json!({"cfg": {"a": {"b": [{}, {"c": 5}]}}})),
            Value::Int(5)
        );
        assert_eq!(
            eval_with("get(cfg, \"a.x\", -1)", json!({"cfg": {"a": {}}})),
            Value::Int(-1)
        );
        assert_eq!(
            eval_with("has(cfg, \"a.b\")", json!({"cfg": {"a": {"b": null}}})),
            Value::Bool(true)
        );
    }

    #[test]
    fn type_family() {
        assert_eq!(eval("type(1)"), Value::from("number"));
        assert_eq!(eval("type(\"s\")"), Value::from("string"));
        assert_eq!(eval("type(null)"), Value::from("null"));
        assert_eq!(eval("type([])"), Value::from("array"));
        assert_eq!(eval("isNull(null)"), Value::Bool(true));
        assert_eq!(eval("isNumber(2.5)"), Value::Bool(true));
        assert_eq!(eval("isString(1)"), Value::Bool(false));
        assert_eq!(eval("isBool(false)"), Value::Bool(true));
        assert_eq!(eval("isArray([])"), Value::Bool(true));
        assert_eq!(eval("isObject({})"), Value::Bool(true));
        assert_eq!(eval("toNumber(\"42\")"), Value::Int(42));
        assert_eq!(eval("toNumber(\"2.5\")"), Value::Float(2.5));
        assert_eq!(eval("toNumber(\"nope\")"), Value::Null);
        assert_eq!(eval("toString(2.5)"), Value::from("2.5"));
        assert_eq!(eval("toBool(\"yes\")"), Value::Bool(true));
        assert_eq!(eval("toBool(\"\")"), Value::Bool(false));
        assert_eq!(eval("toArray(\"ab\")"), eval("[\"a\", \"b\"]"));
        assert_eq!(eval("toArray(null)"), eval("[]"));
        assert_eq!(eval("toArray(5)"), eval("[5]"));
    }

    #[test]
    fn date_family() {
        assert_eq!(eval("year(parseDate(\"2024-03-05\"))"), Value::Int(2024));
        assert_eq!(eval("month(parseDate(\"2024-03-05\"))"), Value::Int(3));
        assert_eq!(eval("day(parseDate(\"2024-03-05\"))"), Value::Int(5));
        assert_eq!(
            eval("hour(parseDate(\"2024-03-05 14:30:09\"))"),
            Value::Int(14)
        );
        assert_eq!(
            eval("minute(parseDate(\"2024-03-05T14:30:09\"))"),
            Value::Int(30)
        );
        assert_eq!(
            eval("second(parseDate(\"2024-03-05T14:30:09Z\"))"),
            Value::Int(9)
        );
        // 2024-03-05 was a Tuesday.
        assert_eq!(eval("dayOfWeek(parseDate(\"2024-03-05\"))"), Value::Int(2));
        assert_eq!(
            eval("formatDate(addDays(parseDate(\"2024-02-28\"), 2), \"yyyy-MM-dd\")"),
            Value::from("2024-03-01")
        );
        assert_eq!(
            eval("formatDate(addMonths(parseDate(\"2024-01-31\"), 1), \"yyyy-MM-dd\")"),
            Value::from("2024-02-29")
        );
        assert_eq!(
            eval("formatDate(addYears(parseDate(\"2024-02-29\"), -1), \"yyyy-MM-dd\")"),
            Value::from("2023-02-28")
        );
        assert_eq!(
            eval("diffDays(parseDate(\"2024-03-05\"), parseDate(\"2024-03-01\"))"),
            Value::Int(4)
        );
        assert_eq!(
            eval("formatDate(parseDate(\"2024-03-05 14:30:09\"), \"dd/MM/yyyy HH:mm:ss\")"),
            Value::from("05/03/2024 14:30:09")
        );
        assert!(eval_err("parseDate(\"whenever\")").contains("unrecognized date"));
    }

    #[test]
    fn dates_compare_as_instants() {
        assert_eq!(
            eval("parseDate(\"2024-01-01\") < parseDate(\"2024-06-01\")"),
            Value::Bool(true)
        );
        assert_eq!(
            eval("parseDate(\"2024-01-01\") == parseDate(\"2024-01-01T00:00:00Z\")"),
            Value::Bool(true)
        );
    }

    #[test]
    fn utility_family() {
        assert_eq!(eval("coalesce(null, null, 3, 4)"), Value::Int(3));
        assert_eq!(eval("coalesce(null)"), Value::Null);
        assert_eq!(eval("default(null, 5)"), Value::Int(5));
        assert_eq!(eval("default(0, 5)"), Value::Int(0));
        assert_eq!(eval("if(1 > 0, \"yes\", \"no\")"), Value::from("yes"));
        assert_eq!(eval("format(\"{0}-{1}-{0}\", \"a\", \"b\")"), Value::from("a-b-a"));
    }

    #[test]
    fn switch_matches_pairs_with_optional_default() {
        let vars = json!({"kind": "b"});
        assert_eq!(
            eval_with("switch(kind, \"a\", 1, \"b\", 2, 0)", vars),
            Value::Int(2)
        );
        let vars = json!({"kind": "z"});
        assert_eq!(
            eval_with("switch(kind, \"a\", 1, \"b\", 2, 0)", vars.clone()),
            Value::Int(0)
        );
        assert_eq!(
            eval_with("switch(kind, \"a\", 1, \"b\", 2)", vars),
            Value::Null
        );
    }

    #[test]
    fn json_encoding_is_canonical() {
        assert_eq!(eval("json({b: 1, a: [2, 1]})"), Value::from(r#"{"a":[2,1],"b":1}"#));
        assert_eq!(eval("json(2.0)"), Value::from("2"));
        assert_eq!(eval("json(x => x)"), Value::from("\"<lambda>\""));
    }

    #[test]
    fn parse_json_round_trips_and_rejects_garbage() {
        assert_eq!(
            eval("parseJson(\"{\\\"a\\\": [1, 2.5, true, null]}\")"),
            eval("{a: [1, 2.5, true, null]}")
        );
        assert!(eval_err("parseJson(\"{oops\")").contains("parseJson"));
    }

    #[test]
    fn regex_family() {
        assert_eq!(eval("matches(\"abc123\", \"[0-9]+\")"), Value::Bool(true));
        assert_eq!(eval("matches(\"ABC\", \"abc\", \"i\")"), Value::Bool(true));
        assert_eq!(eval("regexFind(\"abc123x9\", \"[0-9]+\")"), Value::from("123"));
        assert_eq!(eval("regexFind(\"abc\", \"[0-9]+\")"), Value::Null);
        assert_eq!(
            eval("regexFindAll(\"a1b22c\", \"[0-9]+\")"),
            eval("[\"1\", \"22\"]")
        );
        assert_eq!(
            eval("regexReplace(\"a1b2\", \"[0-9]\", \"#\")"),
            Value::from("a#b#")
        );
        assert!(eval_err("matches(\"x\", \"[\")").contains("invalid regex"));
    }

    #[test]
    fn registry_is_extensible_before_evaluation() {
        use crate::engine::Engine;
        use crate::eval::{EvalResult, Evaluator};

        fn bi_shout(args: &[Value], _ev: &mut Evaluator<'_>) -> EvalResult {
            Ok(Value::string(format!(
                "{}!",
                args.first().map(|v| v.to_display_string()).unwrap_or_default()
            )))
        }

        let mut engine = Engine::new();
        engine.register("shout", bi_shout);
        let out = engine
            .evaluate("shout(\"hey\")", &json!({}))
            .expect("custom builtin should run");
        assert_eq!(out, Value::from("hey!"));
    }
}
