//! The closed builtin function table for the expression engine.
//!
//! Every function either totals over its domain or fails with a defined
//! `CallFailed` error; none of them can run unbounded work. Time helpers are
//! the only non-pure entries and always report UTC. Stringification treats
//! null as the empty string throughout.

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;

use crate::error::ExprError;
use crate::value::Value;

/// Dispatches a call by name. Unknown names fail with `FunctionNotAllowed` —
/// the table is the whole surface, there is no fallback.
pub fn call(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    match name {
        "len" => builtin_len(name, args),
        "int" => builtin_int(name, args),
        "float" => builtin_float(name, args),
        "str" => {
            arity(name, args, 1, 1)?;
            Ok(Value::String(args[0].as_display()))
        }
        "abs" => builtin_abs(name, args),
        "round" => builtin_round(name, args),
        "round_to" => {
            arity(name, args, 2, 2)?;
            let x = require_f64(name, &args[0])?;
            let n = require_i64(name, &args[1])?;
            Ok(Value::Float(round_half_even(x, n)))
        }
        "ceil" => builtin_ceil_floor(name, args, f64::ceil),
        "floor" => builtin_ceil_floor(name, args, f64::floor),
        "sqrt" => {
            arity(name, args, 1, 1)?;
            let x = require_f64(name, &args[0])?;
            if x < 0.0 {
                return Err(ExprError::call_failed(name, "math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "pow" => {
            arity(name, args, 2, 2)?;
            let x = require_f64(name, &args[0])?;
            let y = require_f64(name, &args[1])?;
            Ok(Value::Float(x.powf(y)))
        }
        "upper" => string_transform(name, args, |s| s.to_uppercase()),
        "lower" => string_transform(name, args, |s| s.to_lowercase()),
        "trim" => string_transform(name, args, |s| s.trim().to_string()),
        "substr" | "mid" => builtin_substr(name, args),
        "left" => {
            arity(name, args, 2, 2)?;
            let s = display(&args[0]);
            let n = require_i64(name, &args[1])?;
            Ok(Value::String(slice_chars(&s, 0, Some(n))))
        }
        "right" => builtin_right(name, args),
        "find" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Integer(char_find(&display(&args[1]), &display(&args[0]))))
        }
        "search" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Integer(char_find(
                &display(&args[1]).to_lowercase(),
                &display(&args[0]).to_lowercase(),
            )))
        }
        "startswith" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Boolean(
                display(&args[0]).starts_with(&display(&args[1])),
            ))
        }
        "endswith" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Boolean(display(&args[0]).ends_with(&display(&args[1]))))
        }
        "replace" => {
            arity(name, args, 3, 3)?;
            let s = display(&args[0]);
            Ok(Value::String(
                s.replace(&display(&args[1]), &display(&args[2])),
            ))
        }
        "concat_ws" => {
            arity(name, args, 1, usize::MAX)?;
            let sep = display(&args[0]);
            let parts: Vec<String> = args[1..].iter().map(display).collect();
            Ok(Value::String(parts.join(&sep)))
        }
        "regex_match" => {
            arity(name, args, 2, 2)?;
            let pattern = compile_regex(name, &require_str(name, &args[1])?)?;
            Ok(Value::Boolean(pattern.is_match(&display(&args[0]))))
        }
        "regex_extract" => builtin_regex_extract(name, args),
        "to_bool" => {
            arity(name, args, 1, 1)?;
            let lowered = display(&args[0]).trim().to_lowercase();
            Ok(Value::Boolean(matches!(
                lowered.as_str(),
                "1" | "true" | "yes" | "on"
            )))
        }
        "parse_number" => {
            arity(name, args, 1, 1)?;
            Ok(parse_number(&display(&args[0])))
        }
        "safe_int" => builtin_safe_int(name, args),
        "safe_float" => builtin_safe_float(name, args),
        "sum_nonnull" => {
            let mut total = 0.0;
            for arg in args {
                total += lenient_f64(arg);
            }
            Ok(Value::Float(total))
        }
        "ifelse" => {
            arity(name, args, 3, 3)?;
            Ok(if args[0].truthy() {
                args[1].clone()
            } else {
                args[2].clone()
            })
        }
        "coalesce_val" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
        "first_digit" => digit_helper(name, args, |s| {
            s.chars().find(char::is_ascii_digit).map(String::from)
        }),
        "last_digit" => digit_helper(name, args, |s| {
            s.chars().rev().find(char::is_ascii_digit).map(String::from)
        }),
        "leading_number" => digit_helper(name, args, |s| {
            let run: String = s.chars().take_while(char::is_ascii_digit).collect();
            (!run.is_empty()).then_some(run)
        }),
        "trailing_number" => digit_helper(name, args, |s| {
            let mut run: Vec<char> = s
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .collect();
            run.reverse();
            (!run.is_empty()).then(|| run.into_iter().collect())
        }),
        "digits" => digit_helper(name, args, |s| {
            let run: String = s.chars().filter(char::is_ascii_digit).collect();
            (!run.is_empty()).then_some(run)
        }),
        "today" => {
            arity(name, args, 0, 0)?;
            Ok(Value::String(
                Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            ))
        }
        "now" => {
            arity(name, args, 0, 0)?;
            Ok(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            ))
        }
        "date" => builtin_date(name, args),
        "to_date" => builtin_to_date(name, args),
        "year" => date_component(name, args, |d| d.year() as i64),
        "month" => date_component(name, args, |d| d.month() as i64),
        "day" => date_component(name, args, |d| d.day() as i64),
        "date_add_days" => builtin_date_add_days(name, args),
        "date_diff_days" => builtin_date_diff_days(name, args),
        _ => Err(ExprError::FunctionNotAllowed(name.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Argument plumbing
// ---------------------------------------------------------------------------

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExprError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else if max == usize::MAX {
            format!("at least {min}")
        } else {
            format!("{min}..{max}")
        };
        return Err(ExprError::call_failed(
            name,
            format!("expected {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

/// Stringification used by string helpers: null renders empty.
fn display(value: &Value) -> String {
    value.as_display()
}

fn require_str(name: &str, value: &Value) -> Result<String, ExprError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(ExprError::call_failed(
            name,
            format!("expected a string, got {}", other.type_name()),
        )),
    }
}

fn require_i64(name: &str, value: &Value) -> Result<i64, ExprError> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        Value::Boolean(b) => Ok(i64::from(*b)),
        other => Err(ExprError::call_failed(
            name,
            format!("expected an integer, got {}", other.type_name()),
        )),
    }
}

fn require_f64(name: &str, value: &Value) -> Result<f64, ExprError> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            ExprError::call_failed(name, format!("could not convert '{s}' to float"))
        }),
        other => Err(ExprError::call_failed(
            name,
            format!("expected a number, got {}", other.type_name()),
        )),
    }
}

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

fn builtin_len(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    let length = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Struct(fields) => fields.len(),
        other => {
            return Err(ExprError::call_failed(
                name,
                format!("{} has no length", other.type_name()),
            ));
        }
    };
    Ok(Value::Integer(length as i64))
}

fn builtin_int(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(f) => {
            let t = f.trunc();
            if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                Ok(Value::Integer(t as i64))
            } else {
                Err(ExprError::call_failed(name, "float out of integer range"))
            }
        }
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
            ExprError::call_failed(name, format!("invalid integer literal '{s}'"))
        }),
        other => Err(ExprError::call_failed(
            name,
            format!("cannot convert {} to int", other.type_name()),
        )),
    }
}

fn builtin_float(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    match &args[0] {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ExprError::call_failed(name, format!("invalid float literal '{s}'"))
        }),
        other => Err(ExprError::call_failed(
            name,
            format!("cannot convert {} to float", other.type_name()),
        )),
    }
}

fn builtin_abs(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    match &args[0] {
        Value::Integer(i) => i
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| ExprError::call_failed(name, "integer overflow")),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        other => Err(ExprError::call_failed(
            name,
            format!("cannot take abs of {}", other.type_name()),
        )),
    }
}

fn builtin_round(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 2)?;
    let x = require_f64(name, &args[0])?;
    if args.len() == 2 {
        let n = require_i64(name, &args[1])?;
        return Ok(Value::Float(round_half_even(x, n)));
    }
    // Bare round() is half-to-even.
    let rounded = x.round_ties_even();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
        Ok(Value::Integer(rounded as i64))
    } else {
        Err(ExprError::call_failed(name, "value out of integer range"))
    }
}

fn round_half_even(x: f64, digits: i64) -> f64 {
    let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
    (x * factor).round_ties_even() / factor
}

fn builtin_ceil_floor(
    name: &str,
    args: &[Value],
    op: fn(f64) -> f64,
) -> Result<Value, ExprError> {
    arity(name, args, 1, 2)?;
    let x = require_f64(name, &args[0])?;
    if args.len() == 2 {
        let n = require_i64(name, &args[1])?;
        let factor = 10f64.powi(n.clamp(-308, 308) as i32);
        return Ok(Value::Float(op(x * factor) / factor));
    }
    let result = op(x);
    if result.is_finite() && result >= i64::MIN as f64 && result <= i64::MAX as f64 {
        Ok(Value::Integer(result as i64))
    } else {
        Err(ExprError::call_failed(name, "value out of integer range"))
    }
}

// ---------------------------------------------------------------------------
// String helpers
// ---------------------------------------------------------------------------

fn string_transform(
    name: &str,
    args: &[Value],
    op: impl Fn(&str) -> String,
) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    Ok(Value::String(op(&display(&args[0]))))
}

/// Character slicing with negative-index resolution: a negative bound counts
/// from the end, then both bounds clamp to the string.
fn slice_chars(s: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len() as i64;
    let resolve = |i: i64| -> usize {
        let idx = if i < 0 { i + n } else { i };
        idx.clamp(0, n) as usize
    };
    let lo = resolve(start);
    let hi = end.map_or(chars.len(), resolve);
    if hi <= lo {
        return String::new();
    }
    chars[lo..hi].iter().collect()
}

fn builtin_substr(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 2, 3)?;
    let s = display(&args[0]);
    let start = require_i64(name, &args[1])?;
    let end = if args.len() == 3 {
        Some(start + require_i64(name, &args[2])?)
    } else {
        None
    };
    Ok(Value::String(slice_chars(&s, start, end)))
}

fn builtin_right(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 2, 2)?;
    let s = display(&args[0]);
    let n = require_i64(name, &args[1])?;
    if n == 0 {
        return Ok(Value::String(String::new()));
    }
    Ok(Value::String(slice_chars(&s, -n, None)))
}

/// 0-based character offset of the first occurrence, -1 when absent.
fn char_find(haystack: &str, needle: &str) -> i64 {
    match haystack.find(needle) {
        Some(byte_idx) => haystack[..byte_idx].chars().count() as i64,
        None => -1,
    }
}

fn compile_regex(name: &str, pattern: &str) -> Result<Regex, ExprError> {
    Regex::new(pattern)
        .map_err(|err| ExprError::call_failed(name, format!("invalid regex: {err}")))
}

fn builtin_regex_extract(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 2, 3)?;
    let text = display(&args[0]);
    let pattern = compile_regex(name, &require_str(name, &args[1])?)?;
    let group = if args.len() == 3 {
        require_i64(name, &args[2])?
    } else {
        0
    };
    if group < 0 || group as usize >= pattern.captures_len() {
        return Err(ExprError::call_failed(name, format!("no such group {group}")));
    }
    Ok(match pattern.captures(&text) {
        Some(captures) => captures
            .get(group as usize)
            .map_or(Value::Null, |m| Value::String(m.as_str().to_string())),
        None => Value::Null,
    })
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").expect("static pattern compiles")
    })
}

/// First signed decimal number embedded in the text, as a float; null when
/// absent.
fn parse_number(text: &str) -> Value {
    match number_pattern().find(text) {
        Some(found) => found
            .as_str()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn builtin_safe_int(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 2)?;
    let fallback = || -> i64 {
        args.get(1)
            .and_then(|d| match d {
                Value::Integer(i) => Some(*i),
                Value::Float(f) => Some(f.trunc() as i64),
                Value::Boolean(b) => Some(i64::from(*b)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            })
            .unwrap_or(0)
    };
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Integer(fallback()));
    }
    let converted = match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            match parse_number(s) {
                Value::Float(f) => Some(f.trunc() as i64),
                _ => None,
            }
        }),
        _ => None,
    };
    Ok(Value::Integer(converted.unwrap_or_else(fallback)))
}

fn builtin_safe_float(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 2)?;
    let fallback = || -> f64 {
        args.get(1)
            .and_then(|d| match d {
                Value::Integer(i) => Some(*i as f64),
                Value::Float(f) => Some(*f),
                Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .unwrap_or(0.0)
    };
    let value = &args[0];
    if value.is_null() {
        return Ok(Value::Float(fallback()));
    }
    let converted = match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().or_else(|| match parse_number(s) {
            Value::Float(f) => Some(f),
            _ => None,
        }),
        _ => None,
    };
    Ok(Value::Float(converted.unwrap_or_else(fallback)))
}

/// Null and unparseable inputs contribute zero.
fn lenient_f64(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        Value::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .or_else(|| match parse_number(s) {
                Value::Float(f) => Some(f),
                _ => None,
            })
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn digit_helper(
    name: &str,
    args: &[Value],
    extract: impl Fn(&str) -> Option<String>,
) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    Ok(extract(&display(&args[0]))
        .map(Value::String)
        .unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------------
// Date helpers (UTC, deterministic per call)
// ---------------------------------------------------------------------------

fn parse_iso_date(name: &str, value: &Value) -> Result<NaiveDate, ExprError> {
    let s = display(value);
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|_| ExprError::call_failed(name, format!("invalid date '{s}'")))
}

fn builtin_date(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 3, 3)?;
    let (y, m, d) = (
        require_i64(name, &args[0])?,
        require_i64(name, &args[1])?,
        require_i64(name, &args[2])?,
    );
    let date = NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)
        .ok_or_else(|| ExprError::call_failed(name, format!("invalid date {y}-{m}-{d}")))?;
    Ok(Value::String(date.format("%Y-%m-%d").to_string()))
}

fn builtin_to_date(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 1, 2)?;
    let s = display(&args[0]);
    let parsed = match args.get(1) {
        Some(fmt) => {
            let fmt = require_str(name, fmt)?;
            NaiveDate::parse_from_str(&s, &fmt).or_else(|_| {
                NaiveDateTime::parse_from_str(&s, &fmt).map(|dt| dt.date())
            })
        }
        None => NaiveDate::parse_from_str(&s, "%Y-%m-%d"),
    };
    parsed
        .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
        .map_err(|_| ExprError::call_failed(name, "invalid date or format"))
}

fn date_component(
    name: &str,
    args: &[Value],
    component: fn(NaiveDate) -> i64,
) -> Result<Value, ExprError> {
    arity(name, args, 1, 1)?;
    let s = display(&args[0]);
    let date = if s.contains('T') || s.contains(' ') {
        parse_iso_datetime(&s).map(|dt| dt.date())
    } else {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
    };
    date.map(|d| Value::Integer(component(d)))
        .ok_or_else(|| ExprError::call_failed(name, format!("invalid date '{s}'")))
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let normalized = s.replace('Z', "+00:00");
    for fmt in ["%Y-%m-%dT%H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%:z"] {
        if let Ok(dt) = chrono::DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.naive_utc());
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt);
        }
    }
    None
}

fn builtin_date_add_days(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 2, 2)?;
    let base = parse_iso_date(name, &args[0])?;
    let days = require_i64(name, &args[1])?;
    let shifted = base
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| ExprError::call_failed(name, "date overflow"))?;
    Ok(Value::String(shifted.format("%Y-%m-%d").to_string()))
}

fn builtin_date_diff_days(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    arity(name, args, 2, 2)?;
    let a = parse_iso_date(name, &args[0])?;
    let b = parse_iso_date(name, &args[1])?;
    Ok(Value::Integer((a - b).num_days()))
}
