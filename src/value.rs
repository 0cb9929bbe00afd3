//! Cell value model: a tagged union over null, boolean, integer, float,
//! string, list, and struct values.
//!
//! Mirrors the JSON data model so payloads and results round-trip through
//! `serde_json` without loss. Numeric widening follows the usual rule: an
//! integer promotes to float under mixed arithmetic or comparison. Nulls are
//! first-class — no operation silently conflates null with a default.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Number;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// String-keyed fields in first-occurrence order.
    Struct(Vec<(String, Value)>),
}

/// Broad classification used by ordering-sensitive operations. Integers and
/// floats share the `Numeric` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Null,
    Boolean,
    Numeric,
    String,
    List,
    Struct,
}

/// Target types of the non-strict `cast` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastKind {
    Int,
    Float,
    Str,
    Bool,
}

impl Value {
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Struct(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number(Number::from(*i)),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn class(&self) -> ValueClass {
        match self {
            Value::Null => ValueClass::Null,
            Value::Boolean(_) => ValueClass::Boolean,
            Value::Integer(_) | Value::Float(_) => ValueClass::Numeric,
            Value::String(_) => ValueClass::String,
            Value::List(_) => ValueClass::List,
            Value::Struct(_) => ValueClass::Struct,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
        }
    }

    /// Truthiness: false for null, zero, the empty string, and empty
    /// containers; true otherwise.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Struct(fields) => !fields.is_empty(),
        }
    }

    /// Display rendering used wherever a value is stringified: nulls render
    /// empty, whole floats drop the fractional part, containers render as
    /// JSON text.
    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Struct(_) => self.to_json().to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Structural equality with numeric cross-type comparison (`1 == 1.0`)
    /// and nulls equal to nulls. Expression-level `==` layers its own null
    /// policy on top of this.
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_value(y))
            }
            (Value::Struct(a), Value::Struct(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.eq_value(vb))
            }
            (a, b) => a == b,
        }
    }

    /// Canonical hashable key used for grouping, distinct, and lookups.
    /// Consistent with [`Value::eq_value`]: whole floats collapse onto the
    /// matching integer key.
    pub fn canonical_key(&self) -> String {
        match self {
            Value::Null => "n:".to_string(),
            Value::Boolean(b) => format!("b:{b}"),
            Value::Integer(i) => format!("i:{i}"),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64
                {
                    format!("i:{}", *f as i64)
                } else {
                    format!("f:{}", f.to_bits())
                }
            }
            Value::String(s) => format!("s:{s}"),
            Value::List(_) | Value::Struct(_) => format!("j:{}", self.to_json()),
        }
    }

    /// Ordering within a single value class. Returns `None` when the two
    /// values belong to incomparable classes (callers reject those with a
    /// type-mismatch failure).
    pub fn compare_same_class(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64()?, b.as_f64()?);
                Some(x.total_cmp(&y))
            }
            _ => None,
        }
    }

    /// Non-strict coercion: unparseable inputs yield null instead of failing.
    pub fn cast_to(&self, kind: CastKind) -> Value {
        if self.is_null() {
            return Value::Null;
        }
        match kind {
            CastKind::Int => match self {
                Value::Integer(_) => self.clone(),
                Value::Float(f) => {
                    let t = f.trunc();
                    if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                        Value::Integer(t as i64)
                    } else {
                        Value::Null
                    }
                }
                Value::Boolean(b) => Value::Integer(i64::from(*b)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            CastKind::Float => match self {
                Value::Float(_) => self.clone(),
                Value::Integer(i) => Value::Float(*i as f64),
                Value::Boolean(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            CastKind::Str => Value::String(self.as_display()),
            CastKind::Bool => match self {
                Value::Boolean(_) => self.clone(),
                Value::Integer(i) => Value::Boolean(*i != 0),
                Value::Float(f) => Value::Boolean(*f != 0.0),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => Value::Boolean(true),
                    "false" | "f" | "no" | "n" | "0" => Value::Boolean(false),
                    _ => Value::Null,
                },
                _ => Value::Null,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}
