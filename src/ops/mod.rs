//! Operation implementations, grouped the way the recipe schema groups them.
//!
//! Every operation takes the current dataframe by value and returns a fresh
//! one or a [`StepError`]; the interpreter tags failures with the step index
//! and op name. Missing required columns fail uniformly through
//! [`require_columns`].

pub mod aggregate;
pub mod rows;
pub mod shape;
pub mod strings;
pub mod structural;

use std::collections::HashMap;

use regex::Regex;

use crate::error::{OpError, StepError};
use crate::expr::{self, Expr};
use crate::frame::{DataFrame, FrameError};
use crate::value::Value;

/// Uniform missing-column failure naming both the missing and the available
/// columns.
pub(crate) fn require_columns(frame: &DataFrame, wanted: &[&str]) -> Result<(), OpError> {
    let missing: Vec<String> = wanted
        .iter()
        .filter(|name| !frame.has_column(name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(OpError::MissingColumns {
            names: missing,
            available: frame.column_names(),
        })
    }
}

pub(crate) fn compile_regex(pattern: &str) -> Result<Regex, OpError> {
    Regex::new(pattern).map_err(|err| OpError::BadArgument(format!("invalid regex: {err}")))
}

/// Frame invariant violations surface as bad arguments of the offending op.
pub(crate) fn frame_error(err: FrameError) -> StepError {
    StepError::Op(OpError::BadArgument(err.to_string()))
}

/// Per-row expression environment: every column value plus the zero-based
/// `row_index`. A column named `row_index` wins.
pub(crate) fn row_environment(frame: &DataFrame, idx: usize) -> HashMap<String, Value> {
    let mut env = HashMap::with_capacity(frame.width() + 1);
    env.insert("row_index".to_string(), Value::Integer(idx as i64));
    for (name, value) in frame.row(idx) {
        env.insert(name.to_string(), value.clone());
    }
    env
}

/// Parses an op-embedded expression, attaching the source text to failures.
pub(crate) fn parse_expression(source: &str, max_depth: usize) -> Result<Expr, StepError> {
    expr::parse_with_depth(source, max_depth).map_err(|err| StepError::expr(source, err))
}

pub(crate) fn evaluate_expression(
    parsed: &Expr,
    source: &str,
    env: &HashMap<String, Value>,
) -> Result<Value, StepError> {
    expr::evaluate(parsed, env).map_err(|err| StepError::expr(source, err))
}

/// Stringifies a cell for string-oriented ops; null stays null.
pub(crate) fn cell_to_string(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.as_display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_columns_reports_missing_and_available() {
        let frame = DataFrame::from_pairs(vec![("line".to_string(), vec![])]).unwrap();
        let err = require_columns(&frame, &["line", "no_such"]).unwrap_err();
        match err {
            OpError::MissingColumns { names, available } => {
                assert_eq!(names, vec!["no_such"]);
                assert_eq!(available, vec!["line"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn row_environment_injects_row_index() {
        let frame =
            DataFrame::from_pairs(vec![("a".to_string(), vec![Value::Integer(10)])]).unwrap();
        let env = row_environment(&frame, 0);
        assert_eq!(env["row_index"], Value::Integer(0));
        assert_eq!(env["a"], Value::Integer(10));
    }
}
