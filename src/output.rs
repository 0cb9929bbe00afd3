//! Result serialization: the final dataframe as ordered row objects plus a
//! metadata record, and the wire form of execution failures.

use serde::{Deserialize, Serialize};

use crate::error::ExecutionFailure;
use crate::frame::DataFrame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Row objects in final dataframe order; keys follow column order.
    pub output: Vec<serde_json::Map<String, serde_json::Value>>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub rows: usize,
    pub columns: Vec<String>,
    /// Set when the run drew an unseeded sample.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nondeterministic: bool,
}

pub fn serialize(frame: &DataFrame, nondeterministic: bool) -> ExecuteResult {
    ExecuteResult {
        output: (0..frame.height()).map(|row| frame.row_object(row)).collect(),
        meta: Meta {
            rows: frame.height(),
            columns: frame.column_names(),
            nondeterministic,
        },
    }
}

/// Wire form of an [`ExecutionFailure`]: `{kind, step_index?, op?, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    pub message: String,
}

impl From<&ExecutionFailure> for FailureReport {
    fn from(failure: &ExecutionFailure) -> Self {
        Self {
            kind: failure.kind().to_string(),
            step_index: failure.step_index(),
            op: failure.op_name().map(str::to_string),
            message: failure.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn rows_and_meta_mirror_the_frame() {
        let frame = DataFrame::from_pairs(vec![
            ("b".to_string(), vec![Value::Integer(1), Value::Null]),
            (
                "a".to_string(),
                vec![Value::String("x".into()), Value::Float(2.5)],
            ),
        ])
        .unwrap();
        let result = serialize(&frame, false);
        assert_eq!(result.meta.rows, 2);
        assert_eq!(result.meta.columns, vec!["b", "a"]);
        let rendered = serde_json::to_string(&result.output[0]).unwrap();
        // Row objects keep column order, not alphabetical order.
        assert_eq!(rendered, r#"{"b":1,"a":"x"}"#);
        assert_eq!(result.output[1]["b"], serde_json::Value::Null);
    }

    #[test]
    fn nondeterministic_flag_is_omitted_when_false() {
        let frame = DataFrame::from_pairs(vec![("a".to_string(), vec![])]).unwrap();
        let clean = serde_json::to_value(&serialize(&frame, false)).unwrap();
        assert!(clean["meta"].get("nondeterministic").is_none());
        let flagged = serde_json::to_value(&serialize(&frame, true)).unwrap();
        assert_eq!(flagged["meta"]["nondeterministic"], serde_json::json!(true));
    }

    #[test]
    fn failure_report_shape() {
        let failure = ExecutionFailure::validation(Some(2), "unknown variant `frobnicate`");
        let report = FailureReport::from(&failure);
        assert_eq!(report.kind, "ValidationError");
        assert_eq!(report.step_index, Some(2));
        assert!(report.op.is_none());
    }
}
