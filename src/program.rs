//! Recipe data model: an ordered sequence of typed operation records.
//!
//! Programs are pure data. Each step is a JSON object whose `op` field picks
//! one of the closed operation set; the remaining fields are op-specific and
//! deserialize into the typed [`Step`] variants below. Structural validation
//! happens per step so failures carry the offending step index. Expression
//! fields stay as source strings — they are parsed during execution, not
//! validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionFailure;
use crate::value::CastKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Program {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Structural check with per-step error positions. This is the program
    /// validator: every step must carry a known `op` and well-shaped fields.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ExecutionFailure> {
        let object = value
            .as_object()
            .ok_or_else(|| ExecutionFailure::validation(None, "program must be an object"))?;
        let steps_value = match object.get("steps") {
            Some(steps) => steps,
            None => return Ok(Program::default()),
        };
        let raw_steps = steps_value.as_array().ok_or_else(|| {
            ExecutionFailure::validation(None, "'steps' must be an array of operation records")
        })?;
        let mut steps = Vec::with_capacity(raw_steps.len());
        for (step_index, raw) in raw_steps.iter().enumerate() {
            let step = serde_json::from_value::<Step>(raw.clone()).map_err(|err| {
                ExecutionFailure::validation(Some(step_index), err.to_string())
            })?;
            steps.push(step);
        }
        Ok(Program { steps })
    }

    pub fn from_str(source: &str) -> Result<Self, ExecutionFailure> {
        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|err| ExecutionFailure::validation(None, format!("invalid JSON: {err}")))?;
        Self::from_json(&value)
    }
}

/// One aggregation of a `group_by_agg` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggSpec {
    pub func: AggFunc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub as_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    First,
    Last,
    NUnique,
    ConcatStr,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::First => "first",
            AggFunc::Last => "last",
            AggFunc::NUnique => "n_unique",
            AggFunc::ConcatStr => "concat_str",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMethod {
    Ordinal,
    Dense,
    Min,
    Max,
    Average,
}

/// `descending` accepts either one flag for all sort columns or one per
/// column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descending {
    Uniform(bool),
    PerColumn(Vec<bool>),
}

impl Default for Descending {
    fn default() -> Self {
        Descending::Uniform(false)
    }
}

/// A string-or-list field such as `pivot_wider.values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(name) => vec![name.clone()],
            OneOrMany::Many(names) => names.clone(),
        }
    }
}

/// Seed of one scan state variable from a dataframe cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitFromRow {
    pub var: String,
    #[serde(default = "default_line")]
    pub column: String,
    pub row: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<CastKind>,
}

/// Iteration count read from a dataframe cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepsFromRow {
    #[serde(default = "default_line")]
    pub column: String,
    pub row: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<CastKind>,
}

/// The closed operation set. Serialization uses the `op` field as the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    RegexExtract {
        #[serde(default = "default_line")]
        column: String,
        pattern: String,
        #[serde(default)]
        group: i64,
        #[serde(rename = "as")]
        as_column: String,
    },
    RegexExtractMulti {
        #[serde(default = "default_line")]
        column: String,
        pattern: String,
        #[serde(rename = "as")]
        as_columns: Vec<String>,
    },
    RegexReplace {
        column: String,
        pattern: String,
        #[serde(default)]
        replacement: String,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    ReplaceValues {
        column: String,
        #[serde(default)]
        mapping: BTreeMap<String, serde_json::Value>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    Lookup {
        on: String,
        #[serde(default)]
        table: Vec<BTreeMap<String, serde_json::Value>>,
        #[serde(default = "default_key_field")]
        key_field: String,
        #[serde(default = "default_value_field")]
        value_field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Value>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    Select {
        columns: Vec<String>,
    },
    Rename {
        mapping: BTreeMap<String, String>,
    },
    Drop {
        columns: Vec<String>,
    },
    Cast {
        mapping: BTreeMap<String, CastKind>,
    },
    FillNull {
        mapping: BTreeMap<String, serde_json::Value>,
    },
    Coalesce {
        columns: Vec<String>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    FilterEq {
        column: String,
        value: serde_json::Value,
    },
    FilterRegex {
        column: String,
        pattern: String,
    },
    DropNa {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },
    Slice {
        #[serde(default)]
        offset: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<i64>,
    },
    Head {
        #[serde(default = "default_peek_n")]
        n: i64,
    },
    Tail {
        #[serde(default = "default_peek_n")]
        n: i64,
    },
    Sample {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        n: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frac: Option<f64>,
        #[serde(default)]
        with_replacement: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    JsonExtract {
        expr: String,
        #[serde(rename = "as")]
        as_column: String,
    },
    TakeEvery {
        n: i64,
        #[serde(default)]
        offset: i64,
    },
    AddRowNumber {
        #[serde(rename = "as", default = "default_row_index")]
        as_column: String,
        #[serde(default)]
        start: i64,
    },
    FilterExpr {
        expr: String,
    },
    ComputeExpr {
        expr: String,
        #[serde(rename = "as")]
        as_column: String,
    },
    ConcatColumns {
        columns: Vec<String>,
        #[serde(default)]
        delimiter: String,
        #[serde(rename = "as", default = "default_line")]
        as_column: String,
    },
    SplitColumn {
        column: String,
        #[serde(default = "default_comma")]
        delimiter: String,
        into: Vec<String>,
        #[serde(default)]
        drop_original: bool,
    },
    SplitToRows {
        column: String,
        #[serde(default = "default_comma")]
        delimiter: String,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
        #[serde(default = "default_true")]
        drop_original: bool,
    },
    ToDatetime {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    Scan {
        #[serde(default)]
        init: BTreeMap<String, serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init_from_rows: Option<Vec<InitFromRow>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        steps: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        steps_from_row: Option<StepsFromRow>,
        #[serde(default)]
        update: BTreeMap<String, String>,
        emit: String,
        #[serde(rename = "as", default = "default_value_column")]
        as_column: String,
    },
    GroupByAgg {
        #[serde(default)]
        keys: Vec<String>,
        aggregations: Vec<AggSpec>,
    },
    SortBy {
        columns: Vec<String>,
        #[serde(default)]
        descending: Descending,
    },
    Distinct {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },
    Explode {
        columns: Vec<String>,
    },
    PivotWider {
        keys: Vec<String>,
        column: String,
        values: OneOrMany,
        #[serde(default = "default_pivot_agg")]
        agg: AggFunc,
    },
    PivotLonger {
        #[serde(default)]
        id_vars: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_vars: Option<Vec<String>>,
        #[serde(default = "default_variable_name")]
        variable_name: String,
        #[serde(default = "default_value_column")]
        value_name: String,
    },
    WindowCumsum {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partition_by: Option<Vec<String>>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    Rank {
        column: String,
        #[serde(default = "default_rank_method")]
        method: RankMethod,
        #[serde(default)]
        descending: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partition_by: Option<Vec<String>>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    RollingMean {
        column: String,
        #[serde(default = "default_window")]
        window: i64,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
    RollingSum {
        column: String,
        #[serde(default = "default_window")]
        window: i64,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_column: Option<String>,
    },
}

impl Step {
    /// The wire name of the operation, used in failure reports.
    pub fn op_name(&self) -> &'static str {
        match self {
            Step::RegexExtract { .. } => "regex_extract",
            Step::RegexExtractMulti { .. } => "regex_extract_multi",
            Step::RegexReplace { .. } => "regex_replace",
            Step::ReplaceValues { .. } => "replace_values",
            Step::Lookup { .. } => "lookup",
            Step::Select { .. } => "select",
            Step::Rename { .. } => "rename",
            Step::Drop { .. } => "drop",
            Step::Cast { .. } => "cast",
            Step::FillNull { .. } => "fill_null",
            Step::Coalesce { .. } => "coalesce",
            Step::FilterEq { .. } => "filter_eq",
            Step::FilterRegex { .. } => "filter_regex",
            Step::DropNa { .. } => "drop_na",
            Step::Slice { .. } => "slice",
            Step::Head { .. } => "head",
            Step::Tail { .. } => "tail",
            Step::Sample { .. } => "sample",
            Step::JsonExtract { .. } => "json_extract",
            Step::TakeEvery { .. } => "take_every",
            Step::AddRowNumber { .. } => "add_row_number",
            Step::FilterExpr { .. } => "filter_expr",
            Step::ComputeExpr { .. } => "compute_expr",
            Step::ConcatColumns { .. } => "concat_columns",
            Step::SplitColumn { .. } => "split_column",
            Step::SplitToRows { .. } => "split_to_rows",
            Step::ToDatetime { .. } => "to_datetime",
            Step::Scan { .. } => "scan",
            Step::GroupByAgg { .. } => "group_by_agg",
            Step::SortBy { .. } => "sort_by",
            Step::Distinct { .. } => "distinct",
            Step::Explode { .. } => "explode",
            Step::PivotWider { .. } => "pivot_wider",
            Step::PivotLonger { .. } => "pivot_longer",
            Step::WindowCumsum { .. } => "window_cumsum",
            Step::Rank { .. } => "rank",
            Step::RollingMean { .. } => "rolling_mean",
            Step::RollingSum { .. } => "rolling_sum",
        }
    }
}

fn default_line() -> String {
    "line".to_string()
}

fn default_comma() -> String {
    ",".to_string()
}

fn default_key_field() -> String {
    "key".to_string()
}

fn default_value_field() -> String {
    "value".to_string()
}

fn default_row_index() -> String {
    "row_index".to_string()
}

fn default_value_column() -> String {
    "value".to_string()
}

fn default_variable_name() -> String {
    "variable".to_string()
}

fn default_peek_n() -> i64 {
    5
}

fn default_window() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_pivot_agg() -> AggFunc {
    AggFunc::First
}

fn default_rank_method() -> RankMethod {
    RankMethod::Ordinal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_program() {
        let program = Program::from_str(
            r#"{"steps": [
                {"op": "cast", "mapping": {"age": "int"}},
                {"op": "filter_expr", "expr": "age >= 30"},
                {"op": "sort_by", "columns": ["age"], "descending": true}
            ]}"#,
        )
        .unwrap();
        assert_eq!(program.steps.len(), 3);
        assert_eq!(program.steps[1].op_name(), "filter_expr");
        match &program.steps[2] {
            Step::SortBy { descending, .. } => {
                assert_eq!(*descending, Descending::Uniform(true));
            }
            other => panic!("expected sort_by, got {other:?}"),
        }
    }

    #[test]
    fn unknown_op_reports_step_index() {
        let err = Program::from_str(
            r#"{"steps": [{"op": "select", "columns": ["a"]}, {"op": "frobnicate"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.step_index(), Some(1));
    }

    #[test]
    fn missing_required_field_is_a_validation_error() {
        let err = Program::from_str(r#"{"steps": [{"op": "select"}]}"#).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.step_index(), Some(0));
    }

    #[test]
    fn ill_typed_field_is_a_validation_error() {
        let err =
            Program::from_str(r#"{"steps": [{"op": "select", "columns": "not-a-list"}]}"#)
                .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.step_index(), Some(0));
    }

    #[test]
    fn expression_fields_are_not_parsed_at_validation_time() {
        // A syntactically broken expression is still a structurally valid step.
        let program =
            Program::from_str(r#"{"steps": [{"op": "filter_expr", "expr": "age >="}]}"#).unwrap();
        assert_eq!(program.steps.len(), 1);
    }

    #[test]
    fn per_column_descending_round_trips() {
        let program = Program::from_str(
            r#"{"steps": [{"op": "sort_by", "columns": ["a", "b"], "descending": [true, false]}]}"#,
        )
        .unwrap();
        match &program.steps[0] {
            Step::SortBy { descending, .. } => {
                assert_eq!(*descending, Descending::PerColumn(vec![true, false]));
            }
            other => panic!("unexpected step {other:?}"),
        }
        let rendered = serde_json::to_value(&program).unwrap();
        assert_eq!(rendered["steps"][0]["descending"], serde_json::json!([true, false]));
    }

    #[test]
    fn empty_or_absent_steps_are_valid() {
        assert!(Program::from_str(r#"{}"#).unwrap().steps.is_empty());
        assert!(Program::from_str(r#"{"steps": []}"#).unwrap().steps.is_empty());
        assert!(Program::from_str(r#"[]"#).is_err());
    }

    #[test]
    fn scan_defaults_fill_in() {
        let program = Program::from_str(
            r#"{"steps": [{"op": "scan", "init": {"a": 1}, "steps": 3, "update": {"a": "a+1"}, "emit": "a"}]}"#,
        )
        .unwrap();
        match &program.steps[0] {
            Step::Scan { as_column, .. } => assert_eq!(as_column, "value"),
            other => panic!("unexpected step {other:?}"),
        }
    }
}
