//! String, regex, and value-mapping operations.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{OpError, StepError};
use crate::frame::DataFrame;
use crate::value::Value;

use super::{cell_to_string, compile_regex, frame_error, require_columns, structural};

/// Extracts one regex group per row. Group 0 wraps the whole pattern in an
/// implicit capturing group; other group numbers are 1-based.
pub fn regex_extract(
    frame: DataFrame,
    column: &str,
    pattern: &str,
    group: i64,
    as_column: &str,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    let (effective_pattern, group_index) = if group == 0 {
        (format!("({pattern})"), 1usize)
    } else if group > 0 {
        (pattern.to_string(), group as usize)
    } else {
        return Err(OpError::BadArgument(format!("group must be >= 0, got {group}")).into());
    };
    let regex = compile_regex(&effective_pattern)?;
    if group_index >= regex.captures_len() {
        return Err(OpError::BadArgument(format!(
            "pattern has no capture group {group}"
        ))
        .into());
    }
    let values = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|value| match cell_to_string(value) {
            Some(text) => regex
                .captures(&text)
                .and_then(|captures| captures.get(group_index))
                .map_or(Value::Null, |m| Value::String(m.as_str().to_string())),
            None => Value::Null,
        })
        .collect();
    frame.with_column(as_column.to_string(), values).map_err(frame_error)
}

/// Extracts capture groups 1..=N into N parallel columns.
pub fn regex_extract_multi(
    frame: DataFrame,
    column: &str,
    pattern: &str,
    as_columns: &[String],
) -> Result<DataFrame, StepError> {
    if as_columns.is_empty() {
        return Err(
            OpError::BadArgument("'as' must name at least one output column".to_string()).into(),
        );
    }
    require_columns(&frame, &[column])?;
    let regex = compile_regex(pattern)?;
    if regex.captures_len() <= as_columns.len() {
        return Err(OpError::BadArgument(format!(
            "pattern has {} capture group(s) but 'as' names {}",
            regex.captures_len() - 1,
            as_columns.len()
        ))
        .into());
    }
    let source = frame.values(column).expect("column checked").to_vec();
    let mut result = frame;
    for (group_idx, target) in as_columns.iter().enumerate() {
        let values = source
            .iter()
            .map(|value| match cell_to_string(value) {
                Some(text) => regex
                    .captures(&text)
                    .and_then(|captures| captures.get(group_idx + 1))
                    .map_or(Value::Null, |m| Value::String(m.as_str().to_string())),
                None => Value::Null,
            })
            .collect();
        result = result.with_column(target.clone(), values).map_err(frame_error)?;
    }
    Ok(result)
}

/// Global regex replacement. Capture references use `$1`-style syntax.
pub fn regex_replace(
    frame: DataFrame,
    column: &str,
    pattern: &str,
    replacement: &str,
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    let regex = compile_regex(pattern)?;
    let target = as_column.unwrap_or(column).to_string();
    let values = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|value| match cell_to_string(value) {
            Some(text) => Value::String(regex.replace_all(&text, replacement).into_owned()),
            None => Value::Null,
        })
        .collect();
    frame.with_column(target, values).map_err(frame_error)
}

/// Exact-value substitution: string cells matching a mapping key are
/// replaced, everything else passes through.
pub fn replace_values(
    frame: DataFrame,
    column: &str,
    mapping: &BTreeMap<String, serde_json::Value>,
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    if mapping.is_empty() {
        return Ok(frame);
    }
    let target = as_column.unwrap_or(column).to_string();
    let values = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|value| match value {
            Value::String(text) => mapping
                .get(text)
                .map(Value::from_json)
                .unwrap_or_else(|| value.clone()),
            other => other.clone(),
        })
        .collect();
    frame.with_column(target, values).map_err(frame_error)
}

/// Table-driven mapping with an optional default for unmatched values.
#[allow(clippy::too_many_arguments)]
pub fn lookup(
    frame: DataFrame,
    on: &str,
    table: &[BTreeMap<String, serde_json::Value>],
    key_field: &str,
    value_field: &str,
    default: Option<&serde_json::Value>,
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[on])?;
    if table.is_empty() {
        return Err(OpError::BadArgument(
            "lookup 'table' must be a non-empty list of {key,value} objects".to_string(),
        )
        .into());
    }
    let mut mapping = BTreeMap::new();
    for (idx, entry) in table.iter().enumerate() {
        let key = entry.get(key_field).ok_or_else(|| {
            OpError::BadArgument(format!("lookup table entry {idx} is missing '{key_field}'"))
        })?;
        let value = entry.get(value_field).ok_or_else(|| {
            OpError::BadArgument(format!("lookup table entry {idx} is missing '{value_field}'"))
        })?;
        mapping.insert(Value::from_json(key).canonical_key(), Value::from_json(value));
    }
    let default = default.map(Value::from_json);
    let target = as_column.unwrap_or(on).to_string();
    let values = frame
        .values(on)
        .expect("column checked")
        .iter()
        .map(|value| match mapping.get(&value.canonical_key()) {
            Some(mapped) => mapped.clone(),
            None => default.clone().unwrap_or_else(|| value.clone()),
        })
        .collect();
    frame.with_column(target, values).map_err(frame_error)
}

/// Keeps rows whose cell equals the literal; null equals null here.
pub fn filter_eq(
    frame: DataFrame,
    column: &str,
    value: &serde_json::Value,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    let wanted = Value::from_json(value);
    let mask: Vec<bool> = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|cell| cell.eq_value(&wanted))
        .collect();
    Ok(frame.filter_rows(&mask))
}

/// Keeps rows whose stringified cell contains a match; null cells drop out.
pub fn filter_regex(frame: DataFrame, column: &str, pattern: &str) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    let regex = compile_regex(pattern)?;
    let mask: Vec<bool> = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|cell| match cell_to_string(cell) {
            Some(text) => regex.is_match(&text),
            None => false,
        })
        .collect();
    Ok(frame.filter_rows(&mask))
}

/// Stringifies and joins columns into one; a null operand nulls the row.
pub fn concat_columns(
    frame: DataFrame,
    columns: &[String],
    delimiter: &str,
    as_column: &str,
) -> Result<DataFrame, StepError> {
    if columns.is_empty() {
        return Err(OpError::BadArgument("concat_columns requires 'columns'".to_string()).into());
    }
    let wanted: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;
    let values = (0..frame.height())
        .map(|row| {
            let mut parts = Vec::with_capacity(columns.len());
            for name in columns {
                match cell_to_string(frame.cell(name, row).expect("column checked")) {
                    Some(text) => parts.push(text),
                    None => return Value::Null,
                }
            }
            Value::String(parts.join(delimiter))
        })
        .collect();
    frame.with_column(as_column.to_string(), values).map_err(frame_error)
}

/// Splits a cell into exactly `into.len()` parts; any trailing remainder
/// stays joined to the last part and missing parts come out null.
pub fn split_column(
    frame: DataFrame,
    column: &str,
    delimiter: &str,
    into: &[String],
    drop_original: bool,
) -> Result<DataFrame, StepError> {
    if into.is_empty() {
        return Err(OpError::BadArgument(
            "split_column requires 'into' (list of new column names)".to_string(),
        )
        .into());
    }
    if delimiter.is_empty() {
        return Err(OpError::BadArgument("delimiter must be non-empty".to_string()).into());
    }
    require_columns(&frame, &[column])?;
    let source = frame.values(column).expect("column checked").to_vec();
    let mut parts_per_target: Vec<Vec<Value>> = vec![Vec::with_capacity(source.len()); into.len()];
    for cell in &source {
        match cell_to_string(cell) {
            Some(text) => {
                let parts: Vec<&str> = text.splitn(into.len(), delimiter).collect();
                for (idx, target) in parts_per_target.iter_mut().enumerate() {
                    // Parts beyond what the cell provided come out null.
                    target.push(match parts.get(idx) {
                        Some(part) => Value::String(part.to_string()),
                        None => Value::Null,
                    });
                }
            }
            None => {
                for target in parts_per_target.iter_mut() {
                    target.push(Value::Null);
                }
            }
        }
    }
    let mut result = frame;
    for (target, values) in into.iter().zip(parts_per_target) {
        result = result.with_column(target.clone(), values).map_err(frame_error)?;
    }
    if drop_original && !into.iter().any(|name| name == column) {
        result = result.drop_column(column);
    }
    Ok(result)
}

/// Splits a cell on the delimiter and explodes the pieces into rows.
pub fn split_to_rows(
    frame: DataFrame,
    column: &str,
    delimiter: &str,
    as_column: Option<&str>,
    drop_original: bool,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    if delimiter.is_empty() {
        return Err(OpError::BadArgument("delimiter must be non-empty".to_string()).into());
    }
    let target = as_column.unwrap_or(column).to_string();
    let values = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|cell| match cell_to_string(cell) {
            Some(text) => Value::List(
                text.split(delimiter)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ),
            None => Value::Null,
        })
        .collect();
    let mut widened = frame
        .with_column(target.clone(), values)
        .map_err(frame_error)?;
    if drop_original && target != column {
        widened = widened.drop_column(column);
    }
    structural::explode(widened, &[target])
}

/// Parses cells to datetimes, normalized to ISO-8601 strings; unparseable
/// cells become null. Without an explicit format only ISO-8601 inputs parse.
pub fn to_datetime(
    frame: DataFrame,
    column: &str,
    format: Option<&str>,
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    require_columns(&frame, &[column])?;
    let target = as_column.unwrap_or(column).to_string();
    let values = frame
        .values(column)
        .expect("column checked")
        .iter()
        .map(|cell| match cell_to_string(cell) {
            Some(text) => parse_datetime_cell(&text, format)
                .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
                .unwrap_or(Value::Null),
            None => Value::Null,
        })
        .collect();
    frame.with_column(target, values).map_err(frame_error)
}

fn parse_datetime_cell(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    match format {
        Some(fmt) => NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }),
        None => {
            for fmt in [
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S",
            ] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
                    return Some(dt);
                }
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(rows: &[&str]) -> DataFrame {
        DataFrame::from_pairs(vec![(
            "line".to_string(),
            rows.iter().map(|r| Value::String(r.to_string())).collect(),
        )])
        .unwrap()
    }

    #[test]
    fn regex_extract_group_zero_wraps_whole_pattern() {
        let frame = lines(&["order-123", "no digits"]);
        let by_zero = regex_extract(frame.clone(), "line", r"\d+", 0, "n").unwrap();
        let by_one = regex_extract(frame, "line", r"(\d+)", 1, "n").unwrap();
        assert_eq!(by_zero.values("n").unwrap(), by_one.values("n").unwrap());
        assert_eq!(by_zero.values("n").unwrap()[1], Value::Null);
    }

    #[test]
    fn regex_extract_rejects_out_of_range_groups() {
        let frame = lines(&["x"]);
        assert!(regex_extract(frame.clone(), "line", r"(\d)", 2, "n").is_err());
        assert!(regex_extract(frame, "line", r"\d", -1, "n").is_err());
    }

    #[test]
    fn regex_extract_multi_spreads_groups() {
        let frame = lines(&["2024-01-15"]);
        let result = regex_extract_multi(
            frame,
            "line",
            r"(\d{4})-(\d{2})-(\d{2})",
            &["y".to_string(), "m".to_string(), "d".to_string()],
        )
        .unwrap();
        assert_eq!(result.values("y").unwrap()[0], Value::String("2024".into()));
        assert_eq!(result.values("d").unwrap()[0], Value::String("15".into()));
    }

    #[test]
    fn regex_replace_is_global() {
        let frame = lines(&["a1b2c3"]);
        let result = regex_replace(frame, "line", r"\d", "#", None).unwrap();
        assert_eq!(result.values("line").unwrap()[0], Value::String("a#b#c#".into()));
    }

    #[test]
    fn replace_values_passes_unmatched_through() {
        let mut mapping = BTreeMap::new();
        mapping.insert("yes".to_string(), serde_json::json!(1));
        let frame = lines(&["yes", "no"]);
        let result = replace_values(frame, "line", &mapping, None).unwrap();
        assert_eq!(result.values("line").unwrap()[0], Value::Integer(1));
        assert_eq!(result.values("line").unwrap()[1], Value::String("no".into()));
    }

    #[test]
    fn lookup_applies_default_only_when_present() {
        let table: Vec<BTreeMap<String, serde_json::Value>> = vec![
            [
                ("key".to_string(), serde_json::json!("a")),
                ("value".to_string(), serde_json::json!("alpha")),
            ]
            .into_iter()
            .collect(),
        ];
        let frame = lines(&["a", "b"]);
        let with_default = lookup(
            frame.clone(),
            "line",
            &table,
            "key",
            "value",
            Some(&serde_json::json!("?")),
            None,
        )
        .unwrap();
        assert_eq!(
            with_default.values("line").unwrap(),
            &[Value::String("alpha".into()), Value::String("?".into())]
        );
        let without_default =
            lookup(frame, "line", &table, "key", "value", None, None).unwrap();
        assert_eq!(
            without_default.values("line").unwrap()[1],
            Value::String("b".into())
        );
    }

    #[test]
    fn filter_eq_treats_null_equal_to_null() {
        let frame = DataFrame::from_pairs(vec![(
            "v".to_string(),
            vec![Value::Null, Value::Integer(1)],
        )])
        .unwrap();
        let result = filter_eq(frame, "v", &serde_json::Value::Null).unwrap();
        assert_eq!(result.height(), 1);
    }

    #[test]
    fn filter_regex_drops_nulls_and_non_matches() {
        let frame = DataFrame::from_pairs(vec![(
            "v".to_string(),
            vec![
                Value::String("abc".into()),
                Value::Null,
                Value::String("xyz".into()),
            ],
        )])
        .unwrap();
        let result = filter_regex(frame, "v", "b").unwrap();
        assert_eq!(result.height(), 1);
    }

    #[test]
    fn concat_then_split_round_trips() {
        let frame = DataFrame::from_pairs(vec![
            (
                "a".to_string(),
                vec![Value::String("x".into()), Value::String("y".into())],
            ),
            (
                "b".to_string(),
                vec![Value::String("1".into()), Value::String("2".into())],
            ),
        ])
        .unwrap();
        let joined = concat_columns(frame, &["a".to_string(), "b".to_string()], "-", "j").unwrap();
        let split = split_column(
            joined,
            "j",
            "-",
            &["a2".to_string(), "b2".to_string()],
            true,
        )
        .unwrap();
        assert_eq!(split.values("a2").unwrap()[1], Value::String("y".into()));
        assert_eq!(split.values("b2").unwrap()[0], Value::String("1".into()));
    }

    #[test]
    fn split_column_joins_trailing_parts_into_last() {
        let frame = lines(&["a-b-c-d"]);
        let result = split_column(
            frame,
            "line",
            "-",
            &["first".to_string(), "rest".to_string()],
            false,
        )
        .unwrap();
        assert_eq!(result.values("first").unwrap()[0], Value::String("a".into()));
        assert_eq!(
            result.values("rest").unwrap()[0],
            Value::String("b-c-d".into())
        );
    }

    #[test]
    fn split_to_rows_explodes_pieces() {
        let frame = lines(&["a,b", "c"]);
        let result = split_to_rows(frame, "line", ",", None, true).unwrap();
        assert_eq!(result.height(), 3);
        assert_eq!(result.values("line").unwrap()[1], Value::String("b".into()));
    }

    #[test]
    fn to_datetime_requires_iso_without_format() {
        let frame = lines(&["2024-01-15", "15/01/2024"]);
        let result = to_datetime(frame.clone(), "line", None, Some("dt")).unwrap();
        assert_eq!(
            result.values("dt").unwrap()[0],
            Value::String("2024-01-15T00:00:00".into())
        );
        assert_eq!(result.values("dt").unwrap()[1], Value::Null);

        let with_format = to_datetime(frame, "line", Some("%d/%m/%Y"), Some("dt")).unwrap();
        assert_eq!(
            with_format.values("dt").unwrap()[1],
            Value::String("2024-01-15T00:00:00".into())
        );
    }
}
