//! Column-shaping operations: projection, renaming, dropping, casting, null
//! handling, and duplicate elimination.

use std::collections::{BTreeMap, HashSet};

use crate::error::{OpError, StepError};
use crate::frame::{Column, DataFrame};
use crate::value::{CastKind, Value};

use super::{frame_error, require_columns};

/// Projects to the given columns, in the given order.
pub fn select(frame: DataFrame, columns: &[String]) -> Result<DataFrame, StepError> {
    let wanted: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;
    let projected = columns
        .iter()
        .map(|name| {
            Column::new(
                name.clone(),
                frame.values(name).expect("column checked").to_vec(),
            )
        })
        .collect();
    DataFrame::new(projected).map_err(frame_error)
}

/// Renames columns in place; every old name must exist and the resulting
/// names must stay unique.
pub fn rename(frame: DataFrame, mapping: &BTreeMap<String, String>) -> Result<DataFrame, StepError> {
    let olds: Vec<&str> = mapping.keys().map(String::as_str).collect();
    require_columns(&frame, &olds)?;
    let renamed = frame
        .columns()
        .iter()
        .map(|column| {
            let name = mapping
                .get(column.name())
                .cloned()
                .unwrap_or_else(|| column.name().to_string());
            Column::new(name, column.values().to_vec())
        })
        .collect();
    DataFrame::new(renamed).map_err(frame_error)
}

/// Drops the named columns, silently skipping names that are not present.
pub fn drop(frame: DataFrame, columns: &[String]) -> Result<DataFrame, StepError> {
    let mut result = frame;
    for name in columns {
        result = result.drop_column(name);
    }
    Ok(result)
}

/// Non-strict typed coercion; unparseable values become null.
pub fn cast(frame: DataFrame, mapping: &BTreeMap<String, CastKind>) -> Result<DataFrame, StepError> {
    let wanted: Vec<&str> = mapping.keys().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;
    let mut result = frame;
    for (name, kind) in mapping {
        let values = result
            .values(name)
            .expect("column checked")
            .iter()
            .map(|value| value.cast_to(*kind))
            .collect();
        result = result.with_column(name.clone(), values).map_err(frame_error)?;
    }
    Ok(result)
}

/// Column-wise default substitution for nulls.
pub fn fill_null(
    frame: DataFrame,
    mapping: &BTreeMap<String, serde_json::Value>,
) -> Result<DataFrame, StepError> {
    let wanted: Vec<&str> = mapping.keys().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;
    let mut result = frame;
    for (name, default) in mapping {
        let default = Value::from_json(default);
        let values = result
            .values(name)
            .expect("column checked")
            .iter()
            .map(|value| {
                if value.is_null() {
                    default.clone()
                } else {
                    value.clone()
                }
            })
            .collect();
        result = result.with_column(name.clone(), values).map_err(frame_error)?;
    }
    Ok(result)
}

/// Left-to-right first non-null across `columns`, written into `as`.
pub fn coalesce(
    frame: DataFrame,
    columns: &[String],
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    if columns.is_empty() {
        return Err(OpError::BadArgument("coalesce requires 'columns'".to_string()).into());
    }
    let wanted: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;
    let target = as_column.unwrap_or(&columns[0]).to_string();
    let values = (0..frame.height())
        .map(|row| {
            columns
                .iter()
                .filter_map(|name| frame.cell(name, row))
                .find(|value| !value.is_null())
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect();
    frame.with_column(target, values).map_err(frame_error)
}

/// Drops rows containing null in any of `columns` (every column if omitted).
pub fn drop_na(frame: DataFrame, columns: Option<&[String]>) -> Result<DataFrame, StepError> {
    let subset: Vec<String> = match columns {
        Some(names) if !names.is_empty() => {
            let wanted: Vec<&str> = names.iter().map(String::as_str).collect();
            require_columns(&frame, &wanted)?;
            names.to_vec()
        }
        _ => frame.column_names(),
    };
    let mask: Vec<bool> = (0..frame.height())
        .map(|row| {
            subset
                .iter()
                .all(|name| frame.cell(name, row).is_some_and(|v| !v.is_null()))
        })
        .collect();
    Ok(frame.filter_rows(&mask))
}

/// Keeps the first occurrence of each key tuple, preserving input order.
pub fn distinct(frame: DataFrame, columns: Option<&[String]>) -> Result<DataFrame, StepError> {
    let subset: Vec<String> = match columns {
        Some(names) if !names.is_empty() => {
            let wanted: Vec<&str> = names.iter().map(String::as_str).collect();
            require_columns(&frame, &wanted)?;
            names.to_vec()
        }
        _ => frame.column_names(),
    };
    let mut seen = HashSet::new();
    let mut keep = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let key = subset
            .iter()
            .map(|name| {
                frame
                    .cell(name, row)
                    .map(Value::canonical_key)
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join("\u{1f}");
        keep.push(seen.insert(key));
    }
    Ok(frame.filter_rows(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;

    fn frame() -> DataFrame {
        DataFrame::from_pairs(vec![
            (
                "a".to_string(),
                vec![
                    Value::String("1".into()),
                    Value::Null,
                    Value::String("2".into()),
                ],
            ),
            (
                "b".to_string(),
                vec![Value::Integer(10), Value::Integer(20), Value::Integer(10)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn select_projects_in_order() {
        let result = select(frame(), &["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(result.column_names(), vec!["b", "a"]);
    }

    #[test]
    fn select_missing_column_fails_uniformly() {
        let err = select(frame(), &["no_such".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            StepError::Op(OpError::MissingColumns { .. })
        ));
    }

    #[test]
    fn rename_rejects_collisions() {
        let mut mapping = BTreeMap::new();
        mapping.insert("a".to_string(), "b".to_string());
        assert!(rename(frame(), &mapping).is_err());

        let mut mapping = BTreeMap::new();
        mapping.insert("a".to_string(), "c".to_string());
        let result = rename(frame(), &mapping).unwrap();
        assert_eq!(result.column_names(), vec!["c", "b"]);
    }

    #[test]
    fn drop_skips_absent_names() {
        let result = drop(frame(), &["a".to_string(), "zzz".to_string()]).unwrap();
        assert_eq!(result.column_names(), vec!["b"]);
    }

    #[test]
    fn cast_is_non_strict() {
        let mut mapping = BTreeMap::new();
        mapping.insert("a".to_string(), CastKind::Int);
        let result = cast(frame(), &mapping).unwrap();
        assert_eq!(
            result.values("a").unwrap(),
            &[Value::Integer(1), Value::Null, Value::Integer(2)]
        );
    }

    #[test]
    fn fill_null_substitutes_defaults() {
        let mut mapping = BTreeMap::new();
        mapping.insert("a".to_string(), serde_json::json!("missing"));
        let result = fill_null(frame(), &mapping).unwrap();
        assert_eq!(result.values("a").unwrap()[1], Value::String("missing".into()));
    }

    #[test]
    fn coalesce_takes_first_non_null() {
        let result = coalesce(frame(), &["a".to_string(), "b".to_string()], Some("c")).unwrap();
        assert_eq!(
            result.values("c").unwrap(),
            &[
                Value::String("1".into()),
                Value::Integer(20),
                Value::String("2".into())
            ]
        );
    }

    #[test]
    fn drop_na_with_and_without_subset() {
        assert_eq!(drop_na(frame(), None).unwrap().height(), 2);
        assert_eq!(
            drop_na(frame(), Some(&["b".to_string()])).unwrap().height(),
            3
        );
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let result = distinct(frame(), Some(&["b".to_string()])).unwrap();
        assert_eq!(result.height(), 2);
        assert_eq!(result.values("a").unwrap()[0], Value::String("1".into()));
    }

    #[test]
    fn distinct_is_idempotent() {
        let once = distinct(frame(), None).unwrap();
        let twice = distinct(once.clone(), None).unwrap();
        assert_eq!(once, twice);
    }
}
