//! Grouped aggregation, sorting, pivots, and window operations.
//!
//! Group order always follows the first appearance of each key tuple, so
//! grouped results are as deterministic as their inputs.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::error::{OpError, StepError};
use crate::frame::DataFrame;
use crate::program::{AggFunc, AggSpec, Descending, OneOrMany, RankMethod};
use crate::value::{Value, ValueClass};

use super::{frame_error, require_columns};

// ---------------------------------------------------------------------------
// group_by_agg
// ---------------------------------------------------------------------------

pub fn group_by_agg(
    frame: DataFrame,
    keys: &[String],
    aggregations: &[AggSpec],
) -> Result<DataFrame, StepError> {
    if aggregations.is_empty() {
        return Err(OpError::BadArgument("group_by_agg requires 'aggregations'".to_string()).into());
    }
    let mut wanted: Vec<&str> = keys.iter().map(String::as_str).collect();
    for spec in aggregations {
        match (&spec.func, &spec.column) {
            (AggFunc::Count, _) => {}
            (_, Some(column)) => wanted.push(column),
            (func, None) => {
                return Err(OpError::BadArgument(format!(
                    "group_by_agg: 'column' is required for {}",
                    func.name()
                ))
                .into());
            }
        }
    }
    require_columns(&frame, &wanted)?;

    let groups = group_rows(&frame, keys);

    let mut columns: Vec<(String, Vec<Value>)> = keys
        .iter()
        .enumerate()
        .map(|(key_idx, key)| {
            (
                key.clone(),
                groups
                    .iter()
                    .map(|(tuple, _)| tuple[key_idx].clone())
                    .collect(),
            )
        })
        .collect();

    for spec in aggregations {
        let name = output_name(spec);
        let values = groups
            .iter()
            .map(|(_, rows)| apply_agg(&frame, rows, spec))
            .collect::<Result<Vec<_>, _>>()?;
        columns.push((name, values));
    }

    DataFrame::from_pairs(columns).map_err(frame_error)
}

/// Rows grouped by key tuple, in first-appearance order. With no keys the
/// whole frame forms one global group (even when empty).
fn group_rows(frame: &DataFrame, keys: &[String]) -> Vec<(Vec<Value>, Vec<usize>)> {
    if keys.is_empty() {
        return vec![(Vec::new(), (0..frame.height()).collect())];
    }
    let mut order: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in 0..frame.height() {
        let tuple: Vec<Value> = keys
            .iter()
            .map(|key| frame.cell(key, row).expect("key checked").clone())
            .collect();
        let canonical = tuple.iter().map(Value::canonical_key).join("\u{1f}");
        match index.get(&canonical) {
            Some(&slot) => order[slot].1.push(row),
            None => {
                index.insert(canonical, order.len());
                order.push((tuple, vec![row]));
            }
        }
    }
    order
}

fn output_name(spec: &AggSpec) -> String {
    if let Some(name) = &spec.as_column {
        return name.clone();
    }
    match (&spec.func, &spec.column) {
        (AggFunc::Count, _) => "count".to_string(),
        (func, Some(column)) => format!("{column}_{}", func.name()),
        (func, None) => func.name().to_string(),
    }
}

fn apply_agg(frame: &DataFrame, rows: &[usize], spec: &AggSpec) -> Result<Value, StepError> {
    if spec.func == AggFunc::Count {
        return Ok(Value::Integer(rows.len() as i64));
    }
    let column = spec.column.as_deref().expect("validated above");
    let values: Vec<&Value> = rows
        .iter()
        .map(|&row| frame.cell(column, row).expect("column checked"))
        .collect();
    aggregate_values(&values, spec.func, spec.delimiter.as_deref(), column)
}

/// Applies one aggregation function over a slice of cells. Numeric
/// aggregations skip nulls; `first`/`last` do not.
fn aggregate_values(
    values: &[&Value],
    func: AggFunc,
    delimiter: Option<&str>,
    column: &str,
) -> Result<Value, StepError> {
    let non_null = || values.iter().copied().filter(|v| !v.is_null());
    match func {
        AggFunc::Count => Ok(Value::Integer(values.len() as i64)),
        AggFunc::Sum => {
            let mut int_total: Option<i64> = Some(0);
            let mut float_total = 0.0;
            for value in non_null() {
                let contribution = value.as_f64().filter(|_| value.is_numeric()).ok_or_else(|| {
                    OpError::TypeMismatch(format!(
                        "sum of '{column}' hit a {} value",
                        value.type_name()
                    ))
                })?;
                float_total += contribution;
                int_total = match (int_total, value) {
                    (Some(total), Value::Integer(i)) => total.checked_add(*i),
                    _ => None,
                };
            }
            let any_float = non_null().any(|v| matches!(v, Value::Float(_)));
            match (any_float, int_total) {
                (false, Some(total)) => Ok(Value::Integer(total)),
                (false, None) => {
                    Err(OpError::Overflow(format!("sum of '{column}' overflows i64")).into())
                }
                (true, _) => Ok(Value::Float(float_total)),
            }
        }
        AggFunc::Mean => {
            let mut total = 0.0;
            let mut count = 0usize;
            for value in non_null() {
                let contribution = value.as_f64().filter(|_| value.is_numeric()).ok_or_else(|| {
                    OpError::TypeMismatch(format!(
                        "mean of '{column}' hit a {} value",
                        value.type_name()
                    ))
                })?;
                total += contribution;
                count += 1;
            }
            Ok(if count == 0 {
                Value::Null
            } else {
                Value::Float(total / count as f64)
            })
        }
        AggFunc::Min | AggFunc::Max => {
            let mut best: Option<&Value> = None;
            for value in non_null() {
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let ordering = current.compare_same_class(value).ok_or_else(|| {
                            OpError::TypeMismatch(format!(
                                "cannot compare {} and {} in '{column}'",
                                current.type_name(),
                                value.type_name()
                            ))
                        })?;
                        let take_new = if func == AggFunc::Min {
                            ordering.is_gt()
                        } else {
                            ordering.is_lt()
                        };
                        if take_new { value } else { current }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
        AggFunc::First => Ok(values.first().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        AggFunc::Last => Ok(values.last().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        AggFunc::NUnique => {
            let distinct: HashSet<String> = values.iter().map(|v| v.canonical_key()).collect();
            Ok(Value::Integer(distinct.len() as i64))
        }
        AggFunc::ConcatStr => {
            let delimiter = delimiter.ok_or_else(|| {
                OpError::BadArgument("concat_str requires a 'delimiter'".to_string())
            })?;
            let joined = non_null().map(|v| v.as_display()).join(delimiter);
            Ok(Value::String(joined))
        }
    }
}

// ---------------------------------------------------------------------------
// sort_by
// ---------------------------------------------------------------------------

pub fn sort_by(
    frame: DataFrame,
    columns: &[String],
    descending: &Descending,
) -> Result<DataFrame, StepError> {
    if columns.is_empty() {
        return Err(OpError::BadArgument("sort_by requires 'columns'".to_string()).into());
    }
    let wanted: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;
    let directions: Vec<bool> = match descending {
        Descending::Uniform(flag) => vec![*flag; columns.len()],
        Descending::PerColumn(flags) => {
            if flags.len() != columns.len() {
                return Err(OpError::BadArgument(format!(
                    "'descending' has {} flag(s) for {} column(s)",
                    flags.len(),
                    columns.len()
                ))
                .into());
            }
            flags.clone()
        }
    };
    for name in columns {
        check_sortable(frame.values(name).expect("column checked"), name)?;
    }

    let mut indices: Vec<usize> = (0..frame.height()).collect();
    // Stable sort keeps input order for ties.
    indices.sort_by(|&a, &b| {
        for (name, &desc) in columns.iter().zip(&directions) {
            let left = frame.cell(name, a).expect("column checked");
            let right = frame.cell(name, b).expect("column checked");
            // Null sorts greatest, so reversing the whole ordering for a
            // descending column moves nulls first as well.
            let base = match (left.is_null(), right.is_null()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => left
                    .compare_same_class(right)
                    .expect("classes checked uniform"),
            };
            let ordering = if desc { base.reverse() } else { base };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(frame.take_rows(&indices))
}

/// Sort columns must hold one orderable class (nulls aside); integers and
/// floats count as one class.
fn check_sortable(values: &[Value], column: &str) -> Result<(), OpError> {
    let mut seen: Option<ValueClass> = None;
    for value in values {
        let class = value.class();
        if class == ValueClass::Null {
            continue;
        }
        if matches!(class, ValueClass::List | ValueClass::Struct) {
            return Err(OpError::TypeMismatch(format!(
                "cannot sort '{column}' containing {} values",
                value.type_name()
            )));
        }
        match seen {
            None => seen = Some(class),
            Some(existing) if existing == class => {}
            Some(existing) => {
                return Err(OpError::TypeMismatch(format!(
                    "cannot sort '{column}' with mixed {existing:?} and {class:?} values"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// pivots
// ---------------------------------------------------------------------------

pub fn pivot_wider(
    frame: DataFrame,
    keys: &[String],
    pivot_column: &str,
    values: &OneOrMany,
    agg: AggFunc,
) -> Result<DataFrame, StepError> {
    if keys.is_empty() {
        return Err(OpError::BadArgument("pivot_wider requires 'keys'".to_string()).into());
    }
    let value_columns = values.to_vec();
    if value_columns.is_empty() {
        return Err(OpError::BadArgument("pivot_wider requires 'values'".to_string()).into());
    }
    let mut wanted: Vec<&str> = keys.iter().map(String::as_str).collect();
    wanted.push(pivot_column);
    wanted.extend(value_columns.iter().map(String::as_str));
    require_columns(&frame, &wanted)?;

    // Pivot labels in first-appearance order; a null pivot cell gets the
    // literal label "null" so the output column name stays non-empty.
    let mut labels: Vec<(String, String)> = Vec::new();
    let mut seen = HashSet::new();
    for value in frame.values(pivot_column).expect("column checked") {
        let canonical = value.canonical_key();
        if seen.insert(canonical.clone()) {
            let label = if value.is_null() {
                "null".to_string()
            } else {
                value.as_display()
            };
            labels.push((canonical, label));
        }
    }

    let groups = group_rows(&frame, keys);
    let mut columns: Vec<(String, Vec<Value>)> = keys
        .iter()
        .enumerate()
        .map(|(key_idx, key)| {
            (
                key.clone(),
                groups
                    .iter()
                    .map(|(tuple, _)| tuple[key_idx].clone())
                    .collect(),
            )
        })
        .collect();

    for value_column in &value_columns {
        for (canonical, label) in &labels {
            let name = if value_columns.len() == 1 {
                label.clone()
            } else {
                format!("{value_column}_{label}")
            };
            let cells = groups
                .iter()
                .map(|(_, rows)| {
                    let bucket: Vec<&Value> = rows
                        .iter()
                        .filter(|&&row| {
                            frame
                                .cell(pivot_column, row)
                                .expect("column checked")
                                .canonical_key()
                                == *canonical
                        })
                        .map(|&row| frame.cell(value_column, row).expect("column checked"))
                        .collect();
                    if bucket.is_empty() {
                        Ok(Value::Null)
                    } else {
                        aggregate_values(&bucket, agg, None, value_column)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            columns.push((name, cells));
        }
    }

    DataFrame::from_pairs(columns).map_err(frame_error)
}

pub fn pivot_longer(
    frame: DataFrame,
    id_vars: &[String],
    value_vars: Option<&[String]>,
    variable_name: &str,
    value_name: &str,
) -> Result<DataFrame, StepError> {
    let id_refs: Vec<&str> = id_vars.iter().map(String::as_str).collect();
    require_columns(&frame, &id_refs)?;
    let melted: Vec<String> = match value_vars {
        Some(names) if !names.is_empty() => {
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            require_columns(&frame, &refs)?;
            names.to_vec()
        }
        _ => frame
            .column_names()
            .into_iter()
            .filter(|name| !id_vars.contains(name))
            .collect(),
    };
    if melted.is_empty() {
        return Err(OpError::BadArgument("pivot_longer has no value columns".to_string()).into());
    }

    // Column-major stacking: all rows of the first melted column, then the
    // next, so the unpivoted order is deterministic.
    let height = frame.height();
    let mut columns: Vec<(String, Vec<Value>)> = id_vars
        .iter()
        .map(|id| {
            let source = frame.values(id).expect("column checked");
            let mut values = Vec::with_capacity(height * melted.len());
            for _ in &melted {
                values.extend(source.iter().cloned());
            }
            (id.clone(), values)
        })
        .collect();

    let mut variable_values = Vec::with_capacity(height * melted.len());
    let mut value_values = Vec::with_capacity(height * melted.len());
    for name in &melted {
        variable_values.extend(std::iter::repeat_n(Value::String(name.clone()), height));
        value_values.extend(frame.values(name).expect("column checked").iter().cloned());
    }
    columns.push((variable_name.to_string(), variable_values));
    columns.push((value_name.to_string(), value_values));

    DataFrame::from_pairs(columns).map_err(frame_error)
}

// ---------------------------------------------------------------------------
// windows
// ---------------------------------------------------------------------------

pub fn window_cumsum(
    frame: DataFrame,
    column: &str,
    partition_by: Option<&[String]>,
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    let mut wanted = vec![column];
    if let Some(partitions) = partition_by {
        wanted.extend(partitions.iter().map(String::as_str));
    }
    require_columns(&frame, &wanted)?;
    let values = frame.values(column).expect("column checked");
    check_numeric(values, column)?;
    let any_float = values.iter().any(|v| matches!(v, Value::Float(_)));

    let target = as_column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{column}_cumsum"));
    let mut output = vec![Value::Null; frame.height()];
    for partition in partition_rows(&frame, partition_by) {
        let mut int_acc: i64 = 0;
        let mut float_acc: f64 = 0.0;
        for row in partition {
            match &values[row] {
                Value::Null => {}
                value => {
                    let x = value.as_f64().expect("checked numeric");
                    float_acc += x;
                    if !any_float {
                        let i = match value {
                            Value::Integer(i) => *i,
                            _ => unreachable!("no floats in column"),
                        };
                        int_acc = int_acc.checked_add(i).ok_or_else(|| {
                            OpError::Overflow(format!("cumulative sum of '{column}' overflows i64"))
                        })?;
                    }
                    output[row] = if any_float {
                        Value::Float(float_acc)
                    } else {
                        Value::Integer(int_acc)
                    };
                }
            }
        }
    }
    frame.with_column(target, output).map_err(frame_error)
}

pub fn rank(
    frame: DataFrame,
    column: &str,
    method: RankMethod,
    descending: bool,
    partition_by: Option<&[String]>,
    as_column: Option<&str>,
) -> Result<DataFrame, StepError> {
    let mut wanted = vec![column];
    if let Some(partitions) = partition_by {
        wanted.extend(partitions.iter().map(String::as_str));
    }
    require_columns(&frame, &wanted)?;
    let values = frame.values(column).expect("column checked");
    check_sortable(values, column)?;

    let target = as_column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{column}_rank"));
    let mut output = vec![Value::Null; frame.height()];
    for partition in partition_rows(&frame, partition_by) {
        let mut ranked: Vec<usize> = partition
            .iter()
            .copied()
            .filter(|&row| !values[row].is_null())
            .collect();
        // Stable sort: ties keep input order, which is what ordinal ranks
        // tie-break on.
        ranked.sort_by(|&a, &b| {
            let ord = values[a]
                .compare_same_class(&values[b])
                .expect("classes checked uniform");
            if descending { ord.reverse() } else { ord }
        });

        let mut position = 0usize;
        let mut dense = 0usize;
        while position < ranked.len() {
            let mut end = position + 1;
            while end < ranked.len()
                && values[ranked[end]]
                    .compare_same_class(&values[ranked[position]])
                    .expect("classes checked uniform")
                    .is_eq()
            {
                end += 1;
            }
            dense += 1;
            for (offset, &row) in ranked[position..end].iter().enumerate() {
                output[row] = match method {
                    RankMethod::Ordinal => Value::Integer((position + offset + 1) as i64),
                    RankMethod::Dense => Value::Integer(dense as i64),
                    RankMethod::Min => Value::Integer((position + 1) as i64),
                    RankMethod::Max => Value::Integer(end as i64),
                    RankMethod::Average => {
                        Value::Float((position + 1 + end) as f64 / 2.0)
                    }
                };
            }
            position = end;
        }
    }
    frame.with_column(target, output).map_err(frame_error)
}

pub fn rolling(
    frame: DataFrame,
    column: &str,
    window: i64,
    as_column: Option<&str>,
    mean: bool,
) -> Result<DataFrame, StepError> {
    if window < 1 {
        return Err(OpError::BadArgument(format!("window must be >= 1, got {window}")).into());
    }
    require_columns(&frame, &[column])?;
    let values = frame.values(column).expect("column checked");
    check_numeric(values, column)?;
    let any_float = values.iter().any(|v| matches!(v, Value::Float(_)));
    let window = window as usize;

    let suffix = if mean { "rolling_mean" } else { "rolling_sum" };
    let target = as_column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{column}_{suffix}"));

    let output = (0..frame.height())
        .map(|row| {
            if row + 1 < window {
                return Ok(Value::Null);
            }
            let slice = &values[row + 1 - window..=row];
            if slice.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            if mean {
                let total: f64 = slice.iter().map(|v| v.as_f64().expect("numeric")).sum();
                return Ok(Value::Float(total / window as f64));
            }
            if any_float {
                Ok(Value::Float(
                    slice.iter().map(|v| v.as_f64().expect("numeric")).sum(),
                ))
            } else {
                let mut total: i64 = 0;
                for value in slice {
                    let Value::Integer(i) = value else {
                        unreachable!("no floats in column")
                    };
                    total = total.checked_add(*i).ok_or_else(|| {
                        OpError::Overflow(format!("rolling sum of '{column}' overflows i64"))
                    })?;
                }
                Ok(Value::Integer(total))
            }
        })
        .collect::<Result<Vec<_>, OpError>>()?;
    frame.with_column(target, output).map_err(frame_error)
}

/// Row indices per partition, in input order. Without partitions, one
/// partition covers the frame.
fn partition_rows(frame: &DataFrame, partition_by: Option<&[String]>) -> Vec<Vec<usize>> {
    match partition_by {
        Some(partitions) if !partitions.is_empty() => {
            let owned: Vec<String> = partitions.to_vec();
            group_rows(frame, &owned)
                .into_iter()
                .map(|(_, rows)| rows)
                .collect()
        }
        _ => vec![(0..frame.height()).collect()],
    }
}

fn check_numeric(values: &[Value], column: &str) -> Result<(), OpError> {
    for value in values {
        if !value.is_null() && !value.is_numeric() {
            return Err(OpError::TypeMismatch(format!(
                "'{column}' must be numeric, found {}",
                value.type_name()
            )));
        }
    }
    Ok(())
}
