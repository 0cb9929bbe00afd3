//! Structural operations: explode, row-wise JMESPath extraction, and the
//! bounded stateful scan.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::error::{OpError, StepError};
use crate::frame::DataFrame;
use crate::program::{InitFromRow, StepsFromRow};
use crate::value::{CastKind, Value};

use super::{evaluate_expression, frame_error, parse_expression, require_columns};

/// Explodes list cells into one row per element. Scalar cells repeat; empty
/// lists produce a single null row. When several columns explode together
/// their list lengths must agree.
pub fn explode(frame: DataFrame, columns: &[String]) -> Result<DataFrame, StepError> {
    if columns.is_empty() {
        return Err(OpError::BadArgument("explode requires 'columns'".to_string()).into());
    }
    let wanted: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(&frame, &wanted)?;

    // Per-row fan-out: the agreed list length, counting an empty list as one
    // null row.
    let mut fanout = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let mut row_len: Option<usize> = None;
        for name in columns {
            if let Value::List(items) = frame.cell(name, row).expect("column checked") {
                let len = items.len().max(1);
                match row_len {
                    None => row_len = Some(len),
                    Some(existing) if existing == len => {}
                    Some(existing) => {
                        return Err(OpError::BadArgument(format!(
                            "explode: list lengths differ in row {row} ({existing} vs {len})"
                        ))
                        .into());
                    }
                }
            }
        }
        fanout.push(row_len.unwrap_or(1));
    }

    let exploded = frame
        .columns()
        .iter()
        .map(|column| {
            let is_exploded = columns.iter().any(|name| name == column.name());
            let mut values = Vec::new();
            for (row, &n) in fanout.iter().enumerate() {
                let cell = &column.values()[row];
                match (is_exploded, cell) {
                    (true, Value::List(items)) => {
                        if items.is_empty() {
                            values.push(Value::Null);
                        } else {
                            values.extend(items.iter().cloned());
                        }
                    }
                    _ => values.extend(std::iter::repeat_n(cell.clone(), n)),
                }
            }
            (column.name().to_string(), values)
        })
        .collect();
    DataFrame::from_pairs(exploded).map_err(frame_error)
}

/// Evaluates a JMESPath expression over each row's object form and writes
/// the result into `as`.
pub fn json_extract(
    frame: DataFrame,
    expression: &str,
    as_column: &str,
) -> Result<DataFrame, StepError> {
    let compiled = jmespath::compile(expression).map_err(|err| {
        OpError::BadArgument(format!("invalid JMESPath expression: {err}"))
    })?;
    let mut values = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let object = serde_json::Value::Object(frame.row_object(row));
        let rendered = object.to_string();
        let variable = jmespath::Variable::from_json(&rendered)
            .map_err(|err| OpError::BadArgument(format!("json_extract: {err}")))?;
        let found = compiled
            .search(variable)
            .map_err(|err| OpError::BadArgument(format!("json_extract: {err}")))?;
        let as_json = serde_json::to_value(found.as_ref())
            .map_err(|err| OpError::BadArgument(format!("json_extract: {err}")))?;
        values.push(Value::from_json(&as_json));
    }
    frame.with_column(as_column.to_string(), values).map_err(frame_error)
}

/// Bounded stateful scan. State seeds from `init` (overridden by cells named
/// in `init_from_rows`), then for each of N iterations every update
/// expression reads the pre-iteration state, `emit` reads the pre-iteration
/// state, and the state swaps atomically. The result is a fresh
/// single-column frame of the emitted values; prior rows are discarded.
#[allow(clippy::too_many_arguments)]
pub fn scan(
    frame: DataFrame,
    init: &BTreeMap<String, serde_json::Value>,
    init_from_rows: Option<&[InitFromRow]>,
    steps: Option<i64>,
    steps_from_row: Option<&StepsFromRow>,
    update: &BTreeMap<String, String>,
    emit: &str,
    as_column: &str,
    max_steps: i64,
    max_expr_depth: usize,
) -> Result<DataFrame, StepError> {
    let mut state: HashMap<String, Value> = init
        .iter()
        .map(|(var, value)| (var.clone(), Value::from_json(value)))
        .collect();

    if let Some(seeds) = init_from_rows {
        for seed in seeds {
            let value = read_cell(&frame, &seed.column, seed.row, "init_from_rows")?;
            state.insert(seed.var.clone(), strict_cast(value, seed.cast)?);
        }
    }

    let n = match (steps, steps_from_row) {
        (Some(n), _) => n,
        (None, Some(spec)) => {
            let value = read_cell(&frame, &spec.column, spec.row, "steps_from_row")?;
            let cast = spec.cast.unwrap_or(CastKind::Int);
            match strict_cast(value, Some(cast))? {
                Value::Integer(n) => n,
                Value::Float(f) => f as i64,
                other => {
                    return Err(OpError::TypeMismatch(format!(
                        "steps_from_row produced {}, expected a number",
                        other.type_name()
                    ))
                    .into());
                }
            }
        }
        (None, None) => {
            return Err(
                OpError::BadArgument("scan requires 'steps' or 'steps_from_row'".to_string())
                    .into(),
            );
        }
    };
    if n < 0 || n > max_steps {
        return Err(OpError::OutOfRange(format!(
            "scan steps must be in 0..={max_steps}, got {n}"
        ))
        .into());
    }
    debug!("scan: {n} iteration(s), {} state var(s)", state.len());

    let updates: Vec<(String, String, crate::expr::Expr)> = update
        .iter()
        .map(|(var, source)| {
            parse_expression(source, max_expr_depth)
                .map(|parsed| (var.clone(), source.clone(), parsed))
        })
        .collect::<Result<_, _>>()?;
    let emit_parsed = parse_expression(emit, max_expr_depth)?;

    let mut outputs = Vec::with_capacity(n as usize);
    for iteration in 0..n {
        let mut env = state.clone();
        env.insert("row_index".to_string(), Value::Integer(iteration));

        // All updates read the pre-iteration state; the swap is atomic.
        let mut next_state = state.clone();
        for (var, source, parsed) in &updates {
            next_state.insert(var.clone(), evaluate_expression(parsed, source, &env)?);
        }
        outputs.push(evaluate_expression(&emit_parsed, emit, &env)?);
        state = next_state;
    }

    DataFrame::from_pairs(vec![(as_column.to_string(), outputs)]).map_err(frame_error)
}

/// Reads a cell for scan seeding. The row index is range-checked; a missing
/// column reads as null.
fn read_cell(frame: &DataFrame, column: &str, row: i64, what: &str) -> Result<Value, StepError> {
    if row < 0 || row as usize >= frame.height() {
        return Err(OpError::OutOfRange(format!(
            "{what}: row index {row} out of range (height {})",
            frame.height()
        ))
        .into());
    }
    Ok(frame
        .cell(column, row as usize)
        .cloned()
        .unwrap_or(Value::Null))
}

/// Seed casts are strict: a value that does not convert is an error rather
/// than a silent null.
fn strict_cast(value: Value, cast: Option<CastKind>) -> Result<Value, StepError> {
    let Some(kind) = cast else {
        return Ok(value);
    };
    let converted = value.cast_to(kind);
    if converted.is_null() && !value.is_null() {
        return Err(OpError::TypeMismatch(format!(
            "cannot cast '{}' to {:?}",
            value.as_display(),
            kind
        ))
        .into());
    }
    Ok(converted)
}
