//! Row-shaping and row-wise computed operations.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{OpError, StepError};
use crate::frame::DataFrame;

use super::{evaluate_expression, frame_error, parse_expression, row_environment};
use crate::value::Value;

/// Half-open row window. Negative offsets are rejected rather than counted
/// from the end.
pub fn slice(frame: DataFrame, offset: i64, length: Option<i64>) -> Result<DataFrame, StepError> {
    if offset < 0 {
        return Err(OpError::OutOfRange(format!("slice offset must be >= 0, got {offset}")).into());
    }
    let start = (offset as usize).min(frame.height());
    let end = match length {
        Some(len) if len < 0 => {
            return Err(OpError::BadArgument(format!("slice length must be >= 0, got {len}")).into());
        }
        Some(len) => (start + len as usize).min(frame.height()),
        None => frame.height(),
    };
    let indices: Vec<usize> = (start..end).collect();
    Ok(frame.take_rows(&indices))
}

pub fn head(frame: DataFrame, n: i64) -> Result<DataFrame, StepError> {
    if n < 0 {
        return Err(OpError::BadArgument(format!("head n must be >= 0, got {n}")).into());
    }
    let keep = (n as usize).min(frame.height());
    let indices: Vec<usize> = (0..keep).collect();
    Ok(frame.take_rows(&indices))
}

pub fn tail(frame: DataFrame, n: i64) -> Result<DataFrame, StepError> {
    if n < 0 {
        return Err(OpError::BadArgument(format!("tail n must be >= 0, got {n}")).into());
    }
    let keep = (n as usize).min(frame.height());
    let indices: Vec<usize> = (frame.height() - keep..frame.height()).collect();
    Ok(frame.take_rows(&indices))
}

/// Shuffled draw of `n` rows (or a fraction of the height). Without a seed
/// the draw is non-deterministic and the caller surfaces that in the result
/// metadata.
pub fn sample(
    frame: DataFrame,
    n: Option<i64>,
    frac: Option<f64>,
    with_replacement: bool,
    seed: Option<u64>,
    nondeterministic: &mut bool,
) -> Result<DataFrame, StepError> {
    let count = if let Some(frac) = frac {
        if !(0.0..=f64::MAX).contains(&frac) {
            return Err(OpError::BadArgument(format!("sample frac must be >= 0, got {frac}")).into());
        }
        (frac * frame.height() as f64).round() as usize
    } else if let Some(n) = n {
        if n < 0 {
            return Err(OpError::BadArgument(format!("sample n must be >= 0, got {n}")).into());
        }
        n as usize
    } else {
        return Err(OpError::BadArgument("sample requires 'n' or 'frac'".to_string()).into());
    };

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            *nondeterministic = true;
            debug!("sample without seed: result is non-deterministic");
            StdRng::from_entropy()
        }
    };

    let indices: Vec<usize> = if with_replacement {
        if frame.height() == 0 && count > 0 {
            return Err(
                OpError::BadArgument("cannot sample from an empty dataframe".to_string()).into(),
            );
        }
        (0..count).map(|_| rng.gen_range(0..frame.height())).collect()
    } else {
        if count > frame.height() {
            return Err(OpError::BadArgument(format!(
                "cannot sample {count} row(s) from {} without replacement",
                frame.height()
            ))
            .into());
        }
        rand::seq::index::sample(&mut rng, frame.height(), count).into_vec()
    };
    Ok(frame.take_rows(&indices))
}

/// Keeps rows whose zero-based index is congruent to `offset` modulo `n`.
pub fn take_every(frame: DataFrame, n: i64, offset: i64) -> Result<DataFrame, StepError> {
    if n < 1 {
        return Err(OpError::BadArgument(format!("take_every n must be >= 1, got {n}")).into());
    }
    let residue = offset.rem_euclid(n) as usize;
    let indices: Vec<usize> = (0..frame.height())
        .filter(|idx| idx % n as usize == residue)
        .collect();
    Ok(frame.take_rows(&indices))
}

/// Appends an integer row-number column counting from `start`.
pub fn add_row_number(
    frame: DataFrame,
    as_column: &str,
    start: i64,
) -> Result<DataFrame, StepError> {
    let values = (0..frame.height())
        .map(|idx| {
            start
                .checked_add(idx as i64)
                .map(Value::Integer)
                .ok_or_else(|| OpError::Overflow("row number overflows i64".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    frame.with_column(as_column.to_string(), values).map_err(frame_error)
}

/// Keeps rows whose expression evaluates truthy in the per-row environment.
pub fn filter_expr(
    frame: DataFrame,
    source: &str,
    max_depth: usize,
) -> Result<DataFrame, StepError> {
    let parsed = parse_expression(source, max_depth)?;
    let mut mask = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let env = row_environment(&frame, row);
        let value = evaluate_expression(&parsed, source, &env)?;
        mask.push(value.truthy());
    }
    Ok(frame.filter_rows(&mask))
}

/// Evaluates the expression per row and assigns it to `as`, overwriting any
/// existing column of that name.
pub fn compute_expr(
    frame: DataFrame,
    source: &str,
    as_column: &str,
    max_depth: usize,
) -> Result<DataFrame, StepError> {
    let parsed = parse_expression(source, max_depth)?;
    let mut values = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let env = row_environment(&frame, row);
        values.push(evaluate_expression(&parsed, source, &env)?);
    }
    frame.with_column(as_column.to_string(), values).map_err(frame_error)
}
