//! The operation interpreter: sequential, synchronous execution of a recipe
//! over a decoded dataframe.
//!
//! Execution is a pure function of `(program, input)` apart from the clock
//! builtins and unseeded sampling. There is no shared mutable state — the
//! read-only [`ExecutionContext`] carries the resource knobs, so executions
//! are re-entrant across threads. The first failure halts the run and is
//! surfaced with its step index and op name.

use log::debug;

use crate::error::ExecutionFailure;
use crate::frame::DataFrame;
use crate::input::{self, InputPayload};
use crate::ops::{aggregate, rows, shape, strings, structural};
use crate::output::{self, ExecuteResult};
use crate::program::{Program, Step};

/// Read-only resource knobs, configured once by the host.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    /// Upper bound on `scan` iterations.
    pub max_scan_steps: i64,
    /// Upper bound on expression nesting depth.
    pub max_expr_depth: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            max_scan_steps: 100_000,
            max_expr_depth: crate::expr::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Executes a recipe against an inline input with default resource bounds.
pub fn execute(program: &Program, payload: &InputPayload) -> Result<ExecuteResult, ExecutionFailure> {
    execute_with(&ExecutionContext::default(), program, payload)
}

pub fn execute_with(
    ctx: &ExecutionContext,
    program: &Program,
    payload: &InputPayload,
) -> Result<ExecuteResult, ExecutionFailure> {
    let mut frame = input::decode(payload)?;
    let mut nondeterministic = false;
    for (step_index, step) in program.steps.iter().enumerate() {
        debug!(
            "step {step_index} ({}): {} row(s) x {} column(s) in",
            step.op_name(),
            frame.height(),
            frame.width()
        );
        frame = apply_step(ctx, step, frame, &mut nondeterministic)
            .map_err(|err| err.at(step_index, step.op_name()))?;
    }
    Ok(output::serialize(&frame, nondeterministic))
}

fn apply_step(
    ctx: &ExecutionContext,
    step: &Step,
    frame: DataFrame,
    nondeterministic: &mut bool,
) -> Result<DataFrame, crate::error::StepError> {
    match step {
        Step::RegexExtract {
            column,
            pattern,
            group,
            as_column,
        } => strings::regex_extract(frame, column, pattern, *group, as_column),
        Step::RegexExtractMulti {
            column,
            pattern,
            as_columns,
        } => strings::regex_extract_multi(frame, column, pattern, as_columns),
        Step::RegexReplace {
            column,
            pattern,
            replacement,
            as_column,
        } => strings::regex_replace(frame, column, pattern, replacement, as_column.as_deref()),
        Step::ReplaceValues {
            column,
            mapping,
            as_column,
        } => strings::replace_values(frame, column, mapping, as_column.as_deref()),
        Step::Lookup {
            on,
            table,
            key_field,
            value_field,
            default,
            as_column,
        } => strings::lookup(
            frame,
            on,
            table,
            key_field,
            value_field,
            default.as_ref(),
            as_column.as_deref(),
        ),
        Step::Select { columns } => shape::select(frame, columns),
        Step::Rename { mapping } => shape::rename(frame, mapping),
        Step::Drop { columns } => shape::drop(frame, columns),
        Step::Cast { mapping } => shape::cast(frame, mapping),
        Step::FillNull { mapping } => shape::fill_null(frame, mapping),
        Step::Coalesce { columns, as_column } => {
            shape::coalesce(frame, columns, as_column.as_deref())
        }
        Step::FilterEq { column, value } => strings::filter_eq(frame, column, value),
        Step::FilterRegex { column, pattern } => strings::filter_regex(frame, column, pattern),
        Step::DropNa { columns } => shape::drop_na(frame, columns.as_deref()),
        Step::Slice { offset, length } => rows::slice(frame, *offset, *length),
        Step::Head { n } => rows::head(frame, *n),
        Step::Tail { n } => rows::tail(frame, *n),
        Step::Sample {
            n,
            frac,
            with_replacement,
            seed,
        } => rows::sample(frame, *n, *frac, *with_replacement, *seed, nondeterministic),
        Step::JsonExtract { expr, as_column } => structural::json_extract(frame, expr, as_column),
        Step::TakeEvery { n, offset } => rows::take_every(frame, *n, *offset),
        Step::AddRowNumber { as_column, start } => rows::add_row_number(frame, as_column, *start),
        Step::FilterExpr { expr } => rows::filter_expr(frame, expr, ctx.max_expr_depth),
        Step::ComputeExpr { expr, as_column } => {
            rows::compute_expr(frame, expr, as_column, ctx.max_expr_depth)
        }
        Step::ConcatColumns {
            columns,
            delimiter,
            as_column,
        } => strings::concat_columns(frame, columns, delimiter, as_column),
        Step::SplitColumn {
            column,
            delimiter,
            into,
            drop_original,
        } => strings::split_column(frame, column, delimiter, into, *drop_original),
        Step::SplitToRows {
            column,
            delimiter,
            as_column,
            drop_original,
        } => strings::split_to_rows(
            frame,
            column,
            delimiter,
            as_column.as_deref(),
            *drop_original,
        ),
        Step::ToDatetime {
            column,
            format,
            as_column,
        } => strings::to_datetime(frame, column, format.as_deref(), as_column.as_deref()),
        Step::Scan {
            init,
            init_from_rows,
            steps,
            steps_from_row,
            update,
            emit,
            as_column,
        } => structural::scan(
            frame,
            init,
            init_from_rows.as_deref(),
            *steps,
            steps_from_row.as_ref(),
            update,
            emit,
            as_column,
            ctx.max_scan_steps,
            ctx.max_expr_depth,
        ),
        Step::GroupByAgg { keys, aggregations } => {
            aggregate::group_by_agg(frame, keys, aggregations)
        }
        Step::SortBy {
            columns,
            descending,
        } => aggregate::sort_by(frame, columns, descending),
        Step::Distinct { columns } => shape::distinct(frame, columns.as_deref()),
        Step::Explode { columns } => structural::explode(frame, columns),
        Step::PivotWider {
            keys,
            column,
            values,
            agg,
        } => aggregate::pivot_wider(frame, keys, column, values, *agg),
        Step::PivotLonger {
            id_vars,
            value_vars,
            variable_name,
            value_name,
        } => aggregate::pivot_longer(
            frame,
            id_vars,
            value_vars.as_deref(),
            variable_name,
            value_name,
        ),
        Step::WindowCumsum {
            column,
            partition_by,
            as_column,
        } => aggregate::window_cumsum(frame, column, partition_by.as_deref(), as_column.as_deref()),
        Step::Rank {
            column,
            method,
            descending,
            partition_by,
            as_column,
        } => aggregate::rank(
            frame,
            column,
            *method,
            *descending,
            partition_by.as_deref(),
            as_column.as_deref(),
        ),
        Step::RollingMean {
            column,
            window,
            as_column,
        } => aggregate::rolling(frame, column, *window, as_column.as_deref(), true),
        Step::RollingSum {
            column,
            window,
            as_column,
        } => aggregate::rolling(frame, column, *window, as_column.as_deref(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_carry_step_index_and_op() {
        let program = Program::from_str(
            r#"{"steps": [
                {"op": "add_row_number"},
                {"op": "select", "columns": ["no_such"]}
            ]}"#,
        )
        .unwrap();
        let err = execute(&program, &InputPayload::text("a\nb")).unwrap_err();
        assert_eq!(err.kind(), "OpError");
        assert_eq!(err.step_index(), Some(1));
        assert_eq!(err.op_name(), Some("select"));
    }

    #[test]
    fn context_bounds_are_enforced() {
        let ctx = ExecutionContext {
            max_scan_steps: 10,
            ..ExecutionContext::default()
        };
        let program = Program::from_str(
            r#"{"steps": [{"op": "scan", "init": {"a": 0}, "steps": 11, "update": {"a": "a+1"}, "emit": "a"}]}"#,
        )
        .unwrap();
        let err = execute_with(&ctx, &program, &InputPayload::text("")).unwrap_err();
        assert_eq!(err.kind(), "OpError");
        assert_eq!(err.op_name(), Some("scan"));
    }

    #[test]
    fn empty_program_round_trips_the_input() {
        let result = execute(&Program::default(), &InputPayload::text("a\nb")).unwrap();
        assert_eq!(result.meta.rows, 2);
        assert_eq!(result.meta.columns, vec!["line"]);
    }
}
