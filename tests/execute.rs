//! End-to-end execution scenarios and the universal engine properties:
//! determinism, idempotence, shape invariants, and round-trips.

mod common;

use common::{rows_json, run};
use recipe_engine::input::InputPayload;
use recipe_engine::interp;
use recipe_engine::program::Program;
use serde_json::json;

// ---------------------------------------------------------------------------
// Seed scenarios
// ---------------------------------------------------------------------------

#[test]
fn digit_sum_over_text_lines() {
    let result = run(
        r#"{"steps": [{"op": "compute_expr", "expr": "safe_int(first_digit(line),0)+safe_int(last_digit(line),0)", "as": "line"}]}"#,
        &InputPayload::text("1abc2\n3def4"),
    );
    assert_eq!(rows_json(&result), json!([{"line": 3}, {"line": 7}]));
}

#[test]
fn csv_filter_and_sort() {
    let result = run(
        r#"{"steps": [
            {"op": "cast", "mapping": {"age": "int"}},
            {"op": "filter_expr", "expr": "age >= 30"},
            {"op": "sort_by", "columns": ["age"], "descending": true}
        ]}"#,
        &InputPayload::csv("name,age\nA,30\nB,25\nC,40"),
    );
    assert_eq!(
        rows_json(&result),
        json!([{"name": "C", "age": 40}, {"name": "A", "age": 30}])
    );
}

#[test]
fn group_and_aggregate() {
    let payload = InputPayload::json(vec![
        json!({"k": "x", "v": 1}),
        json!({"k": "x", "v": 2}),
        json!({"k": "y", "v": 5}),
    ]);
    let result = run(
        r#"{"steps": [
            {"op": "group_by_agg", "keys": ["k"], "aggregations": [
                {"column": "v", "func": "sum", "as": "s"},
                {"func": "count", "as": "n"}
            ]},
            {"op": "sort_by", "columns": ["k"]}
        ]}"#,
        &payload,
    );
    assert_eq!(
        rows_json(&result),
        json!([{"k": "x", "s": 3, "n": 2}, {"k": "y", "s": 5, "n": 1}])
    );
}

#[test]
fn fibonacci_scan_from_empty_input() {
    let result = run(
        r#"{"steps": [{"op": "scan", "init": {"a": 1, "b": 1}, "steps": 5, "update": {"a": "b", "b": "a+b"}, "emit": "a", "as": "line"}]}"#,
        &InputPayload::text(""),
    );
    assert_eq!(
        rows_json(&result),
        json!([{"line": 1}, {"line": 1}, {"line": 2}, {"line": 3}, {"line": 5}])
    );
}

#[test]
fn regex_extract_multi_into_parallel_columns() {
    let result = run(
        r#"{"steps": [
            {"op": "regex_extract_multi", "column": "line", "pattern": "(\\d{4})-(\\d{2})-(\\d{2})", "as": ["y", "m", "d"]},
            {"op": "select", "columns": ["y", "m", "d"]}
        ]}"#,
        &InputPayload::text("2024-01-15\n2025-12-31"),
    );
    assert_eq!(
        rows_json(&result),
        json!([
            {"y": "2024", "m": "01", "d": "15"},
            {"y": "2025", "m": "12", "d": "31"}
        ])
    );
}

#[test]
fn missing_column_is_an_op_error_with_position() {
    let program = Program::from_str(r#"{"steps": [{"op": "select", "columns": ["no_such"]}]}"#)
        .expect("program parses");
    let failure = interp::execute(&program, &InputPayload::text("anything")).unwrap_err();
    assert_eq!(failure.kind(), "OpError");
    assert_eq!(failure.step_index(), Some(0));
    assert_eq!(failure.op_name(), Some("select"));
    assert!(failure.to_string().contains("no_such"));
}

// ---------------------------------------------------------------------------
// Universal properties
// ---------------------------------------------------------------------------

#[test]
fn execution_is_deterministic_without_sample_or_clock() {
    let program = r#"{"steps": [
        {"op": "cast", "mapping": {"v": "float"}},
        {"op": "compute_expr", "expr": "round_to(v * 3 / 7, 4)", "as": "scaled"},
        {"op": "group_by_agg", "keys": ["k"], "aggregations": [
            {"column": "scaled", "func": "mean", "as": "m"},
            {"func": "count"}
        ]},
        {"op": "sort_by", "columns": ["m"], "descending": true}
    ]}"#;
    let payload = InputPayload::csv("k,v\na,1.5\nb,2.25\na,3.125\nc,0.5\nb,9");
    let first = run(program, &payload);
    for _ in 0..3 {
        assert_eq!(run(program, &payload), first);
    }
}

#[test]
fn seeded_sample_is_deterministic_and_flagged_otherwise() {
    let seeded = r#"{"steps": [{"op": "sample", "n": 3, "seed": 11}]}"#;
    let payload = InputPayload::csv("v\n1\n2\n3\n4\n5\n6");
    let first = run(seeded, &payload);
    assert_eq!(run(seeded, &payload), first);
    assert!(!first.meta.nondeterministic);

    let unseeded = run(r#"{"steps": [{"op": "sample", "n": 3}]}"#, &payload);
    assert!(unseeded.meta.nondeterministic);
    assert_eq!(unseeded.meta.rows, 3);
}

#[test]
fn select_distinct_drop_na_sort_are_idempotent() {
    let payload = InputPayload::json(vec![
        json!({"a": 3, "b": null}),
        json!({"a": 1, "b": "x"}),
        json!({"a": 3, "b": "y"}),
        json!({"a": 2, "b": "x"}),
    ]);
    for step in [
        r#"{"op": "select", "columns": ["a"]}"#,
        r#"{"op": "distinct", "columns": ["a"]}"#,
        r#"{"op": "drop_na"}"#,
        r#"{"op": "sort_by", "columns": ["a"]}"#,
    ] {
        let once = run(&format!(r#"{{"steps": [{step}]}}"#), &payload);
        let twice = run(&format!(r#"{{"steps": [{step}, {step}]}}"#), &payload);
        assert_eq!(once, twice, "not idempotent: {step}");
    }
}

#[test]
fn every_op_preserves_shape_invariants() {
    // A pipeline touching each op family; meta.columns unique and rows
    // consistent is the observable half of the frame invariant.
    let program = r#"{"steps": [
        {"op": "add_row_number", "as": "rn", "start": 0},
        {"op": "compute_expr", "expr": "safe_int(v, 0) * 2", "as": "double"},
        {"op": "concat_columns", "columns": ["k", "v"], "delimiter": ":", "as": "joined"},
        {"op": "split_column", "column": "joined", "delimiter": ":", "into": ["k2", "v2"]},
        {"op": "rank", "column": "double", "method": "dense", "as": "r"},
        {"op": "window_cumsum", "column": "double", "partition_by": ["k"], "as": "c"},
        {"op": "rolling_sum", "column": "double", "window": 2, "as": "rs"},
        {"op": "drop", "columns": ["joined"]}
    ]}"#;
    let result = run(program, &InputPayload::csv("k,v\na,1\nb,2\na,3"));
    let mut names = result.meta.columns.clone();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), result.meta.columns.len(), "duplicate columns");
    assert_eq!(result.meta.rows, result.output.len());
    for row in &result.output {
        assert_eq!(row.len(), result.meta.columns.len(), "ragged row object");
    }
}

#[test]
fn pivot_round_trip_reproduces_the_original() {
    let payload = InputPayload::json(vec![
        json!({"id": "r1", "metric": "a", "value": 1}),
        json!({"id": "r1", "metric": "b", "value": 2}),
        json!({"id": "r2", "metric": "a", "value": 3}),
        json!({"id": "r2", "metric": "b", "value": 4}),
    ]);
    let round_trip = run(
        r#"{"steps": [
            {"op": "pivot_wider", "keys": ["id"], "column": "metric", "values": "value", "agg": "first"},
            {"op": "pivot_longer", "id_vars": ["id"], "variable_name": "metric", "value_name": "value"},
            {"op": "sort_by", "columns": ["id", "metric"]}
        ]}"#,
        &payload,
    );
    let original = run(
        r#"{"steps": [{"op": "sort_by", "columns": ["id", "metric"]}]}"#,
        &payload,
    );
    assert_eq!(rows_json(&round_trip), rows_json(&original));
}

#[test]
fn split_of_concat_reproduces_the_originals() {
    let payload = InputPayload::csv("a,b\nx,1\ny,2");
    let result = run(
        r#"{"steps": [
            {"op": "concat_columns", "columns": ["a", "b"], "delimiter": "|", "as": "j"},
            {"op": "split_column", "column": "j", "delimiter": "|", "into": ["a2", "b2"], "drop_original": true},
            {"op": "compute_expr", "expr": "a == a2 and b == b2", "as": "same"},
            {"op": "filter_expr", "expr": "not same"}
        ]}"#,
        &payload,
    );
    assert_eq!(result.meta.rows, 0, "split/concat round trip diverged");
}

#[test]
fn regex_group_zero_equals_wrapped_group_one() {
    let payload = InputPayload::text("order-123\nno digits here\nitem-9");
    let zero = run(
        r#"{"steps": [{"op": "regex_extract", "column": "line", "pattern": "\\d+", "group": 0, "as": "n"}]}"#,
        &payload,
    );
    let wrapped = run(
        r#"{"steps": [{"op": "regex_extract", "column": "line", "pattern": "(\\d+)", "group": 1, "as": "n"}]}"#,
        &payload,
    );
    assert_eq!(rows_json(&zero), rows_json(&wrapped));
}

#[test]
fn scan_is_total_over_the_allowed_range() {
    for n in [0usize, 1, 100_000] {
        let program = format!(
            r#"{{"steps": [{{"op": "scan", "init": {{"x": 0}}, "steps": {n}, "update": {{"x": "x + 1"}}, "emit": "x"}}]}}"#
        );
        let result = run(&program, &InputPayload::text(""));
        assert_eq!(result.meta.rows, n);
        assert_eq!(result.meta.columns, vec!["value"]);
    }
}

#[test]
fn scan_above_the_bound_fails() {
    let program = Program::from_str(
        r#"{"steps": [{"op": "scan", "init": {"x": 0}, "steps": 100001, "update": {"x": "x"}, "emit": "x"}]}"#,
    )
    .expect("program parses");
    let failure = interp::execute(&program, &InputPayload::text("")).unwrap_err();
    assert_eq!(failure.kind(), "OpError");
}

#[test]
fn unsafe_expressions_fail_without_executing() {
    for expr in ["line.__class__", "line[0]", "unknown_name + 1", "open('x')"] {
        let program = Program::from_str(&format!(
            r#"{{"steps": [{{"op": "compute_expr", "expr": {}, "as": "out"}}]}}"#,
            serde_json::to_string(expr).unwrap()
        ))
        .expect("program parses");
        let failure = interp::execute(&program, &InputPayload::text("data")).unwrap_err();
        assert_eq!(failure.kind(), "ExprError", "expression: {expr}");
        assert_eq!(failure.step_index(), Some(0));
    }
}

// ---------------------------------------------------------------------------
// Decoder + pipeline seams
// ---------------------------------------------------------------------------

#[test]
fn auto_detected_json_flows_through_ops() {
    let payload = InputPayload {
        media_type: None,
        data: Some(recipe_engine::input::InputData::Text(
            r#"[{"n": 1}, {"n": 2}, {"n": 3}]"#.to_string(),
        )),
        options: Default::default(),
    };
    let result = run(
        r#"{"steps": [{"op": "filter_expr", "expr": "n >= 2"}]}"#,
        &payload,
    );
    assert_eq!(rows_json(&result), json!([{"n": 2}, {"n": 3}]));
}

#[test]
fn input_errors_surface_without_a_step_index() {
    let payload = InputPayload::csv("a,b\n1");
    let failure = interp::execute(&Program::default(), &payload).unwrap_err();
    assert_eq!(failure.kind(), "InputError");
    assert_eq!(failure.step_index(), None);
}

#[test]
fn scan_discards_prior_rows_by_contract() {
    let result = run(
        r#"{"steps": [
            {"op": "add_row_number", "as": "rn"},
            {"op": "scan", "init": {"x": 100}, "steps": 2, "update": {"x": "x + 1"}, "emit": "x", "as": "out"}
        ]}"#,
        &InputPayload::text("a\nb\nc"),
    );
    assert_eq!(result.meta.columns, vec!["out"]);
    assert_eq!(rows_json(&result), json!([{"out": 100}, {"out": 101}]));
}

#[test]
fn steps_from_row_drives_scan_length() {
    let result = run(
        r#"{"steps": [{"op": "scan", "init": {"x": 0}, "steps_from_row": {"column": "line", "row": 0}, "update": {"x": "x + 2"}, "emit": "x"}]}"#,
        &InputPayload::text("4"),
    );
    assert_eq!(
        rows_json(&result),
        json!([{"value": 0}, {"value": 2}, {"value": 4}, {"value": 6}])
    );
}
