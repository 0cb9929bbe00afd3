//! Per-operation contract tests driven through the public execute boundary.

mod common;

use common::{rows_json, run};
use recipe_engine::input::InputPayload;
use recipe_engine::interp;
use recipe_engine::program::Program;
use serde_json::json;

fn expect_failure(program: &str, payload: &InputPayload) -> recipe_engine::error::ExecutionFailure {
    let program = Program::from_str(program).expect("program parses");
    interp::execute(&program, payload).unwrap_err()
}

#[test]
fn rename_and_drop_reshape_columns() {
    let result = run(
        r#"{"steps": [
            {"op": "rename", "mapping": {"a": "alpha"}},
            {"op": "drop", "columns": ["b", "not_there"]}
        ]}"#,
        &InputPayload::csv("a,b,c\n1,2,3"),
    );
    assert_eq!(result.meta.columns, vec!["alpha", "c"]);
}

#[test]
fn rename_missing_old_name_fails() {
    let failure = expect_failure(
        r#"{"steps": [{"op": "rename", "mapping": {"zz": "y"}}]}"#,
        &InputPayload::csv("a\n1"),
    );
    assert_eq!(failure.kind(), "OpError");
    assert_eq!(failure.op_name(), Some("rename"));
}

#[test]
fn cast_unparseable_values_become_null_then_fill() {
    let result = run(
        r#"{"steps": [
            {"op": "cast", "mapping": {"v": "int"}},
            {"op": "fill_null", "mapping": {"v": -1}}
        ]}"#,
        &InputPayload::csv("v\n12\nnope\n"),
    );
    assert_eq!(rows_json(&result), json!([{"v": 12}, {"v": -1}]));
}

#[test]
fn coalesce_defaults_to_first_column_name() {
    let result = run(
        r#"{"steps": [{"op": "coalesce", "columns": ["a", "b"]}]}"#,
        &InputPayload::json(vec![json!({"a": null, "b": 7}), json!({"a": 1, "b": 2})]),
    );
    assert_eq!(
        rows_json(&result),
        json!([{"a": 7, "b": 7}, {"a": 1, "b": 2}])
    );
}

#[test]
fn slice_contract_is_half_open_with_clamping() {
    let payload = InputPayload::csv("v\n0\n1\n2\n3\n4");
    let result = run(
        r#"{"steps": [{"op": "slice", "offset": 1, "length": 2}]}"#,
        &payload,
    );
    assert_eq!(rows_json(&result), json!([{"v": "1"}, {"v": "2"}]));

    let failure = expect_failure(r#"{"steps": [{"op": "slice", "offset": -1}]}"#, &payload);
    assert_eq!(failure.kind(), "OpError");
    assert_eq!(failure.op_name(), Some("slice"));
}

#[test]
fn take_every_and_head_and_tail() {
    let payload = InputPayload::csv("v\n0\n1\n2\n3\n4\n5");
    let every = run(
        r#"{"steps": [{"op": "take_every", "n": 2, "offset": 1}]}"#,
        &payload,
    );
    assert_eq!(rows_json(&every), json!([{"v": "1"}, {"v": "3"}, {"v": "5"}]));

    let head = run(r#"{"steps": [{"op": "head", "n": 2}]}"#, &payload);
    assert_eq!(head.meta.rows, 2);
    let tail = run(r#"{"steps": [{"op": "tail", "n": 99}]}"#, &payload);
    assert_eq!(tail.meta.rows, 6);
}

#[test]
fn filter_eq_matches_nulls_and_exact_values() {
    let payload = InputPayload::json(vec![
        json!({"v": 1}),
        json!({"v": null}),
        json!({"v": "1"}),
    ]);
    let by_int = run(r#"{"steps": [{"op": "filter_eq", "column": "v", "value": 1}]}"#, &payload);
    assert_eq!(by_int.meta.rows, 1);
    let by_null = run(
        r#"{"steps": [{"op": "filter_eq", "column": "v", "value": null}]}"#,
        &payload,
    );
    assert_eq!(by_null.meta.rows, 1);
}

#[test]
fn replace_values_and_lookup_map_cells() {
    let payload = InputPayload::csv("code\nus\nfr\nxx");
    let replaced = run(
        r#"{"steps": [{"op": "replace_values", "column": "code", "mapping": {"us": "United States", "fr": "France"}}]}"#,
        &payload,
    );
    assert_eq!(
        rows_json(&replaced),
        json!([{"code": "United States"}, {"code": "France"}, {"code": "xx"}])
    );

    let looked_up = run(
        r#"{"steps": [{"op": "lookup", "on": "code", "table": [
            {"key": "us", "value": "USD"},
            {"key": "fr", "value": "EUR"}
        ], "default": "???", "as": "currency"}]}"#,
        &payload,
    );
    assert_eq!(
        rows_json(&looked_up),
        json!([
            {"code": "us", "currency": "USD"},
            {"code": "fr", "currency": "EUR"},
            {"code": "xx", "currency": "???"}
        ])
    );
}

#[test]
fn lookup_honors_custom_field_names() {
    let result = run(
        r#"{"steps": [{"op": "lookup", "on": "n", "table": [
            {"from": 1, "to": "one"}
        ], "key_field": "from", "value_field": "to", "as": "word"}]}"#,
        &InputPayload::json(vec![json!({"n": 1}), json!({"n": 2})]),
    );
    assert_eq!(
        rows_json(&result),
        json!([{"n": 1, "word": "one"}, {"n": 2, "word": 2}])
    );
}

#[test]
fn split_to_rows_defaults_and_aliasing() {
    let aliased = run(
        r#"{"steps": [{"op": "split_to_rows", "column": "tags", "delimiter": ";", "as": "tag"}]}"#,
        &InputPayload::json(vec![json!({"id": 1, "tags": "a;b"}), json!({"id": 2, "tags": null})]),
    );
    assert_eq!(
        rows_json(&aliased),
        json!([
            {"id": 1, "tag": "a"},
            {"id": 1, "tag": "b"},
            {"id": 2, "tag": null}
        ])
    );
}

#[test]
fn explode_fans_out_json_lists() {
    let result = run(
        r#"{"steps": [{"op": "explode", "columns": ["tags"]}]}"#,
        &InputPayload::json(vec![
            json!({"id": 1, "tags": ["a", "b"]}),
            json!({"id": 2, "tags": []}),
        ]),
    );
    assert_eq!(
        rows_json(&result),
        json!([
            {"id": 1, "tags": "a"},
            {"id": 1, "tags": "b"},
            {"id": 2, "tags": null}
        ])
    );
}

#[test]
fn json_extract_traverses_nested_payloads() {
    let result = run(
        r#"{"steps": [{"op": "json_extract", "expr": "user.name", "as": "name"}]}"#,
        &InputPayload::json(vec![
            json!({"user": {"name": "ada"}}),
            json!({"user": {}}),
        ]),
    );
    assert_eq!(
        rows_json(&result),
        json!([
            {"user": {"name": "ada"}, "name": "ada"},
            {"user": {}, "name": null}
        ])
    );
}

#[test]
fn to_datetime_normalizes_or_nulls() {
    let result = run(
        r#"{"steps": [{"op": "to_datetime", "column": "ts", "format": "%d.%m.%Y %H:%M", "as": "dt"}]}"#,
        &InputPayload::csv("ts\n15.01.2024 10:30\ngarbage"),
    );
    assert_eq!(
        rows_json(&result),
        json!([
            {"ts": "15.01.2024 10:30", "dt": "2024-01-15T10:30:00"},
            {"ts": "garbage", "dt": null}
        ])
    );
}

#[test]
fn group_by_agg_covers_every_function() {
    let payload = InputPayload::json(vec![
        json!({"k": "a", "v": 1, "w": 2.0}),
        json!({"k": "a", "v": 3, "w": null}),
        json!({"k": "b", "v": 5, "w": 1.5}),
    ]);
    let result = run(
        r#"{"steps": [{"op": "group_by_agg", "keys": ["k"], "aggregations": [
            {"func": "count"},
            {"column": "v", "func": "sum"},
            {"column": "v", "func": "mean"},
            {"column": "v", "func": "min"},
            {"column": "v", "func": "max"},
            {"column": "v", "func": "first"},
            {"column": "v", "func": "last"},
            {"column": "v", "func": "n_unique"},
            {"column": "v", "func": "concat_str", "delimiter": "-", "as": "joined"}
        ]}]}"#,
        &payload,
    );
    assert_eq!(
        result.meta.columns,
        vec![
            "k", "count", "v_sum", "v_mean", "v_min", "v_max", "v_first", "v_last", "v_n_unique",
            "joined"
        ]
    );
    assert_eq!(
        rows_json(&result)[0],
        json!({
            "k": "a", "count": 2, "v_sum": 4, "v_mean": 2.0, "v_min": 1, "v_max": 3,
            "v_first": 1, "v_last": 3, "v_n_unique": 2, "joined": "1-3"
        })
    );
}

#[test]
fn sort_by_mixed_type_column_is_a_type_mismatch() {
    let failure = expect_failure(
        r#"{"steps": [{"op": "sort_by", "columns": ["v"]}]}"#,
        &InputPayload::json(vec![json!({"v": 1}), json!({"v": "two"})]),
    );
    assert_eq!(failure.kind(), "OpError");
    assert!(failure.to_string().contains("mixed"));
}

#[test]
fn sort_by_per_column_directions() {
    let result = run(
        r#"{"steps": [{"op": "sort_by", "columns": ["k", "v"], "descending": [false, true]}]}"#,
        &InputPayload::json(vec![
            json!({"k": "a", "v": 1}),
            json!({"k": "a", "v": 3}),
            json!({"k": "b", "v": 2}),
        ]),
    );
    assert_eq!(
        rows_json(&result),
        json!([
            {"k": "a", "v": 3},
            {"k": "a", "v": 1},
            {"k": "b", "v": 2}
        ])
    );
}

#[test]
fn pivot_wider_aggregates_buckets() {
    let result = run(
        r#"{"steps": [{"op": "pivot_wider", "keys": ["id"], "column": "m", "values": "v", "agg": "sum"}]}"#,
        &InputPayload::json(vec![
            json!({"id": "r1", "m": "a", "v": 1}),
            json!({"id": "r1", "m": "a", "v": 2}),
            json!({"id": "r1", "m": "b", "v": 5}),
        ]),
    );
    assert_eq!(rows_json(&result), json!([{"id": "r1", "a": 3, "b": 5}]));
}

#[test]
fn window_and_rolling_ops_compose() {
    let result = run(
        r#"{"steps": [
            {"op": "cast", "mapping": {"v": "int"}},
            {"op": "window_cumsum", "column": "v", "as": "c"},
            {"op": "rolling_mean", "column": "v", "window": 2, "as": "rm"},
            {"op": "rank", "column": "v", "method": "ordinal", "descending": true, "as": "r"}
        ]}"#,
        &InputPayload::csv("v\n3\n1\n2"),
    );
    assert_eq!(
        rows_json(&result),
        json!([
            {"v": 3, "c": 3, "rm": null, "r": 1},
            {"v": 1, "c": 4, "rm": 2.0, "r": 3},
            {"v": 2, "c": 6, "rm": 1.5, "r": 2}
        ])
    );
}

#[test]
fn compute_expr_overwrites_existing_columns() {
    let result = run(
        r#"{"steps": [{"op": "compute_expr", "expr": "upper(name)", "as": "name"}]}"#,
        &InputPayload::csv("name\nada\ngrace"),
    );
    assert_eq!(rows_json(&result), json!([{"name": "ADA"}, {"name": "GRACE"}]));
}

#[test]
fn expression_failure_names_the_expression() {
    let failure = expect_failure(
        r#"{"steps": [{"op": "filter_expr", "expr": "v + 1 >"}]}"#,
        &InputPayload::csv("v\n1"),
    );
    assert_eq!(failure.kind(), "ExprError");
    assert!(failure.to_string().contains("v + 1 >"));
}

#[test]
fn null_arithmetic_is_an_expression_error() {
    let failure = expect_failure(
        r#"{"steps": [{"op": "compute_expr", "expr": "v + 1", "as": "out"}]}"#,
        &InputPayload::json(vec![json!({"v": null})]),
    );
    assert_eq!(failure.kind(), "ExprError");
    assert!(failure.to_string().contains("null"));
}

#[test]
fn add_row_number_defaults() {
    let result = run(
        r#"{"steps": [{"op": "add_row_number"}]}"#,
        &InputPayload::text("a\nb"),
    );
    assert_eq!(
        rows_json(&result),
        json!([{"line": "a", "row_index": 0}, {"line": "b", "row_index": 1}])
    );
}

#[test]
fn validation_rejects_unknown_ops_before_execution() {
    let failure = Program::from_str(r#"{"steps": [{"op": "transmogrify"}]}"#).unwrap_err();
    assert_eq!(failure.kind(), "ValidationError");
    assert_eq!(failure.step_index(), Some(0));
}
