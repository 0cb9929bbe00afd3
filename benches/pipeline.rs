use std::fmt::Write as _;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use recipe_engine::input::InputPayload;
use recipe_engine::interp;
use recipe_engine::program::Program;

fn generate_orders(rows: usize) -> InputPayload {
    let mut data = String::from("id,day,amount,status\n");
    for i in 0..rows {
        let status = match i % 3 {
            0 => "shipped",
            1 => "pending",
            _ => "processing",
        };
        let day = (i % 28) + 1;
        let amount = (i * 7) % 500;
        writeln!(data, "{i},2024-01-{day:02},{amount},{status}").expect("row");
    }
    InputPayload::csv(data)
}

fn transform_program() -> Program {
    Program::from_str(
        r#"{"steps": [
            {"op": "cast", "mapping": {"amount": "int"}},
            {"op": "filter_expr", "expr": "amount > 50 and status != 'pending'"},
            {"op": "compute_expr", "expr": "round_to(amount * 1.2, 2)", "as": "gross"},
            {"op": "group_by_agg", "keys": ["status", "day"], "aggregations": [
                {"column": "gross", "func": "sum", "as": "total"},
                {"func": "count", "as": "n"}
            ]},
            {"op": "sort_by", "columns": ["total"], "descending": true}
        ]}"#,
    )
    .expect("program parses")
}

fn scan_program() -> Program {
    Program::from_str(
        r#"{"steps": [{"op": "scan", "init": {"a": 1, "b": 1}, "steps": 10000, "update": {"a": "b", "b": "(a + b) % 1000000007"}, "emit": "a"}]}"#,
    )
    .expect("program parses")
}

fn bench_pipeline(c: &mut Criterion) {
    let program = transform_program();
    for rows in [1_000usize, 10_000] {
        let payload = generate_orders(rows);
        c.bench_function(&format!("transform_{rows}_rows"), |b| {
            b.iter_batched(
                || (program.clone(), payload.clone()),
                |(program, payload)| interp::execute(&program, &payload).expect("executes"),
                BatchSize::SmallInput,
            )
        });
    }

    let scan = scan_program();
    c.bench_function("scan_10k_iterations", |b| {
        b.iter_batched(
            || (scan.clone(), InputPayload::text("")),
            |(program, payload)| interp::execute(&program, &payload).expect("executes"),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
