pub mod builtins;
pub mod cli;
pub mod error;
pub mod expr;
pub mod frame;
pub mod input;
pub mod interp;
pub mod ops;
pub mod output;
pub mod program;
pub mod value;

use std::{
    env,
    fs::File,
    io::{Read, Write},
    path::Path,
    sync::OnceLock,
    time::Instant,
};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use log::{LevelFilter, error, info};

use crate::cli::{Cli, Commands, ExecuteArgs, ValidateArgs};
use crate::input::InputPayload;
use crate::interp::ExecutionContext;
use crate::output::FailureReport;
use crate::program::Program;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("recipe_engine", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Execute(args) => run_operation("execute", || handle_execute(&args)),
        Commands::Validate(args) => run_operation("validate", || handle_validate(&args)),
    }
}

fn run_operation<F>(name: &str, op: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let start_clock = Utc::now();
    let start_instant = Instant::now();
    let result = op();
    let end_clock = Utc::now();
    let duration_secs = start_instant.elapsed().as_secs_f64();
    let start_str = start_clock.to_rfc3339_opts(SecondsFormat::Millis, true);
    let end_str = end_clock.to_rfc3339_opts(SecondsFormat::Millis, true);

    match &result {
        Ok(_) => info!(
            "Operation '{name}' completed (status=ok)\nstart: {start_str}\nend: {end_str}\nduration_secs: {duration_secs:.3}"
        ),
        Err(err) => error!(
            "Operation '{name}' failed (status=error)\nstart: {start_str}\nend: {end_str}\nduration_secs: {duration_secs:.3}\nerror: {err:?}"
        ),
    }

    result
}

fn handle_execute(args: &ExecuteArgs) -> Result<()> {
    let program = load_program(&args.program)?;
    let payload = match &args.input {
        Some(path) => {
            let raw = read_source(path)?;
            serde_json::from_str::<InputPayload>(&raw)
                .with_context(|| format!("Parsing input payload from {path:?}"))?
        }
        None => InputPayload::text(""),
    };
    let ctx = ExecutionContext {
        max_scan_steps: args.max_scan_steps,
        max_expr_depth: args.max_expr_depth,
    };
    info!(
        "Executing recipe with {} step(s) from {:?}",
        program.steps.len(),
        args.program
    );
    match interp::execute_with(&ctx, &program, &payload) {
        Ok(result) => {
            let rendered = if args.pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            write_output(args.output.as_deref(), &rendered)?;
            info!(
                "Recipe produced {} row(s) x {} column(s)",
                result.meta.rows,
                result.meta.columns.len()
            );
            Ok(())
        }
        Err(failure) => {
            let report = FailureReport::from(&failure);
            let rendered = if args.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            write_output(args.output.as_deref(), &rendered)?;
            Err(anyhow::Error::new(failure).context("Recipe execution failed"))
        }
    }
}

fn handle_validate(args: &ValidateArgs) -> Result<()> {
    let program = load_program(&args.program)?;
    info!(
        "Recipe {:?} is structurally valid ({} step(s))",
        args.program,
        program.steps.len()
    );
    Ok(())
}

fn load_program(path: &Path) -> Result<Program> {
    let raw = read_source(path)?;
    match Program::from_str(&raw) {
        Ok(program) => Ok(program),
        Err(failure) => {
            let report = serde_json::to_string(&FailureReport::from(&failure))?;
            println!("{report}");
            Err(anyhow::Error::new(failure).context(format!("Validating recipe from {path:?}")))
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .lock()
            .read_to_string(&mut buffer)
            .context("Reading from stdin")?;
        return Ok(buffer);
    }
    let mut buffer = String::new();
    File::open(path)
        .with_context(|| format!("Opening {path:?}"))?
        .read_to_string(&mut buffer)
        .with_context(|| format!("Reading {path:?}"))?;
    Ok(buffer)
}

fn write_output(path: Option<&Path>, rendered: &str) -> Result<()> {
    match path {
        Some(path) if path != Path::new("-") => {
            let mut file =
                File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
            writeln!(file, "{rendered}").with_context(|| format!("Writing {path:?}"))
        }
        _ => {
            println!("{rendered}");
            Ok(())
        }
    }
}
