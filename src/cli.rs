use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Execute deterministic transform recipes over tabular data", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a recipe against an inline input payload and print the result as JSON
    Execute(ExecuteArgs),
    /// Structurally validate a recipe without executing it
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    /// Recipe JSON file ({"steps": [...]}); use '-' for stdin
    #[arg(short = 'p', long = "program")]
    pub program: PathBuf,
    /// Input payload JSON file ({media_type, data, options}); defaults to an empty text payload
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// Destination file for the result JSON (defaults to stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Pretty-print the result JSON
    #[arg(long)]
    pub pretty: bool,
    /// Upper bound on scan iterations
    #[arg(long = "max-scan-steps", default_value_t = 100_000)]
    pub max_scan_steps: i64,
    /// Upper bound on expression nesting depth
    #[arg(long = "max-expr-depth", default_value_t = 64)]
    pub max_expr_depth: usize,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Recipe JSON file to check; use '-' for stdin
    #[arg(short = 'p', long = "program")]
    pub program: PathBuf,
}
