#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use recipe_engine::input::InputPayload;
use recipe_engine::interp;
use recipe_engine::output::ExecuteResult;
use recipe_engine::program::Program;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Parses a recipe from JSON source and executes it against the payload,
/// expecting success.
pub fn run(program: &str, payload: &InputPayload) -> ExecuteResult {
    let program = Program::from_str(program).expect("program parses");
    interp::execute(&program, payload).expect("execution succeeds")
}

/// Rows of a result as JSON values, for terse assertions.
pub fn rows_json(result: &ExecuteResult) -> serde_json::Value {
    serde_json::to_value(&result.output).expect("rows serialize")
}
