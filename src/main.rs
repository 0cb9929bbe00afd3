//! Entry point for the recipe-engine binary.
//!
//! Delegates to [`recipe_engine::run()`] and translates its `Result` into
//! process exit codes: `0` on success, `1` on any error.

fn main() {
    if recipe_engine::run().is_err() {
        std::process::exit(1);
    }
}
