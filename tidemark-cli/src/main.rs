//! Tidemark CLI Tool
//!
//! Runs with no compiled-in units; applications embed [`tidemark_cli::run_with`]
//! with their own registries instead.

use std::process;
use tidemark_cli::{run_with, Registries};

fn main() {
    process::exit(run_with(Registries::default()));
}
