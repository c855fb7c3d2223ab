//! CLI command handlers, one file per command.

mod completions;
mod fetch;
mod probe;

pub use completions::run_completions;
pub use fetch::run_fetch;
pub use probe::{run_probe, ProbeArgs};
