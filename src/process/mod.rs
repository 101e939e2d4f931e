mod command;
mod shell;

pub use command::{CommandOutput, CommandSpec};
pub use shell::{DEFAULT_MAX_OUTPUT_BYTES, HostShell, SystemShell, run_capture, run_checked};
