//! Bridges to the outside world: launching services and running shell commands.

pub mod launcher;
pub mod shell;

pub use launcher::*;
pub use shell::{run_shell, ShellError, ShellOutput};
