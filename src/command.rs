use crate::error::Result;
use crate::vars::VariableStore;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Object-safe trait for a command the shell runs in-process.
///
/// Builtins get this through a blanket impl.
pub trait ExecutableCommand {
    /// Executes the command, writing its output to `stdout`.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, vars: &mut VariableStore)
        -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize `name`, and
/// `Some(Err(_))` when it does but the arguments are unusable.
pub trait CommandFactory {
    fn try_create(&self, name: &str, args: &[String]) -> Option<Result<Box<dyn ExecutableCommand>>>;
}
