use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::error::{Result, ShellError};
use crate::interpreter::Factory;
use crate::lexer::expand_word;
use crate::vars::VariableStore;
use std::env;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins parse their own arguments and run in-process without spawning a
/// child. They only apply to single-stage lines; inside a pipeline the same
/// name is looked up on `PATH` instead.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Validate the arguments (everything after the name).
    fn from_args(args: &[String]) -> Result<Self>;

    /// Executes the command against the shell's output and variables.
    fn execute(self, stdout: &mut dyn Write, vars: &mut VariableStore) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        vars: &mut VariableStore,
    ) -> Result<ExitCode> {
        T::execute(*self, stdout, vars)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[String]) -> Option<Result<Box<dyn ExecutableCommand>>> {
        if name != T::name() {
            return None;
        }
        Some(T::from_args(args).map(|cmd| Box::new(cmd) as Box<dyn ExecutableCommand>))
    }
}

/// Take exactly `N` arguments or fail with a usage message.
fn exact_args<const N: usize>(name: &str, usage: &str, args: &[String]) -> Result<[String; N]> {
    <[String; N]>::try_from(args.to_vec())
        .map_err(|_| ShellError::MalformedCommand(format!("usage: {name} {usage}")))
}

/// Print the current working directory to standard output.
pub struct Pwd;

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn from_args(_args: &[String]) -> Result<Self> {
        Ok(Pwd)
    }

    fn execute(self, stdout: &mut dyn Write, _vars: &mut VariableStore) -> Result<ExitCode> {
        let cwd = env::current_dir().map_err(ShellError::PathResolutionFailed)?;
        writeln!(stdout, "{}", cwd.display())?;
        Ok(0)
    }
}

/// Change the working directory of the shell process.
pub struct Cd {
    pub target: PathBuf,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn from_args(args: &[String]) -> Result<Self> {
        let [target] = exact_args(Self::name(), "<dir>", args)?;
        Ok(Cd {
            target: PathBuf::from(target),
        })
    }

    fn execute(self, _stdout: &mut dyn Write, _vars: &mut VariableStore) -> Result<ExitCode> {
        env::set_current_dir(&self.target).map_err(|source| ShellError::DirectoryChangeFailed {
            path: self.target.clone(),
            source,
        })?;
        tracing::debug!(dir = %self.target.display(), "changed directory");
        Ok(0)
    }
}

/// Bind a shell variable: `set NAME VALUE`.
pub struct Set {
    pub name: String,
    pub value: String,
}

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn from_args(args: &[String]) -> Result<Self> {
        let [name, value] = exact_args(Self::name(), "<name> <value>", args)?;
        if name.contains('=') {
            return Err(ShellError::MalformedCommand(format!(
                "set: invalid variable name `{name}`"
            )));
        }
        Ok(Set { name, value })
    }

    fn execute(self, _stdout: &mut dyn Write, vars: &mut VariableStore) -> Result<ExitCode> {
        vars.set(self.name, self.value);
        Ok(0)
    }
}

/// Remove a shell variable: `unset NAME`.
pub struct Unset {
    pub name: String,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn from_args(args: &[String]) -> Result<Self> {
        let [name] = exact_args(Self::name(), "<name>", args)?;
        Ok(Unset { name })
    }

    fn execute(self, _stdout: &mut dyn Write, vars: &mut VariableStore) -> Result<ExitCode> {
        vars.unset(&self.name);
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces, with a
/// trailing newline. Each argument goes through `$name` expansion first;
/// this is the only place the shell expands variables.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn from_args(args: &[String]) -> Result<Self> {
        Ok(Echo {
            args: args.to_vec(),
        })
    }

    fn execute(self, stdout: &mut dyn Write, vars: &mut VariableStore) -> Result<ExitCode> {
        let words: Vec<_> = self.args.iter().map(|a| expand_word(a, vars)).collect();
        writeln!(stdout, "{}", words.join(" "))?;
        Ok(0)
    }
}
