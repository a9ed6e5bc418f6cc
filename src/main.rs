use argh::FromArgs;
use std::io::{self, IsTerminal};
use xsh::Interpreter;
use xsh::logging::init_logging;

#[derive(FromArgs)]
/// A tiny shell: builtins, pipes, redirections and background jobs.
struct Args {
    /// prompt shown before each interactive line
    #[argh(option, default = "String::from(\"xsh# \")")]
    prompt: String,

    /// log level: error, warn, info, debug or trace (overrides XSH_LOG)
    #[argh(option)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    init_logging(args.log_level.as_deref())?;

    let mut shell = Interpreter::default().with_prompt(args.prompt);
    let stdin = io::stdin();
    if stdin.is_terminal() {
        shell.repl()?;
    } else {
        shell.run_script(stdin.lock(), &mut io::stdout(), &mut io::stderr())?;
    }

    Ok(())
}
