use crate::command::{CommandFactory, ExitCode};
use crate::error::{Result, ShellError};
use crate::executor::{PipelineExecutor, create_output};
use crate::parser::{self, CommandSpec, Pipeline};
use crate::vars::VariableStore;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Prompt printed before each interactive line.
pub const DEFAULT_PROMPT: &str = "xsh# ";

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate, i.e. builtins.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Whether the read-eval loop should keep going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A line interpreter that runs builtins in-process and everything else as
/// child processes.
///
/// Example
/// ```
/// use xsh::{Flow, Interpreter};
/// let mut sh = Interpreter::default();
/// let mut out = Vec::new();
/// sh.eval_line("set NAME world", &mut out, &mut std::io::sink());
/// sh.eval_line("echo hello $NAME", &mut out, &mut std::io::sink());
/// assert_eq!(out, b"hello world\n");
/// assert_eq!(sh.eval_line("exit", &mut out, &mut std::io::sink()), Flow::Exit);
/// ```
pub struct Interpreter {
    vars: VariableStore,
    builtins: Vec<Box<dyn CommandFactory>>,
    executor: PipelineExecutor,
    prompt: String,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of builtin factories.
    pub fn new(builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            vars: VariableStore::new(),
            builtins,
            executor: PipelineExecutor::new(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Evaluate one input line.
    ///
    /// Builtin output and background notices go to `out`; every error is
    /// reported to `err` as `xsh: <message>` and never ends the loop. Only
    /// the exact lines `quit` and `exit` return [`Flow::Exit`].
    pub fn eval_line(&mut self, line: &str, out: &mut dyn Write, err: &mut dyn Write) -> Flow {
        let line = line.trim_end_matches(['\n', '\r']);
        if line == "quit" || line == "exit" {
            return Flow::Exit;
        }

        if let Err(e) = self.try_eval(line, out, err) {
            debug!(error = ?e, "line failed");
            if writeln!(err, "xsh: {e}").is_err() {
                tracing::warn!(error = %e, "could not report error");
            }
        }
        Flow::Continue
    }

    fn try_eval(&mut self, line: &str, out: &mut dyn Write, err: &mut dyn Write) -> Result<()> {
        let Some(pipeline) = parser::parse_line(line)? else {
            return Ok(());
        };
        debug!(?pipeline, "parsed");

        if let Some(result) = self.try_builtin(&pipeline, out) {
            return result.map(|_| ());
        }

        self.executor.run(&pipeline, out, err)?;
        Ok(())
    }

    /// Run a single-stage line as a builtin, if its name is one.
    ///
    /// A `>` redirection applies to the builtin's output; `<` and `&` are
    /// accepted and ignored.
    fn try_builtin(&mut self, pipeline: &Pipeline, out: &mut dyn Write) -> Option<Result<ExitCode>> {
        if !pipeline.is_single() {
            return None;
        }
        let spec = &pipeline.stages[0];
        let created = self
            .builtins
            .iter()
            .find_map(|factory| factory.try_create(spec.name(), spec.args()))?;

        Some(created.and_then(|cmd| {
            debug!(builtin = spec.name(), "running builtin");
            match redirected_output(spec)? {
                Some(mut file) => cmd.execute(&mut file, &mut self.vars),
                None => cmd.execute(out, &mut self.vars),
            }
        }))
    }

    /// Read lines from `input` until end-of-input or `quit`/`exit`.
    ///
    /// Used when stdin is not a terminal; no prompt is printed. Lines are
    /// read as raw bytes and invalid UTF-8 is replaced rather than rejected,
    /// so only a read error ends the loop early.
    pub fn run_script<R: BufRead>(
        &mut self,
        mut input: R,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<()> {
        let mut buf = Vec::new();
        loop {
            self.executor.reap_background();
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if self.eval_line(&line, out, err) == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Interactive read-eval loop on the terminal.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut stdout = io::stdout();
        let mut stderr = io::stderr();

        loop {
            self.executor.reap_background();
            match rl.readline(&self.prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if self.eval_line(&line, &mut stdout, &mut stderr) == Flow::Exit {
                        break;
                    }
                }
                // no signal handling: a ^C just discards the line being typed
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

fn redirected_output(spec: &CommandSpec) -> Result<Option<std::fs::File>> {
    spec.output_file
        .as_deref()
        .map(|path| {
            create_output(path).map_err(|source| ShellError::RedirectionOpenFailed {
                path: path.to_path_buf(),
                source,
            })
        })
        .transpose()
}

impl Default for Interpreter {
    /// Create an interpreter with the default builtins:
    /// `cd`, `pwd`, `set`, `unset`, `echo`.
    fn default() -> Self {
        use crate::builtin::*;
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Set>::default()),
            Box::new(Factory::<Unset>::default()),
            Box::new(Factory::<Echo>::default()),
        ])
    }
}
