//! Error taxonomy shared by the parser, builtins and executor.
//!
//! None of these are fatal to the read-eval loop: they are reported to the
//! user and the next line is read.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    /// Empty or structurally invalid token stream, or a builtin called with
    /// the wrong number of arguments.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("cd: {}: {source}", path.display())]
    DirectoryChangeFailed { path: PathBuf, source: io::Error },

    #[error("pwd: {0}")]
    PathResolutionFailed(#[source] io::Error),

    #[error("{}: {source}", path.display())]
    RedirectionOpenFailed { path: PathBuf, source: io::Error },

    /// `argv[0]` did not resolve to anything on `PATH`.
    #[error("{program}: command not found")]
    CommandNotFound { program: String },

    /// The program was found but the OS refused to start it.
    #[error("{program}: {reason}")]
    ExecutionLaunchFailed { program: String, reason: String },

    #[error("pipe failed: {0}")]
    PipeCreationFailed(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Status the affected stage is considered to have exited with.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::CommandNotFound { .. } => 127,
            ShellError::ExecutionLaunchFailed { .. } => 126,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
