//! A tiny line-oriented shell.
//!
//! Each input line is split into whitespace-delimited tokens, grouped into
//! pipeline stages on `|`, and either handled in-process by a builtin
//! (`cd`, `pwd`, `set`, `unset`, `echo`) or launched as one child process per
//! stage with pipes and file redirections wired between them.
//!
//! The main entry point is [`Interpreter`]. The public modules [`vars`],
//! [`lexer`] and [`parser`] expose the shell-local variable store, the
//! tokenizer and the command builder so they can be used on their own.

mod builtin;
pub mod command;
pub mod error;
pub mod executor;
mod external;
mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod vars;

/// Convenient re-export of the line interpreter.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Flow, Interpreter};
pub use error::ShellError;
pub use vars::VariableStore;
