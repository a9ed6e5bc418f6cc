use crate::error::{Result, ShellError};
use crate::lexer::{self, Token, TokenKind};
use std::path::PathBuf;

/// One executable pipeline stage.
///
/// `argv[0]` is the program (or builtin) name and is never empty once the
/// spec has been built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name followed by its arguments.
    pub argv: Vec<String>,
    /// File to bind to standard input (`< path`).
    pub input_file: Option<PathBuf>,
    /// File to create or truncate and bind to standard output (`> path`).
    pub output_file: Option<PathBuf>,
    /// Whether this stage carried a `&` token.
    pub background: bool,
}

impl CommandSpec {
    pub fn name(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// Stages connected by pipes, in launch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<CommandSpec>,
    /// True when a `&` appeared anywhere in the line. The whole pipeline is
    /// then launched without waiting.
    pub background: bool,
}

impl Pipeline {
    pub fn is_single(&self) -> bool {
        self.stages.len() == 1
    }
}

struct SpecBuilder<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'t, 'a> SpecBuilder<'t, 'a> {
    fn from(tokens: &'t [Token<'a>]) -> Self {
        SpecBuilder { tokens, pos: 0 }
    }

    fn consume(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Redirection target: the token right after `<` or `>`, which must be a word.
    fn expect_target(&mut self, op: &str) -> Result<PathBuf> {
        match self.consume() {
            Some(token) if token.is_word() => Ok(PathBuf::from(token.text)),
            Some(token) => Err(ShellError::MalformedCommand(format!(
                "expected a file name after `{op}`, found `{}`",
                token.text
            ))),
            None => Err(ShellError::MalformedCommand(format!(
                "missing file name after `{op}`"
            ))),
        }
    }

    fn build(mut self) -> Result<CommandSpec> {
        let mut argv = Vec::new();
        let mut input_file = None;
        let mut output_file = None;
        let mut background = false;

        while let Some(token) = self.consume() {
            match token.kind {
                TokenKind::Background => background = true,
                TokenKind::RedirectIn => input_file = Some(self.expect_target(token.text)?),
                TokenKind::RedirectOut => output_file = Some(self.expect_target(token.text)?),
                TokenKind::Word => argv.push(token.text.to_string()),
                TokenKind::Pipe => {
                    return Err(ShellError::MalformedCommand(
                        "unexpected `|` inside a stage".to_string(),
                    ));
                }
            }
        }

        if argv.is_empty() {
            return Err(ShellError::MalformedCommand("empty command".to_string()));
        }

        Ok(CommandSpec {
            argv,
            input_file,
            output_file,
            background,
        })
    }
}

/// Split a token stream into per-stage slices on `|`.
///
/// `n` pipes always produce `n + 1` slices, some of which may be empty.
pub fn split_stages<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t [Token<'a>]> {
    tokens.split(|t| t.kind == TokenKind::Pipe).collect()
}

/// Build the spec for one stage.
///
/// Walks the tokens left to right: `&` marks background, `<` and `>` consume
/// the following token as a file name (the last one wins), everything else
/// is appended to `argv`.
pub fn build_spec(stage: &[Token<'_>]) -> Result<CommandSpec> {
    SpecBuilder::from(stage).build()
}

/// Parse a whole input line.
///
/// Returns `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<Pipeline>> {
    let tokens = lexer::tokenize(line);
    if tokens.is_empty() {
        return Ok(None);
    }

    let stages = split_stages(&tokens)
        .into_iter()
        .map(build_spec)
        .collect::<Result<Vec<_>>>()?;
    let background = stages.iter().any(|s| s.background);

    Ok(Some(Pipeline { stages, background }))
}
