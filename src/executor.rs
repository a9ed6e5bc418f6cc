//! Launching pipelines of external programs.
//!
//! Wiring is decided up front by [`plan`]: every stage gets a [`Source`] for
//! its standard input and a [`Sink`] for its standard output. Only then are
//! the pipes created and the stages spawned, in order.
//!
//! Pipes come from [`std::io::pipe`] and are close-on-exec, so a child only
//! ever holds the two ends installed as its stdin and stdout. The parent
//! drops its copies of a stage's ends as soon as that stage has been
//! spawned (or has failed to spawn), which is what lets downstream readers
//! see end-of-stream.

use crate::command::ExitCode;
use crate::error::{Result, ShellError};
use crate::external::resolve_program;
use crate::parser::{CommandSpec, Pipeline};
use std::fs::{File, OpenOptions};
use std::io::{self, PipeReader, PipeWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, info, warn};

/// Where a stage reads its standard input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The shell's own stdin.
    Inherit,
    /// `< path`, opened read-only.
    File(PathBuf),
    /// The read end of pipe `i`.
    Pipe(usize),
}

/// Where a stage writes its standard output to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// The shell's own stdout.
    Inherit,
    /// `> path`, created or truncated with mode 0644.
    File(PathBuf),
    /// The write end of pipe `i`.
    Pipe(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWiring {
    pub source: Source,
    pub sink: Sink,
}

/// Compute the wiring for every stage of a pipeline.
///
/// Pipe `i` connects stage `i` to stage `i + 1`. A file redirection on a
/// stage takes precedence over the pipe on that side; the displaced pipe
/// end is simply never handed to anyone.
pub fn plan(pipeline: &Pipeline) -> Vec<StageWiring> {
    let last = pipeline.stages.len().saturating_sub(1);
    pipeline
        .stages
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let source = match &spec.input_file {
                Some(path) => Source::File(path.clone()),
                None if i > 0 => Source::Pipe(i - 1),
                None => Source::Inherit,
            };
            let sink = match &spec.output_file {
                Some(path) => Sink::File(path.clone()),
                None if i < last => Sink::Pipe(i),
                None => Sink::Inherit,
            };
            StageWiring { source, sink }
        })
        .collect()
}

/// What happened to one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Foreground stage ran to completion.
    Exited(ExitCode),
    /// Background stage was launched with this pid and is not waited for.
    Running(u32),
    /// The stage never started: redirection or launch failure.
    Failed(ExitCode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub stages: Vec<StageOutcome>,
}

impl PipelineOutcome {
    /// Status of the last stage, the way shells report a pipeline's status.
    pub fn last_status(&self) -> Option<ExitCode> {
        match self.stages.last()? {
            StageOutcome::Exited(code) | StageOutcome::Failed(code) => Some(*code),
            StageOutcome::Running(_) => None,
        }
    }
}

/// Both ends of one pipe as still owned by the parent.
struct PipeEdge {
    reader: Option<PipeReader>,
    writer: Option<PipeWriter>,
}

impl PipeEdge {
    fn open() -> Result<Self> {
        let (reader, writer) = io::pipe().map_err(ShellError::PipeCreationFailed)?;
        Ok(PipeEdge {
            reader: Some(reader),
            writer: Some(writer),
        })
    }
}

struct BackgroundJob {
    pid: u32,
    program: String,
    child: Child,
}

/// Spawns pipelines and keeps track of the ones left running in the background.
#[derive(Default)]
pub struct PipelineExecutor {
    jobs: Vec<BackgroundJob>,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch every stage of `pipeline`.
    ///
    /// Per-stage failures are written to `err` and recorded in the outcome;
    /// they do not stop the remaining stages from launching. Foreground
    /// pipelines are waited on in full. Background pipelines report their
    /// pids to `out` and return at once.
    ///
    /// Only failing to create the pipes themselves is returned as an error,
    /// in which case nothing has been spawned.
    pub fn run(
        &mut self,
        pipeline: &Pipeline,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<PipelineOutcome> {
        let wiring = plan(pipeline);
        let mut edges = (1..pipeline.stages.len())
            .map(|_| PipeEdge::open())
            .collect::<Result<Vec<_>>>()?;
        debug!(stages = pipeline.stages.len(), background = pipeline.background, "launching pipeline");

        // Anything the shell printed must land before the children's output.
        report(out.flush());

        let mut outcomes = Vec::with_capacity(pipeline.stages.len());
        let mut children = Vec::new();
        for (i, (spec, wiring)) in pipeline.stages.iter().zip(&wiring).enumerate() {
            let launched = launch(spec, wiring, &mut edges);
            release_stage_ends(&mut edges, i);

            match launched {
                Ok(child) => {
                    debug!(stage = i, pid = child.id(), program = spec.name(), "spawned");
                    outcomes.push(StageOutcome::Running(child.id()));
                    children.push((i, child));
                }
                Err(e) => {
                    warn!(stage = i, program = spec.name(), error = %e, "stage failed to start");
                    report(writeln!(err, "xsh: {e}"));
                    outcomes.push(StageOutcome::Failed(e.exit_code()));
                }
            }
        }

        if pipeline.background {
            for (i, child) in children {
                let pid = child.id();
                report(writeln!(out, "Process {pid} running in background"));
                info!(pid, program = pipeline.stages[i].name(), "running in background");
                self.jobs.push(BackgroundJob {
                    pid,
                    program: pipeline.stages[i].name().to_string(),
                    child,
                });
            }
            report(out.flush());
        } else {
            for (i, mut child) in children {
                outcomes[i] = match child.wait() {
                    Ok(status) => {
                        let code = exit_code(status);
                        debug!(stage = i, code, "stage exited");
                        StageOutcome::Exited(code)
                    }
                    Err(e) => {
                        warn!(stage = i, error = %e, "wait failed");
                        StageOutcome::Failed(1)
                    }
                };
            }
        }

        Ok(PipelineOutcome { stages: outcomes })
    }

    /// Collect background jobs that have finished, without blocking.
    ///
    /// Returns the pid and status of each job reaped by this call.
    pub fn reap_background(&mut self) -> Vec<(u32, ExitCode)> {
        let mut finished = Vec::new();
        self.jobs.retain_mut(|job| match job.child.try_wait() {
            Ok(Some(status)) => {
                let code = exit_code(status);
                info!(pid = job.pid, program = %job.program, code, "background job finished");
                finished.push((job.pid, code));
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = job.pid, error = %e, "could not poll background job");
                false
            }
        });
        finished
    }

    /// Number of background jobs not reaped yet.
    pub fn background_jobs(&self) -> usize {
        self.jobs.len()
    }
}

/// Once a stage is spawned it must still be waited on or kept as a job, so
/// failing to print a notice never cuts `run` short.
fn report(written: io::Result<()>) {
    if let Err(e) = written {
        warn!(error = %e, "could not write shell notice");
    }
}

/// Open the redirections, resolve the program and spawn one stage.
///
/// The `Command` (and with it every descriptor handed to it) is dropped on
/// return, whether or not the spawn succeeded.
fn launch(spec: &CommandSpec, wiring: &StageWiring, edges: &mut [PipeEdge]) -> Result<Child> {
    let stdin = match &wiring.source {
        Source::Inherit => Stdio::inherit(),
        Source::File(path) => File::open(path)
            .map(Stdio::from)
            .map_err(|source| ShellError::RedirectionOpenFailed {
                path: path.clone(),
                source,
            })?,
        Source::Pipe(k) => edges[*k].reader.take().map_or_else(Stdio::null, Stdio::from),
    };
    let stdout = match &wiring.sink {
        Sink::Inherit => Stdio::inherit(),
        Sink::File(path) => create_output(path)
            .map(Stdio::from)
            .map_err(|source| ShellError::RedirectionOpenFailed {
                path: path.clone(),
                source,
            })?,
        Sink::Pipe(k) => edges[*k].writer.take().map_or_else(Stdio::null, Stdio::from),
    };

    let program = resolve_program(spec.name())?;
    let mut cmd = Command::new(&program);
    cmd.args(spec.args()).stdin(stdin).stdout(stdout);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.arg0(spec.name());
    }

    cmd.spawn().map_err(|e| ShellError::ExecutionLaunchFailed {
        program: spec.name().to_string(),
        reason: e.to_string(),
    })
}

/// Drop the parent's copies of the pipe ends that belong to stage `i`,
/// including ones displaced by a file redirection.
fn release_stage_ends(edges: &mut [PipeEdge], i: usize) {
    if let Some(upstream) = i.checked_sub(1).and_then(|k| edges.get_mut(k)) {
        upstream.reader = None;
    }
    if let Some(downstream) = edges.get_mut(i) {
        downstream.writer = None;
    }
}

/// Open `path` for writing, creating it with mode 0644 or truncating it.
pub(crate) fn create_output(path: &std::path::Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

fn exit_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or_else(|| terminated_by_signal(status))
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    match exit_status.signal() {
        Some(signal) => 128 + signal,
        None => -1,
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> ExitCode {
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn pipeline(line: &str) -> Pipeline {
        parse_line(line).unwrap().unwrap()
    }

    struct Run {
        outcome: PipelineOutcome,
        out: String,
        err: String,
    }

    fn run(executor: &mut PipelineExecutor, line: &str) -> Run {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = executor.run(&pipeline(line), &mut out, &mut err).unwrap();
        Run {
            outcome,
            out: String::from_utf8(out).unwrap(),
            err: String::from_utf8(err).unwrap(),
        }
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn test_plan_single_stage() {
        let wiring = plan(&pipeline("ls"));
        assert_eq!(
            wiring,
            vec![StageWiring {
                source: Source::Inherit,
                sink: Sink::Inherit
            }]
        );
    }

    #[test]
    fn test_plan_three_stages() {
        let wiring = plan(&pipeline("a | b | c"));
        assert_eq!(wiring[0].source, Source::Inherit);
        assert_eq!(wiring[0].sink, Sink::Pipe(0));
        assert_eq!(wiring[1].source, Source::Pipe(0));
        assert_eq!(wiring[1].sink, Sink::Pipe(1));
        assert_eq!(wiring[2].source, Source::Pipe(1));
        assert_eq!(wiring[2].sink, Sink::Inherit);
    }

    #[test]
    fn test_plan_redirection_overrides_pipe() {
        let wiring = plan(&pipeline("a > x | b < y"));
        assert_eq!(wiring[0].sink, Sink::File(PathBuf::from("x")));
        assert_eq!(wiring[1].source, Source::File(PathBuf::from("y")));
    }

    #[test]
    fn test_three_stage_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let mut executor = PipelineExecutor::new();
        let r = run(
            &mut executor,
            &format!("printf foo | cat | cat > {}", path_str(&out)),
        );

        assert_eq!(r.outcome.stages, vec![StageOutcome::Exited(0); 3]);
        assert_eq!(r.err, "");
        assert_eq!(fs::read_to_string(&out).unwrap(), "foo");
    }

    #[test]
    fn test_output_redirection_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "previous content that is longer").unwrap();

        let mut executor = PipelineExecutor::new();
        run(&mut executor, &format!("printf X > {}", path_str(&out)));

        assert_eq!(fs::read_to_string(&out).unwrap(), "X");
    }

    #[test]
    fn test_created_output_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fresh.txt");
        create_output(&out).unwrap();

        let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        // the process umask can only clear bits
        assert_eq!(mode & !0o644, 0);
        assert_ne!(mode & 0o600, 0);
    }

    #[test]
    fn test_input_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "b\na\n").unwrap();

        let mut executor = PipelineExecutor::new();
        let r = run(
            &mut executor,
            &format!("sort < {} > {}", path_str(&input), path_str(&out)),
        );

        assert_eq!(r.outcome.last_status(), Some(0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_missing_program_fails_only_its_stage() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let mut executor = PipelineExecutor::new();
        let r = run(
            &mut executor,
            &format!("printf foo | nosuchprogram123 | cat > {}", path_str(&out)),
        );

        assert_eq!(r.outcome.stages[1], StageOutcome::Failed(127));
        assert!(matches!(r.outcome.stages[0], StageOutcome::Exited(_)));
        assert_eq!(r.outcome.stages[2], StageOutcome::Exited(0));
        assert!(r.err.contains("nosuchprogram123: command not found"));
        // downstream saw end-of-stream instead of hanging
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn test_unopenable_input_fails_only_its_stage() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let mut executor = PipelineExecutor::new();
        let r = run(
            &mut executor,
            &format!(
                "cat < /nonexistent/xsh_input | printf ok > {}",
                path_str(&out)
            ),
        );

        assert_eq!(r.outcome.stages[0], StageOutcome::Failed(1));
        assert_eq!(r.outcome.stages[1], StageOutcome::Exited(0));
        assert!(r.err.contains("/nonexistent/xsh_input"));
        assert_eq!(fs::read_to_string(&out).unwrap(), "ok");
    }

    #[test]
    fn test_unwritable_output_fails() {
        let mut executor = PipelineExecutor::new();
        let r = run(&mut executor, "printf x > /nonexistent/dir/out.txt");
        assert_eq!(r.outcome.stages, vec![StageOutcome::Failed(1)]);
        assert!(r.err.starts_with("xsh: /nonexistent/dir/out.txt"));
    }

    #[test]
    fn test_exit_status_is_recorded() {
        let mut executor = PipelineExecutor::new();
        let r = run(&mut executor, "false");
        assert_eq!(r.outcome.stages, vec![StageOutcome::Exited(1)]);
        assert_eq!(r.out, "");
    }

    #[test]
    fn test_background_returns_immediately_and_is_reaped() {
        let mut executor = PipelineExecutor::new();

        let started = Instant::now();
        let r = run(&mut executor, "sleep 1 &");
        assert!(started.elapsed() < Duration::from_millis(900));

        let pid = match r.outcome.stages[0] {
            StageOutcome::Running(pid) => pid,
            other => panic!("expected a running stage, got {other:?}"),
        };
        assert_eq!(r.out, format!("Process {pid} running in background\n"));
        assert_eq!(r.outcome.last_status(), None);
        assert_eq!(executor.background_jobs(), 1);

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut reaped = Vec::new();
        while reaped.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            reaped = executor.reap_background();
        }
        assert_eq!(reaped, vec![(pid, 0)]);
        assert_eq!(executor.background_jobs(), 0);
    }

    /// Sink that refuses every write, like a closed terminal.
    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_unwritable_error_stream_still_waits_on_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let mut executor = PipelineExecutor::new();
        let outcome = executor
            .run(
                &pipeline(&format!("nosuchprogram123 | printf ok > {}", path_str(&out))),
                &mut BrokenWriter,
                &mut BrokenWriter,
            )
            .unwrap();

        assert_eq!(outcome.stages[0], StageOutcome::Failed(127));
        assert_eq!(outcome.stages[1], StageOutcome::Exited(0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "ok");
    }

    #[test]
    fn test_unwritable_output_still_tracks_background_job() {
        let mut executor = PipelineExecutor::new();
        let outcome = executor
            .run(&pipeline("sleep 1 &"), &mut BrokenWriter, &mut BrokenWriter)
            .unwrap();

        assert!(matches!(outcome.stages[0], StageOutcome::Running(_)));
        assert_eq!(executor.background_jobs(), 1);
    }

    #[test]
    fn test_non_executable_program_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();

        let mut executor = PipelineExecutor::new();
        let r = run(&mut executor, path_str(&tool));

        assert_eq!(r.outcome.stages, vec![StageOutcome::Failed(126)]);
        assert!(r.err.contains("ermission denied"), "{:?}", r.err);
    }
}
