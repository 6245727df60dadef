//! Spawning interpreters and draining their output channels.

use std::ffi::OsString;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CanonicalSink, EvmBinary, EvmError, ProcessExit, RunOutcome};
use crate::canonical::{
    CanonSummary, Canonicalizer, RootFormat, canonicalize_lines, canonicalize_stream,
    finish_stream,
};

type TraceChannel = Box<dyn AsyncRead + Unpin + Send>;

/// Output channels carrying an interpreter's trace, in logical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channels {
    Stderr,
    Stdout,
    /// Trace on stderr, summary on stdout. Both are drained concurrently and
    /// stdout content is appended after stderr content.
    StderrThenStdout,
}

impl Channels {
    fn pipes_stdout(self) -> bool {
        matches!(self, Channels::Stdout | Channels::StderrThenStdout)
    }

    fn pipes_stderr(self) -> bool {
        matches!(self, Channels::Stderr | Channels::StderrThenStdout)
    }
}

/// A fully specified interpreter invocation.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    pub binary: &'a EvmBinary,
    pub name: &'a str,
    pub args: Vec<OsString>,
    pub channels: Channels,
    pub format: RootFormat,
}

/// Render a command line the way it is reported in diagnostics: the program
/// followed by its arguments, space separated and unquoted.
pub(crate) fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn with_deadline<F: Future>(deadline: Option<Duration>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Lines read from the secondary channel, shared with its drain task so they
/// survive the task being aborted.
type SecondaryLines = Arc<Mutex<Vec<Vec<u8>>>>;

/// Read a channel to the end, keeping every line.
async fn collect_lines<R: AsyncRead + Unpin>(channel: R, buffered: SecondaryLines) {
    let mut lines = BufReader::new(channel).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => buffered.lock().await.push(line),
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "secondary trace channel read failed, treating as end of stream");
                break;
            }
        }
    }
}

/// Canonicalize whatever the secondary channel produced so far.
async fn drain_buffered(
    canon: &mut Canonicalizer,
    buffered: &SecondaryLines,
    sink: &mut CanonicalSink<'_>,
) -> std::io::Result<()> {
    let lines = std::mem::take(&mut *buffered.lock().await);
    canonicalize_lines(canon, lines, sink).await
}

/// Close the canonical stream with its terminal record, also when the run
/// itself failed. The run's own error takes precedence over a sink error.
async fn finalize(
    canon: Canonicalizer,
    sink: &mut CanonicalSink<'_>,
    command: &str,
    exit: Result<ProcessExit, EvmError>,
) -> Result<(ProcessExit, CanonSummary), EvmError> {
    let finished = finish_stream(canon, sink)
        .await
        .map_err(|source| EvmError::sink(command, source));
    let exit = exit?;
    Ok((exit, finished?))
}

/// Spawn the interpreter and stream its canonical trace into `sink`.
///
/// The primary channel is canonicalized while the process runs. A secondary
/// channel, if any, is drained by its own task so a full pipe can never stall
/// the child; its lines are canonicalized after the primary channel ends.
/// When the deadline fires the child is killed and whatever was produced so
/// far is finalized with a terminal record.
pub(crate) async fn run(
    invocation: Invocation<'_>,
    sink: &mut CanonicalSink<'_>,
) -> Result<RunOutcome, EvmError> {
    let Invocation {
        binary,
        name,
        args,
        channels,
        format,
    } = invocation;
    let command = command_line(&binary.path, &args);

    let mut cmd = Command::new(&binary.path);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(if channels.pipes_stdout() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(if channels.pipes_stderr() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    debug!(evm = name, %command, "spawning interpreter");
    let mut child = cmd
        .spawn()
        .map_err(|source| EvmError::launch(&command, source))?;

    let (primary, secondary): (TraceChannel, Option<ChildStdout>) = match channels {
        Channels::Stderr => {
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| EvmError::pipe(&command, "stderr"))?;
            (Box::new(stderr), None)
        }
        Channels::Stdout => {
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| EvmError::pipe(&command, "stdout"))?;
            (Box::new(stdout), None)
        }
        Channels::StderrThenStdout => {
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| EvmError::pipe(&command, "stderr"))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| EvmError::pipe(&command, "stdout"))?;
            (Box::new(stderr), Some(stdout))
        }
    };
    let buffered = SecondaryLines::default();
    let mut secondary_task =
        secondary.map(|stdout| tokio::spawn(collect_lines(stdout, buffered.clone())));

    let mut canon = Canonicalizer::new(format);
    let drained = with_deadline(binary.timeout, async {
        canonicalize_stream(&mut canon, BufReader::new(primary), sink)
            .await
            .map_err(|source| EvmError::sink(&command, source))?;
        if let Some(task) = secondary_task.as_mut() {
            if let Err(err) = task.await {
                warn!(evm = name, %err, "secondary channel task failed");
            }
            drain_buffered(&mut canon, &buffered, sink)
                .await
                .map_err(|source| EvmError::sink(&command, source))?;
        }
        child
            .wait()
            .await
            .map(ProcessExit::from)
            .map_err(|source| EvmError::wait(&command, source))
    })
    .await;

    let exit = match drained {
        Some(exit) => exit,
        None => {
            warn!(evm = name, %command, "deadline elapsed, killing interpreter");
            if let Err(err) = child.kill().await {
                warn!(evm = name, %err, "failed to kill interpreter");
            }
            if let Some(task) = secondary_task.take() {
                task.abort();
                // Cancellation is the expected outcome here.
                let _ = task.await;
            }
            drain_buffered(&mut canon, &buffered, sink)
                .await
                .map_err(|source| EvmError::sink(&command, source))
                .map(|()| ProcessExit::TimedOut)
        }
    };

    let (exit, summary) = finalize(canon, sink, &command, exit).await?;

    if !exit.is_success() {
        warn!(evm = name, %exit, "interpreter exited abnormally");
    }
    info!(
        evm = name,
        steps = summary.steps,
        root = summary.state_root.as_deref().unwrap_or(""),
        %exit,
        "trace canonicalized"
    );

    Ok(RunOutcome {
        command,
        exit,
        summary,
    })
}
