//! Running agent child processes with a timeout and bounded output capture.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Where forwarded stderr lines are written while the child runs.
pub type StderrSink = Box<dyn Write + Send>;

/// Longest stderr piece held before it is forwarded and counted.
const STDERR_CHUNK_BYTES: u64 = 8192;

type StreamResult = Result<(Vec<u8>, usize)>;

/// The child could not be started. No process exists.
#[derive(Debug, Error)]
#[error("spawn {program}: {source}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// The deadline passed before the child exited or before its pipes closed.
    /// Output is not collected in that case.
    pub timed_out: bool,
}

impl CommandOutput {
    fn past_deadline(status: ExitStatus) -> Self {
        Self {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out: true,
        }
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Captured stderr, trimmed, with a truncation notice when bytes were dropped.
    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(" [stderr truncated {} bytes]", self.stderr_truncated));
        }
        text
    }
}

/// Run a command with a timeout, capturing stdout and stderr independently.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty child
/// cannot deadlock on a full pipe. `output_limit_bytes` bounds what is kept in memory
/// per stream; the rest is drained and counted. When `stderr_sink` is set, every stderr
/// line is also written there as soon as it is read.
///
/// The deadline covers both the child's exit and the draining of its pipes. On timeout
/// the child is killed and reaped before returning. The reader threads are detached
/// rather than joined: a grandchild that inherited the pipes must not be able to hold
/// the caller past its deadline, even after the child itself has exited.
#[instrument(
    skip_all,
    fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes)
)]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    stderr_sink: Option<StderrSink>,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(program = %program, "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(source) => {
            error!(program = %program, err = %source, "failed to spawn command");
            return Err(SpawnError { program, source }.into());
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let deadline = Instant::now() + timeout;
    let stdout_rx = spawn_reader(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_rx =
        spawn_reader(move || read_lines_limited_with_tee(stderr, output_limit_bytes, stderr_sink));

    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            debug!(exit_code = ?status.code(), "timed out command reaped");
            return Ok(CommandOutput::past_deadline(status));
        }
    };

    let (Some(stdout), Some(stderr)) = (
        recv_before(&stdout_rx, deadline),
        recv_before(&stderr_rx, deadline),
    ) else {
        warn!(
            timeout_secs = timeout.as_secs(),
            exit_code = ?status.code(),
            "command exited but its output pipes stayed open past the deadline"
        );
        return Ok(CommandOutput::past_deadline(status));
    };
    let (stdout, stdout_truncated) = stdout.context("read stdout")?;
    let (stderr, stderr_truncated) = stderr.context("read stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out: false,
    })
}

/// Run `read` on a detached thread and hand its result back over a channel.
fn spawn_reader<F>(read: F) -> Receiver<StreamResult>
where
    F: FnOnce() -> StreamResult + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the caller gave up on this stream.
        let _ = tx.send(read());
    });
    rx
}

/// `None` when the reader has not finished by `deadline`.
fn recv_before(rx: &Receiver<StreamResult>, deadline: Instant) -> Option<StreamResult> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => Some(result),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(anyhow!("output reader thread panicked"))),
    }
}

/// Read a stream line by line with a size limit, optionally tee-ing each line to `sink`.
///
/// Lines longer than [`STDERR_CHUNK_BYTES`] are handled in pieces, so a child that never
/// writes a newline cannot grow the line buffer past that size.
fn read_lines_limited_with_tee<R: Read>(
    reader: R,
    limit: usize,
    mut sink: Option<StderrSink>,
) -> StreamResult {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = (&mut buf_reader)
            .take(STDERR_CHUNK_BYTES)
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Some(writer) = sink.as_mut() {
            // Forwarding is best-effort; a closed stderr must not fail the agent call.
            if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
                debug!(err = %e, "failed to forward stderr line");
            }
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> StreamResult {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
