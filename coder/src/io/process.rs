//! Child process supervision with combined output, timeouts and cancellation.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancelSignal;

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long the output reader may lag behind the child's exit.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Captured child process output.
#[derive(Debug)]
pub struct CombinedOutput {
    pub status: ExitStatus,
    /// Interleaved stdout and stderr, as written to a terminal.
    pub output: Vec<u8>,
    /// Bytes drained from the pipe but not kept.
    pub truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CombinedOutput {
    pub fn truncated_notice(&self, label: &str) -> String {
        if self.truncated > 0 {
            format!("\n[{label} output truncated {} bytes]\n", self.truncated)
        } else {
            String::new()
        }
    }

    /// True only for a child that exited on its own with a success status.
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.status.success()
    }
}

/// Run a command with stdout and stderr sharing one pipe.
///
/// Output is read concurrently while the child runs, so a chatty child cannot
/// deadlock on a full pipe. `output_limit_bytes` bounds what is kept in memory.
/// The child runs in its own process group; the whole group is killed when
/// `timeout` elapses or `cancel` fires, and again if background processes
/// still hold the pipe after the child exits.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_combined(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancelSignal,
) -> Result<CombinedOutput> {
    let (reader, writer) = std::io::pipe().context("create output pipe")?;
    let writer_clone = writer.try_clone().context("clone output pipe")?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(writer_clone))
        .stderr(Stdio::from(writer));
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let spawned = cmd.spawn();
    // `Command` keeps its copies of the pipe writer open; the reader only sees
    // EOF once they are gone.
    drop(cmd);
    let mut child = match spawned {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let captured = Arc::new(Mutex::new(Captured::default()));
    let (done_tx, done_rx) = mpsc::channel();
    {
        let captured = Arc::clone(&captured);
        thread::spawn(move || {
            // The receiver is gone only if the caller already gave up on the output.
            let _ = done_tx.send(read_stream_limited(reader, output_limit_bytes, &captured));
        });
    }

    let started = Instant::now();
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        if cancel.is_cancelled() {
            warn!("cancellation requested, killing child");
            cancelled = true;
            break kill_and_wait(&mut child)?;
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            break kill_and_wait(&mut child)?;
        }
        let slice = POLL_INTERVAL.min(timeout - elapsed);
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
    };

    if !wait_for_reader(&done_rx)? {
        warn!("background processes hold the output pipe, killing process group");
        kill_process_group(child.id());
        if !wait_for_reader(&done_rx)? {
            warn!("output pipe still open, returning partial output");
        }
    }
    let (output, truncated) = take_captured(&captured)?;
    if truncated > 0 {
        warn!(truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CombinedOutput {
        status,
        output,
        truncated,
        timed_out,
        cancelled,
    })
}

#[derive(Debug, Default)]
struct Captured {
    buf: Vec<u8>,
    truncated: usize,
}

fn kill_and_wait(child: &mut Child) -> Result<ExitStatus> {
    kill_process_group(child.id());
    // The child may exit between the last wait and the kill.
    if let Err(err) = child.kill() {
        debug!(err = %err, "kill after exit");
    }
    child.wait().context("wait command after kill")
}

/// Kill every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let result = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -s KILL -- -{pid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = result {
        debug!(err = %err, pid, "failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Wait up to [`READER_GRACE`] for the reader to hit EOF. `Ok(false)` means the
/// pipe is still held open by someone.
fn wait_for_reader(done: &mpsc::Receiver<Result<()>>) -> Result<bool> {
    match done.recv_timeout(READER_GRACE) {
        Ok(result) => result.map(|()| true),
        Err(RecvTimeoutError::Timeout) => Ok(false),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn take_captured(captured: &Mutex<Captured>) -> Result<(Vec<u8>, usize)> {
    let mut guard = captured
        .lock()
        .map_err(|_| anyhow!("output buffer poisoned"))?;
    let Captured { buf, truncated } = std::mem::take(&mut *guard);
    Ok((buf, truncated))
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    captured: &Mutex<Captured>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut guard = captured
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(guard.buf.len());
        let keep = n.min(remaining);
        guard.buf.extend_from_slice(&chunk[..keep]);
        guard.truncated += n - keep;
    }
}
