//! Helpers for running child processes with timeouts and bounded output.
//!
//! Every call reaps its child before returning. On unix the child leads its
//! own process group and the whole group is killed, so helpers it forked
//! cannot keep the output pipes open past the deadline.
//!
//! A descendant that leaves the group (for example through `setsid`) is out of
//! reach and keeps running. Once the child is reaped, its output readers get
//! [`READER_GRACE`] to finish; a reader still blocked after that is detached.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long output readers may keep draining after the child was reaped.
pub const READER_GRACE: Duration = Duration::from_millis(500);
const READER_POLL: Duration = Duration::from_millis(10);

/// Failure to run a child process to completion.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// A standard stream was not connected to a pipe.
    #[error("{0} was not piped")]
    Pipe(&'static str),
    /// Waiting on or killing the child failed.
    #[error("wait for child: {0}")]
    Wait(#[source] io::Error),
    /// Reading one of the output streams failed.
    #[error("read {stream}: {source}")]
    Read {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
    /// An output reader thread panicked.
    #[error("{0} reader thread panicked")]
    ReaderPanicked(&'static str),
    /// A process outside the child's group still holds the stream open.
    #[error("{0} still open after the child exited")]
    StreamHeldOpen(&'static str),
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// Wall-clock time from spawn until the child was reaped.
    pub elapsed: Duration,
}

/// Owns a spawned child until it has been reaped.
///
/// Dropping an unreaped guard kills the child and waits for it.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let status = self.child.wait_timeout(timeout)?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Kill the child (and its group) and reap it.
    fn terminate(&mut self) -> io::Result<ExitStatus> {
        kill_child(&mut self.child)?;
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = kill_child(&mut self.child) {
            warn!(err = %e, pid = self.child.id(), "failed to kill child on drop");
        }
        if let Err(e) = self.child.wait() {
            warn!(err = %e, pid = self.child.id(), "failed to reap child on drop");
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// If the child is still running after `timeout`, it is killed and `timed_out` is set.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes = output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(program = %program, "spawning child process");
    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = %program, "failed to spawn command");
            return Err(ProcessError::Spawn { program, source: e });
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut guard = ChildGuard::new(child);
    let stdout = stdout.ok_or(ProcessError::Pipe("stdout"))?;
    let stderr = stderr.ok_or(ProcessError::Pipe("stderr"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let waited = wait_or_kill(&mut guard, timeout);
    let elapsed = start.elapsed();
    if waited.is_err() {
        // Unblock the readers before joining them.
        if let Err(e) = guard.terminate() {
            warn!(err = %e, "failed to terminate child after wait error");
        }
    }
    sweep_process_group(&guard.child);

    let reader_deadline = Instant::now() + READER_GRACE;
    let stdout = join_output(stdout_handle, "stdout", reader_deadline);
    let stderr = join_output(stderr_handle, "stderr", reader_deadline);

    let (status, timed_out) = waited.map_err(ProcessError::Wait)?;
    let (stdout, stdout_truncated) = discard_if_timed_out(stdout, timed_out)?;
    let (stderr, stderr_truncated) = discard_if_timed_out(stderr, timed_out)?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(
        exit_code = ?status.code(),
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        "command finished"
    );
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        elapsed,
    })
}

fn wait_or_kill(guard: &mut ChildGuard, timeout: Duration) -> io::Result<(ExitStatus, bool)> {
    match guard.wait_timeout(timeout)? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                pid = guard.child.id(),
                "command timed out, killing"
            );
            let status = guard.terminate()?;
            Ok((status, true))
        }
    }
}

fn join_output(
    handle: thread::JoinHandle<Result<(Vec<u8>, usize), io::Error>>,
    stream: &'static str,
    deadline: Instant,
) -> Result<(Vec<u8>, usize), ProcessError> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(stream, "output stream held open after child exit, detaching reader");
            return Err(ProcessError::StreamHeldOpen(stream));
        }
        thread::sleep(READER_POLL);
    }
    match handle.join() {
        Ok(result) => result.map_err(|source| ProcessError::Read { stream, source }),
        Err(_) => Err(ProcessError::ReaderPanicked(stream)),
    }
}

/// Output of a timed-out run is never shown, so a held-open stream is not an error there.
fn discard_if_timed_out(
    output: Result<(Vec<u8>, usize), ProcessError>,
    timed_out: bool,
) -> Result<(Vec<u8>, usize), ProcessError> {
    match output {
        Err(ProcessError::StreamHeldOpen(_)) if timed_out => Ok((Vec::new(), 0)),
        other => other,
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
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

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_child(child: &mut Child) -> io::Result<()> {
    signal_process_group(child.id())?;
    match child.kill() {
        Ok(()) => Ok(()),
        // Already exited; the group signal got there first.
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn kill_child(child: &mut Child) -> io::Result<()> {
    match child.kill() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e),
    }
}

/// Kill whatever is left in the child's process group after it exited.
#[cfg(unix)]
fn sweep_process_group(child: &Child) {
    if let Err(e) = signal_process_group(child.id()) {
        warn!(err = %e, pgid = child.id(), "failed to sweep process group");
    }
}

#[cfg(not(unix))]
fn sweep_process_group(_child: &Child) {}

/// Send SIGKILL to the process group led by `pid`. A group that no longer exists is not an error.
#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_process_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid targets the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}
