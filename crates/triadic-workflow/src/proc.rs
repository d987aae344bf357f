//! Subprocess execution with a hard timeout.
//!
//! Version-control calls must never hang a hook. The child's pipes are
//! drained on reader threads while the parent polls for exit, so a chatty
//! subprocess cannot deadlock on a full pipe buffer; on deadline the child
//! is killed.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Default timeout for version-control subprocesses.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a bounded subprocess run.
#[derive(Debug)]
pub struct BoundedOutput {
    pub status_success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command, killing it if it outlives `timeout`.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<BoundedOutput> {
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = command.spawn().context("failed to spawn subprocess")?;

    let stdout = child.stdout.take().context("missing stdout pipe")?;
    let stderr = child.stderr.take().context("missing stderr pipe")?;

    let stdout_reader = thread::spawn(move || read_all(stdout));
    let stderr_reader = thread::spawn(move || read_all(stderr));

    let status = wait_with_deadline(&mut child, timeout)?;

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(BoundedOutput {
        status_success: status,
        stdout,
        stderr,
    })
}

fn read_all(mut pipe: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().context("failed to poll subprocess")? {
            return Ok(status.success());
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("subprocess timed out after {timeout:?}");
        }
        thread::sleep(Duration::from_millis(20));
    }
}
