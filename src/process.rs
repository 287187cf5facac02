#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    fs::File,
    path::Path,
    process::Stdio,
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{
    process::{Child, Command},
    time::timeout,
};

/// Drop guard that terminates a spawned child process. A test script that
/// outlives its deadline is killed here when the guard is dropped on the
/// timeout path.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child> {
        self.0
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// How a bounded test invocation ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The process ran to completion with the given exit status.
    Completed(std::process::ExitStatus),
    /// The deadline elapsed first; the process was killed and its result
    /// discarded.
    TimedOut,
}

/// Spawns `program` with `args`, working directory `cwd`, stdout and stderr
/// both appended to `log`, and waits at most `deadline`. Nothing is read
/// back into memory; the log file is the only record of the output.
///
/// A timeout is an expected outcome, not an error: the child is killed and
/// `RunOutcome::TimedOut` returned so the caller can continue with the next
/// test file.
pub async fn run_logged(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    cwd: &Path,
    log: &File,
    deadline: Duration,
) -> Result<RunOutcome> {
    let stdout = log.try_clone().context("failed to clone log handle for stdout")?;
    let stderr = log.try_clone().context("failed to clone log handle for stderr")?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    let mut guard = ChildDropGuard::new(cmd.spawn().context("failed to spawn test process")?);

    let status = match timeout(deadline, guard.child_mut()?.wait()).await {
        Ok(waited) => waited.context("failed to wait on test process")?,
        Err(_elapsed) => {
            // Guard kills the child on drop.
            return Ok(RunOutcome::TimedOut);
        }
    };

    guard.disarm();
    Ok(RunOutcome::Completed(status))
}
