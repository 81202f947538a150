//! Shell command execution with a hard wall-clock timeout
//!
//! Every command runs through `sh -c` in its own process group. A timeout
//! takes down the whole tree the command started, and whatever is still
//! running in the group after the shell exits is killed as well.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{IrisError, Result};

/// How long to wait for pipes to drain once the process itself is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Exit status used when no status could be observed at all
const UNKNOWN_STATUS: i32 = -1;

/// Everything observed about one finished (or killed) command
#[derive(Debug, Clone)]
pub struct ShellOutput {
  /// Exit code, or `128 + signal` when the process was killed by a signal
  pub status: i32,
  pub stdout: String,
  pub stderr: String,
  pub timed_out: bool,
  pub duration: Duration,
}

fn shell_command(command: &str) -> Command {
  if cfg!(target_os = "windows") {
    let mut c = Command::new("cmd");
    c.args(["/C", command]);
    c
  } else {
    let mut c = Command::new("sh");
    c.args(["-c", command]);
    c
  }
}

fn status_code(status: ExitStatus) -> i32 {
  if let Some(code) = status.code() {
    return code;
  }
  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
      return 128 + signal;
    }
  }
  UNKNOWN_STATUS
}

/// Bytes read from one pipe so far, shared with its reader task
#[derive(Debug)]
struct Capture {
  buf: Arc<Mutex<Vec<u8>>>,
  task: JoinHandle<()>,
}

impl Capture {
  fn spawn<R>(stream: Option<R>) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let task = tokio::spawn(async move {
      let Some(mut stream) = stream else {
        return;
      };
      let mut chunk = [0u8; 8192];
      loop {
        match stream.read(&mut chunk).await {
          Ok(0) => break,
          Ok(n) => {
            sink.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&chunk[..n]);
          }
          Err(e) => {
            debug!("Output read stopped: {}", e);
            break;
          }
        }
      }
    });
    Self { buf, task }
  }

  /// Wait for end of stream; keeps what was read even if the pipe never closes
  async fn collect(mut self) -> String {
    match tokio::time::timeout(DRAIN_GRACE, &mut self.task).await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!("Output reader failed: {}", e),
      Err(_) => {
        warn!("Output pipe still open {:?} after the process ended", DRAIN_GRACE);
        self.task.abort();
      }
    }
    let bytes = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
  }
}

/// SIGKILL every process left in the group; false when the group is already empty
#[cfg(unix)]
fn kill_group(pgid: u32) -> bool {
  use nix::errno::Errno;
  use nix::sys::signal::{killpg, Signal};
  use nix::unistd::Pid;

  match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
    Ok(()) => true,
    Err(Errno::ESRCH) => false,
    Err(e) => {
      warn!("Failed to kill process group {}: {}", pgid, e);
      false
    }
  }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> bool {
  false
}

/// Run `command` through the shell in `cwd`, killing it after `limit`
///
/// Only a failure to launch the shell itself is an error; a non-zero exit
/// or a timeout is reported in the returned [`ShellOutput`].
pub async fn run_shell(command: &str, cwd: &Path, limit: Duration) -> Result<ShellOutput> {
  let mut cmd = shell_command(command);
  cmd
    .current_dir(cwd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  #[cfg(unix)]
  cmd.process_group(0);

  debug!("Running `{}` in {} (limit {:?})", command, cwd.display(), limit);
  let started = Instant::now();
  let mut child =
    cmd.spawn().map_err(|e| IrisError::process_spawn(command, e.to_string()))?;

  // the child leads its own group, so its pid is the group id
  let group = child.id();
  let stdout = Capture::spawn(child.stdout.take());
  let stderr = Capture::spawn(child.stderr.take());

  let (status, timed_out) = match tokio::time::timeout(limit, child.wait()).await {
    Ok(Ok(status)) => (status_code(status), false),
    Ok(Err(e)) => return Err(IrisError::process_spawn(command, e.to_string())),
    Err(_) => {
      warn!("`{}` exceeded {:?}; killing its process group", command, limit);
      if !group.is_some_and(kill_group) {
        let _ = child.start_kill();
      }
      let status = match child.wait().await {
        Ok(status) => status_code(status),
        Err(e) => {
          warn!("Failed to reap timed out process: {}", e);
          UNKNOWN_STATUS
        }
      };
      (status, true)
    }
  };

  // background children may still hold the pipes open
  if !timed_out && group.is_some_and(kill_group) {
    debug!("Killed processes left behind by `{}`", command);
  }

  let (stdout, stderr) = tokio::join!(stdout.collect(), stderr.collect());
  let output = ShellOutput { status, stdout, stderr, timed_out, duration: started.elapsed() };
  debug!("`{}` finished with status {} in {:?}", command, output.status, output.duration);
  Ok(output)
}
