//! Building the submission
//!
//! Expands the compiler template for one submission, runs it in the
//! submission's directory and removes the produced executable afterwards.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CompilerConfig, NAME_PLACEHOLDER};
use crate::process::run_shell;
use crate::{IrisError, Result};

/// Exit status `sh` uses when the command could not be found
const COMMAND_NOT_FOUND: i32 = 127;

/// The single source file under audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
  pub source: PathBuf,
  /// Working directory for the build and every test run
  pub dir: PathBuf,
  /// File stem substituted for `{name}`
  pub name: String,
}

impl Submission {
  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
    let source = path.as_ref().to_path_buf();
    let name = source
      .file_stem()
      .and_then(|stem| stem.to_str())
      .filter(|stem| !stem.is_empty())
      .ok_or_else(|| IrisError::SourceRead {
        path: source.clone(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "source has no usable file name"),
      })?
      .to_string();
    let dir = match source.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };

    Ok(Self { source, dir, name })
  }

  /// File name as shown in reports, e.g. `main.c`
  pub fn file_name(&self) -> String {
    self
      .source
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.name.clone())
  }

  /// Candidate paths of the built executable
  pub fn executables(&self) -> [PathBuf; 2] {
    [self.dir.join(&self.name), self.dir.join(format!("{}.exe", self.name))]
  }
}

pub fn render_template(template: &str, name: &str) -> String {
  template.replace(NAME_PLACEHOLDER, name)
}

/// What a successful build printed
#[derive(Debug, Clone)]
pub struct BuildOutput {
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

/// Run the compiler; a non-zero exit is fatal to the test phase only
pub async fn build(submission: &Submission, compiler: &CompilerConfig) -> Result<BuildOutput> {
  let command = render_template(&compiler.cmd, &submission.name);
  info!("Compiling with `{}`", command);

  let out = run_shell(&command, &submission.dir, compiler.timeout()).await?;

  if out.timed_out {
    let mut stderr = out.stderr;
    stderr.push_str(&format!("compiler did not finish within {:?}\n", compiler.timeout()));
    return Err(IrisError::compile(out.status, out.stdout, stderr));
  }
  if out.status == COMMAND_NOT_FOUND {
    let message = match out.stderr.trim() {
      "" => "command not found".to_string(),
      text => text.to_string(),
    };
    return Err(IrisError::process_spawn(command, message));
  }
  if out.status != 0 {
    warn!("Compilation failed with status {}", out.status);
    return Err(IrisError::compile(out.status, out.stdout, out.stderr));
  }

  debug!("Build finished in {:?}", out.duration);
  Ok(BuildOutput { command, stdout: out.stdout, stderr: out.stderr, duration: out.duration })
}

/// Remove the built executable; returns the paths actually removed
pub fn cleanup(submission: &Submission) -> Vec<PathBuf> {
  let mut removed = Vec::new();
  for path in submission.executables() {
    if path == submission.source || !path.is_file() {
      continue;
    }
    match fs::remove_file(&path) {
      Ok(()) => {
        debug!("Removed {}", path.display());
        removed.push(path);
      }
      Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
  }
  removed
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn compiler(cmd: &str) -> CompilerConfig {
    CompilerConfig { cmd: cmd.to_string(), timeout_secs: 10.0 }
  }

  #[test]
  fn test_submission_from_path() {
    let sub = Submission::from_path("work/hw1/main.c").unwrap();
    assert_eq!(sub.name, "main");
    assert_eq!(sub.dir, PathBuf::from("work/hw1"));
    assert_eq!(sub.file_name(), "main.c");

    let bare = Submission::from_path("prog.c").unwrap();
    assert_eq!(bare.dir, PathBuf::from("."));

    assert!(Submission::from_path("/").is_err());
  }

  #[test]
  fn test_render_template() {
    assert_eq!(render_template("gcc {name}.c -o {name}", "hw"), "gcc hw.c -o hw");
    assert_eq!(render_template("./{name}", "a"), "./a");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_build_outcomes() {
    let dir = TempDir::new().unwrap();
    let sub = Submission::from_path(dir.path().join("hw.c")).unwrap();

    let ok = build(&sub, &compiler("touch {name} && echo built {name}")).await.unwrap();
    assert_eq!(ok.command, "touch hw && echo built hw");
    assert_eq!(ok.stdout, "built hw\n");
    assert!(dir.path().join("hw").exists());

    let failing = compiler("echo 'hw.c:1: error' >&2; exit 1 # {name}");
    let err = build(&sub, &failing).await.unwrap_err();
    match err {
      IrisError::Compile { status, stderr, .. } => {
        assert_eq!(status, 1);
        assert!(stderr.contains("hw.c:1: error"));
      }
      other => panic!("expected compile error, got {other:?}"),
    }

    let err = build(&sub, &compiler("no-such-compiler-xyz {name}.c")).await.unwrap_err();
    assert!(matches!(err, IrisError::ProcessSpawn { .. }));
  }

  #[test]
  fn test_cleanup_removes_executables_only() {
    let dir = TempDir::new().unwrap();
    let sub = Submission::from_path(dir.path().join("hw.c")).unwrap();
    fs::write(dir.path().join("hw.c"), "int main(void) { return 0; }").unwrap();
    fs::write(dir.path().join("hw"), "bin").unwrap();
    fs::write(dir.path().join("hw.exe"), "bin").unwrap();

    let removed = cleanup(&sub);
    assert_eq!(removed.len(), 2);
    assert!(dir.path().join("hw.c").exists());
    assert!(!dir.path().join("hw").exists());
    assert!(cleanup(&sub).is_empty());
  }

  #[test]
  fn test_cleanup_never_removes_the_source() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("script"), "x").unwrap();
    let sub = Submission::from_path(dir.path().join("script")).unwrap();
    assert!(cleanup(&sub).is_empty());
    assert!(dir.path().join("script").exists());
  }
}
