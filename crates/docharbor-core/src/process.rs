//! Child-process execution teed into per-build log files
//!
//! Every external tool (git, uv, pyenv, sphinx-build) runs through this
//! module: explicit argument lists, no shell, a hard timeout that kills
//! the child, and stdout/stderr appended verbatim to the build log so
//! the log is tailable while the process runs.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

/// Errors raised while running an external tool
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with status {code}")]
    ExitStatus { program: String, code: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// One external command invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// Arguments to show in the log header instead of `args`, for
    /// invocations whose real arguments embed credentials
    pub display_args: Option<Vec<String>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: None,
            display_args: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn display_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.display_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    fn header_line(&self) -> String {
        let shown = self.display_args.as_ref().unwrap_or(&self.args);
        let cwd = self
            .cwd
            .as_deref()
            .map(|p| format!(" (cwd={})", p.display()))
            .unwrap_or_default();
        format!("$ {} {}{cwd}", self.program, shown.join(" "))
    }
}

/// Append-only handle on a build's log file.
///
/// Only the worker that owns the build writes it.
pub struct BuildLog {
    path: PathBuf,
    file: std::fs::File,
}

impl BuildLog {
    /// Open (creating parents as needed) the log file for appending
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a line, flushing so the log stays tailable
    pub fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }

    fn stdio_handle(&self) -> std::io::Result<std::fs::File> {
        self.file.try_clone()
    }
}

/// Run a command, streaming its combined output into the build log.
///
/// Returns an error on spawn failure, non-zero exit, or timeout; on
/// timeout the child is killed before returning.
pub async fn run_logged(spec: &CommandSpec, log: &mut BuildLog) -> Result<(), ProcessError> {
    debug!(program = %spec.program, "running command: {}", spec.header_line());
    log.append_line("")?;
    log.append_line(&spec.header_line())?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.stdio_handle()?))
        .stderr(Stdio::from(log.stdio_handle()?))
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let status = match spec.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(waited) => waited?,
            Err(_) => {
                child.kill().await.ok();
                let secs = timeout.as_secs();
                log.append_line(&format!("{} killed after {secs}s timeout", spec.program))?;
                error!(program = %spec.program, secs, "command timed out");
                return Err(ProcessError::Timeout { program: spec.program.clone(), secs });
            }
        },
        None => child.wait().await?,
    };

    if status.success() {
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        error!(program = %spec.program, code, "command failed");
        Err(ProcessError::ExitStatus { program: spec.program.clone(), code })
    }
}

/// Output captured from a command run without a log file
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run a command capturing stdout/stderr in memory.
///
/// Used for working-tree-free lookups (`git ls-remote`, `rev-parse`)
/// where the caller inspects output and exit code itself; only spawn
/// failures and timeouts are errors here.
pub async fn run_captured(spec: &CommandSpec) -> Result<CapturedOutput, ProcessError> {
    debug!(program = %spec.program, "running command: {}", spec.header_line());

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.envs {
        cmd.env(key, value);
    }

    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let output = match spec.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(waited) => waited?,
            Err(_) => {
                // wait_with_output consumed the child; kill_on_drop reaps it
                let secs = timeout.as_secs();
                error!(program = %spec.program, secs, "command timed out");
                return Err(ProcessError::Timeout { program: spec.program.clone(), secs });
            }
        },
        None => child.wait_with_output().await?,
    };

    Ok(CapturedOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
