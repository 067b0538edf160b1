//! Subprocess execution for the PHPUnit binary.
//!
//! [`ProcessExecutor`] resolves a binary (project-local copies first, then
//! `PATH`), optionally launches it through the PHP interpreter, runs it in
//! the project root and enforces a hard wall-clock timeout.
//!
//! A command that runs and exits non-zero is NOT an error here; that is how
//! PHPUnit reports failing tests. Errors are reserved for commands that could
//! not be started at all.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::Settings;

/// Result type for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors that prevent a command from running.
///
/// Both variants are configuration problems and are not retried.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// No usable binary was found locally or on `PATH`.
    #[error("Unable to find `{0}`: not installed in the project and not on PATH")]
    BinaryNotFound(String),

    /// The binary was found but could not be started.
    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A command to execute.
///
/// # Example
///
/// ```
/// use phpunit_mate::process::Command;
///
/// let cmd = Command::new("php")
///     .arg("vendor/bin/phpunit")
///     .args(["--filter", "testCreate"])
///     .timeout(300);
///
/// assert_eq!(cmd.to_shell_string(), "php vendor/bin/phpunit --filter testCreate");
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    /// The program/executable to run.
    pub program: String,

    /// Arguments to pass to the program.
    pub args: Vec<String>,

    /// Working directory; the current directory if `None`.
    pub working_dir: Option<PathBuf>,

    /// Maximum execution time in seconds.
    pub timeout_secs: Option<u64>,
}

impl Command {
    /// Creates a new command with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout_secs: None,
        }
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the execution timeout in seconds.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Renders the command as a shell-quoted string, for logging.
    pub fn to_shell_string(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }

    /// Runs the command to completion, capturing stdout and stderr.
    ///
    /// When the timeout elapses the child is killed and an `ExecResult` with
    /// exit code `-1` and `timed_out` set is returned. Output produced before
    /// the kill is discarded.
    pub async fn run(&self) -> ProcessResult<ExecResult> {
        let start = Instant::now();

        let mut process = tokio::process::Command::new(&self.program);
        process
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        tracing::debug!("Executing: {}", self.to_shell_string());

        let spawn_failed = |source| ProcessError::SpawnFailed {
            program: self.program.clone(),
            source,
        };

        let output = match self.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), process.output()).await {
                    Ok(output) => output.map_err(spawn_failed)?,
                    Err(_) => {
                        tracing::warn!("Command timed out after {}s: {}", secs, self.program);
                        return Ok(ExecResult {
                            exit_code: -1,
                            stdout: String::new(),
                            stderr: format!("Process timed out after {secs}s and was terminated"),
                            duration: start.elapsed(),
                            timed_out: true,
                        });
                    }
                }
            }
            None => process.output().await.map_err(spawn_failed)?,
        };

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
            timed_out: false,
        })
    }
}

/// Raw outcome of a finished (or killed) process.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code; `-1` when killed by a signal or by the timeout.
    pub exit_code: i32,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Wall-clock time the command took.
    pub duration: Duration,

    /// Whether the process was killed because it exceeded its timeout.
    pub timed_out: bool,
}

impl ExecResult {
    /// Returns `true` if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Returns the first of `candidates` that exists as a file. Relative
/// candidates are resolved against `root`.
pub fn resolve_local(root: &Path, candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

/// Resolves `name` to an executable path: project-local candidates first,
/// then a `PATH` lookup.
pub fn resolve_binary(name: &str, root: &Path, candidates: &[PathBuf]) -> Option<PathBuf> {
    resolve_local(root, candidates).or_else(|| which::which(name).ok())
}

/// Executes commands on behalf of the runner.
///
/// The runner only depends on this trait, which keeps it testable without a
/// PHP installation.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `command` with `args`, waiting at most `timeout_secs`.
    ///
    /// With `use_interpreter`, the resolved binary is launched through the
    /// PHP interpreter instead of directly.
    async fn execute(
        &self,
        command: &str,
        args: &[String],
        timeout_secs: u64,
        use_interpreter: bool,
    ) -> ProcessResult<ExecResult>;
}

/// Executes binaries from the project root.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    project_root: PathBuf,
    local_paths: Vec<PathBuf>,
    interpreter: String,
}

impl ProcessExecutor {
    /// Creates an executor that looks for `vendor/bin/phpunit` locally and
    /// uses `php` as interpreter.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            local_paths: vec![PathBuf::from("vendor/bin/phpunit")],
            interpreter: "php".to_string(),
        }
    }

    /// Creates an executor from settings.
    pub fn from_settings(settings: &Settings, project_root: impl Into<PathBuf>) -> Self {
        Self::new(project_root)
            .with_local_paths(settings.phpunit.local_paths.clone())
            .with_interpreter(settings.phpunit.interpreter.clone())
    }

    /// Sets the project-local binary locations.
    ///
    /// A location is considered for a command when its file name equals the
    /// command name.
    pub fn with_local_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.local_paths = paths;
        self
    }

    /// Sets the interpreter used when `use_interpreter` is requested.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Builds the command that [`Executor::execute`] would run.
    pub fn build_command(
        &self,
        command: &str,
        args: &[String],
        timeout_secs: u64,
        use_interpreter: bool,
    ) -> ProcessResult<Command> {
        let candidates: Vec<PathBuf> = self
            .local_paths
            .iter()
            .filter(|path| path.file_name().is_some_and(|name| name == command))
            .cloned()
            .collect();

        let binary = resolve_binary(command, &self.project_root, &candidates)
            .ok_or_else(|| ProcessError::BinaryNotFound(command.to_string()))?;

        tracing::debug!("Resolved {} to {}", command, binary.display());

        let binary = binary.to_string_lossy().into_owned();
        let cmd = if use_interpreter {
            let interpreter = which::which(&self.interpreter)
                .map_err(|_| ProcessError::BinaryNotFound(self.interpreter.clone()))?;
            Command::new(interpreter.to_string_lossy()).arg(binary)
        } else {
            Command::new(binary)
        };

        Ok(cmd
            .args(args.iter().cloned())
            .working_dir(&self.project_root)
            .timeout(timeout_secs))
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(
        &self,
        command: &str,
        args: &[String],
        timeout_secs: u64,
        use_interpreter: bool,
    ) -> ProcessResult<ExecResult> {
        self.build_command(command, args, timeout_secs, use_interpreter)?
            .run()
            .await
    }
}
