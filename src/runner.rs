//! Runs PHPUnit and collects its JUnit XML report.
//!
//! Every run gets its own uniquely named temporary report file. PHPUnit is
//! told to write there with `--log-junit <path>`, and the returned
//! [`RunResult`] owns the file until it is cleaned up or dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::process::{Executor, ProcessError};

/// Name of the runner binary.
pub const PHPUNIT_BINARY: &str = "phpunit";

/// Default wall-clock limit for a run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Errors that abort a run before any report exists.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The temporary report file could not be created.
    #[error("Failed to create temporary file for JUnit XML: {0}")]
    TempFile(#[source] std::io::Error),

    /// PHPUnit could not be located or started.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// PHPUnit was killed at the time limit before writing a report.
    #[error("PHPUnit timed out after {0}s without writing a JUnit report")]
    TimedOut(u64),
}

/// Outcome of a PHPUnit run and the location of its report.
///
/// A non-zero exit code usually just means tests failed; the report is still
/// there to be parsed.
#[derive(Debug)]
pub struct RunResult {
    /// Process exit code.
    pub exit_code: i32,

    /// Captured standard output.
    pub output: String,

    /// Captured standard error.
    pub error_output: String,

    /// `true` if PHPUnit was killed at the time limit.
    pub timed_out: bool,

    report_path: PathBuf,
}

impl RunResult {
    /// Wraps a finished run. Takes ownership of the report file at
    /// `report_path`.
    pub fn new(exit_code: i32, output: String, error_output: String, report_path: PathBuf) -> Self {
        Self {
            exit_code,
            output,
            error_output,
            timed_out: false,
            report_path,
        }
    }

    /// Marks the run as killed at the time limit.
    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    /// Returns `true` if PHPUnit exited with code 0.
    pub fn was_successful(&self) -> bool {
        self.exit_code == 0
    }

    /// Path of the JUnit XML report.
    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Reads the JUnit XML report.
    ///
    /// Returns an empty string when the file doesn't exist, e.g. because
    /// PHPUnit crashed before writing it.
    pub fn report(&self) -> std::io::Result<String> {
        match std::fs::read_to_string(&self.report_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No JUnit report at {}", self.report_path.display());
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes the report file if present. Safe to call repeatedly.
    pub fn cleanup(&self) {
        match std::fs::remove_file(&self.report_path) {
            Ok(()) => tracing::debug!("Removed {}", self.report_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.report_path.display(), e),
        }
    }
}

impl Drop for RunResult {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Runs PHPUnit with a JUnit report redirected to a temporary file.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use phpunit_mate::process::ProcessExecutor;
/// use phpunit_mate::runner::Runner;
///
/// # async fn example() -> anyhow::Result<()> {
/// let runner = Runner::new(Arc::new(ProcessExecutor::new("/srv/app")));
/// let run = runner.run(vec!["--stop-on-failure".to_string()]).await?;
/// println!("exit code {}", run.exit_code);
/// let xml = run.report()?;
/// run.cleanup();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Runner {
    executor: Arc<dyn Executor>,
    binary: String,
    timeout_secs: u64,
    use_interpreter: bool,
}

impl Runner {
    /// Creates a runner with the default timeout, launching PHPUnit through
    /// the interpreter.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            binary: PHPUNIT_BINARY.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            use_interpreter: true,
        }
    }

    /// Sets the binary name handed to the executor.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sets the wall-clock limit for each run.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Chooses whether PHPUnit is launched through the interpreter.
    pub fn with_interpreter(mut self, use_interpreter: bool) -> Self {
        self.use_interpreter = use_interpreter;
        self
    }

    /// Runs PHPUnit with `args` followed by `--log-junit <temp file>`.
    ///
    /// A run that hit the time limit and left no report is an error; one that
    /// still wrote a report is returned like any other.
    pub async fn run(&self, args: Vec<String>) -> Result<RunResult, RunnerError> {
        let report_path = tempfile::Builder::new()
            .prefix("phpunit_junit_")
            .suffix(".xml")
            .tempfile()
            .and_then(|file| file.into_temp_path().keep().map_err(|e| e.error))
            .map_err(RunnerError::TempFile)?;

        let mut args = args;
        args.push("--log-junit".to_string());
        args.push(report_path.to_string_lossy().into_owned());

        let result = match self
            .executor
            .execute(&self.binary, &args, self.timeout_secs, self.use_interpreter)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let _ = std::fs::remove_file(&report_path);
                return Err(e.into());
            }
        };

        tracing::debug!(
            "PHPUnit exited with {} in {:?}",
            result.exit_code,
            result.duration
        );

        let run = RunResult::new(result.exit_code, result.stdout, result.stderr, report_path)
            .with_timed_out(result.timed_out);

        if run.timed_out && run.report().map_or(true, |xml| xml.trim().is_empty()) {
            tracing::warn!("PHPUnit timed out after {}s", self.timeout_secs);
            return Err(RunnerError::TimedOut(self.timeout_secs));
        }

        Ok(run)
    }
}
