//! Test execution operations exposed to agents.
//!
//! [`Toolbox`] wires the pipeline together: detect configuration, build the
//! PHPUnit arguments, run, parse the JUnit report, format, clean up. The
//! [`registry`] maps tool names onto these operations.

pub mod registry;

pub use registry::{ResourceContent, ResourceDefinition, ToolDefinition, ToolRegistry};

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::config::{ConfigurationDetector, Settings};
use crate::discovery::TestDiscovery;
use crate::format::{FormatError, FormatMode, Formatter};
use crate::process::ProcessExecutor;
use crate::report::{JunitParser, ReportError};
use crate::runner::{Runner, RunnerError};

pub const RUN_SUITE: &str = "phpunit-run-suite";
pub const RUN_FILE: &str = "phpunit-run-file";
pub const RUN_METHOD: &str = "phpunit-run-method";
pub const LIST_TESTS: &str = "phpunit-list-tests";

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors returned by tool operations.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A required parameter is missing or a parameter has the wrong shape.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to read JUnit report: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// `true` when the caller sent something unusable, as opposed to the
    /// environment failing.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::UnknownTool(_)
                | Self::UnknownResource(_)
                | Self::Format(FormatError::UnsupportedMode(_))
        )
    }
}

fn missing(parameter: &str, tool: &str) -> ToolError {
    ToolError::InvalidRequest(format!(
        "The \"{parameter}\" parameter is required for {tool} tool."
    ))
}

/// Parameters of `phpunit-run-suite`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSuiteParams {
    /// Explicit configuration file; detected when absent.
    pub configuration: Option<String>,
    pub filter: Option<String>,
    #[serde(default)]
    pub stop_on_failure: bool,
    pub mode: Option<String>,
}

/// Parameters of `phpunit-run-file`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFileParams {
    pub file: Option<String>,
    pub filter: Option<String>,
    #[serde(default)]
    pub stop_on_failure: bool,
    pub mode: Option<String>,
}

/// Parameters of `phpunit-run-method`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMethodParams {
    /// Namespace-qualified class name.
    pub class: Option<String>,
    pub method: Option<String>,
    pub mode: Option<String>,
}

/// Parameters of `phpunit-list-tests`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTestsParams {
    /// Directory relative to the project root; the configured test
    /// directories when absent.
    pub directory: Option<String>,
}

fn parse_mode(mode: Option<&str>) -> ToolResult<FormatMode> {
    Ok(mode.unwrap_or(FormatMode::Default.as_str()).parse()?)
}

/// Treats empty strings like absent values.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// The run/list/config operations over one project.
#[derive(Clone)]
pub struct Toolbox {
    runner: Runner,
    parser: JunitParser,
    formatter: Formatter,
    detector: ConfigurationDetector,
    discovery: TestDiscovery,
}

impl Toolbox {
    pub fn new(
        runner: Runner,
        parser: JunitParser,
        formatter: Formatter,
        detector: ConfigurationDetector,
        discovery: TestDiscovery,
    ) -> Self {
        Self {
            runner,
            parser,
            formatter,
            detector,
            discovery,
        }
    }

    /// Builds a toolbox for `project_root` running the real PHPUnit binary.
    pub fn from_settings(settings: &Settings, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let executor = ProcessExecutor::from_settings(settings, &project_root);

        let runner = Runner::new(Arc::new(executor))
            .with_binary(settings.phpunit.binary.clone())
            .with_timeout(settings.phpunit.timeout_secs)
            .with_interpreter(settings.phpunit.use_interpreter);
        let detector = ConfigurationDetector::new(&project_root)
            .with_candidates(settings.phpunit.config_candidates.clone());
        let discovery = TestDiscovery::new(&project_root)
            .with_file_suffix(settings.discovery.file_suffix.clone());

        Self::new(
            runner,
            JunitParser::new().with_message_limit(settings.output.message_limit),
            Formatter::new(),
            detector,
            discovery,
        )
    }

    /// Replaces the output formatter.
    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn detector(&self) -> &ConfigurationDetector {
        &self.detector
    }

    /// Builds PHPUnit arguments in a fixed order: configuration (explicit or
    /// detected), filter, stop-on-failure, file.
    pub fn build_phpunit_args(
        &self,
        configuration: Option<&str>,
        filter: Option<&str>,
        file: Option<&str>,
        stop_on_failure: bool,
    ) -> Vec<String> {
        let mut args = Vec::new();

        let configuration = non_empty(configuration)
            .map(str::to_string)
            .or_else(|| {
                self.detector
                    .detect()
                    .map(|path| path.to_string_lossy().into_owned())
            });
        if let Some(configuration) = configuration {
            args.push("--configuration".to_string());
            args.push(configuration);
        }

        if let Some(filter) = non_empty(filter) {
            args.push("--filter".to_string());
            args.push(filter.to_string());
        }

        if stop_on_failure {
            args.push("--stop-on-failure".to_string());
        }

        if let Some(file) = non_empty(file) {
            args.push(file.to_string());
        }

        args
    }

    /// Runs the whole suite.
    pub async fn run_suite(&self, params: RunSuiteParams) -> ToolResult<String> {
        let mode = parse_mode(params.mode.as_deref())?;
        let args = self.build_phpunit_args(
            params.configuration.as_deref(),
            params.filter.as_deref(),
            None,
            params.stop_on_failure,
        );

        self.execute(args, mode).await
    }

    /// Runs the tests of one file.
    pub async fn run_file(&self, params: RunFileParams) -> ToolResult<String> {
        let file = non_empty(params.file.as_deref()).ok_or_else(|| missing("file", RUN_FILE))?;
        let mode = parse_mode(params.mode.as_deref())?;
        let args = self.build_phpunit_args(
            None,
            params.filter.as_deref(),
            Some(file),
            params.stop_on_failure,
        );

        self.execute(args, mode).await
    }

    /// Runs a single test method, matched by an anchored `Class::method`
    /// filter.
    pub async fn run_method(&self, params: RunMethodParams) -> ToolResult<String> {
        let class = non_empty(params.class.as_deref()).ok_or_else(|| missing("class", RUN_METHOD))?;
        let method = non_empty(params.method.as_deref()).ok_or_else(|| missing("method", RUN_METHOD))?;
        let mode = parse_mode(params.mode.as_deref())?;

        let filter = method_filter(class, method);
        let args = self.build_phpunit_args(None, Some(&filter), None, false);

        self.execute(args, mode).await
    }

    /// Lists discoverable tests as `{tests: [{file, class, method}]}`.
    pub fn list_tests(&self, params: ListTestsParams) -> ToolResult<String> {
        let directories = match non_empty(params.directory.as_deref()) {
            Some(directory) => vec![directory.to_string()],
            None => self.detector.test_directories(),
        };

        let tests = self.discovery.discover_tests(&directories);
        tracing::debug!("Discovered {} tests in {:?}", tests.len(), directories);

        Ok(self.formatter.encode(&json!({ "tests": tests })))
    }

    /// Reports the project's PHPUnit configuration.
    pub fn config_report(&self) -> ToolResult<String> {
        let config_file = self.detector.detect();

        let mut data = Map::new();
        data.insert(
            "project_root".to_string(),
            json!(self.detector.project_root().to_string_lossy()),
        );
        data.insert(
            "config_file".to_string(),
            json!(config_file.as_ref().map(|path| path.to_string_lossy())),
        );
        data.insert("config_exists".to_string(), json!(config_file.is_some()));

        if config_file.is_some() {
            data.insert(
                "test_directories".to_string(),
                json!(self.detector.test_directories()),
            );
            data.insert("bootstrap_file".to_string(), json!(self.detector.bootstrap_file()));
            data.insert(
                "config_content".to_string(),
                json!(self.detector.config_content()),
            );
        }

        Ok(self.formatter.encode(&Value::Object(data)))
    }

    async fn execute(&self, args: Vec<String>, mode: FormatMode) -> ToolResult<String> {
        let run = self.runner.run(args).await?;
        if !run.was_successful() {
            tracing::debug!("PHPUnit exited with {}", run.exit_code);
        }

        let xml = run.report()?;
        let parsed = self.parser.parse(&xml);
        run.cleanup();

        if let Err(ReportError::EmptyReport) = &parsed {
            tracing::warn!(
                "PHPUnit produced no report (exit code {}): {}",
                run.exit_code,
                run.error_output.trim()
            );
        }

        Ok(self.formatter.render(&parsed?, mode))
    }
}

/// Anchored `--filter` pattern selecting exactly `class::method`.
pub fn method_filter(class: &str, method: &str) -> String {
    format!("{}::{}$", regex::escape(class), regex::escape(method))
}
