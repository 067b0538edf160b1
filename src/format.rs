//! Token-efficient rendering of test results.
//!
//! Every mode first builds an insertion-ordered [`serde_json::Value`] tree
//! and then hands it to a [`StructuredEncoder`]. The default encoder writes
//! TOON (see [`toon`]); [`JsonEncoder`] writes pretty JSON.

pub mod toon;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::report::{IssueRecord, TestResult};

pub use toon::ToonEncoder;

/// Result type for formatting.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors that can occur while formatting.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Unknown format mode: {0}")]
    UnsupportedMode(String),
}

/// Output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatMode {
    /// Counts, status and compact failure/error lists.
    #[default]
    Default,
    /// Counts and status only.
    Summary,
    /// Like `Default` with full class names and file paths.
    Detailed,
    /// Issues grouped by file base name.
    ByFile,
    /// Issues grouped by short class name.
    ByClass,
}

impl FormatMode {
    /// All modes, in the order they are documented.
    pub const ALL: [FormatMode; 5] = [
        Self::Default,
        Self::Summary,
        Self::Detailed,
        Self::ByFile,
        Self::ByClass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Summary => "summary",
            Self::Detailed => "detailed",
            Self::ByFile => "by-file",
            Self::ByClass => "by-class",
        }
    }
}

impl std::fmt::Display for FormatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FormatMode {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| FormatError::UnsupportedMode(s.to_string()))
    }
}

/// Serializes a value tree into the final output text.
pub trait StructuredEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> String;
}

/// Pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl StructuredEncoder for JsonEncoder {
    fn encode(&self, value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }
}

/// Renders [`TestResult`]s in one of the [`FormatMode`]s.
///
/// # Example
///
/// ```
/// use phpunit_mate::format::Formatter;
/// use phpunit_mate::report::{Summary, TestResult};
///
/// let result = TestResult::new(
///     Summary { tests: 3, time: 0.5, ..Summary::default() },
///     Vec::new(),
///     Vec::new(),
/// );
///
/// let output = Formatter::new().format(&result, "summary")?;
/// assert!(output.contains("status: OK"));
/// # Ok::<(), phpunit_mate::format::FormatError>(())
/// ```
#[derive(Clone)]
pub struct Formatter {
    encoder: Arc<dyn StructuredEncoder>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    /// Creates a formatter writing TOON.
    pub fn new() -> Self {
        Self::with_encoder(ToonEncoder::new())
    }

    /// Creates a formatter using `encoder`.
    pub fn with_encoder<E: StructuredEncoder + 'static>(encoder: E) -> Self {
        Self {
            encoder: Arc::new(encoder),
        }
    }

    /// Formats `result` in the mode named `mode`.
    pub fn format(&self, result: &TestResult, mode: &str) -> FormatResult<String> {
        Ok(self.render(result, mode.parse()?))
    }

    /// Formats `result` in `mode`.
    pub fn render(&self, result: &TestResult, mode: FormatMode) -> String {
        self.encode(&build(result, mode))
    }

    /// Encodes an arbitrary value with this formatter's encoder.
    pub fn encode(&self, value: &Value) -> String {
        self.encoder.encode(value)
    }
}

/// Builds the value tree for `mode`.
pub fn build(result: &TestResult, mode: FormatMode) -> Value {
    match mode {
        FormatMode::Summary => json!({
            "tests": result.summary.tests,
            "passed": result.passed(),
            "failed": result.summary.failures,
            "errors": result.summary.errors,
            "time": format_time(result.summary.time),
            "status": status(result),
        }),
        FormatMode::Default => {
            let mut summary = short_summary(result);
            summary.insert("warnings".to_string(), json!(result.summary.warnings));
            summary.insert("skipped".to_string(), json!(result.summary.skipped));
            summary.insert("time".to_string(), json!(format_time(result.summary.time)));
            issue_lists(result, Value::Object(summary), true)
        }
        FormatMode::Detailed => issue_lists(result, timed_summary(result), false),
        FormatMode::ByFile => grouped(result, "by_file", |issue| base_name(&issue.file)),
        FormatMode::ByClass => grouped(result, "by_class", |issue| short_class(&issue.class)),
    }
}

fn status(result: &TestResult) -> &'static str {
    if result.was_successful() { "OK" } else { "FAILED" }
}

/// Seconds rounded to milliseconds with an `s` suffix, e.g. `2.5s` or `0s`.
fn format_time(seconds: f64) -> String {
    let rounded = (seconds * 1000.0).round() / 1000.0;
    // Avoid "-0s".
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{}s", rounded)
}

fn short_summary(result: &TestResult) -> Map<String, Value> {
    let mut summary = Map::new();
    summary.insert("tests".to_string(), json!(result.summary.tests));
    summary.insert("passed".to_string(), json!(result.passed()));
    summary.insert("failed".to_string(), json!(result.summary.failures));
    summary.insert("errors".to_string(), json!(result.summary.errors));
    summary
}

fn timed_summary(result: &TestResult) -> Value {
    let mut summary = short_summary(result);
    summary.insert("time".to_string(), json!(format_time(result.summary.time)));
    Value::Object(summary)
}

fn issue_lists(result: &TestResult, summary: Value, compact: bool) -> Value {
    let mut data = Map::new();
    data.insert("summary".to_string(), summary);
    data.insert("status".to_string(), json!(status(result)));

    let row = |issue: &IssueRecord, message_key: &str| {
        let (class, file) = if compact {
            (short_class(&issue.class), base_name(&issue.file))
        } else {
            (issue.class.clone(), issue.file.clone())
        };

        let mut row = Map::new();
        row.insert("class".to_string(), json!(class));
        row.insert("method".to_string(), json!(issue.method));
        row.insert(message_key.to_string(), json!(issue.message));
        row.insert("file".to_string(), json!(file));
        row.insert("line".to_string(), json!(issue.line));
        Value::Object(row)
    };

    if !result.failures.is_empty() {
        let failures = result.failures.iter().map(|f| row(f, "message")).collect();
        data.insert("failures".to_string(), Value::Array(failures));
    }
    if !result.errors.is_empty() {
        let errors = result.errors.iter().map(|e| row(e, "exception")).collect();
        data.insert("errors".to_string(), Value::Array(errors));
    }

    Value::Object(data)
}

fn grouped(result: &TestResult, key: &str, group_of: impl Fn(&IssueRecord) -> String) -> Value {
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for issue in result.issues() {
        groups
            .entry(group_of(issue))
            .or_default()
            .push(json!(issue));
    }

    let mut data = Map::new();
    data.insert("summary".to_string(), timed_summary(result));
    data.insert("status".to_string(), json!(status(result)));
    data.insert(
        key.to_string(),
        Value::Object(
            groups
                .into_iter()
                .map(|(name, issues)| (name, Value::Array(issues)))
                .collect(),
        ),
    );
    Value::Object(data)
}

/// Last `\`-separated segment of a class name.
fn short_class(class: &str) -> String {
    class.rsplit('\\').next().unwrap_or(class).to_string()
}

fn base_name(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map_or_else(|| file.to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Summary;

    fn issue(class: &str, method: &str, file: &str, line: i64, message: &str) -> IssueRecord {
        IssueRecord {
            class: class.to_string(),
            method: method.to_string(),
            file: file.to_string(),
            line,
            kind: "PHPUnit\\Framework\\ExpectationFailedException".to_string(),
            message: message.to_string(),
        }
    }

    fn successful() -> TestResult {
        TestResult::new(
            Summary {
                tests: 10,
                assertions: 20,
                time: 2.5,
                ..Summary::default()
            },
            Vec::new(),
            Vec::new(),
        )
    }

    fn failing() -> TestResult {
        TestResult::new(
            Summary {
                tests: 10,
                failures: 2,
                errors: 1,
                time: 5.5,
                ..Summary::default()
            },
            vec![
                issue("App\\Tests\\UserTest", "testCreate", "/path/to/UserTest.php", 45, "Expected 200 got 404"),
                issue("App\\Tests\\UserTest", "testUpdate", "/path/to/UserTest.php", 60, "Expected true"),
            ],
            vec![issue(
                "App\\Tests\\OrderTest",
                "testShip",
                "/path/to/OrderTest.php",
                12,
                "Call to undefined method",
            )],
        )
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("default".parse::<FormatMode>().unwrap(), FormatMode::Default);
        assert_eq!("by-file".parse::<FormatMode>().unwrap(), FormatMode::ByFile);
        assert_eq!("by-class".parse::<FormatMode>().unwrap(), FormatMode::ByClass);
        for mode in FormatMode::ALL {
            assert_eq!(mode.as_str().parse::<FormatMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode() {
        let err = Formatter::new().format(&successful(), "invalid").unwrap_err();
        assert_eq!(err.to_string(), "Unknown format mode: invalid");
        assert!("BY-FILE".parse::<FormatMode>().is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(2.5), "2.5s");
        assert_eq!(format_time(0.0), "0s");
        assert_eq!(format_time(1.0), "1s");
        assert_eq!(format_time(0.123456), "0.123s");
        assert_eq!(format_time(-0.0001), "0s");
    }

    #[test]
    fn test_short_class_and_base_name() {
        assert_eq!(short_class("App\\Tests\\UserTest"), "UserTest");
        assert_eq!(short_class("UserTest"), "UserTest");
        assert_eq!(base_name("/path/to/UserTest.php"), "UserTest.php");
        assert_eq!(base_name("UserTest.php"), "UserTest.php");
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn test_summary_mode_is_flat() {
        let value = build(&successful(), FormatMode::Summary);
        assert_eq!(
            value,
            json!({
                "tests": 10,
                "passed": 10,
                "failed": 0,
                "errors": 0,
                "time": "2.5s",
                "status": "OK",
            })
        );

        let output = Formatter::new().format(&failing(), "summary").unwrap();
        assert!(output.contains("status"));
        assert!(!output.contains("failures"));
    }

    #[test]
    fn test_default_mode_successful() {
        let value = build(&successful(), FormatMode::Default);
        assert_eq!(
            value,
            json!({
                "summary": {
                    "tests": 10,
                    "passed": 10,
                    "failed": 0,
                    "errors": 0,
                    "warnings": 0,
                    "skipped": 0,
                    "time": "2.5s",
                },
                "status": "OK",
            })
        );
        let keys: Vec<_> = value["summary"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            ["tests", "passed", "failed", "errors", "warnings", "skipped", "time"]
        );
    }

    #[test]
    fn test_default_mode_shortens_names() {
        let value = build(&failing(), FormatMode::Default);

        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["summary"]["passed"], 7);
        assert_eq!(
            value["failures"][0],
            json!({
                "class": "UserTest",
                "method": "testCreate",
                "message": "Expected 200 got 404",
                "file": "UserTest.php",
                "line": 45,
            })
        );
        assert_eq!(value["errors"][0]["exception"], "Call to undefined method");
        assert!(value["errors"][0].get("message").is_none());
    }

    #[test]
    fn test_detailed_mode_keeps_full_names() {
        let value = build(&failing(), FormatMode::Detailed);

        assert!(value["summary"].get("warnings").is_none());
        assert_eq!(value["failures"][0]["class"], "App\\Tests\\UserTest");
        assert_eq!(value["failures"][0]["file"], "/path/to/UserTest.php");

        let output = Formatter::new().render(&failing(), FormatMode::Detailed);
        assert!(output.contains("UserTest"));
        assert!(output.contains("/path/to/UserTest.php"));
    }

    #[test]
    fn test_by_file_groups_sorted() {
        let value = build(&failing(), FormatMode::ByFile);

        assert_eq!(value["status"], "FAILED");
        let groups = value["by_file"].as_object().unwrap();
        let names: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(names, ["OrderTest.php", "UserTest.php"]);
        assert_eq!(groups["UserTest.php"].as_array().unwrap().len(), 2);
        assert_eq!(
            groups["OrderTest.php"][0],
            json!({
                "class": "App\\Tests\\OrderTest",
                "method": "testShip",
                "file": "/path/to/OrderTest.php",
                "line": 12,
                "type": "PHPUnit\\Framework\\ExpectationFailedException",
                "message": "Call to undefined method",
            })
        );

        let output = Formatter::new().format(&failing(), "by-file").unwrap();
        assert!(output.contains("UserTest.php"));
        assert!(output.contains("FAILED"));
    }

    #[test]
    fn test_by_class_groups() {
        let value = build(&failing(), FormatMode::ByClass);
        let groups = value["by_class"].as_object().unwrap();
        let names: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(names, ["OrderTest", "UserTest"]);
    }

    #[test]
    fn test_grouped_without_issues() {
        let value = build(&successful(), FormatMode::ByFile);
        assert_eq!(value["by_file"], json!({}));
        assert_eq!(value["status"], "OK");
    }

    #[test]
    fn test_json_encoder() {
        let formatter = Formatter::with_encoder(JsonEncoder);
        let output = formatter.format(&successful(), "summary").unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["status"], "OK");
        assert_eq!(parsed["time"], "2.5s");
    }
}
