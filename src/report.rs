//! Normalized test results parsed from PHPUnit's JUnit XML report.

pub mod junit;
pub mod truncate;

pub use junit::JunitParser;
pub use truncate::MessageTruncator;

use serde::Serialize;

/// Result type for report parsing.
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors that can occur while parsing a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report was empty. PHPUnit most likely crashed before writing it.
    #[error("Empty JUnit XML provided")]
    EmptyReport,

    /// The report is not well-formed XML.
    #[error("Malformed JUnit XML: {0}")]
    Malformed(String),
}

/// Suite-level counts as reported by PHPUnit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub tests: i64,
    pub assertions: i64,
    pub failures: i64,
    pub errors: i64,
    pub warnings: i64,
    pub skipped: i64,
    /// Total run time in seconds.
    pub time: f64,
}

/// One failing or erroring test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRecord {
    /// Namespace-qualified test class.
    pub class: String,
    /// Test method name.
    pub method: String,
    /// Path of the test file, as reported.
    pub file: String,
    pub line: i64,
    /// Exception or assertion type, `unknown` when not reported.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message, already truncated.
    pub message: String,
}

/// Parsed outcome of a test run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestResult {
    pub summary: Summary,
    pub failures: Vec<IssueRecord>,
    pub errors: Vec<IssueRecord>,
}

impl TestResult {
    /// Creates a result from its parts.
    pub fn new(summary: Summary, failures: Vec<IssueRecord>, errors: Vec<IssueRecord>) -> Self {
        Self {
            summary,
            failures,
            errors,
        }
    }

    /// Tests that neither failed, errored nor were skipped.
    ///
    /// Inconsistent counts from the report are passed through, so this can
    /// be negative.
    pub fn passed(&self) -> i64 {
        self.summary.tests - self.summary.failures - self.summary.errors - self.summary.skipped
    }

    /// `true` when the report counts no failures and no errors.
    pub fn was_successful(&self) -> bool {
        self.summary.failures == 0 && self.summary.errors == 0
    }

    /// Failures followed by errors.
    pub fn issues(&self) -> impl Iterator<Item = &IssueRecord> {
        self.failures.iter().chain(&self.errors)
    }
}
