//! JUnit XML report parsing.
//!
//! Reads the report PHPUnit writes with `--log-junit`:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites>
//!   <testsuite name="Unit" tests="2" assertions="3" failures="1" errors="0"
//!              warnings="0" skipped="0" time="0.012">
//!     <testcase name="testCreate" class="App\Tests\UserTest"
//!               file="/app/tests/UserTest.php" line="45" assertions="1" time="0.004">
//!       <failure type="PHPUnit\Framework\ExpectationFailedException">
//!         Failed asserting that 404 matches expected 200.
//!       </failure>
//!     </testcase>
//!     <testcase name="testDelete" class="App\Tests\UserTest"
//!               file="/app/tests/UserTest.php" line="60" assertions="2" time="0.003"/>
//!   </testsuite>
//! </testsuites>
//! ```
//!
//! Suite counts come from the first `<testsuite>` under `<testsuites>`, or
//! from the root element when it is a bare `<testsuite>`. Missing or
//! unparseable counts read as zero.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{IssueRecord, MessageTruncator, ReportError, ReportResult, Summary, TestResult};

/// Default bound for failure and error messages, in characters.
pub const DEFAULT_MESSAGE_LIMIT: usize = 200;

/// Parses JUnit XML into a [`TestResult`].
///
/// # Example
///
/// ```
/// use phpunit_mate::report::JunitParser;
///
/// let result = JunitParser::new().parse(
///     r#"<testsuite tests="3" failures="0" errors="0" skipped="1" time="0.5"/>"#,
/// )?;
///
/// assert_eq!(result.passed(), 2);
/// assert!(result.was_successful());
/// # Ok::<(), phpunit_mate::report::ReportError>(())
/// ```
#[derive(Debug, Clone)]
pub struct JunitParser {
    truncator: MessageTruncator,
    message_limit: usize,
}

impl Default for JunitParser {
    fn default() -> Self {
        Self::new()
    }
}

impl JunitParser {
    /// Creates a parser truncating messages to 200 characters.
    pub fn new() -> Self {
        Self {
            truncator: MessageTruncator::new(),
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }

    /// Sets the message bound.
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    /// Parses a JUnit XML document.
    ///
    /// # Errors
    ///
    /// [`ReportError::EmptyReport`] for empty input, [`ReportError::Malformed`]
    /// when the document is not well-formed.
    pub fn parse(&self, xml: &str) -> ReportResult<TestResult> {
        if xml.trim().is_empty() {
            return Err(ReportError::EmptyReport);
        }

        let mut reader = Reader::from_str(xml);

        let mut depth = 0usize;
        let mut root_is_suites = false;
        let mut root_summary: Option<Summary> = None;
        let mut suite_summary: Option<Summary> = None;
        let mut case: Option<CaseState> = None;
        let mut capture: Option<Capture> = None;

        let mut failures = Vec::new();
        let mut errors = Vec::new();

        loop {
            let event = reader.read_event().map_err(malformed)?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = e.name();

                    if depth == 0 {
                        if root_summary.is_some() {
                            return Err(ReportError::Malformed(
                                "multiple root elements".to_string(),
                            ));
                        }
                        root_is_suites = name.as_ref() == b"testsuites";
                        root_summary = Some(read_summary(e)?);
                    } else if depth == 1
                        && root_is_suites
                        && name.as_ref() == b"testsuite"
                        && suite_summary.is_none()
                    {
                        suite_summary = Some(read_summary(e)?);
                    }

                    match (name.as_ref(), &mut case) {
                        (b"testcase", None) if !is_empty => {
                            case = Some(CaseState::read(e, depth)?);
                        }
                        (b"failure" | b"error", Some(state))
                            if depth == state.depth + 1 && capture.is_none() =>
                        {
                            let kind = if name.as_ref() == b"failure" {
                                IssueKind::Failure
                            } else {
                                IssueKind::Error
                            };
                            let issue_type =
                                attr(e, "type")?.unwrap_or_else(|| "unknown".to_string());

                            if is_empty {
                                state.record(kind, issue_type, String::new());
                            } else {
                                capture = Some(Capture {
                                    kind,
                                    issue_type,
                                    text: String::new(),
                                    depth,
                                });
                            }
                        }
                        _ => {}
                    }

                    if !is_empty {
                        depth += 1;
                    }
                }
                Event::Text(t) => {
                    if let Some(capture) = &mut capture {
                        capture.text.push_str(&t.unescape().map_err(malformed)?);
                    }
                }
                Event::CData(c) => {
                    if let Some(capture) = &mut capture {
                        capture.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);

                    if capture.as_ref().is_some_and(|c| c.depth == depth) {
                        if let (Some(done), Some(state)) = (capture.take(), case.as_mut()) {
                            let message = self.truncator.truncate(&done.text, self.message_limit);
                            state.record(done.kind, done.issue_type, message);
                        }
                    } else if case.as_ref().is_some_and(|c| c.depth == depth) {
                        if let Some(done) = case.take() {
                            done.finish(&mut failures, &mut errors);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let Some(root_summary) = root_summary else {
            return Err(ReportError::Malformed("no root element".to_string()));
        };
        if depth > 0 {
            return Err(ReportError::Malformed(
                "unexpected end of document".to_string(),
            ));
        }

        let summary = suite_summary.unwrap_or(root_summary);
        tracing::debug!(
            "Parsed report: {} tests, {} failures, {} errors",
            summary.tests,
            failures.len(),
            errors.len()
        );

        Ok(TestResult::new(summary, failures, errors))
    }
}

#[derive(Debug, Clone, Copy)]
enum IssueKind {
    Failure,
    Error,
}

/// Text being collected for a `<failure>` or `<error>` element.
struct Capture {
    kind: IssueKind,
    issue_type: String,
    text: String,
    depth: usize,
}

/// A `<testcase>` whose children are still being read.
struct CaseState {
    class: String,
    method: String,
    file: String,
    line: i64,
    depth: usize,
    failure: Option<(String, String)>,
    error: Option<(String, String)>,
}

impl CaseState {
    fn read(e: &BytesStart<'_>, depth: usize) -> ReportResult<Self> {
        Ok(Self {
            class: attr(e, "class")?.unwrap_or_default(),
            method: attr(e, "name")?.unwrap_or_default(),
            file: attr(e, "file")?.unwrap_or_default(),
            line: attr(e, "line")?.as_deref().map_or(0, parse_int),
            depth,
            failure: None,
            error: None,
        })
    }

    /// Keeps the first failure and the first error; later ones are ignored.
    fn record(&mut self, kind: IssueKind, issue_type: String, message: String) {
        let slot = match kind {
            IssueKind::Failure => &mut self.failure,
            IssueKind::Error => &mut self.error,
        };
        if slot.is_none() {
            *slot = Some((issue_type, message));
        }
    }

    fn finish(self, failures: &mut Vec<IssueRecord>, errors: &mut Vec<IssueRecord>) {
        let issue = |(kind, message): (String, String)| IssueRecord {
            class: self.class.clone(),
            method: self.method.clone(),
            file: self.file.clone(),
            line: self.line,
            kind,
            message,
        };

        if let Some(failure) = self.failure.clone() {
            failures.push(issue(failure));
        }
        if let Some(error) = self.error.clone() {
            errors.push(issue(error));
        }
    }
}

fn malformed(e: impl std::fmt::Display) -> ReportError {
    ReportError::Malformed(e.to_string())
}

fn attr(e: &BytesStart<'_>, name: &str) -> ReportResult<Option<String>> {
    match e.try_get_attribute(name).map_err(malformed)? {
        Some(a) => {
            let raw = std::str::from_utf8(&a.value).map_err(malformed)?;
            Ok(Some(quick_xml::escape::unescape(raw).map_err(malformed)?.into_owned()))
        }
        None => Ok(None),
    }
}

fn read_summary(e: &BytesStart<'_>) -> ReportResult<Summary> {
    let int = |name: &str| -> ReportResult<i64> { Ok(attr(e, name)?.as_deref().map_or(0, parse_int)) };

    Ok(Summary {
        tests: int("tests")?,
        assertions: int("assertions")?,
        failures: int("failures")?,
        errors: int("errors")?,
        warnings: int("warnings")?,
        skipped: int("skipped")?,
        time: attr(e, "time")?.as_deref().map_or(0.0, parse_float),
    })
}

/// Integer attribute value; decimals are truncated, garbage reads as 0.
fn parse_int(value: &str) -> i64 {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| {
            value
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        })
        .unwrap_or(0)
}

fn parse_float(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
}
