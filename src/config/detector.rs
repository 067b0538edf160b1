//! PHPUnit configuration file detection.
//!
//! Looks for the project's PHPUnit configuration under the project root and
//! extracts the few values the tools report: declared test directories and
//! the bootstrap file.
//!
//! Nothing in here fails. A missing or unparseable configuration degrades to
//! the default test directory (`tests`) and no bootstrap file.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};

/// Test directory used when no configuration declares one.
pub const DEFAULT_TEST_DIRECTORY: &str = "tests";

/// Configuration file names in priority order.
const DEFAULT_CANDIDATES: [&str; 3] = ["phpunit.xml", "phpunit.xml.dist", "phpunit.dist.xml"];

/// Locates and reads `phpunit.xml` and its `.dist` variants.
///
/// # Example
///
/// ```no_run
/// use phpunit_mate::config::ConfigurationDetector;
///
/// let detector = ConfigurationDetector::new("/srv/app");
/// if let Some(path) = detector.detect() {
///     println!("Using {}", path.display());
/// }
/// println!("Test dirs: {:?}", detector.test_directories());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigurationDetector {
    project_root: PathBuf,
    candidates: Vec<String>,
}

impl ConfigurationDetector {
    /// Creates a detector for the given project root with the standard
    /// candidate names.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Replaces the candidate file names. Order is priority order.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    /// The project root this detector searches.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns the first candidate that exists, or `None`.
    pub fn detect(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .map(|name| self.project_root.join(name))
            .find(|path| path.exists())
    }

    /// Returns the `<directory>` values declared in the configuration, in
    /// document order without duplicates.
    ///
    /// Falls back to `["tests"]` when there is no configuration, it cannot be
    /// parsed, or it declares no directories.
    pub fn test_directories(&self) -> Vec<String> {
        let default = || vec![DEFAULT_TEST_DIRECTORY.to_string()];

        let Some(summary) = self.read_config() else {
            return default();
        };

        if summary.directories.is_empty() {
            default()
        } else {
            summary.directories
        }
    }

    /// Returns the `bootstrap` attribute of the configuration's root element.
    pub fn bootstrap_file(&self) -> Option<String> {
        self.read_config()?.bootstrap
    }

    /// Returns the text of the detected configuration, decoded with the
    /// encoding its XML declaration names (UTF-8 otherwise).
    pub fn config_content(&self) -> Option<String> {
        let (_, bytes) = self.read_bytes()?;
        Some(decode_document(&bytes))
    }

    fn read_bytes(&self) -> Option<(PathBuf, Vec<u8>)> {
        let path = self.detect()?;

        match std::fs::read(&path) {
            Ok(bytes) => Some((path, bytes)),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn read_config(&self) -> Option<PhpunitXml> {
        let (path, bytes) = self.read_bytes()?;

        match PhpunitXml::parse(&bytes) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("Ignoring unparseable {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// The parts of a `phpunit.xml` we care about.
#[derive(Debug, Default, PartialEq)]
struct PhpunitXml {
    bootstrap: Option<String>,
    directories: Vec<String>,
}

impl PhpunitXml {
    fn parse(xml: &[u8]) -> Result<Self, String> {
        let mut reader = Reader::from_reader(xml);
        let mut summary = PhpunitXml::default();

        let mut depth = 0usize;
        let mut seen_root = false;
        let mut in_directory = false;
        let mut text = String::new();

        loop {
            match reader.read_event().map_err(|e| e.to_string())? {
                Event::Start(e) => {
                    if !seen_root {
                        seen_root = true;
                        summary.bootstrap = bootstrap_attribute(&e, reader.decoder())?;
                    }
                    if e.name().as_ref() == b"directory" {
                        in_directory = true;
                        text.clear();
                    }
                    depth += 1;
                }
                Event::Empty(e) => {
                    if !seen_root {
                        seen_root = true;
                        summary.bootstrap = bootstrap_attribute(&e, reader.decoder())?;
                    }
                }
                Event::Text(t) if in_directory => {
                    text.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
                Event::CData(c) if in_directory => {
                    text.push_str(&reader.decoder().decode(&c).map_err(|e| e.to_string())?);
                }
                Event::End(e) => {
                    if e.name().as_ref() == b"directory" && in_directory {
                        in_directory = false;
                        let dir = text.trim();
                        if !dir.is_empty() && !summary.directories.iter().any(|d| d == dir) {
                            summary.directories.push(dir.to_string());
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err("no root element".to_string());
        }
        if depth > 0 {
            return Err("unexpected end of document".to_string());
        }

        Ok(summary)
    }
}

fn bootstrap_attribute(
    element: &BytesStart<'_>,
    decoder: Decoder,
) -> Result<Option<String>, String> {
    let attr = element
        .try_get_attribute("bootstrap")
        .map_err(|e| e.to_string())?;

    match attr {
        Some(attr) => Ok(Some(
            attr.decode_and_unescape_value(decoder)
                .map_err(|e| e.to_string())?
                .into_owned(),
        )),
        None => Ok(None),
    }
}

/// Decodes a whole XML document. The declaration, when present, is the
/// first event; bytes that don't fit the encoding are replaced.
fn decode_document(bytes: &[u8]) -> String {
    let mut reader = Reader::from_reader(bytes);
    let _ = reader.read_event();

    match reader.decoder().decode(bytes) {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
