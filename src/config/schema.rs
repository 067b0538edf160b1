//! Settings schema definitions for phpunit-mate.
//!
//! All sections and fields are optional; a missing settings file is the same
//! as an empty one.
//!
//! # Schema Overview
//!
//! ```text
//! Settings (root)
//! ├── ProjectSettings     - Project root the runner is executed in
//! ├── PhpunitSettings     - Binary lookup, interpreter, timeout, config names
//! ├── DiscoverySettings   - Static test discovery options
//! └── OutputSettings      - Message truncation bound
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings structure.
///
/// # Example
///
/// ```
/// use phpunit_mate::config::Settings;
///
/// let settings: Settings = toml::from_str(r#"
///     [phpunit]
///     timeout_secs = 60
/// "#).unwrap();
///
/// assert_eq!(settings.phpunit.timeout_secs, 60);
/// assert_eq!(settings.phpunit.binary, "phpunit");
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Project location.
    #[serde(default)]
    pub project: ProjectSettings,

    /// How PHPUnit is located and invoked.
    #[serde(default)]
    pub phpunit: PhpunitSettings,

    /// Static test discovery.
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Output rendering.
    #[serde(default)]
    pub output: OutputSettings,
}

/// Project location settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProjectSettings {
    /// Project root. PHPUnit runs with this as its working directory and all
    /// relative paths (config candidates, test directories) resolve against it.
    ///
    /// Default: the current working directory.
    pub root: Option<PathBuf>,
}

/// PHPUnit invocation settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `binary` | `phpunit` |
/// | `local_paths` | `["vendor/bin/phpunit"]` |
/// | `interpreter` | `php` |
/// | `use_interpreter` | `true` |
/// | `timeout_secs` | 300 |
/// | `config_candidates` | `phpunit.xml`, `phpunit.xml.dist`, `phpunit.dist.xml` |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhpunitSettings {
    /// Binary name used for the system-wide `PATH` lookup.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Project-local binary locations, tried in order before `PATH`.
    /// Relative entries resolve against the project root.
    #[serde(default = "default_local_paths")]
    pub local_paths: Vec<PathBuf>,

    /// Interpreter used to launch the binary when `use_interpreter` is set.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Launch the binary through the interpreter (`php vendor/bin/phpunit ...`).
    #[serde(default = "default_true")]
    pub use_interpreter: bool,

    /// Hard wall-clock limit for a single PHPUnit run.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// PHPUnit configuration file names, most specific first.
    #[serde(default = "default_config_candidates")]
    pub config_candidates: Vec<String>,
}

impl Default for PhpunitSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            local_paths: default_local_paths(),
            interpreter: default_interpreter(),
            use_interpreter: true,
            timeout_secs: default_timeout(),
            config_candidates: default_config_candidates(),
        }
    }
}

fn default_binary() -> String {
    "phpunit".to_string()
}

fn default_local_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("vendor/bin/phpunit")]
}

fn default_interpreter() -> String {
    "php".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_config_candidates() -> Vec<String> {
    vec![
        "phpunit.xml".to_string(),
        "phpunit.xml.dist".to_string(),
        "phpunit.dist.xml".to_string(),
    ]
}

/// Static discovery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// File name suffix identifying test files.
    ///
    /// Default: `Test.php`
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            file_suffix: default_file_suffix(),
        }
    }
}

fn default_file_suffix() -> String {
    "Test.php".to_string()
}

/// Output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSettings {
    /// Maximum length, in characters, of a failure or error message.
    ///
    /// Default: 200
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
        }
    }
}

fn default_message_limit() -> usize {
    200
}
