//! Settings loading and PHPUnit configuration detection.
//!
//! Two different things are called "configuration" here:
//!
//! - [`Settings`]: phpunit-mate's own optional TOML file (binary lookup,
//!   timeouts, truncation bound).
//! - [`ConfigurationDetector`]: finds and reads the project's `phpunit.xml`.

pub mod detector;
pub mod schema;

pub use detector::ConfigurationDetector;
pub use schema::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default settings file name, looked up in the current directory.
pub const DEFAULT_SETTINGS_FILE: &str = "phpunit-mate.toml";

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or doesn't match the schema.
///
/// # Example
///
/// ```no_run
/// use phpunit_mate::config::load_settings;
/// use std::path::Path;
///
/// let settings = load_settings(Path::new("phpunit-mate.toml"))?;
/// println!("Timeout: {}s", settings.phpunit.timeout_secs);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    let settings: Settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

    Ok(settings)
}

/// Loads settings from a TOML string.
///
/// # Example
///
/// ```
/// use phpunit_mate::config::load_settings_str;
///
/// let settings = load_settings_str(r#"
///     [output]
///     message_limit = 120
/// "#)?;
///
/// assert_eq!(settings.output.message_limit, 120);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_settings_str(content: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(content).context("Failed to parse settings")?;

    Ok(settings)
}

/// Loads settings from `path` if it exists, otherwise returns the defaults.
pub fn load_settings_or_default(path: &Path) -> Result<Settings> {
    if path.exists() {
        load_settings(path)
    } else {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        Ok(Settings::default())
    }
}

impl Settings {
    /// Resolves the project root: the configured root with `~` and
    /// environment variables expanded, or the current directory.
    pub fn project_root(&self) -> Result<PathBuf> {
        match &self.project.root {
            Some(root) => {
                let raw = root.to_string_lossy();
                let expanded = shellexpand::full(&raw)
                    .with_context(|| format!("Failed to expand project root: {raw}"))?;
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => std::env::current_dir().context("Unable to determine current working directory"),
        }
    }
}
