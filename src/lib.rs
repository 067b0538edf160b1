//! phpunit-mate: token-efficient PHPUnit test execution for AI agents.
//!
//! This crate runs a PHP project's PHPUnit suite (or one file, or one
//! method), parses the JUnit XML report PHPUnit writes and renders the
//! outcome in compact output modes meant to be read by a language model.
//! The operations are served over MCP (stdio JSON-RPC) and from the CLI.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Config**: Settings file and `phpunit.xml` detection
//! - **Discovery**: Static scan of `*Test.php` files for test methods
//! - **Process/Runner**: Launch PHPUnit with a temporary `--log-junit` report
//! - **Report**: Parse JUnit XML into a normalized result
//! - **Format**: Render results as TOON or JSON
//! - **Tools/MCP**: Named operations and the server exposing them
//!
//! # Example
//!
//! ```no_run
//! use phpunit_mate::config::Settings;
//! use phpunit_mate::tools::{RunSuiteParams, Toolbox};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let toolbox = Toolbox::from_settings(&settings, settings.project_root()?);
//!     let output = toolbox.run_suite(RunSuiteParams::default()).await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod format;
pub mod mcp;
pub mod process;
pub mod report;
pub mod runner;
pub mod tools;

// Re-export commonly used types
pub use config::{ConfigurationDetector, Settings, load_settings};
pub use discovery::{TestDescriptor, TestDiscovery};
pub use format::{FormatMode, Formatter};
pub use mcp::McpServer;
pub use report::{JunitParser, TestResult};
pub use runner::{RunResult, Runner};
pub use tools::{ToolRegistry, Toolbox};
