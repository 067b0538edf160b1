//! Name-based dispatch for tools and resources.
//!
//! The registry is an explicit table: each entry pairs a [`ToolDefinition`]
//! (name, description, JSON schema of the arguments) with a handler that
//! decodes the arguments and calls into the [`Toolbox`].

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{
    LIST_TESTS, ListTestsParams, RUN_FILE, RUN_METHOD, RUN_SUITE, RunFileParams,
    RunMethodParams, RunSuiteParams, ToolError, ToolResult, Toolbox,
};
use crate::format::FormatMode;

/// URI of the configuration resource.
pub const CONFIG_RESOURCE_URI: &str = "phpunit://config";

const CONFIG_RESOURCE_NAME: &str = "phpunit-configuration";

type ToolFuture<'a> = BoxFuture<'a, ToolResult<String>>;
type Handler = fn(&Toolbox, Value) -> ToolFuture<'_>;

/// Description of a callable tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Description of a readable resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDefinition {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
}

/// Contents of a resource read.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

struct Entry {
    definition: ToolDefinition,
    handler: Handler,
}

/// All tools and resources of a [`Toolbox`].
pub struct ToolRegistry {
    toolbox: Toolbox,
    entries: Vec<Entry>,
}

impl ToolRegistry {
    /// Registers the built-in PHPUnit tools.
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox,
            entries: builtin_entries(),
        }
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.entries.iter().map(|entry| &entry.definition)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions().find(|definition| definition.name == name)
    }

    /// Calls the tool `name` with JSON `arguments`.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult<String> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.definition.name == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::debug!("Calling {} with {}", name, arguments);
        (entry.handler)(&self.toolbox, arguments).await
    }

    pub fn resources(&self) -> Vec<ResourceDefinition> {
        vec![ResourceDefinition {
            uri: CONFIG_RESOURCE_URI,
            name: CONFIG_RESOURCE_NAME,
            description: "PHPUnit project configuration: project root, config file path, \
                test directories, bootstrap file and full config content. Use for: \
                understanding project setup, locating test directories, troubleshooting \
                configuration issues.",
            mime_type: "text/plain",
        }]
    }

    /// Reads the resource at `uri`.
    pub fn read_resource(&self, uri: &str) -> ToolResult<ResourceContent> {
        match uri {
            CONFIG_RESOURCE_URI => Ok(ResourceContent {
                uri: uri.to_string(),
                mime_type: "text/plain".to_string(),
                text: self.toolbox.config_report()?,
            }),
            _ => Err(ToolError::UnknownResource(uri.to_string())),
        }
    }
}

/// Decodes tool arguments; `null` counts as no arguments.
fn decode<T: DeserializeOwned>(tool: &str, arguments: Value) -> ToolResult<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidRequest(format!("Invalid arguments for {tool}: {e}")))
}

fn run_suite(toolbox: &Toolbox, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let params = decode::<RunSuiteParams>(RUN_SUITE, arguments)?;
        toolbox.run_suite(params).await
    })
}

fn run_file(toolbox: &Toolbox, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let params = decode::<RunFileParams>(RUN_FILE, arguments)?;
        toolbox.run_file(params).await
    })
}

fn run_method(toolbox: &Toolbox, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let params = decode::<RunMethodParams>(RUN_METHOD, arguments)?;
        toolbox.run_method(params).await
    })
}

fn list_tests(toolbox: &Toolbox, arguments: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let params = decode::<ListTestsParams>(LIST_TESTS, arguments)?;
        toolbox.list_tests(params)
    })
}

fn mode_schema(modes: &[FormatMode]) -> Value {
    let names: Vec<&str> = modes.iter().map(FormatMode::as_str).collect();
    json!({
        "type": "string",
        "enum": names,
        "default": FormatMode::Default.as_str(),
        "description": "Output mode"
    })
}

fn builtin_entries() -> Vec<Entry> {
    vec![
        Entry {
            definition: ToolDefinition {
                name: RUN_SUITE,
                description: "Run the full PHPUnit test suite. Returns token-optimized TOON. \
                    Modes: \"default\" (summary plus failures and errors with truncated messages), \
                    \"summary\" (totals and status only), \"detailed\" (full class names and paths), \
                    \"by-file\" (issues grouped by file), \"by-class\" (issues grouped by class).",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "configuration": {
                            "type": "string",
                            "description": "Path to a PHPUnit configuration file (detected when omitted)"
                        },
                        "filter": {
                            "type": "string",
                            "description": "PHPUnit --filter pattern"
                        },
                        "stopOnFailure": {
                            "type": "boolean",
                            "description": "Stop on the first failure",
                            "default": false
                        },
                        "mode": mode_schema(&FormatMode::ALL)
                    }
                }),
            },
            handler: run_suite,
        },
        Entry {
            definition: ToolDefinition {
                name: RUN_FILE,
                description: "Run the PHPUnit tests of a single file. Returns token-optimized TOON. \
                    Use for testing changes to one test file.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file": {
                            "type": "string",
                            "description": "Test file path relative to the project root"
                        },
                        "filter": {
                            "type": "string",
                            "description": "PHPUnit --filter pattern"
                        },
                        "stopOnFailure": {
                            "type": "boolean",
                            "description": "Stop on the first failure",
                            "default": false
                        },
                        "mode": mode_schema(&FormatMode::ALL)
                    },
                    "required": ["file"]
                }),
            },
            handler: run_file,
        },
        Entry {
            definition: ToolDefinition {
                name: RUN_METHOD,
                description: "Run a single PHPUnit test method. Returns token-optimized TOON. \
                    Use for debugging one failing test.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "class": {
                            "type": "string",
                            "description": "Fully qualified test class, e.g. App\\Tests\\UserTest"
                        },
                        "method": {
                            "type": "string",
                            "description": "Test method name"
                        },
                        "mode": mode_schema(&FormatMode::ALL)
                    },
                    "required": ["class", "method"]
                }),
            },
            handler: run_method,
        },
        Entry {
            definition: ToolDefinition {
                name: LIST_TESTS,
                description: "List the PHPUnit tests of the project as files, classes and \
                    methods, without running them. Optionally limited to one directory.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "directory": {
                            "type": "string",
                            "description": "Directory relative to the project root (configured test directories when omitted)"
                        }
                    }
                }),
            },
            handler: list_tests,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::tools::tests::{FAILING_REPORT, FakeExecutor, toolbox};

    fn registry(root: &std::path::Path) -> ToolRegistry {
        ToolRegistry::new(toolbox(root, Arc::new(FakeExecutor::new(Some(FAILING_REPORT), 1))))
    }

    #[test]
    fn test_definitions() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(temp_dir.path());

        let names: Vec<_> = registry.definitions().map(|d| d.name).collect();
        assert_eq!(
            names,
            [
                "phpunit-run-suite",
                "phpunit-run-file",
                "phpunit-run-method",
                "phpunit-list-tests"
            ]
        );

        let run_file = registry.get("phpunit-run-file").unwrap();
        assert_eq!(run_file.input_schema["required"], json!(["file"]));
        assert!(registry.get("phpunit-coverage").is_none());
    }

    #[test]
    fn test_definition_serializes_input_schema() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(temp_dir.path());

        let value = serde_json::to_value(registry.get(RUN_SUITE).unwrap()).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert_eq!(
            value["inputSchema"]["properties"]["mode"]["enum"],
            json!(["default", "summary", "detailed", "by-file", "by-class"])
        );
    }

    #[tokio::test]
    async fn test_call_dispatches() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(temp_dir.path());

        let output = registry
            .call(RUN_SUITE, json!({"mode": "summary", "stopOnFailure": true}))
            .await
            .unwrap();

        assert!(output.contains("status: FAILED"));
        assert!(!output.contains("failures"));
    }

    #[test]
    fn test_call_null_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(temp_dir.path());

        let output = tokio_test::block_on(registry.call(LIST_TESTS, Value::Null)).unwrap();
        assert_eq!(output, "tests[0]:");
    }

    #[test]
    fn test_call_unknown_tool() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(temp_dir.path());

        let err = tokio_test::block_on(registry.call("phpunit-coverage", json!({}))).unwrap_err();

        assert!(matches!(err, ToolError::UnknownTool(_)));
        assert_eq!(err.to_string(), "Unknown tool: phpunit-coverage");
    }

    #[tokio::test]
    async fn test_call_wrong_argument_type() {
        let temp_dir = TempDir::new().unwrap();
        let err = registry(temp_dir.path())
            .call(RUN_FILE, json!({"file": 42}))
            .await
            .unwrap_err();

        assert!(err.is_invalid_request());
        assert!(err.to_string().starts_with("Invalid arguments for phpunit-run-file"));
    }

    #[test]
    fn test_read_config_resource() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(temp_dir.path());

        let resources = registry.resources();
        assert_eq!(resources[0].uri, "phpunit://config");

        let content = registry.read_resource(CONFIG_RESOURCE_URI).unwrap();
        assert_eq!(content.mime_type, "text/plain");
        assert!(content.text.contains("config_exists: false"));

        let err = registry.read_resource("phpunit://coverage").unwrap_err();
        assert!(matches!(err, ToolError::UnknownResource(_)));
    }
}
