//! Static PHPUnit test discovery.
//!
//! Tests are found by scanning source text, never by loading or executing
//! PHP. This is best effort: it recognises the conventional layout of one
//! test class per file extending a base test case, with `public function
//! testSomething(` methods. Files that don't follow that layout (no class,
//! several classes) are skipped rather than guessed at.
//!
//! # Example
//!
//! ```no_run
//! use phpunit_mate::discovery::TestDiscovery;
//!
//! let discovery = TestDiscovery::new("/srv/app");
//! for test in discovery.discover_tests(&["tests".to_string()]) {
//!     println!("{}::{}", test.class, test.method);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

static CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)\s+extends").expect("valid class pattern"));

static NAMESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"namespace\s+([\w\\]+)\s*;").expect("valid namespace pattern")
});

static METHOD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public\s+function\s+(test\w+)\s*\(").expect("valid method pattern")
});

/// A single runnable test found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    /// File path relative to the project root.
    pub file: String,

    /// Namespace-qualified class name (`App\Tests\UserTest`).
    pub class: String,

    /// Test method name.
    pub method: String,
}

/// Scans test directories for PHPUnit test methods.
#[derive(Debug, Clone)]
pub struct TestDiscovery {
    project_root: PathBuf,
    file_suffix: String,
}

impl TestDiscovery {
    /// Creates a discovery rooted at `project_root`, matching `*Test.php`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            file_suffix: "Test.php".to_string(),
        }
    }

    /// Sets the file name suffix that marks a test file.
    pub fn with_file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = suffix.into();
        self
    }

    /// Discovers tests in the given directories (relative to the project
    /// root). Missing directories are skipped.
    ///
    /// Results are in directory order, then file order (sorted by name), then
    /// declaration order within each file.
    pub fn discover_tests(&self, directories: &[String]) -> Vec<TestDescriptor> {
        let mut tests = Vec::new();

        for dir in directories {
            let full_path = self.project_root.join(dir.trim_start_matches('/'));

            if !full_path.is_dir() {
                tracing::debug!("Skipping missing test directory {}", full_path.display());
                continue;
            }

            let files = WalkDir::new(&full_path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!("Failed to read directory entry: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.ends_with(&self.file_suffix))
                });

            for entry in files {
                tests.extend(self.parse_test_file(entry.path()));
            }
        }

        tracing::debug!("Discovered {} tests", tests.len());
        tests
    }

    fn parse_test_file(&self, path: &Path) -> Vec<TestDescriptor> {
        let content = match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        let file = path
            .strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        scan_source(&content)
            .map(|(class, methods)| {
                methods
                    .into_iter()
                    .map(|method| TestDescriptor {
                        file: file.clone(),
                        class: class.clone(),
                        method,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Extracts the qualified class name and test method names from PHP source.
///
/// Returns `None` when the file has no class extending another, or more than
/// one.
fn scan_source(content: &str) -> Option<(String, Vec<String>)> {
    let mut classes = CLASS_PATTERN.captures_iter(content);
    let class_name = classes.next()?.get(1)?.as_str();
    if classes.next().is_some() {
        tracing::debug!("Skipping file declaring several classes");
        return None;
    }

    let class = match NAMESPACE_PATTERN
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    {
        Some(namespace) if !namespace.is_empty() => format!("{namespace}\\{class_name}"),
        _ => class_name.to_string(),
    };

    let methods = METHOD_PATTERN
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    Some((class, methods))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const USER_TEST: &str = r#"<?php

namespace App\Tests;

use PHPUnit\Framework\TestCase;

final class UserTest extends TestCase
{
    protected function setUp(): void
    {
    }

    public function testCreate(): void
    {
        $this->assertTrue(true);
    }

    private function helper(): void
    {
    }

    public function testDelete(): void
    {
    }
}
"#;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discovers_methods_in_declaration_order() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "tests/UserTest.php", USER_TEST);

        let tests = TestDiscovery::new(temp_dir.path()).discover_tests(&["tests".to_string()]);

        assert_eq!(
            tests,
            vec![
                TestDescriptor {
                    file: "tests/UserTest.php".to_string(),
                    class: "App\\Tests\\UserTest".to_string(),
                    method: "testCreate".to_string(),
                },
                TestDescriptor {
                    file: "tests/UserTest.php".to_string(),
                    class: "App\\Tests\\UserTest".to_string(),
                    method: "testDelete".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_class_without_namespace_uses_bare_name() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "tests/PlainTest.php",
            "<?php\nclass PlainTest extends TestCase {\n public function testIt() {}\n}\n",
        );

        let tests = TestDiscovery::new(temp_dir.path()).discover_tests(&["tests".to_string()]);

        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].class, "PlainTest");
        assert_eq!(tests[0].method, "testIt");
    }

    #[test]
    fn test_class_without_test_methods_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "tests/EmptyTest.php",
            "<?php\nnamespace App;\nclass EmptyTest extends TestCase {\n public function helper() {}\n}\n",
        );

        let tests = TestDiscovery::new(temp_dir.path()).discover_tests(&["tests".to_string()]);
        assert!(tests.is_empty());
    }

    #[test]
    fn test_file_without_class_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "tests/BrokenTest.php",
            "<?php\nfunction testOrphan() {\n",
        );

        let tests = TestDiscovery::new(temp_dir.path()).discover_tests(&["tests".to_string()]);
        assert!(tests.is_empty());
    }

    #[test]
    fn test_file_with_several_classes_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "tests/PairTest.php",
            "<?php\nclass ATest extends TestCase { public function testA() {} }\nclass BTest extends TestCase { public function testB() {} }\n",
        );

        let tests = TestDiscovery::new(temp_dir.path()).discover_tests(&["tests".to_string()]);
        assert!(tests.is_empty());
    }

    #[test]
    fn test_non_test_files_and_missing_directories_ignored() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "tests/UserTest.php", USER_TEST);
        write(temp_dir.path(), "tests/Helper.php", USER_TEST);
        write(temp_dir.path(), "tests/UserTest.php.bak", USER_TEST);

        let tests = TestDiscovery::new(temp_dir.path())
            .discover_tests(&["missing".to_string(), "/tests".to_string()]);

        assert_eq!(tests.len(), 2);
        assert!(tests.iter().all(|t| t.file == "tests/UserTest.php"));
    }

    #[test]
    fn test_recurses_in_sorted_order() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "tests/Unit/Zed/ZedTest.php",
            "<?php\nnamespace Unit\\Zed;\nclass ZedTest extends TestCase { public function testZ() {} }\n",
        );
        write(
            temp_dir.path(),
            "tests/Unit/AlphaTest.php",
            "<?php\nnamespace Unit;\nclass AlphaTest extends TestCase { public function testA() {} }\n",
        );

        let tests = TestDiscovery::new(temp_dir.path()).discover_tests(&["tests".to_string()]);

        let classes: Vec<_> = tests.iter().map(|t| t.class.as_str()).collect();
        assert_eq!(classes, vec!["Unit\\AlphaTest", "Unit\\Zed\\ZedTest"]);
        assert_eq!(tests[1].file, "tests/Unit/Zed/ZedTest.php");
    }

    #[test]
    fn test_custom_file_suffix() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "tests/UserSpec.php", USER_TEST);

        let tests = TestDiscovery::new(temp_dir.path())
            .with_file_suffix("Spec.php")
            .discover_tests(&["tests".to_string()]);
        assert_eq!(tests.len(), 2);
    }

    #[test]
    fn test_scan_source_tolerates_incomplete_source() {
        let (class, methods) =
            scan_source("<?php namespace A\\B;\nclass CTest extends X {\n public function testOne(").unwrap();

        assert_eq!(class, "A\\B\\CTest");
        assert_eq!(methods, vec!["testOne"]);
    }
}
