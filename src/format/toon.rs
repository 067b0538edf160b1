//! TOON (Token-Oriented Object Notation) encoding.
//!
//! A YAML-like layout that spends as few tokens as possible on structure:
//!
//! ```text
//! summary:
//!   tests: 10
//!   passed: 8
//!   time: 5.5s
//! status: FAILED
//! failures[2]{class,method,message,file,line}:
//!   UserTest,testCreate,Expected 200 got 404,UserTest.php,45
//!   UserTest,testUpdate,"Expected true, got false",UserTest.php,60
//! ```
//!
//! Arrays carry their length. Arrays of primitives are written inline, arrays
//! of objects sharing the same primitive fields become a table, anything
//! else becomes a `- ` list. Strings are quoted only when they would
//! otherwise be ambiguous.

use serde_json::{Map, Value};

use super::StructuredEncoder;

const INDENT: &str = "  ";
const LIST_MARKER: &str = "- ";
const DELIMITER: char = ',';

/// Encodes values as TOON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToonEncoder;

impl ToonEncoder {
    pub fn new() -> Self {
        Self
    }

    fn write_object(&self, map: &Map<String, Value>, depth: usize, out: &mut Vec<String>) {
        for (key, value) in map {
            self.write_field(&encode_key(key), value, depth, out);
        }
    }

    fn write_field(&self, key: &str, value: &Value, depth: usize, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                out.push(format!("{}{}:", pad(depth), key));
                self.write_object(map, depth + 1, out);
            }
            Value::Array(items) => self.write_array(key, items, depth, out),
            primitive => out.push(format!("{}{}: {}", pad(depth), key, encode_primitive(primitive))),
        }
    }

    fn write_array(&self, key: &str, items: &[Value], depth: usize, out: &mut Vec<String>) {
        let header = format!("{}{}[{}]", pad(depth), key, items.len());

        if items.iter().all(is_primitive) {
            if items.is_empty() {
                out.push(format!("{header}:"));
            } else {
                out.push(format!("{header}: {}", join_primitives(items.iter())));
            }
            return;
        }

        if let Some(fields) = table_fields(items) {
            let names: Vec<String> = fields.iter().map(|f| encode_key(f)).collect();
            out.push(format!("{header}{{{}}}:", names.join(",")));
            for item in items.iter().filter_map(Value::as_object) {
                let row = join_primitives(fields.iter().filter_map(|f| item.get(*f)));
                out.push(format!("{}{}", pad(depth + 1), row));
            }
            return;
        }

        out.push(format!("{header}:"));
        for item in items {
            self.write_list_item(item, depth + 1, out);
        }
    }

    fn write_list_item(&self, item: &Value, depth: usize, out: &mut Vec<String>) {
        let mut lines = Vec::new();
        match item {
            Value::Object(map) if !map.is_empty() => self.write_object(map, depth + 1, &mut lines),
            Value::Array(items) => self.write_array("", items, depth + 1, &mut lines),
            Value::Object(_) => {
                out.push(format!("{}-", pad(depth)));
                return;
            }
            primitive => {
                out.push(format!("{}{}{}", pad(depth), LIST_MARKER, encode_primitive(primitive)));
                return;
            }
        }

        // The first line moves onto the marker; the rest keep their indent.
        let nested = pad(depth + 1);
        let mut lines = lines.into_iter();
        if let Some(first) = lines.next() {
            let first = first.strip_prefix(nested.as_str()).unwrap_or(&first);
            out.push(format!("{}{}{}", pad(depth), LIST_MARKER, first));
        }
        out.extend(lines);
    }
}

impl StructuredEncoder for ToonEncoder {
    fn encode(&self, value: &Value) -> String {
        let mut out = Vec::new();
        match value {
            Value::Object(map) => self.write_object(map, 0, &mut out),
            Value::Array(items) => self.write_array("", items, 0, &mut out),
            primitive => out.push(encode_primitive(primitive)),
        }
        out.join("\n")
    }
}

fn pad(depth: usize) -> String {
    INDENT.repeat(depth)
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Field names shared by every item when the array can be written as a
/// table: all items are non-empty objects with the same keys and only
/// primitive values.
fn table_fields(items: &[Value]) -> Option<Vec<&String>> {
    let first = items.first()?.as_object()?;
    if first.is_empty() {
        return None;
    }

    let fields: Vec<&String> = first.keys().collect();
    let uniform = items.iter().all(|item| {
        item.as_object().is_some_and(|map| {
            map.len() == fields.len()
                && fields
                    .iter()
                    .all(|f| map.get(*f).is_some_and(is_primitive))
        })
    });

    uniform.then_some(fields)
}

fn join_primitives<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(encode_primitive)
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

fn encode_primitive(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if needs_quotes(s) => quote(s),
        Value::String(s) => s.clone(),
        // Containers never reach here.
        other => quote(&other.to_string()),
    }
}

fn encode_key(key: &str) -> String {
    let mut chars = key.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if plain { key.to_string() } else { quote(key) }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.trim() != s
        || matches!(s, "true" | "false" | "null")
        || s.parse::<f64>().is_ok()
        || s.starts_with('-')
        || s.chars().any(|c| {
            c == DELIMITER
                || c.is_control()
                || matches!(c, ':' | '"' | '\\' | '[' | ']' | '{' | '}')
        })
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: Value) -> String {
        ToonEncoder::new().encode(&value)
    }

    #[test]
    fn test_flat_object() {
        let output = encode(json!({"tests": 10, "passed": 8, "time": "5.5s", "status": "FAILED"}));
        assert_eq!(output, "tests: 10\npassed: 8\ntime: 5.5s\nstatus: FAILED");
    }

    #[test]
    fn test_nested_object() {
        let output = encode(json!({"summary": {"tests": 1, "failed": 0}, "status": "OK"}));
        assert_eq!(output, "summary:\n  tests: 1\n  failed: 0\nstatus: OK");
    }

    #[test]
    fn test_tabular_array() {
        let output = encode(json!({
            "failures": [
                {"class": "UserTest", "method": "testCreate", "line": 45},
                {"class": "UserTest", "method": "testUpdate", "line": 60},
            ]
        }));
        assert_eq!(
            output,
            "failures[2]{class,method,line}:\n  UserTest,testCreate,45\n  UserTest,testUpdate,60"
        );
    }

    #[test]
    fn test_primitive_and_empty_arrays() {
        assert_eq!(
            encode(json!({"dirs": ["tests", "src/Tests"]})),
            "dirs[2]: tests,src/Tests"
        );
        assert_eq!(encode(json!({"tests": []})), "tests[0]:");
    }

    #[test]
    fn test_non_uniform_array_becomes_list() {
        let output = encode(json!({
            "items": [
                {"a": 1, "b": 2},
                {"a": 3},
                "plain",
            ]
        }));
        assert_eq!(output, "items[3]:\n  - a: 1\n    b: 2\n  - a: 3\n  - plain");
    }

    #[test]
    fn test_list_item_with_nested_object() {
        let output = encode(json!({"items": [{"name": "x", "meta": {"k": "v"}}]}));
        assert_eq!(output, "items[1]:\n  - name: x\n    meta:\n      k: v");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(encode(json!("plain text")), "plain text");
        assert_eq!(encode(json!("")), "\"\"");
        assert_eq!(encode(json!("a,b")), "\"a,b\"");
        assert_eq!(encode(json!("key: value")), "\"key: value\"");
        assert_eq!(encode(json!("true")), "\"true\"");
        assert_eq!(encode(json!("42")), "\"42\"");
        assert_eq!(encode(json!(" padded")), "\" padded\"");
        assert_eq!(encode(json!("- item")), "\"- item\"");
        assert_eq!(encode(json!("App\\Tests\\UserTest")), "\"App\\\\Tests\\\\UserTest\"");
        assert_eq!(encode(json!("line\nbreak")), "\"line\\nbreak\"");
        assert_eq!(encode(json!("say \"hi\"")), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_keys() {
        assert_eq!(encode(json!({"UserTest.php": 1})), "UserTest.php: 1");
        assert_eq!(encode(json!({"by_file": {}})), "by_file:");
        assert_eq!(encode(json!({"my key": 1})), "\"my key\": 1");
        assert_eq!(encode(json!({"1abc": 1})), "\"1abc\": 1");
    }

    #[test]
    fn test_primitives() {
        assert_eq!(encode(json!(null)), "null");
        assert_eq!(encode(json!(false)), "false");
        assert_eq!(encode(json!(-2)), "-2");
        assert_eq!(encode(json!(2.5)), "2.5");
    }

    #[test]
    fn test_root_array() {
        assert_eq!(encode(json!([1, 2, 3])), "[3]: 1,2,3");
    }
}
