//! Configuration tree values.
//!
//! A tree is built from terminals (null, booleans, numbers, text), sequences,
//! and mappings. Text may carry the directory of the file it was loaded from
//! so that it can later be resolved as a pathname relative to that file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A mapping from names to configuration values.
pub type Map = BTreeMap<String, Value>;

/// A text terminal, optionally annotated with the directory it was sourced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Text {
    Plain(String),
    Annotated { text: String, origin_dir: PathBuf },
}

impl Text {
    pub fn as_str(&self) -> &str {
        match self {
            Text::Plain(text) | Text::Annotated { text, .. } => text,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Text::Plain(text) | Text::Annotated { text, .. } => text,
        }
    }

    /// The directory this text was loaded from, if known.
    pub fn origin_dir(&self) -> Option<&Path> {
        match self {
            Text::Plain(_) => None,
            Text::Annotated { origin_dir, .. } => Some(origin_dir.as_path()),
        }
    }

    /// Returns new text that carries this text's annotation.
    pub fn with_text(&self, text: impl Into<String>) -> Text {
        match self {
            Text::Plain(_) => Text::Plain(text.into()),
            Text::Annotated { origin_dir, .. } => Text::Annotated {
                text: text.into(),
                origin_dir: origin_dir.clone(),
            },
        }
    }

    /// Annotates plain text with `dir`. Text that is already annotated keeps
    /// its original directory.
    pub fn annotate(self, dir: impl AsRef<Path>) -> Text {
        match self {
            Text::Plain(text) => Text::Annotated {
                text,
                origin_dir: dir.as_ref().to_path_buf(),
            },
            annotated => annotated,
        }
    }

    /// Interprets the text as a pathname relative to its origin directory.
    ///
    /// Absolute paths and plain text are returned unchanged.
    pub fn to_pathname(&self) -> PathBuf {
        match self {
            Text::Plain(text) => PathBuf::from(text),
            Text::Annotated { text, origin_dir } => origin_dir.join(text),
        }
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Text {
    fn from(text: &str) -> Self {
        Text::Plain(text.to_string())
    }
}

impl From<String> for Text {
    fn from(text: String) -> Self {
        Text::Plain(text)
    }
}

/// A node in a configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(Text),
    Seq(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Value::Seq(_) | Value::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Recursively annotates every text leaf with `dir`.
    pub fn annotate(self, dir: &Path) -> Value {
        match self {
            Value::Text(text) => Value::Text(text.annotate(dir)),
            Value::Seq(items) => Value::Seq(items.into_iter().map(|v| v.annotate(dir)).collect()),
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(key, v)| (key, v.annotate(dir)))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Renders the value as it appears when spliced into surrounding text.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(text) => text.as_str().to_string(),
            Value::Seq(_) | Value::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(text) => serializer.serialize_str(text.as_str()),
            Value::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(Text::from(text))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(Text::Plain(text))
    }
}

impl From<Text> for Value {
    fn from(text: Text) -> Self {
        Value::Text(text)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::Text(Text::Plain(s)),
            toml::Value::Integer(i) => Value::Integer(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::Text(Text::Plain(dt.to_string())),
            toml::Value::Array(items) => Value::Seq(items.into_iter().map(Value::from).collect()),
            toml::Value::Table(table) => Value::from(table),
        }
    }
}

impl From<toml::Table> for Value {
    fn from(table: toml::Table) -> Self {
        Value::Map(
            table
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect(),
        )
    }
}

/// JSON integers outside the `i64` range become `Float` and may lose precision.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(Text::Plain(s)),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let table: toml::Table = toml::from_str(
            r#"
            name = "demo"
            port = 8080
            ratio = 0.5
            debug = true
            tags = ["a", "b"]

            [db]
            host = "localhost"
            "#,
        )
        .unwrap();
        let value = Value::from(table);

        assert_eq!(value.get("name").and_then(Value::as_str), Some("demo"));
        assert_eq!(value.get("port"), Some(&Value::Integer(8080)));
        assert_eq!(value.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(value.get("debug"), Some(&Value::Bool(true)));
        assert_eq!(value.get("tags").and_then(Value::as_seq).map(<[Value]>::len), Some(2));
        assert_eq!(
            value.get("db").and_then(|db| db.get("host")).and_then(Value::as_str),
            Some("localhost")
        );
    }

    #[test]
    fn test_from_json_large_integer_is_float() {
        let value = Value::from(serde_json::json!({ "big": u64::MAX, "max": i64::MAX }));
        assert_eq!(value.get("big"), Some(&Value::Float(u64::MAX as f64)));
        assert_eq!(value.get("max"), Some(&Value::Integer(i64::MAX)));
    }

    #[test]
    fn test_from_json_keeps_null() {
        let value = Value::from(serde_json::json!({ "a": null, "b": 1.25 }));
        assert_eq!(value.get("a"), Some(&Value::Null));
        assert_eq!(value.get("b"), Some(&Value::Float(1.25)));
    }

    #[test]
    fn test_relative_pathname() {
        let text = Text::from("mystuff").annotate("/tmp");
        assert_eq!(text.to_pathname(), PathBuf::from("/tmp/mystuff"));
    }

    #[test]
    fn test_absolute_pathname() {
        let text = Text::from("/usr/bin/node").annotate("/tmp");
        assert_eq!(text.to_pathname(), PathBuf::from("/usr/bin/node"));
    }

    #[test]
    fn test_annotation_is_not_overwritten() {
        let text = Text::from("mystuff").annotate("/tmp").annotate("/opt");
        assert_eq!(text.origin_dir(), Some(Path::new("/tmp")));
        assert_eq!(text.to_pathname(), PathBuf::from("/tmp/mystuff"));
    }

    #[test]
    fn test_with_text_keeps_annotation() {
        let plain = Text::from("Hello, World\n").with_text("foo");
        assert_eq!(plain, Text::Plain("foo".into()));

        let smart = Text::from("${ENV}").annotate("/tmp").with_text("foo");
        assert_eq!(smart.origin_dir(), Some(Path::new("/tmp")));
        assert_eq!(smart.to_pathname(), PathBuf::from("/tmp/foo"));
    }

    #[test]
    fn test_annotate_tree() {
        let value = Value::from(serde_json::json!({ "dirs": ["a", "b"], "n": 1 }))
            .annotate(Path::new("/srv"));
        let dirs = value.get("dirs").and_then(Value::as_seq).unwrap();
        assert!(dirs.iter().all(|d| d.as_text().unwrap().origin_dir() == Some(Path::new("/srv"))));
        assert_eq!(value.get("n"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Integer(3000).render(), "3000");
        assert_eq!(Value::Bool(false).render(), "false");
        assert_eq!(Value::Null.render(), "null");
        assert_eq!(Value::from(vec![Value::Integer(1), Value::from("x")]).render(), r#"[1,"x"]"#);
    }
}
