use std::path::{Path, PathBuf};

use super::value::{Map, Value};
use super::ConfigError;

/// A raw configuration tree and the directory it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub value: Value,
    pub origin_dir: Option<PathBuf>,
}

impl Layer {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            origin_dir: None,
        }
    }

    pub fn from_dir(value: Value, dir: impl AsRef<Path>) -> Self {
        Self {
            value,
            origin_dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    /// The tree with every text leaf annotated with the origin directory.
    pub fn annotated(self) -> Value {
        match self.origin_dir {
            Some(dir) => self.value.annotate(&dir),
            None => self.value,
        }
    }
}

/// Something that produces configuration layers, in precedence order.
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    fn layers(&self) -> Result<Vec<Layer>, ConfigError>;
}

/// A configuration tree built in memory.
#[derive(Debug, Clone)]
pub struct ValueSource {
    layer: Layer,
}

impl ValueSource {
    pub fn new(value: Value, origin_dir: Option<PathBuf>) -> Self {
        Self {
            layer: Layer { value, origin_dir },
        }
    }
}

impl ConfigSource for ValueSource {
    fn layers(&self) -> Result<Vec<Layer>, ConfigError> {
        Ok(vec![self.layer.clone()])
    }
}

/// Places `value` at `path`, creating intermediate mappings and replacing
/// anything in the way that is not a mapping.
pub(crate) fn insert_at_path(map: &mut Map, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };

    if rest.is_empty() {
        map.insert(first.clone(), value);
        return;
    }

    if !matches!(map.get(first), Some(Value::Map(_))) {
        map.insert(first.clone(), Value::Map(Map::new()));
    }

    if let Some(Value::Map(nested)) = map.get_mut(first) {
        insert_at_path(nested, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn test_insert_creates_tables() {
        let mut map = Map::new();
        insert_at_path(&mut map, &path("database.primary.host"), Value::from("db0"));
        insert_at_path(&mut map, &path("database.primary.port"), Value::from("5432"));

        let tree = Value::Map(map);
        let primary = tree.get("database").and_then(|d| d.get("primary")).unwrap();
        assert_eq!(primary.get("host"), Some(&Value::from("db0")));
        assert_eq!(primary.get("port"), Some(&Value::from("5432")));
    }

    #[test]
    fn test_insert_replaces_terminal() {
        let mut map = Map::new();
        insert_at_path(&mut map, &path("server"), Value::from("plain"));
        insert_at_path(&mut map, &path("server.host"), Value::from("example.com"));

        let tree = Value::Map(map);
        assert_eq!(
            tree.get("server").and_then(|s| s.get("host")),
            Some(&Value::from("example.com"))
        );
    }

    #[test]
    fn test_layer_annotation() {
        let layer = Layer::from_dir(Value::from(serde_json::json!({ "p": "x" })), "/etc/app");
        let value = layer.annotated();
        let text = value.get("p").and_then(Value::as_text).unwrap();
        assert_eq!(text.origin_dir(), Some(Path::new("/etc/app")));

        let plain = Layer::new(Value::from("x")).annotated();
        assert_eq!(plain, Value::from("x"));
    }
}
