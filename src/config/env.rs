use super::source::{insert_at_path, ConfigSource, Layer};
use super::value::{Map, Value};
use super::ConfigError;

/// A configuration source built from prefixed environment variables.
///
/// `MYAPP__DATABASE__HOST=db0` with prefix `MYAPP` and separator `__` becomes
/// `database.host = "db0"`. Values are kept as text.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    separator: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        Self {
            prefix: prefix.into(),
            separator,
        }
    }

    fn collect(&self, vars: impl IntoIterator<Item = (String, String)>) -> Map {
        let prefix_with_sep = format!("{}{}", self.prefix, self.separator);
        let mut map = Map::new();

        for (key, value) in vars {
            let Some(path_str) = key.strip_prefix(&prefix_with_sep) else {
                continue;
            };
            if path_str.is_empty() {
                continue;
            }

            let path: Vec<String> = path_str
                .split(&self.separator)
                .map(|s| s.to_lowercase())
                .collect();

            tracing::trace!(var = %key, "applying environment override");
            insert_at_path(&mut map, &path, Value::from(value));
        }

        map
    }
}

impl ConfigSource for EnvSource {
    fn layers(&self) -> Result<Vec<Layer>, ConfigError> {
        let map = self.collect(std::env::vars());
        if map.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![Layer::new(Value::Map(map))])
    }
}
