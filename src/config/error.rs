use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("circular reference: {}", .trace.join(" -> "))]
    CircularReference { trace: Vec<String> },

    #[error("undefined variable '{name}'{}", referenced_from(.origin))]
    UndefinedVariable {
        name: String,
        origin: Option<String>,
    },

    #[error("required config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    JsonError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported config file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        ConfigError::Syntax(message.into())
    }
}

fn referenced_from(origin: &Option<String>) -> String {
    match origin {
        Some(path) if !path.is_empty() => format!(" (referenced from '{path}')"),
        _ => String::new(),
    }
}
