//! File-based configuration source.

use std::path::{Path, PathBuf};

use super::source::{ConfigSource, Layer};
use super::value::Value;
use super::ConfigError;

/// Supported configuration file formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// Every format, ordered by extension.
    pub const ALL: [Format; 2] = [Format::Json, Format::Toml];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Toml => "toml",
        }
    }

    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?;
        Format::ALL.into_iter().find(|f| f.extension() == ext)
    }

    fn parse(self, contents: &str, path: &Path) -> Result<Value, ConfigError> {
        match self {
            Format::Json => serde_json::from_str::<serde_json::Value>(contents)
                .map(Value::from)
                .map_err(|e| ConfigError::JsonError {
                    path: path.to_path_buf(),
                    source: e,
                }),
            Format::Toml => toml::from_str::<toml::Table>(contents)
                .map(Value::from)
                .map_err(|e| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    source: e,
                }),
        }
    }
}

/// A configuration source that loads from a TOML or JSON file.
///
/// Files can be marked as required or optional. Required files that don't exist
/// cause an error; optional files that don't exist are silently skipped.
/// Text values are annotated with the directory containing the file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    required: bool,
}

impl FileSource {
    /// Creates a new file source.
    ///
    /// If `required` is true, the build will fail if the file doesn't exist.
    pub fn new(path: impl AsRef<Path>, required: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            required,
        }
    }
}

impl ConfigSource for FileSource {
    fn layers(&self) -> Result<Vec<Layer>, ConfigError> {
        match load_config_file(&self.path, self.required)? {
            Some(value) => Ok(vec![Layer::from_dir(value, containing_dir(&self.path))]),
            None => Ok(vec![]),
        }
    }
}

fn containing_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Loads and parses a config file, picking the format from its extension.
///
/// Returns `Ok(None)` if the file doesn't exist and `required` is false.
pub(crate) fn load_config_file(path: &Path, required: bool) -> Result<Option<Value>, ConfigError> {
    let format = Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::debug!(path = %path.display(), "loading config file");
            format.parse(&contents, path).map(Some)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                Err(ConfigError::FileNotFound(path.to_path_buf()))
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
