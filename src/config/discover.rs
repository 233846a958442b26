//! Discovery of configuration files in a directory and its ancestors.

use std::path::{Path, PathBuf};

use super::file::{load_config_file, Format};
use super::pattern::MultiPath;
use super::source::{ConfigSource, Layer};
use super::ConfigError;

/// A configuration source that looks for `<name>.<ext>` files, starting in a
/// directory and climbing toward the filesystem root.
///
/// The base name is a path pattern, so `"app.(local|)"` looks for
/// `app.local.json`, `app.local.toml`, `app.json`, and `app.toml` in each
/// directory, in that order. Files in nearer directories come first and
/// therefore take precedence.
#[derive(Debug, Clone)]
pub struct DiscoverSource {
    base_name: String,
    start_dir: PathBuf,
    max_up: Option<usize>,
    stop_after: Option<usize>,
}

impl DiscoverSource {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            start_dir: PathBuf::from("."),
            max_up: None,
            stop_after: None,
        }
    }

    /// The directory the search starts in. Defaults to the working directory.
    pub fn start_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.start_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Maximum number of directories to search, the start directory included.
    pub fn max_up(mut self, max_up: Option<usize>) -> Self {
        self.max_up = max_up;
        self
    }

    /// Stop climbing once this many directories have yielded files.
    pub fn stop_after(mut self, stop_after: Option<usize>) -> Self {
        self.stop_after = stop_after;
        self
    }

    fn candidates(&self) -> Result<Vec<String>, ConfigError> {
        let names = MultiPath::parse(&self.base_name)?.paths();
        Ok(names
            .iter()
            .filter(|name| !name.is_empty())
            .flat_map(|name| Format::ALL.map(|format| format!("{name}.{}", format.extension())))
            .collect())
    }
}

impl ConfigSource for DiscoverSource {
    fn layers(&self) -> Result<Vec<Layer>, ConfigError> {
        let candidates = self.candidates()?;
        let mut dir = std::fs::canonicalize(&self.start_dir).map_err(|e| ConfigError::ReadError {
            path: self.start_dir.clone(),
            source: e,
        })?;

        let mut layers = Vec::new();
        let mut searched = 0;
        let mut found_in = 0;

        loop {
            if self.max_up.is_some_and(|max| searched >= max)
                || self.stop_after.is_some_and(|n| found_in >= n)
            {
                break;
            }

            let before = layers.len();
            for candidate in &candidates {
                let path = dir.join(candidate);
                if let Some(value) = load_config_file(&path, false)? {
                    tracing::debug!(path = %path.display(), "discovered config file");
                    layers.push(Layer::from_dir(value, &dir));
                }
            }
            if layers.len() > before {
                found_in += 1;
            }
            searched += 1;

            let Some(parent) = dir.parent().map(Path::to_path_buf) else {
                break;
            };
            dir = parent;
        }

        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::Value;
    use std::fs;

    /// root/home/me/projects, each level holding a few config files.
    fn tree() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap().join("root");
        let projects = root.join("home/me/projects");
        fs::create_dir_all(&projects).unwrap();

        fs::write(
            projects.join("configle.local.json"),
            r#"{ "name": "Projects local config", "sources": ["projects local"], "here": ["."] }"#,
        )
        .unwrap();
        fs::write(
            projects.join("configle.toml"),
            "name = \"Projects config\"\nsources = [\"projects\"]\nhere = [\".\"]\n",
        )
        .unwrap();
        fs::write(
            root.join("home/me/configle.json"),
            r#"{ "sources": ["home"], "here": ["."] }"#,
        )
        .unwrap();
        fs::write(root.join("configle.toml"), "sources = [\"root\"]\nhere = [\".\"]\n").unwrap();

        (tmp, root)
    }

    fn sources(layers: &[Layer]) -> Vec<String> {
        layers
            .iter()
            .filter_map(|layer| layer.value.get("sources").and_then(Value::as_seq))
            .flat_map(|seq| seq.iter().filter_map(Value::as_str).map(String::from))
            .collect()
    }

    #[test]
    fn test_candidates_follow_pattern() {
        let source = DiscoverSource::new("app.(local|)");
        assert_eq!(
            source.candidates().unwrap(),
            vec!["app.local.json", "app.local.toml", "app.json", "app.toml"]
        );
    }

    #[test]
    fn test_discovers_nearest_first() {
        let (_tmp, root) = tree();
        let source = DiscoverSource::new("configle.(local|)")
            .start_dir(root.join("home/me/projects"))
            .max_up(Some(4));

        let layers = source.layers().unwrap();

        assert_eq!(sources(&layers), vec!["projects local", "projects", "home", "root"]);
        let dirs: Vec<_> = layers.iter().map(|l| l.origin_dir.clone().unwrap()).collect();
        assert_eq!(
            dirs,
            vec![
                root.join("home/me/projects"),
                root.join("home/me/projects"),
                root.join("home/me"),
                root.clone(),
            ]
        );
    }

    #[test]
    fn test_max_up_limits_search() {
        let (_tmp, root) = tree();
        let source = DiscoverSource::new("configle.(local|)")
            .start_dir(root.join("home/me/projects"))
            .max_up(Some(2));

        assert_eq!(sources(&source.layers().unwrap()), vec!["projects local", "projects", "home"]);
    }

    #[test]
    fn test_stop_after_counts_directories_with_files() {
        let (_tmp, root) = tree();
        let source = DiscoverSource::new("configle.(local|)")
            .start_dir(root.join("home/me/projects"))
            .stop_after(Some(2));

        // home/ holds no files, so the second hit is home/me.
        assert_eq!(sources(&source.layers().unwrap()), vec!["projects local", "projects", "home"]);
    }

    #[test]
    fn test_missing_start_dir() {
        let source = DiscoverSource::new("configle").start_dir("/nonexistent/start/dir");
        assert!(matches!(source.layers(), Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_bad_base_name() {
        let source = DiscoverSource::new("configle.(local");
        assert!(matches!(source.layers(), Err(ConfigError::Syntax(_))));
    }
}
