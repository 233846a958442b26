use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::discover::DiscoverSource;
use super::env::EnvSource;
use super::file::FileSource;
use super::interpolate::{process_env, EnvLookup, Resolver};
use super::merge::merge;
use super::resolve::{self, expand, ExpandOptions};
use super::source::{ConfigSource, Layer, ValueSource};
use super::value::{Map, Value};
use super::ConfigError;

/// A configuration source in the loading pipeline.
#[derive(Debug)]
enum Source {
    File { path: PathBuf, required: bool },
    Env { prefix: String, separator: String },
    Inline { value: Value, origin_dir: Option<PathBuf> },
    Discover { base_name: String },
    Custom(Box<dyn ConfigSource>),
}

impl Source {
    fn layers(&self, options: &Options) -> Result<Vec<Layer>, ConfigError> {
        match self {
            Source::File { path, required } => FileSource::new(path, *required).layers(),
            Source::Env { prefix, separator } => EnvSource::new(prefix.clone(), separator.clone()).layers(),
            Source::Inline { value, origin_dir } => ValueSource::new(value.clone(), origin_dir.clone()).layers(),
            Source::Discover { base_name } => DiscoverSource::new(base_name.clone())
                .start_dir(&options.start_dir)
                .max_up(options.max_up)
                .stop_after(options.stop_after)
                .layers(),
            Source::Custom(source) => source.layers(),
        }
    }
}

/// Settings that shape how configuration is discovered and expanded.
///
/// Can be deserialized, so an application may read them from its own
/// bootstrap file:
///
/// ```
/// use configle::Options;
///
/// let options: Options = toml::from_str("smart_strings = false\nmax_up = 3").unwrap();
/// assert_eq!(options.max_up, Some(3));
/// assert!(options.expand_vars);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Where discovery starts.
    pub start_dir: PathBuf,
    /// Maximum number of directories discovery searches.
    pub max_up: Option<usize>,
    /// Discovery stops once this many directories have yielded files.
    pub stop_after: Option<usize>,
    /// Annotate text with the directory of the file it came from.
    pub smart_strings: bool,
    /// Resolve `${path}` references against the configuration itself.
    pub expand_vars: bool,
    /// Resolve `${env:NAME}`, and bare names missing from the configuration.
    pub expand_env: bool,
    /// Expand unresolved references to nothing instead of failing.
    pub allow_undefined: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            start_dir: PathBuf::from("."),
            max_up: None,
            stop_after: None,
            smart_strings: true,
            expand_vars: true,
            expand_env: true,
            allow_undefined: false,
        }
    }
}

/// Builder for loading configuration from files, discovery, the environment,
/// and in-memory values.
///
/// Sources are merged in registration order, and the first source to define a
/// value wins. Mappings are merged key by key and sequences are concatenated,
/// so a later source can fill in keys an earlier one left out and contribute
/// extra list entries, but never replace a value.
///
/// ## Variable References
///
/// Text values can reference other config values using `${path.to.field}` syntax:
///
/// ```toml
/// [server]
/// host = "localhost"
/// port = 8080
/// url = "http://${server.host}:${server.port}/api"
/// ```
///
/// A value that is nothing but a single reference keeps the referenced value's
/// type, so `port = "${server.port}"` stays an integer. `${env:HOME}` reads the
/// environment, `${path:data}` resolves `data` against the directory of the
/// file the value came from, and `$$` escapes a literal `$`.
///
/// ## Example
///
/// ```no_run
/// use configle::Config;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: u16,
/// }
///
/// let config: MyConfig = Config::builder()
///     .with_file("config/local.toml", false)
///     .with_file("config/default.toml", true)
///     .build()?;
/// # Ok::<(), configle::ConfigError>(())
/// ```
#[derive(Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct Config {
    sources: Vec<Source>,
    options: Options,
    resolvers: Vec<Box<dyn Resolver>>,
    default_resolvers: Vec<Box<dyn Resolver>>,
    env: Option<Box<EnvLookup>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sources", &self.sources)
            .field("options", &self.options)
            .field("resolvers", &self.resolvers.len())
            .field("default_resolvers", &self.default_resolvers.len())
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Adds a TOML or JSON file to be loaded, chosen by extension.
    ///
    /// If `required` is `true`, the build will fail if the file doesn't exist.
    /// Optional files that are missing are silently skipped.
    pub fn with_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        self.sources.push(Source::File {
            path: path.as_ref().to_path_buf(),
            required,
        });
        self
    }

    /// Searches for `<base_name>.json` and `<base_name>.toml` in the start
    /// directory and its ancestors. The base name may be a path pattern such
    /// as `app.(local|)`.
    ///
    /// Files found closer to the start directory take precedence.
    ///
    /// ```no_run
    /// # use configle::Config;
    /// let tree = Config::builder()
    ///     .discover("myapp.(local|)")
    ///     .stop_after(Some(1))
    ///     .build_tree()?;
    /// # Ok::<(), configle::ConfigError>(())
    /// ```
    pub fn discover(mut self, base_name: impl Into<String>) -> Self {
        self.sources.push(Source::Discover {
            base_name: base_name.into(),
        });
        self
    }

    /// Loads configuration from environment variables with the given prefix.
    ///
    /// Environment variables are mapped to config paths by:
    /// 1. Removing the prefix and separator
    /// 2. Splitting remaining segments on the separator
    /// 3. Converting path segments to lowercase
    ///
    /// Values are kept as text. Register the environment first to let it
    /// override files:
    ///
    /// ```no_run
    /// # use configle::Config;
    /// # use serde::Deserialize;
    /// # #[derive(Deserialize)] struct MyConfig { }
    /// // With MYAPP__DATABASE__HOST=localhost
    /// let config: MyConfig = Config::builder()
    ///     .with_env("MYAPP", "__")
    ///     .with_file("config/default.toml", true)
    ///     .build()?;
    /// # Ok::<(), configle::ConfigError>(())
    /// ```
    pub fn with_env(mut self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.sources.push(Source::Env {
            prefix: prefix.into(),
            separator: separator.into(),
        });
        self
    }

    /// Adds an in-memory configuration tree.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.sources.push(Source::Inline {
            value: value.into(),
            origin_dir: None,
        });
        self
    }

    /// Adds an in-memory configuration tree whose text is treated as if it had
    /// been loaded from a file in `dir`.
    pub fn with_value_from(mut self, value: impl Into<Value>, dir: impl AsRef<Path>) -> Self {
        self.sources.push(Source::Inline {
            value: value.into(),
            origin_dir: Some(dir.as_ref().to_path_buf()),
        });
        self
    }

    /// Adds a custom configuration source.
    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Source::Custom(Box::new(source)));
        self
    }

    /// Replaces all options at once.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn start_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.options.start_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn max_up(mut self, max_up: Option<usize>) -> Self {
        self.options.max_up = max_up;
        self
    }

    pub fn stop_after(mut self, stop_after: Option<usize>) -> Self {
        self.options.stop_after = stop_after;
        self
    }

    pub fn smart_strings(mut self, enabled: bool) -> Self {
        self.options.smart_strings = enabled;
        self
    }

    pub fn expand_vars(mut self, enabled: bool) -> Self {
        self.options.expand_vars = enabled;
        self
    }

    pub fn expand_env(mut self, enabled: bool) -> Self {
        self.options.expand_env = enabled;
        self
    }

    pub fn allow_undefined(mut self, enabled: bool) -> Self {
        self.options.allow_undefined = enabled;
        self
    }

    /// Adds a resolver consulted before any built-in one.
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Adds a resolver consulted only after every built-in one has declined.
    pub fn with_default_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.default_resolvers.push(Box::new(resolver));
        self
    }

    /// Replaces the process environment as seen by `${env:NAME}` and `${NAME}`.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env = Some(Box::new(lookup));
        self
    }

    /// Loads, merges, and expands every source into a [`ConfigTree`].
    pub fn build_tree(self) -> Result<ConfigTree, ConfigError> {
        let mut layers = Vec::new();
        for source in &self.sources {
            layers.extend(source.layers(&self.options)?);
        }
        tracing::debug!(layers = layers.len(), "merging configuration layers");

        let smart_strings = self.options.smart_strings;
        let values: Vec<Value> = layers
            .into_iter()
            .map(|layer| if smart_strings { layer.annotated() } else { layer.value })
            .collect();
        let merged = merge(values.iter().map(Some)).unwrap_or_else(|| Value::Map(Map::new()));

        let options = ExpandOptions {
            resolvers: self.resolvers,
            default_resolvers: self.default_resolvers,
            expand_vars: self.options.expand_vars,
            expand_env: self.options.expand_env,
            allow_undefined: self.options.allow_undefined,
            env: self.env.unwrap_or_else(|| Box::new(process_env)),
        };
        let value = expand(&merged, options)?;

        Ok(ConfigTree { value })
    }

    /// Builds the configuration and deserializes it into `T`.
    ///
    /// This performs deserialization once at build time rather than on each access,
    /// making subsequent config reads zero-cost.
    pub fn build<T: DeserializeOwned>(self) -> Result<T, ConfigError> {
        self.build_tree()?.deserialize()
    }
}

/// A fully expanded configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    value: Value,
}

impl ConfigTree {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Looks up a path pattern, merging every path it names.
    pub fn get(&self, path_spec: &str) -> Result<Option<Value>, ConfigError> {
        resolve::get(&self.value, path_spec)
    }

    /// Looks up a path pattern and interprets the text found there as
    /// pathnames, relative to the directory each piece of text came from.
    pub fn pathnames(&self, path_spec: &str) -> Result<Vec<PathBuf>, ConfigError> {
        let pathnames = match self.get(path_spec)? {
            Some(Value::Text(text)) => vec![text.to_pathname()],
            Some(Value::Seq(items)) => items
                .iter()
                .filter_map(Value::as_text)
                .map(|text| text.to_pathname())
                .collect(),
            _ => Vec::new(),
        };
        Ok(pathnames)
    }

    /// Deserializes the whole tree into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let json = serde_json::to_value(&self.value)?;
        Ok(serde_json::from_value(json)?)
    }
}
