//! Layered configuration with path patterns, structural merging, and
//! `${...}` reference expansion.

pub mod config;

pub use config::interpolate::{interpolate, FuncCall, ResolveContext, Resolver};
pub use config::merge::{merge, merge_with, Mergeable};
pub use config::pattern::MultiPath;
pub use config::resolve::{expand, get, ExpandOptions, Expander};
pub use config::{
    Config, ConfigError, ConfigSource, ConfigTree, DiscoverSource, EnvSource, FileSource, Format, Layer, Map,
    Options, Text, Value, ValueSource,
};
