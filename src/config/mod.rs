//! Configuration loading, merging, and reference expansion.

mod builder;
mod discover;
mod env;
mod error;
mod file;
pub mod interpolate;
pub mod merge;
pub mod pattern;
pub mod resolve;
mod source;
mod value;

pub use builder::{Config, ConfigTree, Options};
pub use discover::DiscoverSource;
pub use env::EnvSource;
pub use error::ConfigError;
pub use file::{FileSource, Format};
pub use source::{ConfigSource, Layer, ValueSource};
pub use value::{Map, Text, Value};
