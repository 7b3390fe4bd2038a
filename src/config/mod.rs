//! Configuration for the `atlas` binary.
//! Provides configuration types, default paths and XML loading.

pub mod paths;
pub mod types;
pub mod xml;

pub use paths::{default_config_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use xml::{CONFIG_ENV, config_path, load_config, load_config_from_xml_path};
