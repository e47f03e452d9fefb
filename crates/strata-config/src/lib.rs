//! Configuration for the Strata terrain generator.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Missing sections and fields fall back to defaults, so old
//! files keep loading as settings are added.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{BiomeConfig, Config, DebugConfig, GenerationConfig, default_config_dir};
pub use error::ConfigError;
