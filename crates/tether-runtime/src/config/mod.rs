//! Configuration module for the Tether runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for the bridge, the inbound server and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, Settings, TetherConfig, WsServerConfig,
};
pub use validation::validate_config;
