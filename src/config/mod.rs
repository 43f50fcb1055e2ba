//! Configuration for the registry and the command-line tool.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_REGISTRY_CONFIG` environment variable (explicit path)
//! 2. `./serial-registry.toml` (current directory)
//! 3. `serial-registry.toml` in the platform config directory
//!    (`~/.config/serial-registry/` on Linux, `%APPDATA%\serial-registry\config\` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Selected values can be overridden via environment variables named
//! `SERIAL_REGISTRY_<SECTION>_<KEY>`, for example:
//! - `SERIAL_REGISTRY_SERIAL_DEFAULT_BAUD=115200`
//! - `SERIAL_REGISTRY_LOGGING_LEVEL=debug`
//!
//! The hardware test suite also reads `TEST_PORT`, `TEST_BAUD`, `TEST_TIMEOUT`
//! and `TEST_LOOPBACK`.
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_registry::config::ConfigLoader;
//! use serial_registry::Registry;
//!
//! let loader = ConfigLoader::load()?;
//! let registry = Registry::from_config(loader.config());
//! println!("Default baud: {}", loader.config().serial.default_baud);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TestingConfig};
