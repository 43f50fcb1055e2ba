//! Finds, reads and writes `serial-registry.toml`, then layers
//! `SERIAL_REGISTRY_*` environment overrides on top.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_REGISTRY";

/// Config file name
const CONFIG_FILE_NAME: &str = "serial-registry.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_REGISTRY_CONFIG";

/// A loaded configuration and the file it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// File the configuration was read from; `None` for built-in defaults
    pub config_path: Option<PathBuf>,
    /// Configuration after environment overrides
    pub config: Config,
}

impl ConfigLoader {
    /// Load from the first configuration file found, or defaults.
    ///
    /// Search order:
    /// 1. `SERIAL_REGISTRY_CONFIG` environment variable (explicit path)
    /// 2. `./serial-registry.toml` (current directory)
    /// 3. `serial-registry.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment overrides are applied last.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path()?;

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load from `path`, which must exist.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Built-in defaults plus environment overrides.
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Re-read the file this loader came from, or the defaults if none.
    ///
    /// On error the previously loaded configuration is kept.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let mut config = match &self.config_path {
            Some(path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;

        self.config = config;
        Ok(())
    }

    /// Write the configuration to `path` as TOML, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
///
/// An explicit `SERIAL_REGISTRY_CONFIG` that points nowhere is an error
/// rather than a silent fallback.
pub fn resolve_config_path() -> ConfigResult<Option<PathBuf>> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::NotFound(path))
        };
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    Ok(get_default_config_path().filter(|path| path.exists()))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> Option<(String, String)> {
    let name = format!("{ENV_PREFIX}_{key}");
    std::env::var(&name).ok().map(|value| (name, value))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(name, format!("Invalid {what}")))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_REGISTRY_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_REGISTRY_SERIAL_DEFAULT_BAUD=115200`
/// - `SERIAL_REGISTRY_LOGGING_LEVEL=debug`
/// - `SERIAL_REGISTRY_TESTING_PORT=/dev/ttyUSB0`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some((name, val)) = env_var("SERIAL_DEFAULT_BAUD") {
        config.serial.default_baud = parse_env(&name, &val, "baud rate")?;
    }
    if let Some((name, val)) = env_var("SERIAL_DEFAULT_TIMEOUT_MS") {
        config.serial.default_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((name, val)) = env_var("SERIAL_CONNECT_ON_ACQUIRE") {
        config.serial.connect_on_acquire = parse_bool(&name, &val)?;
    }

    // Logging overrides
    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some((name, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = val
            .parse()
            .map_err(|message: String| ConfigError::env_parse(name, message))?;
    }

    // Testing overrides (also support the short TEST_PORT etc.)
    if let Some(val) = env_var("TESTING_PORT")
        .map(|(_, v)| v)
        .or_else(|| std::env::var("TEST_PORT").ok())
    {
        config.testing.port = Some(val);
    }
    if let Some((name, val)) = env_var("TESTING_BAUD")
        .or_else(|| std::env::var("TEST_BAUD").ok().map(|v| ("TEST_BAUD".to_string(), v)))
    {
        config.testing.baud = parse_env(&name, &val, "baud rate")?;
    }
    if let Some((name, val)) = env_var("TESTING_TIMEOUT_MS")
        .or_else(|| std::env::var("TEST_TIMEOUT").ok().map(|v| ("TEST_TIMEOUT".to_string(), v)))
    {
        config.testing.timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Ok(val) = std::env::var("TEST_LOOPBACK") {
        config.testing.loopback_enabled = parse_bool("TEST_LOOPBACK", &val)?;
    }

    Ok(())
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse(name, "Expected a boolean")),
    }
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "serial-registry").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.default_baud, 9600);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIAL_REGISTRY_SERIAL_DEFAULT_BAUD", "19200");
        env::set_var("SERIAL_REGISTRY_LOGGING_FORMAT", "compact");

        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.default_baud, 19200);
        assert_eq!(
            loader.config().logging.format,
            crate::config::LogFormat::Compact
        );

        env::remove_var("SERIAL_REGISTRY_SERIAL_DEFAULT_BAUD");
        env::remove_var("SERIAL_REGISTRY_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        env::set_var("SERIAL_REGISTRY_SERIAL_DEFAULT_TIMEOUT_MS", "soon");
        let result = ConfigLoader::with_defaults();
        env::remove_var("SERIAL_REGISTRY_SERIAL_DEFAULT_TIMEOUT_MS");

        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    #[serial]
    fn test_short_test_port_env() {
        env::set_var("TEST_PORT", "COM99");
        env::set_var("TEST_BAUD", "57600");
        env::set_var("TEST_LOOPBACK", "1");

        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().testing.port, Some("COM99".to_string()));
        assert_eq!(loader.config().testing.baud, 57600);
        assert!(loader.config().testing.loopback_enabled);

        env::remove_var("TEST_PORT");
        env::remove_var("TEST_BAUD");
        env::remove_var("TEST_LOOPBACK");
    }

    #[test]
    #[serial]
    fn test_load_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut loader = ConfigLoader::with_defaults().unwrap();
        loader.config.serial.default_baud = 38400;
        loader
            .config
            .serial
            .port_aliases
            .insert("scope".into(), "/dev/ttyACM1".into());
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.default_baud, 38400);
        assert_eq!(
            reloaded.config().serial.port_aliases.get("scope").map(String::as_str),
            Some("/dev/ttyACM1")
        );
        assert_eq!(reloaded.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    #[serial]
    fn test_reload_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[serial]\ndefault_baud = 4800\n").unwrap();

        let mut loader = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(loader.config().serial.default_baud, 4800);

        std::fs::write(&path, "[serial]\ndefault_baud = 57600\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.config().serial.default_baud, 57600);

        std::fs::write(&path, "[serial]\ndefault_baud = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.config().serial.default_baud, 57600);
    }

    #[test]
    #[serial]
    fn test_explicit_path_must_exist() {
        env::set_var(CONFIG_PATH_ENV, "/nonexistent/serial-registry.toml");
        let result = ConfigLoader::load();
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[serial]\nconnect_on_acquire = false\n").unwrap();

        env::set_var(CONFIG_PATH_ENV, &path);
        let result = ConfigLoader::load();
        env::remove_var(CONFIG_PATH_ENV);

        let loader = result.unwrap();
        assert!(!loader.config().serial.connect_on_acquire);
    }

    #[test]
    fn test_parse_error_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[serial\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
