//! Layered configuration loading.
//!
//! File formats follow the `toml-config` and `yaml-config` features. The
//! search takes the first `courier.*` or `config.*` file it finds.
//!
//! # Precedence (lowest first)
//!
//! 1. Built-in defaults
//! 2. Programmatic values passed to [`ConfigLoader::merge`]
//! 3. Profile-specific config file (`courier.{profile}.toml` / `courier.{profile}.yaml`)
//! 4. Main config file (`courier.toml` / `courier.yaml`)
//! 5. Environment variables (`COURIER_*`)
//!
//! # Environment
//!
//! `COURIER_` prefix, `__` between nested keys:
//!
//! - `COURIER_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `COURIER_IDENTITY__NICKNAME=relay` → `identity.nickname = "relay"`
//! - `COURIER_BRIDGE__RETRY__MAX_RETRIES=8` → `bridge.retry.max_retries = 8`
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/courier.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::CourierConfig;
use super::validation::validate_config;

/// Directory name under the user config dir.
const APP_DIR: &str = "courier";

/// Selects `courier.<profile>.*` overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting `dev` and `prod` shorthands.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `COURIER_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("COURIER_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds a [`CourierConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Searched in the order added. Replaces the default directories.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join(APP_DIR)),
            None => self,
        }
    }

    /// Sets a specific configuration file to load, skipping the search.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// `COURIER_*` variables are read by default.
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically. Applied before files and
    /// environment variables.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<CourierConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: CourierConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("invalid configuration: {e}"))
        })?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            nickname = %config.identity.nickname,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(CourierConfig::default()))
            .merge(std::mem::take(&mut self.figment));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with COURIER_ prefix");
            figment = figment.merge(
                Env::prefixed("COURIER_")
                    .ignore(&["PROFILE"])
                    .split("__"),
            );
        }

        Ok(figment)
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "unsupported config format .{ext} (check the toml-config/yaml-config features)"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join(APP_DIR)))
            .collect()
    }

    /// Merges the first base file found in any search directory, preceded by
    /// its profile variant (`courier.production.toml`) when one exists.
    fn load_config_files(&self, figment: Figment) -> Figment {
        for dir in self.resolve_search_paths() {
            for name in CONFIG_FILE_NAMES {
                let base = dir.join(name);
                if !base.is_file() {
                    continue;
                }

                let mut figment = figment;
                if let Some(variant) = profile_variant(&base, &self.profile)
                    && variant.is_file()
                {
                    debug!(path = %variant.display(), profile = %self.profile, "Merging profile config");
                    figment = merge_searched(figment, &variant);
                }
                info!(path = %base.display(), "Loading configuration file");
                return merge_searched(figment, &base);
            }
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

/// Candidate file names, in search order, for the enabled formats.
const CONFIG_FILE_NAMES: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "courier.toml",
    #[cfg(feature = "yaml-config")]
    "courier.yaml",
    #[cfg(feature = "yaml-config")]
    "courier.yml",
    #[cfg(feature = "toml-config")]
    "config.toml",
    #[cfg(feature = "yaml-config")]
    "config.yaml",
];

/// `dir/courier.toml` becomes `dir/courier.<profile>.toml`.
fn profile_variant(base: &Path, profile: &Profile) -> Option<PathBuf> {
    let stem = base.file_stem()?.to_str()?;
    let ext = base.extension()?.to_str()?;
    Some(base.with_file_name(format!("{stem}.{profile}.{ext}")))
}

/// Searched names only carry enabled extensions, so this cannot fail.
fn merge_searched(figment: Figment, path: &Path) -> Figment {
    match ConfigLoader::merge_config_file(figment.clone(), path) {
        Ok(merged) => merged,
        Err(_) => figment,
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<CourierConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from one file plus environment variables.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<CourierConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use figment::Jail;

    fn jailed(result: ConfigResult<CourierConfig>) -> figment::error::Result<CourierConfig> {
        result.map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = jailed(
                ConfigLoader::new()
                    .search_path(jail.directory())
                    .without_env()
                    .load(),
            )?;

            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.identity.nickname, "courier");
            Ok(())
        });
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("DEV"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/courier.toml")
            .load();

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "courier.toml",
                r#"
                [identity]
                nickname = "from-file"
                username = "relay"

                [logging]
                level = "warn"
                "#,
            )?;
            jail.set_env("COURIER_IDENTITY__NICKNAME", "from-env");
            jail.set_env("COURIER_BRIDGE__RETRY__MAX_RETRIES", "9");

            let config = jailed(ConfigLoader::new().search_path(jail.directory()).load())?;

            assert_eq!(config.identity.nickname, "from-env");
            assert_eq!(config.identity.username, "relay");
            assert_eq!(config.logging.level, LogLevel::Warn);
            assert_eq!(config.bridge.retry.max_retries, 9);
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_below_base_file() {
        Jail::expect_with(|jail| {
            jail.create_file("courier.production.toml", "[bot]\nmax_buffer = 1024\nconnect_timeout_ms = 500\n")?;
            jail.create_file("courier.toml", "[bot]\nmax_buffer = 2048\n")?;

            let config = jailed(
                ConfigLoader::new()
                    .profile("production")
                    .search_path(jail.directory())
                    .without_env()
                    .load(),
            )?;

            assert_eq!(config.bot.max_buffer, 2048);
            assert_eq!(config.bot.connect_timeout_ms, 500);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("COURIER_IDENTITY__NICKNAME", "two words");

            let result = ConfigLoader::new().search_path(jail.directory()).load();
            assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
            Ok(())
        });
    }
}
