//! Daemon configuration.
//!
//! Configuration is layered with the `config` crate:
//! 1. built-in defaults
//! 2. a TOML file (`APIFORGE_CONFIG`, or `config.toml` in the platform config dir)
//! 3. environment overrides of the form `APIFORGE__SECTION__KEY`
//!
//! A missing default file is not an error; a missing file named explicitly
//! through `APIFORGE_CONFIG` is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "APIFORGE_CONFIG";

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "APIFORGE";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly named config file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The layered sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field name, e.g. `search.alpha`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("Configuration has {} invalid values", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),

    /// The platform config/data directories could not be determined.
    #[error("Cannot determine platform directories for apiforge")]
    NoPlatformDirs,
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Ranking and pagination.
    pub search: SearchConfig,
    /// Descriptor storage.
    pub storage: StorageConfig,
    /// Sync coordination.
    pub sync: SyncConfig,
    /// Project usage scanning.
    pub usage: UsageConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Allow cross-origin requests from any origin (local UI).
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4680,
            cors_allow_any: true,
        }
    }
}

/// Ranking and pagination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Weight of textual relevance against recency, in `[0, 1]`.
    pub alpha: f64,
    /// Hours after which recency decays to one half.
    pub half_life_hours: f64,
    /// Page size when a caller passes none.
    pub default_limit: usize,
    /// Largest page size the HTTP facade accepts.
    pub max_page_size: usize,
    /// Default fuzzy tolerance, in `[0, 1]`.
    pub fuzzy: f64,
    /// Rerun a method query as free text when the method filter empties it.
    pub method_intent_fallback: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alpha: 0.75,
            half_life_hours: 24.0,
            default_limit: 20,
            max_page_size: 100,
            fuzzy: 0.2,
            method_intent_fallback: false,
        }
    }
}

impl SearchConfig {
    /// Every invalid field, empty when the config is usable.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !(0.0..=1.0).contains(&self.alpha) {
            errors.push(ConfigError::invalid(
                "search.alpha",
                format!("must be within [0, 1], got {}", self.alpha),
            ));
        }
        if !(self.half_life_hours.is_finite() && self.half_life_hours > 0.0) {
            errors.push(ConfigError::invalid(
                "search.half_life_hours",
                format!("must be a positive number, got {}", self.half_life_hours),
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy) {
            errors.push(ConfigError::invalid(
                "search.fuzzy",
                format!("must be within [0, 1], got {}", self.fuzzy),
            ));
        }
        if self.default_limit == 0 {
            errors.push(ConfigError::invalid("search.default_limit", "must be at least 1"));
        }
        if self.max_page_size < self.default_limit {
            errors.push(ConfigError::invalid(
                "search.max_page_size",
                format!(
                    "must be at least default_limit ({}), got {}",
                    self.default_limit, self.max_page_size
                ),
            ));
        }

        errors
    }
}

/// Descriptor storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; descriptors live in `<data_dir>/descriptors`.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Sync coordination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds after which a running sync is considered abandoned.
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

/// Project usage scanning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Project root to scan.
    pub root: PathBuf,
    /// Globs of files to scan, relative to `root`.
    pub include: Vec<String>,
    /// Globs of files to skip, relative to `root`.
    pub exclude: Vec<String>,
    /// Import prefix of the generated client package.
    pub package: String,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|ext| format!("**/*.{ext}"))
                .collect(),
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
                "**/dist/**".to_string(),
            ],
            package: "@apiforge/client".to_string(),
        }
    }
}

impl Config {
    /// Load from `APIFORGE_CONFIG` or the default location, plus the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing or any
    /// source fails to parse.
    pub fn load() -> ConfigResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                Self::build(Some(&path), None)
            }
            _ => {
                let path = default_config_path().ok();
                Self::build(path.as_deref(), None)
            }
        }
    }

    /// Load from a specific file (if it exists) plus the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source fails to parse.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        Self::build(Some(path), None)
    }

    /// Load, falling back to defaults with a warning on any error.
    #[must_use]
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load configuration, using defaults");
            Self::default()
        })
    }

    /// Layer defaults, an optional file and environment overrides.
    ///
    /// `env` replaces the process environment when given.
    fn build(
        path: Option<&Path>,
        env: Option<::config::Map<String, String>>,
    ) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            );
        }

        let environment = ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("usage.include")
            .with_list_parse_key("usage.exclude")
            .source(env);

        let config: Self = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        tracing::debug!(?path, "Configuration loaded");
        Ok(config)
    }

    /// Check every section, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single invalid field, or `MultipleValidationErrors`.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(ConfigError::invalid("server.host", "cannot be empty"));
        }
        if self.server.port == 0 {
            errors.push(ConfigError::invalid("server.port", "must be non-zero"));
        }

        errors.extend(self.search.validation_errors());

        if self.sync.timeout_secs == 0 {
            errors.push(ConfigError::invalid("sync.timeout_secs", "must be at least 1"));
        }

        if self.usage.package.trim().is_empty() {
            errors.push(ConfigError::invalid("usage.package", "cannot be empty"));
        }
        for (field, globs) in [("usage.include", &self.usage.include), ("usage.exclude", &self.usage.exclude)] {
            for glob in globs {
                if let Err(e) = globset::Glob::new(glob) {
                    errors.push(ConfigError::invalid(field, format!("invalid glob '{glob}': {e}")));
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Directory holding descriptor files.
    #[must_use]
    pub fn descriptors_dir(&self) -> PathBuf {
        self.storage.data_dir.join("descriptors")
    }
}

/// Default config file location.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformDirs`] when no home directory is known.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    directories::ProjectDirs::from("dev", "apiforge", "apiforge")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or(ConfigError::NoPlatformDirs)
}

/// Default data directory, falling back to `./.apiforge`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "apiforge", "apiforge")
        .map_or_else(|| PathBuf::from(".apiforge"), |dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(contents: &str, env: &[(&str, &str)]) -> ConfigResult<Config> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let env = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::build(Some(file.path()), Some(env))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 4680);
        assert!((config.search.alpha - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.search.max_page_size, 100);
        assert!(!config.search.method_intent_fallback);
        assert_eq!(config.sync.timeout_secs, 300);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::build(Some(&dir.path().join("absent.toml")), Some(Default::default())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = load("[search]\nalpha = 0.5\n\n[server]\nport = 9000\n", &[]).unwrap();
        assert!((config.search.alpha - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_environment_overrides_file() {
        let config = load(
            "[server]\nport = 9000\n",
            &[
                ("APIFORGE__SERVER__PORT", "9100"),
                ("APIFORGE__SEARCH__METHOD_INTENT_FALLBACK", "true"),
                ("APIFORGE__USAGE__EXCLUDE", "**/build/**,**/out/**"),
            ],
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(config.search.method_intent_fallback);
        assert_eq!(config.usage.exclude, vec!["**/build/**", "**/out/**"]);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = Config::default();
        config.search.alpha = 1.5;
        config.search.half_life_hours = 0.0;
        config.sync.timeout_secs = 0;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error_is_unwrapped() {
        let mut config = Config::default();
        config.usage.include = vec!["src/{unclosed".to_string()];

        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "usage.include"),
            other => panic!("expected a single error, got {other:?}"),
        }
    }

    #[test]
    fn test_search_config_bounds() {
        let config = SearchConfig {
            fuzzy: -0.1,
            default_limit: 0,
            ..SearchConfig::default()
        };
        assert_eq!(config.validation_errors().len(), 2);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
