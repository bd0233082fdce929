//! Configuration management for the rsperm server.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rsperm_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("rsperm.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```
//!
//! # Example YAML Configuration
//!
//! ```yaml
//! engine:
//!   cache_initial_capacity: 64
//!   include_diagnostics: true
//! logging:
//!   level: info
//!   json: false
//! policy:
//!   checks:
//!     user has all access: { kind: allow }
//!     is admin: { kind: role, role: admin }
//!   entities:
//!     - name: book
//!       permissions:
//!         read: user has all access
//!       fields:
//!         title:
//!           update: is admin
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Engine settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Declared checks and entity rules
    #[serde(default)]
    pub policy: PolicySettings,
}

/// Permission engine settings.
///
/// Environment overrides use the `RSPERM_` prefix and `__` as the nested key
/// separator, e.g. `RSPERM_ENGINE__CACHE_INITIAL_CAPACITY=500`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineSettings {
    /// Check results to allocate room for up front in each request cache.
    /// The cache grows past it and never evicts.
    #[serde(default = "default_cache_initial_capacity")]
    pub cache_initial_capacity: usize,

    /// Attach the rendered expression trace to every decision.
    #[serde(default = "default_true")]
    pub include_diagnostics: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_initial_capacity: default_cache_initial_capacity(),
            include_diagnostics: true,
        }
    }
}

fn default_cache_initial_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Checks and rules loaded into the permission dictionary.
///
/// Configuration keys are case-folded on load, so check names should be
/// written in lower case.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PolicySettings {
    /// Check name to prefab check binding.
    #[serde(default)]
    pub checks: BTreeMap<String, CheckSettings>,

    /// Entity types and their rules.
    #[serde(default)]
    pub entities: Vec<EntitySettings>,
}

/// A prefab check binding.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CheckSettings {
    /// Always passes.
    Allow,
    /// Always fails.
    Deny,
    /// Passes when the user holds `role`.
    Role {
        #[serde(default)]
        role: String,
    },
}

/// Rules declared for one entity type.
///
/// Category keys are case-insensitive; names other than read, create, update
/// and delete declare user-defined categories.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EntitySettings {
    pub name: String,

    /// Category to entity-level rule.
    #[serde(default)]
    pub permissions: BTreeMap<String, String>,

    /// Field to category to field-level rule.
    #[serde(default)]
    pub fields: BTreeMap<String, BTreeMap<String, String>>,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RSPERM_` and use `__` as separator.
    /// For example:
    /// - `RSPERM_LOGGING__LEVEL=debug` overrides `logging.level`
    /// - `RSPERM_ENGINE__INCLUDE_DIAGNOSTICS=false` overrides `engine.include_diagnostics`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Uses default values and allows overrides via RSPERM_ prefixed env vars.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    ///
    /// Rule text is not parsed here; malformed rules surface when a decision
    /// first compiles them.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        for (name, check) in &self.policy.checks {
            if name.trim().is_empty() {
                return Err(invalid("policy.checks names must not be empty"));
            }
            if let CheckSettings::Role { role } = check {
                if role.trim().is_empty() {
                    return Err(invalid(format!(
                        "policy.checks.{name}: role checks require a non-empty role"
                    )));
                }
            }
        }

        for entity in &self.policy.entities {
            if entity.name.trim().is_empty() {
                return Err(invalid("policy.entities entries require a name"));
            }
            let categories = entity
                .permissions
                .keys()
                .chain(entity.fields.values().flat_map(|rules| rules.keys()));
            for category in categories {
                if category.trim().is_empty() {
                    return Err(invalid(format!(
                        "policy.entities.{}: permission category must not be empty",
                        entity.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn environment() -> Environment {
    // RSPERM_ENGINE__CACHE_INITIAL_CAPACITY -> engine.cache_initial_capacity
    Environment::with_prefix("RSPERM")
        .prefix_separator("_")
        .separator("__")
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
engine:
  cache_initial_capacity: 500
  include_diagnostics: false

logging:
  level: debug
  json: true

policy:
  checks:
    user has all access:
      kind: allow
    user has no access:
      kind: deny
    is admin:
      kind: role
      role: admin
  entities:
    - name: book
      permissions:
        read: user has all access
        delete: is admin
      fields:
        title:
          update: is admin OR user has no access
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.engine.cache_initial_capacity, 500);
        assert!(!config.engine.include_diagnostics);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.policy.checks.len(), 3);
        assert_eq!(
            config.policy.checks.get("is admin"),
            Some(&CheckSettings::Role {
                role: "admin".to_string()
            })
        );
        assert_eq!(
            config.policy.checks.get("user has no access"),
            Some(&CheckSettings::Deny)
        );
        let book = &config.policy.entities[0];
        assert_eq!(book.name, "book");
        assert_eq!(
            book.permissions.get("read").map(String::as_str),
            Some("user has all access")
        );
        assert_eq!(
            book.fields["title"].get("update").map(String::as_str),
            Some("is admin OR user has no access")
        );
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
engine:
  cache_initial_capacity: 500

logging:
  level: info
"#
        )
        .unwrap();

        std::env::set_var("RSPERM_ENGINE__CACHE_INITIAL_CAPACITY", "42");
        std::env::set_var("RSPERM_LOGGING__LEVEL", "warn");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("RSPERM_ENGINE__CACHE_INITIAL_CAPACITY");
        std::env::remove_var("RSPERM_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.engine.cache_initial_capacity, 42);
        assert_eq!(config.logging.level, "warn");
        assert!(config.engine.include_diagnostics);
    }

    /// Test: Config validation catches errors
    #[test]
    fn test_config_validation_catches_errors() {
        let mut config = ServerConfig::default();
        config.logging.level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));

        let mut config = ServerConfig::default();
        config.policy.checks.insert(
            "is admin".to_string(),
            CheckSettings::Role {
                role: "  ".to_string(),
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("policy.checks.is admin"));

        let mut config = ServerConfig::default();
        config.policy.entities.push(EntitySettings::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("require a name"));

        let mut config = ServerConfig::default();
        let mut entity = EntitySettings {
            name: "book".to_string(),
            ..Default::default()
        };
        entity
            .permissions
            .insert(" ".to_string(), "user has all access".to_string());
        config.policy.entities.push(entity);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("category must not be empty"));
    }

    /// Test: Unknown check kinds are rejected at load time
    #[test]
    #[serial]
    fn test_unknown_check_kind_fails_to_load() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
policy:
  checks:
    is owner:
      kind: owner
"#
        )
        .unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    /// Test: Invalid config returns clear error
    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = ServerConfig::load("/nonexistent/path/rsperm.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    /// Test: Default config is valid
    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.engine.cache_initial_capacity, 64);
        assert!(config.engine.include_diagnostics);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.policy.checks.is_empty());
        assert!(config.policy.entities.is_empty());
    }

    /// Test: from_env loads defaults with env overrides
    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("RSPERM_LOGGING__JSON", "true");

        let config = ServerConfig::from_env();

        std::env::remove_var("RSPERM_LOGGING__JSON");

        let config = config.unwrap();
        assert!(config.logging.json);
        assert_eq!(config.engine.cache_initial_capacity, 64);
    }
}
