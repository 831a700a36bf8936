use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::auth::{Actor, Role};
use crate::errors::ServiceError;

/// Default values for configuration
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_ROLE: &str = "warehouse_staff";
const CONFIG_DIR: &str = "config";

/// Client configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ClientConfig {
    /// Base URL of the inventory REST API, including any `/api` prefix
    #[validate(url)]
    pub api_base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Environment name (development, staging, production)
    pub environment: String,

    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Id of the signed-in user; recorded as author of created transactions
    #[serde(default)]
    pub actor_id: Option<String>,

    #[validate(custom = "validate_role")]
    pub actor_role: String,

    #[validate(range(min = 1, max = 65536))]
    pub event_channel_capacity: usize,
}

impl ClientConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// The acting user described by `actor_id` and `actor_role`.
    pub fn actor(&self) -> Result<Actor, ServiceError> {
        let id = self
            .actor_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::Config("actor_id is not configured".into()))?;
        let role = Role::from_str(&self.actor_role)
            .map_err(|_| ServiceError::Config(format!("unknown role '{}'", self.actor_role)))?;
        Ok(Actor::new(id, role))
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.is_production() && self.api_base_url.starts_with("http://") {
            let mut err = ValidationError::new("api_base_url");
            err.message = Some("Production deployments must use https".into());
            errors.add("api_base_url", err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_role(role: &str) -> Result<(), ValidationError> {
    Role::from_str(role).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("actor_role");
        err.message = Some(
            "Must be one of: admin, warehouse_staff, department_user, head_of_warehouse".into(),
        );
        err
    })
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stockdesk={}", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_directive));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads client configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<ClientConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(CONFIG_DIR, &run_env)
}

/// Same as [`load_config`] with an explicit config directory and profile.
pub fn load_config_from(
    dir: impl AsRef<Path>,
    run_env: &str,
) -> Result<ClientConfig, AppConfigError> {
    let dir = dir.as_ref();
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("api_base_url", DEFAULT_API_BASE_URL)?
        .set_default("request_timeout_secs", DEFAULT_TIMEOUT_SECS)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("actor_role", DEFAULT_ROLE)?
        .set_default("event_channel_capacity", DEFAULT_EVENT_CHANNEL_CAPACITY as u64)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let client_config: ClientConfig = config.try_deserialize()?;

    client_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    client_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(client_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = config_dir(&[]);
        let cfg = load_config_from(dir.path().join("missing"), "development").unwrap();
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.actor_role, "warehouse_staff");
        assert_matches!(cfg.actor(), Err(ServiceError::Config(_)));
    }

    #[test]
    fn profile_file_overrides_default_file() {
        let dir = config_dir(&[
            (
                "default.toml",
                "api_base_url = \"http://inventory.local/api\"\nactor_id = \"u-1\"\n",
            ),
            (
                "staging.toml",
                "request_timeout_secs = 5\nactor_role = \"admin\"\n",
            ),
        ]);
        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.api_base_url, "http://inventory.local/api");
        assert_eq!(cfg.request_timeout_secs, 5);
        let actor = cfg.actor().unwrap();
        assert_eq!(actor.id.as_str(), "u-1");
        assert_eq!(actor.role, Role::Admin);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = config_dir(&[(
            "default.toml",
            "request_timeout_secs = 0\nlog_level = \"loud\"\nactor_role = \"janitor\"\n",
        )]);
        let err = load_config_from(dir.path(), "development").unwrap_err();
        match err {
            AppConfigError::Validation(errors) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("request_timeout_secs"));
                assert!(fields.contains_key("log_level"));
                assert!(fields.contains_key("actor_role"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn production_requires_https() {
        let dir = config_dir(&[]);
        let err = load_config_from(dir.path(), "production").unwrap_err();
        assert_matches!(err, AppConfigError::Validation(_));
    }
}
