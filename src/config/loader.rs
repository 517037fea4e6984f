//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `upstream.api_key`.
pub const ENV_API_KEY: &str = "NYT_API_KEY";
/// Environment variable overriding `cache.redis_url`.
pub const ENV_REDIS_URL: &str = "GATEWAY_REDIS_URL";
/// Environment variable overriding `admin.api_key`.
pub const ENV_ADMIN_KEY: &str = "GATEWAY_ADMIN_KEY";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load, apply environment overrides and validate a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, |name| std::env::var(name).ok())
}

/// Parse `content`, then apply overrides looked up through `env`.
pub fn parse_config<F>(content: &str, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: GatewayConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a file.
pub fn default_config() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut GatewayConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    if let Some(key) = non_empty(ENV_API_KEY) {
        config.upstream.api_key = key;
    }
    if let Some(url) = non_empty(ENV_REDIS_URL) {
        config.cache.redis_url = Some(url);
    }
    if let Some(key) = non_empty(ENV_ADMIN_KEY) {
        config.admin.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_win() {
        let config = parse_config("[upstream]\napi_key = \"from-file\"\n", |name| match name {
            ENV_API_KEY => Some("from-env".to_string()),
            ENV_REDIS_URL => Some("redis://cache:6379".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.upstream.api_key, "from-env");
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn test_blank_env_ignored() {
        let config = parse_config("[upstream]\napi_key = \"from-file\"\n", |_| Some("  ".into())).unwrap();
        assert_eq!(config.upstream.api_key, "from-file");
    }

    #[test]
    fn test_parse_error_reported() {
        let err = parse_config("listener = 3", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors_collected() {
        let err = parse_config(
            "[[bulkheads]]\nroute_prefix = \"api\"\nmax_concurrent = 0\n",
            |_| None,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
