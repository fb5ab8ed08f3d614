//! Configuration management for the site orchestrator
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use topology_compiler::CompilerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Root directory holding one private directory per site
    pub sites_path: PathBuf,

    /// Redis URL for the descriptor store; in-memory store when unset
    pub redis_url: Option<String>,

    /// Compose invocation, e.g. `docker compose` or `docker-compose`
    pub compose_command: Vec<String>,

    /// Docker CLI used for listing containers and reading logs
    pub docker_bin: String,

    /// Upper bound on a single container engine invocation
    pub engine_timeout: Duration,

    /// Images, PHP versions and proxy conventions for the compiler
    pub compiler: CompilerConfig,
}

impl OrchestratorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let defaults = CompilerConfig::default();

        let config = OrchestratorConfig {
            api_host: var("API_HOST", "0.0.0.0"),

            api_port: var("API_PORT", "8090")
                .parse()
                .context("Invalid API_PORT")?,

            sites_path: var("SITES_PATH", "/var/www/sites").into(),

            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),

            compose_command: var("COMPOSE_COMMAND", "docker compose")
                .split_whitespace()
                .map(str::to_string)
                .collect(),

            docker_bin: var("DOCKER_BIN", "docker"),

            engine_timeout: Duration::from_secs(
                var("ENGINE_TIMEOUT_SECS", "300")
                    .parse()
                    .context("Invalid ENGINE_TIMEOUT_SECS")?,
            ),

            compiler: CompilerConfig {
                app_image: var("APP_IMAGE", &defaults.app_image),
                database_image: var("DATABASE_IMAGE", &defaults.database_image),
                cache_image: var("CACHE_IMAGE", &defaults.cache_image),
                php_versions: var("PHP_VERSIONS", &defaults.php_versions.join(","))
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect(),
                network: var("TRAEFIK_NETWORK", &defaults.network),
                http_entrypoint: var("HTTP_ENTRYPOINT", &defaults.http_entrypoint),
                https_entrypoint: var("HTTPS_ENTRYPOINT", &defaults.https_entrypoint),
                cert_resolver: var("CERT_RESOLVER", &defaults.cert_resolver),
                ..defaults
            },
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }
        if self.engine_timeout.is_zero() {
            anyhow::bail!("ENGINE_TIMEOUT_SECS must be greater than 0");
        }
        if self.compose_command.is_empty() {
            anyhow::bail!("COMPOSE_COMMAND cannot be empty");
        }
        if self.compiler.php_versions.is_empty() {
            anyhow::bail!("PHP_VERSIONS must list at least one version");
        }
        if self.compiler.network.trim().is_empty() {
            anyhow::bail!("TRAEFIK_NETWORK cannot be empty");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Ensure the sites root exists
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.sites_path).with_context(|| {
            format!(
                "Failed to create sites directory: {}",
                self.sites_path.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<OrchestratorConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OrchestratorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[]).expect("Failed to load config");

        assert_eq!(config.api_host, "0.0.0.0");
        assert_eq!(config.api_port, 8090);
        assert_eq!(config.sites_path, PathBuf::from("/var/www/sites"));
        assert!(config.redis_url.is_none());
        assert_eq!(config.compose_command, vec!["docker", "compose"]);
        assert_eq!(config.engine_timeout, Duration::from_secs(300));
        assert_eq!(config.compiler.network, "ddeployer");
        assert_eq!(config.compiler.php_versions, vec!["8.1", "8.2", "8.3"]);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("API_PORT", "9000"),
            ("COMPOSE_COMMAND", "docker-compose"),
            ("PHP_VERSIONS", "8.3, 8.4"),
            ("TRAEFIK_NETWORK", "proxy"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
        ])
        .unwrap();

        assert_eq!(config.api_address(), "0.0.0.0:9000");
        assert_eq!(config.compose_command, vec!["docker-compose"]);
        assert_eq!(config.compiler.php_versions, vec!["8.3", "8.4"]);
        assert_eq!(config.compiler.network, "proxy");
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn test_validate_invalid_port() {
        let result = load(&[("API_PORT", "0")]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("API_PORT must be greater than 0"));
    }

    #[test]
    fn test_validate_empty_php_versions() {
        assert!(load(&[("PHP_VERSIONS", " , ")]).is_err());
    }

    #[test]
    fn test_invalid_timeout() {
        assert!(load(&[("ENGINE_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("ENGINE_TIMEOUT_SECS", "0")]).is_err());
    }
}
