//! Site descriptor to topology compilation
//!
//! This module turns a [`Site`] and its [`Credential`] into a [`TopologySpec`].
//! Compilation is pure: no I/O, and identical inputs always yield identical output.

mod environment;
pub mod routing;

use ddeployer_common::{Credential, Error, Result, Site, SiteKind};
use std::collections::BTreeMap;

use crate::topology::{RestartPolicy, ServiceRole, ServiceSpec, TopologySpec, VolumeMount};
use environment::{is_valid_env_key, LayeredEnvironment};

const DATABASE_PORT: u16 = 3306;
const CACHE_PORT: u16 = 6379;

/// Images, allow-lists and proxy conventions the compiler works against
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Repository of the PHP runtime image, tagged `php{version}`
    pub app_image: String,

    pub database_image: String,

    pub cache_image: String,

    /// Supported PHP versions
    pub php_versions: Vec<String>,

    /// Shared external network the reverse proxy watches
    pub network: String,

    pub http_entrypoint: String,

    pub https_entrypoint: String,

    pub cert_resolver: String,

    /// Port the app container serves HTTP on
    pub app_port: u16,

    pub cache_max_memory: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            app_image: "dunglas/frankenphp".to_string(),
            database_image: "mariadb:10.11".to_string(),
            cache_image: "redis:7-alpine".to_string(),
            php_versions: vec!["8.1".to_string(), "8.2".to_string(), "8.3".to_string()],
            network: "ddeployer".to_string(),
            http_entrypoint: "web".to_string(),
            https_entrypoint: "websecure".to_string(),
            cert_resolver: "letsencrypt".to_string(),
            app_port: 80,
            cache_max_memory: "128mb".to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn supports_php(&self, version: &str) -> bool {
        self.php_versions.iter().any(|v| v == version)
    }

    /// Runtime image for a site.
    ///
    /// Every kind currently runs on the same image family; only the injected
    /// environment differs.
    pub fn app_image_for(&self, kind: SiteKind, php_version: &str) -> String {
        match kind {
            SiteKind::WordPress | SiteKind::Laravel | SiteKind::GenericPhp => {
                format!("{}:php{}", self.app_image, php_version)
            }
        }
    }
}

/// Compiles site descriptors into topologies
#[derive(Debug, Clone, Default)]
pub struct TopologyCompiler {
    config: CompilerConfig,
}

impl TopologyCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile the complete topology for `site`.
    ///
    /// Fails without producing anything on an unsupported PHP version, missing
    /// secret material, or an environment key defined by two layers.
    pub fn compile(&self, site: &Site, credential: &Credential) -> Result<TopologySpec> {
        if !self.config.supports_php(&site.php_version) {
            return Err(Error::UnsupportedPhpVersion(site.php_version.clone()));
        }
        if site.domains.is_empty() {
            return Err(Error::Validation("a site needs at least one domain".to_string()));
        }
        if let Some(key) = site.environment.keys().find(|k| !is_valid_env_key(k)) {
            return Err(Error::Validation(format!(
                "invalid environment variable name '{}'",
                key
            )));
        }

        let container = site.container_name();
        let database = self.database_service(site, credential, &container)?;
        let cache = site
            .cache_enabled
            .then(|| self.cache_service(&container));

        let environment = self.app_environment(site, credential, database.is_some())?;
        let app = ServiceSpec {
            role: ServiceRole::App,
            image: self.config.app_image_for(site.kind, &site.php_version),
            container_name: container.clone(),
            restart: RestartPolicy::UnlessStopped,
            environment,
            volumes: vec![VolumeMount::new("./app", "/var/www/html")],
            labels: routing::routing_labels(&self.config, &container, &site.domains, site.ssl_enabled),
            depends_on: database
                .iter()
                .map(|db| db.name().to_string())
                .collect(),
            command: None,
        };

        let mut services = vec![app];
        let mut volumes = Vec::new();
        for service in database.into_iter().chain(cache) {
            volumes.extend(service.volumes.iter().map(|v| v.source.clone()));
            services.push(service);
        }

        Ok(TopologySpec {
            project: container,
            services,
            volumes,
            network: self.config.network.clone(),
        })
    }

    fn database_service(
        &self,
        site: &Site,
        credential: &Credential,
        container: &str,
    ) -> Result<Option<ServiceSpec>> {
        let Some(account) = &site.database else {
            return Ok(None);
        };
        let password = credential
            .database_password
            .as_ref()
            .ok_or_else(|| Error::MissingSecret("database password".to_string()))?;
        let root_password = credential
            .database_root_password
            .as_ref()
            .unwrap_or(password);

        let environment = BTreeMap::from([
            ("MYSQL_ROOT_PASSWORD".to_string(), root_password.clone()),
            ("MYSQL_DATABASE".to_string(), account.name.clone()),
            ("MYSQL_USER".to_string(), account.user.clone()),
            ("MYSQL_PASSWORD".to_string(), password.clone()),
        ]);

        Ok(Some(ServiceSpec {
            role: ServiceRole::Database,
            image: self.config.database_image.clone(),
            container_name: format!("{}{}", container, ServiceRole::Database.container_suffix()),
            restart: RestartPolicy::UnlessStopped,
            environment,
            volumes: vec![VolumeMount::new(format!("{}_db", container), "/var/lib/mysql")],
            labels: BTreeMap::new(),
            depends_on: Vec::new(),
            command: None,
        }))
    }

    fn cache_service(&self, container: &str) -> ServiceSpec {
        ServiceSpec {
            role: ServiceRole::Cache,
            image: self.config.cache_image.clone(),
            container_name: format!("{}{}", container, ServiceRole::Cache.container_suffix()),
            restart: RestartPolicy::UnlessStopped,
            environment: BTreeMap::new(),
            volumes: vec![VolumeMount::new(format!("{}_redis", container), "/data")],
            labels: BTreeMap::new(),
            depends_on: Vec::new(),
            command: Some(format!(
                "redis-server --maxmemory {} --maxmemory-policy allkeys-lru",
                self.config.cache_max_memory
            )),
        }
    }

    /// database -> cache -> kind -> operator
    fn app_environment(
        &self,
        site: &Site,
        credential: &Credential,
        has_database: bool,
    ) -> Result<BTreeMap<String, String>> {
        let mut env = LayeredEnvironment::new();
        let db_host = ServiceRole::Database.service_name();
        let cache_host = ServiceRole::Cache.service_name();

        let database = match (&site.database, &credential.database_password) {
            (Some(account), Some(password)) if has_database => Some((account, password)),
            _ => None,
        };

        if let Some((account, password)) = database {
            env.layer(
                "database",
                [
                    ("DB_HOST", db_host.to_string()),
                    ("DB_PORT", DATABASE_PORT.to_string()),
                    ("DB_DATABASE", account.name.clone()),
                    ("DB_USERNAME", account.user.clone()),
                    ("DB_PASSWORD", password.clone()),
                ],
            )?;
        }

        if site.cache_enabled {
            env.layer(
                "cache",
                [
                    ("REDIS_HOST", cache_host.to_string()),
                    ("REDIS_PORT", CACHE_PORT.to_string()),
                ],
            )?;
        }

        let mut kind_vars: Vec<(String, String)> = Vec::new();
        match site.kind {
            SiteKind::WordPress => {
                if let Some((account, password)) = database {
                    kind_vars.push(("WORDPRESS_DB_HOST".to_string(), db_host.to_string()));
                    kind_vars.push(("WORDPRESS_DB_NAME".to_string(), account.name.clone()));
                    kind_vars.push(("WORDPRESS_DB_USER".to_string(), account.user.clone()));
                    kind_vars.push(("WORDPRESS_DB_PASSWORD".to_string(), password.clone()));
                }
                let salts = credential
                    .wordpress
                    .as_ref()
                    .ok_or_else(|| Error::MissingSecret("WordPress keys and salts".to_string()))?;
                for (name, value) in salts.entries() {
                    kind_vars.push((format!("WORDPRESS_{}", name), value.to_string()));
                }
            }
            SiteKind::Laravel => {
                let app_key = credential
                    .app_key
                    .as_ref()
                    .ok_or_else(|| Error::MissingSecret("Laravel application key".to_string()))?;
                kind_vars.push(("APP_NAME".to_string(), site.name.clone()));
                kind_vars.push(("APP_ENV".to_string(), "production".to_string()));
                kind_vars.push(("APP_KEY".to_string(), app_key.clone()));
                kind_vars.push(("APP_DEBUG".to_string(), "false".to_string()));
                kind_vars.push(("APP_URL".to_string(), site.primary_url()));
                if database.is_some() {
                    kind_vars.push(("DB_CONNECTION".to_string(), "mysql".to_string()));
                }
                if site.cache_enabled {
                    for key in ["CACHE_DRIVER", "SESSION_DRIVER", "QUEUE_CONNECTION"] {
                        kind_vars.push((key.to_string(), "redis".to_string()));
                    }
                }
            }
            SiteKind::GenericPhp => {}
        }
        env.layer(site.kind.as_str(), kind_vars)?;

        env.layer(
            "operator",
            site.environment.iter().map(|(k, v)| (k.clone(), v.clone())),
        )?;

        Ok(env.into_vars())
    }
}
