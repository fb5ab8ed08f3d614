//! Request and response models for the operator API

use chrono::{DateTime, Utc};
use ddeployer_common::{
    slugify, DatabaseAccount, Error, Result, Site, SiteKind, SiteStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use topology_compiler::CompilerConfig;

use crate::prober::StatusSnapshot;

const MAX_NAME_LEN: usize = 255;
const MAX_DOMAIN_LEN: usize = 253;

fn default_php_version() -> String {
    "8.3".to_string()
}

fn default_true() -> bool {
    true
}

/// Request to create a site
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSiteRequest {
    /// Unique human label
    pub name: String,

    /// `wordpress`, `laravel` or `php`
    #[serde(rename = "type")]
    pub kind: String,

    /// Hostnames, primary first
    pub domains: Vec<String>,

    #[serde(default = "default_php_version")]
    pub php_version: String,

    #[serde(default)]
    pub create_database: bool,

    #[serde(default)]
    pub ssl_enabled: bool,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Extra environment for the app service
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Validated, normalised create input
#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub kind: SiteKind,
    pub domains: Vec<String>,
    pub php_version: String,
    pub create_database: bool,
    pub ssl_enabled: bool,
    pub cache_enabled: bool,
    pub environment: BTreeMap<String, String>,
}

impl CreateSiteRequest {
    /// Check the request before any side effect happens.
    pub fn validate(self, compiler: &CompilerConfig) -> Result<NewSite> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::Validation(format!(
                "name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if slugify(&name, '-').is_empty() {
            return Err(Error::Validation(
                "name must contain at least one letter or digit".to_string(),
            ));
        }

        let kind: SiteKind = self.kind.parse()?;
        let domains = validate_domains(&self.domains)?;

        if !compiler.supports_php(&self.php_version) {
            return Err(Error::UnsupportedPhpVersion(self.php_version));
        }

        Ok(NewSite {
            name,
            kind,
            domains,
            php_version: self.php_version,
            create_database: self.create_database,
            ssl_enabled: self.ssl_enabled,
            cache_enabled: self.cache_enabled,
            environment: self.environment,
        })
    }
}

/// Request to change an existing site
///
/// Name, kind and the database are fixed at creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSiteRequest {
    /// Accepted only when unchanged
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub create_database: Option<bool>,

    #[serde(default)]
    pub domains: Option<Vec<String>>,

    #[serde(default)]
    pub ssl_enabled: Option<bool>,

    #[serde(default)]
    pub cache_enabled: Option<bool>,

    #[serde(default)]
    pub php_version: Option<String>,

    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
}

impl UpdateSiteRequest {
    /// Apply the request to a copy of `site`.
    pub fn apply(self, site: &Site, compiler: &CompilerConfig) -> Result<Site> {
        if self.name.as_deref().is_some_and(|n| n.trim() != site.name) {
            return Err(Error::Validation("name cannot be changed".to_string()));
        }
        if let Some(kind) = self.kind {
            if kind.parse::<SiteKind>()? != site.kind {
                return Err(Error::Validation("type cannot be changed".to_string()));
            }
        }
        if self
            .create_database
            .is_some_and(|db| db != site.database_requested())
        {
            return Err(Error::Validation(
                "database cannot be added or removed after creation".to_string(),
            ));
        }

        let mut updated = site.clone();

        if let Some(domains) = self.domains {
            updated.domains = validate_domains(&domains)?;
        }
        if let Some(ssl) = self.ssl_enabled {
            updated.ssl_enabled = ssl;
        }
        if let Some(cache) = self.cache_enabled {
            updated.cache_enabled = cache;
        }
        if let Some(version) = self.php_version {
            if !compiler.supports_php(&version) {
                return Err(Error::UnsupportedPhpVersion(version));
            }
            updated.php_version = version;
        }
        if let Some(environment) = self.environment {
            updated.environment = environment;
        }

        Ok(updated)
    }
}

/// Lowercase, trim and check every hostname; order is kept.
pub fn validate_domains(domains: &[String]) -> Result<Vec<String>> {
    if domains.is_empty() {
        return Err(Error::Validation(
            "at least one domain is required".to_string(),
        ));
    }

    let mut normalised: Vec<String> = Vec::with_capacity(domains.len());
    for domain in domains {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if !is_valid_hostname(&domain) {
            return Err(Error::Validation(format!("invalid domain '{}'", domain)));
        }
        if normalised.contains(&domain) {
            return Err(Error::Validation(format!("duplicate domain '{}'", domain)));
        }
        normalised.push(domain);
    }
    Ok(normalised)
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_DOMAIN_LEN {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Site as shown to operators; secrets are never included
#[derive(Debug, Clone, Serialize)]
pub struct SiteView {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SiteKind,
    pub domains: Vec<String>,
    pub primary_domain: String,
    pub container_name: String,
    pub php_version: String,
    pub ssl_enabled: bool,
    pub cache_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseAccount>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    pub status: SiteStatus,
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Site> for SiteView {
    fn from(site: &Site) -> Self {
        Self {
            id: site.id,
            name: site.name.clone(),
            kind: site.kind,
            domains: site.domains.clone(),
            primary_domain: site.primary_domain().to_string(),
            container_name: site.container_name(),
            php_version: site.php_version.clone(),
            ssl_enabled: site.ssl_enabled,
            cache_enabled: site.cache_enabled,
            database: site.database.clone(),
            environment: site.environment.clone(),
            status: site.status,
            revision: site.revision,
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

/// What the engine reports for a site
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Observation {
    Running { snapshot: StatusSnapshot },
    NotRunning { snapshot: StatusSnapshot },
    /// The probe failed; actual container state is not known
    Unknown { reason: String },
}

/// Recorded status next to observed reality
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub site_id: u64,
    pub recorded: SiteStatus,
    pub observed: Observation,
    /// Recorded and observed state disagree
    pub drift: bool,
}

impl StatusReport {
    pub fn new(site: &Site, observed: Observation) -> Self {
        let drift = match (&observed, site.status) {
            (Observation::Unknown { .. }, _) => false,
            (Observation::Running { .. }, SiteStatus::Running) => false,
            (Observation::Running { .. }, _) => true,
            (Observation::NotRunning { .. }, SiteStatus::Running) => true,
            (Observation::NotRunning { .. }, _) => false,
        };

        Self {
            site_id: site.id,
            recorded: site.status,
            observed,
            drift,
        }
    }
}

/// Steps of a site deletion, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStep {
    Stop,
    Teardown,
    RemoveDirectory,
    EraseDescriptor,
}

/// Outcome of one deletion step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: DeleteStep,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a best-effort deletion
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub site_id: u64,
    pub steps: Vec<StepOutcome>,
}

impl DeleteReport {
    pub fn new(site_id: u64) -> Self {
        Self {
            site_id,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: DeleteStep, outcome: Result<()>) {
        self.steps.push(StepOutcome {
            step,
            ok: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
        });
    }

    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.steps.iter().filter(|s| !s.ok).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .map(|s| match &s.error {
                Some(error) => format!("{:?}: failed: {}", s.step, error),
                None => format!("{:?}: ok", s.step),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateSiteRequest {
        CreateSiteRequest {
            name: "Demo".to_string(),
            kind: "wordpress".to_string(),
            domains: vec!["Demo.Localhost".to_string()],
            php_version: "8.3".to_string(),
            create_database: true,
            ssl_enabled: false,
            cache_enabled: true,
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn test_valid_request_is_normalised() {
        let site = request().validate(&CompilerConfig::default()).unwrap();
        assert_eq!(site.kind, SiteKind::WordPress);
        assert_eq!(site.domains, vec!["demo.localhost"]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = CompilerConfig::default();

        let mut no_domains = request();
        no_domains.domains.clear();
        assert!(matches!(no_domains.validate(&config), Err(Error::Validation(_))));

        let mut bad_kind = request();
        bad_kind.kind = "rails".to_string();
        assert!(matches!(bad_kind.validate(&config), Err(Error::UnsupportedKind(_))));

        let mut old_php = request();
        old_php.php_version = "7.4".to_string();
        assert!(matches!(
            old_php.validate(&config),
            Err(Error::UnsupportedPhpVersion(_))
        ));

        let mut blank = request();
        blank.name = "   ".to_string();
        assert!(matches!(blank.validate(&config), Err(Error::Validation(_))));
    }

    #[test]
    fn test_hostname_rules() {
        assert!(is_valid_hostname("demo.localhost"));
        assert!(is_valid_hostname("a-b.example.co.uk"));
        assert!(!is_valid_hostname("-bad.example"));
        assert!(!is_valid_hostname("under_score.example"));
        assert!(!is_valid_hostname("double..dot"));
        assert!(!is_valid_hostname("Host(`x`)"));
    }

    #[test]
    fn test_duplicate_domains_rejected() {
        let domains = vec!["a.test".to_string(), "A.test".to_string()];
        assert!(validate_domains(&domains).is_err());
    }

    #[test]
    fn test_delete_report() {
        let mut report = DeleteReport::new(3);
        report.record(
            DeleteStep::Stop,
            Err(Error::Engine {
                exit_code: Some(1),
                stderr: "boom".to_string(),
            }),
        );
        report.record(DeleteStep::Teardown, Ok(()));

        assert!(!report.is_clean());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].step, DeleteStep::Stop);
        assert!(report.summary().contains("boom"));
    }
}
