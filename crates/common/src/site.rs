//! Site descriptors
//!
//! A [`Site`] is the desired state of one hosted unit. Everything the
//! compiler needs to produce a topology lives here, including the credential
//! generated once at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::credential::Credential;
use crate::error::Error;

/// Application flavour hosted by a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    #[serde(rename = "wordpress")]
    WordPress,
    Laravel,
    #[serde(rename = "php")]
    GenericPhp,
}

impl SiteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteKind::WordPress => "wordpress",
            SiteKind::Laravel => "laravel",
            SiteKind::GenericPhp => "php",
        }
    }
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wordpress" => Ok(SiteKind::WordPress),
            "laravel" => Ok(SiteKind::Laravel),
            "php" | "generic_php" => Ok(SiteKind::GenericPhp),
            _ => Err(Error::UnsupportedKind(s.to_string())),
        }
    }
}

/// Last known lifecycle state of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Creating,
    Running,
    Stopped,
    Error,
    Deleted,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Creating => "creating",
            SiteStatus::Running => "running",
            SiteStatus::Stopped => "stopped",
            SiteStatus::Error => "error",
            SiteStatus::Deleted => "deleted",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Redeploying a running or failed site is modelled as a transition to
    /// `Running` (or `Error` when the redeploy fails).
    pub fn can_transition_to(&self, next: SiteStatus) -> bool {
        match self {
            SiteStatus::Creating => matches!(next, SiteStatus::Running | SiteStatus::Error),
            SiteStatus::Running => matches!(
                next,
                SiteStatus::Running | SiteStatus::Stopped | SiteStatus::Error | SiteStatus::Deleted
            ),
            SiteStatus::Stopped => matches!(
                next,
                SiteStatus::Running | SiteStatus::Error | SiteStatus::Deleted
            ),
            SiteStatus::Error => matches!(
                next,
                SiteStatus::Running | SiteStatus::Error | SiteStatus::Deleted
            ),
            SiteStatus::Deleted => false,
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "creating" => Ok(SiteStatus::Creating),
            "running" => Ok(SiteStatus::Running),
            "stopped" => Ok(SiteStatus::Stopped),
            "error" => Ok(SiteStatus::Error),
            "deleted" => Ok(SiteStatus::Deleted),
            _ => Err(Error::Validation(format!("unknown site status '{}'", s))),
        }
    }
}

/// Database identity provisioned for a site
///
/// Set once at creation when a database was requested, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseAccount {
    pub name: String,
    pub user: String,
}

/// Desired state of one hosted site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Stable identifier assigned by the store at creation
    pub id: u64,

    /// Unique human label
    pub name: String,

    pub kind: SiteKind,

    /// Hostnames routed to the site, primary first
    pub domains: Vec<String>,

    pub php_version: String,

    pub ssl_enabled: bool,

    pub cache_enabled: bool,

    /// Present iff a database was requested at creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseAccount>,

    /// Secrets generated once at creation
    pub credential: Credential,

    /// Extra operator-supplied environment for the app service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    pub status: SiteStatus,

    /// Bumped on every accepted descriptor update
    pub revision: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Site {
    /// Docker-safe container name derived from the id and the name.
    pub fn container_name(&self) -> String {
        format!("site-{}-{}", self.id, slugify(&self.name, '-'))
    }

    pub fn primary_domain(&self) -> &str {
        self.domains.first().map(String::as_str).unwrap_or_default()
    }

    pub fn database_requested(&self) -> bool {
        self.database.is_some()
    }

    /// Derive the database identity for a new site.
    pub fn database_account_for(id: u64, name: &str) -> DatabaseAccount {
        let slug = slugify(name, '_');
        let mut db_name = format!("site_{}_{}", id, slug);
        db_name.truncate(64);
        let mut user = format!("u{}_{}", id, slug);
        user.truncate(32);

        DatabaseAccount {
            name: db_name.trim_end_matches('_').to_string(),
            user: user.trim_end_matches('_').to_string(),
        }
    }

    /// Protocol-qualified URL of the primary domain.
    pub fn primary_url(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        format!("{}://{}", scheme, self.primary_domain())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some() || self.status == SiteStatus::Deleted
    }

    /// Version tag used on deployment records.
    pub fn version_tag(&self) -> String {
        format!("r{}", self.revision)
    }
}

/// Lowercase `name`, collapsing every run of characters outside `[a-z0-9]`
/// into a single `separator`.
pub fn slugify(name: &str, separator: char) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(separator);
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Simple filter over stored sites
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteFilter {
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub kind: Option<SiteKind>,
}

impl SiteFilter {
    pub fn matches(&self, site: &Site) -> bool {
        self.status.map_or(true, |s| s == site.status) && self.kind.map_or(true, |k| k == site.kind)
    }
}
