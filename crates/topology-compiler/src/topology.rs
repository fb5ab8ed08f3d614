//! Compiled topology value types
//!
//! A [`TopologySpec`] is the complete, engine-independent description of the
//! containers that make up one site. It is produced by the compiler and
//! consumed by the writer; nothing mutates it in between.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role a service plays inside a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    App,
    Database,
    Cache,
}

impl ServiceRole {
    /// Service key in the manifest, which is also the hostname on the site network.
    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceRole::App => "app",
            ServiceRole::Database => "db",
            ServiceRole::Cache => "redis",
        }
    }

    /// Suffix appended to the site's container name.
    pub fn container_suffix(&self) -> &'static str {
        match self {
            ServiceRole::App => "",
            ServiceRole::Database => "-db",
            ServiceRole::Cache => "-redis",
        }
    }
}

/// Container restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_compose_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// A mount of a named volume or a path relative to the site directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
}

impl VolumeMount {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// `source:target` short syntax.
    pub fn to_compose_string(&self) -> String {
        format!("{}:{}", self.source, self.target)
    }
}

/// One service of a site topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub role: ServiceRole,
    pub image: String,
    pub container_name: String,
    pub restart: RestartPolicy,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    /// Reverse-proxy routing labels, only ever set on the app service
    pub labels: BTreeMap<String, String>,
    /// Service names this service starts after
    pub depends_on: Vec<String>,
    pub command: Option<String>,
}

impl ServiceSpec {
    pub fn name(&self) -> &'static str {
        self.role.service_name()
    }
}

/// The compiled unit for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    /// Compose project name, equal to the site's container name
    pub project: String,

    /// Services in app, db, cache order
    pub services: Vec<ServiceSpec>,

    /// Named volumes declared by the topology
    pub volumes: Vec<String>,

    /// Pre-existing shared network every service attaches to
    pub network: String,
}

impl TopologySpec {
    pub fn service(&self, role: ServiceRole) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.role == role)
    }

    /// The app service. Every compiled topology has exactly one.
    pub fn app(&self) -> Option<&ServiceSpec> {
        self.service(ServiceRole::App)
    }

    /// Container names of every service, app first.
    pub fn container_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.container_name.as_str()).collect()
    }
}
