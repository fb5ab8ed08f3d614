//! Compose manifest encoding
//!
//! The single place a [`TopologySpec`] is turned into the container engine's
//! declarative format.

use ddeployer_common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::topology::{ServiceSpec, TopologySpec};

pub const MANIFEST_FILE: &str = "docker-compose.yml";

#[derive(Debug, Serialize)]
struct ComposeFile {
    name: String,
    services: BTreeMap<String, ComposeService>,
    networks: BTreeMap<String, ComposeNetwork>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    volumes: BTreeMap<String, ()>,
}

#[derive(Debug, Serialize)]
struct ComposeService {
    image: String,
    container_name: String,
    restart: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ComposeNetwork {
    name: String,
    external: bool,
}

impl From<&ServiceSpec> for ComposeService {
    fn from(service: &ServiceSpec) -> Self {
        Self {
            image: service.image.clone(),
            container_name: service.container_name.clone(),
            restart: service.restart.as_compose_str().to_string(),
            command: service.command.as_deref().map(escape_interpolation),
            environment: escape_values(&service.environment),
            volumes: service.volumes.iter().map(|v| v.to_compose_string()).collect(),
            depends_on: service.depends_on.clone(),
            labels: escape_values(&service.labels),
        }
    }
}

/// Compose interpolates `$VAR` and `${..}`; `$$` is a literal dollar sign.
fn escape_interpolation(value: &str) -> String {
    value.replace('$', "$$")
}

fn escape_values(values: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), escape_interpolation(v)))
        .collect()
}

/// Render `topology` as a compose YAML document.
pub fn render(topology: &TopologySpec) -> Result<String> {
    let compose = ComposeFile {
        name: topology.project.clone(),
        services: topology
            .services
            .iter()
            .map(|s| (s.name().to_string(), ComposeService::from(s)))
            .collect(),
        networks: BTreeMap::from([(
            "default".to_string(),
            ComposeNetwork {
                name: topology.network.clone(),
                external: true,
            },
        )]),
        volumes: topology.volumes.iter().map(|v| (v.clone(), ())).collect(),
    };

    serde_yaml::to_string(&compose).map_err(|e| Error::Manifest(e.to_string()))
}
