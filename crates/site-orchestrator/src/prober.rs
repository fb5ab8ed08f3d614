//! Live status probing
//!
//! Reads container state back from the engine. The prober only reports what
//! it observes; reconciling the stored status is left to the caller.

use ddeployer_common::{Error, Result, Site};
use serde::Serialize;
use std::sync::Arc;
use topology_compiler::ServiceRole;
use tracing::debug;

use crate::engine::ContainerEngine;

/// One container reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerState {
    pub name: String,
    pub status: String,
    pub ports: String,
}

impl ContainerState {
    pub fn is_up(&self) -> bool {
        self.status.starts_with("Up")
    }
}

/// Observed runtime state of a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// The app container is up
    pub running: bool,
    /// Raw listing as reported by the engine
    pub detail: String,
    pub containers: Vec<ContainerState>,
}

/// Queries the engine for a site's containers
#[derive(Clone)]
pub struct StatusProber {
    engine: Arc<dyn ContainerEngine>,
}

impl StatusProber {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    pub async fn probe(&self, site: &Site) -> Result<StatusSnapshot> {
        let container = site.container_name();
        let output = self
            .engine
            .list(&container)
            .await
            .map_err(|e| Error::Probe(e.to_string()))?;

        if !output.success() {
            return Err(Error::Probe(format!(
                "container listing exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let snapshot = parse_listing(&container, &output.stdout);
        debug!(
            "Probed site {}: {} containers, running={}",
            site.id,
            snapshot.containers.len(),
            snapshot.running
        );
        Ok(snapshot)
    }
}

/// Parse `name\tstatus\tports` lines, keeping only this site's containers.
///
/// The engine's name filter is a substring match, so `site-1-demo` would
/// also match `site-1-demo2`; exact names are checked here.
pub fn parse_listing(container: &str, listing: &str) -> StatusSnapshot {
    let owned: Vec<String> = [ServiceRole::App, ServiceRole::Database, ServiceRole::Cache]
        .iter()
        .map(|role| format!("{}{}", container, role.container_suffix()))
        .collect();

    let containers: Vec<ContainerState> = listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.trim();
            if name.is_empty() || !owned.iter().any(|o| o == name) {
                return None;
            }
            Some(ContainerState {
                name: name.to_string(),
                status: fields.next().unwrap_or_default().trim().to_string(),
                ports: fields.next().unwrap_or_default().trim().to_string(),
            })
        })
        .collect();

    let running = containers.iter().any(|c| c.name == container && c.is_up());
    let detail = containers
        .iter()
        .map(|c| format!("{}\t{}\t{}", c.name, c.status, c.ports))
        .collect::<Vec<_>>()
        .join("\n");

    StatusSnapshot {
        running,
        detail,
        containers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_site() {
        let listing = "site-1-demo\tUp 3 minutes\t80/tcp\n\
                       site-1-demo-db\tUp 3 minutes\t3306/tcp\n\
                       site-1-demo2\tUp 1 hour\t80/tcp\n";

        let snapshot = parse_listing("site-1-demo", listing);
        assert!(snapshot.running);
        assert_eq!(snapshot.containers.len(), 2);
        assert!(!snapshot.detail.contains("site-1-demo2"));
    }

    #[test]
    fn test_parse_exited_app() {
        let listing = "site-1-demo\tExited (1) 2 minutes ago\t\nsite-1-demo-redis\tUp 2 minutes\t6379/tcp\n";

        let snapshot = parse_listing("site-1-demo", listing);
        assert!(!snapshot.running);
        assert_eq!(snapshot.containers[0].status, "Exited (1) 2 minutes ago");
    }

    #[test]
    fn test_parse_empty_listing() {
        let snapshot = parse_listing("site-1-demo", "");
        assert!(!snapshot.running);
        assert!(snapshot.containers.is_empty());
        assert!(snapshot.detail.is_empty());
    }
}
