//! Topology persistence
//!
//! Owns each site's private directory under the sites root and keeps the
//! compose manifest in it in sync with the compiled topology.

use ddeployer_common::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::manifest::{self, MANIFEST_FILE};
use crate::topology::TopologySpec;

/// Directory the app service's `./app` bind mount points at.
pub const APP_SOURCE_DIR: &str = "app";

/// Writes compiled topologies to disk
#[derive(Debug, Clone)]
pub struct TopologyWriter {
    sites_root: PathBuf,
}

impl TopologyWriter {
    pub fn new(sites_root: impl Into<PathBuf>) -> Self {
        Self {
            sites_root: sites_root.into(),
        }
    }

    pub fn sites_root(&self) -> &Path {
        &self.sites_root
    }

    /// Private directory of the site whose container name is `project`.
    pub fn site_dir(&self, project: &str) -> PathBuf {
        self.sites_root.join(project)
    }

    pub fn manifest_path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Write `topology` into its own site directory and return the manifest path.
    pub fn write_site(&self, topology: &TopologySpec) -> Result<PathBuf> {
        self.write(topology, &self.site_dir(&topology.project))
    }

    /// Write `topology` into `dest`, replacing any previous manifest.
    ///
    /// The manifest is rendered before anything touches the disk and is moved
    /// into place atomically, so a failed write leaves the old manifest intact.
    pub fn write(&self, topology: &TopologySpec, dest: &Path) -> Result<PathBuf> {
        let rendered = manifest::render(topology)?;

        fs::create_dir_all(dest.join(APP_SOURCE_DIR))?;
        restrict_to_owner(dest)?;

        let path = Self::manifest_path(dest);
        let mut tmp = NamedTempFile::new_in(dest)?;
        tmp.write_all(rendered.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        info!(
            "Wrote topology for {} ({} services) to {}",
            topology.project,
            topology.services.len(),
            path.display()
        );
        Ok(path)
    }

    /// Remove a site directory and everything in it. A missing directory is fine.
    pub fn remove(&self, dest: &Path) -> Result<()> {
        match fs::remove_dir_all(dest) {
            Ok(()) => {
                info!("Removed site directory {}", dest.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Site directory {} already gone", dest.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
