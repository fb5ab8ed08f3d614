//! In-process store, used when no Redis URL is configured and in tests

use async_trait::async_trait;
use ddeployer_common::{DeploymentRecord, Error, Result, Site, SiteFilter, SiteStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::SiteStore;

#[derive(Default)]
struct Tables {
    sites: BTreeMap<u64, Site>,
    /// name -> id, non-deleted sites only
    names: HashMap<String, u64>,
    deployments: HashMap<u64, Vec<DeploymentRecord>>,
}

/// Store that keeps everything in memory
#[derive(Default)]
pub struct MemorySiteStore {
    next_id: AtomicU64,
    tables: Mutex<Tables>,
}

impl MemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))
    }

    /// Fetch a site including soft-deleted ones.
    pub fn get_any(&self, id: u64) -> Option<Site> {
        self.tables.lock().ok()?.sites.get(&id).cloned()
    }
}

#[async_trait]
impl SiteStore for MemorySiteStore {
    async fn allocate_id(&self) -> Result<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_site(&self, site: &Site) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.names.contains_key(&site.name) {
            return Err(Error::Validation(format!(
                "a site named '{}' already exists",
                site.name
            )));
        }
        if tables.sites.contains_key(&site.id) {
            return Err(Error::Storage(format!("site id {} already in use", site.id)));
        }
        tables.names.insert(site.name.clone(), site.id);
        tables.sites.insert(site.id, site.clone());
        debug!("Inserted site {} ({})", site.id, site.name);
        Ok(())
    }

    async fn update_site(&self, site: &Site) -> Result<()> {
        let mut tables = self.tables()?;
        match tables.sites.get_mut(&site.id) {
            Some(stored) if !stored.is_deleted() => {
                *stored = site.clone();
                Ok(())
            }
            _ => Err(Error::NotFound(site.id)),
        }
    }

    async fn get_site(&self, id: u64) -> Result<Option<Site>> {
        let tables = self.tables()?;
        Ok(tables.sites.get(&id).filter(|s| !s.is_deleted()).cloned())
    }

    async fn list_sites(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        let tables = self.tables()?;
        Ok(tables
            .sites
            .values()
            .filter(|s| !s.is_deleted() && filter.matches(s))
            .cloned()
            .collect())
    }

    async fn soft_delete_site(&self, site: &Site) -> Result<()> {
        let mut tables = self.tables()?;
        let stored = tables
            .sites
            .get_mut(&site.id)
            .filter(|s| !s.is_deleted())
            .ok_or(Error::NotFound(site.id))?;

        *stored = site.clone();
        stored.status = SiteStatus::Deleted;
        stored.deleted_at = Some(chrono::Utc::now());
        let name = stored.name.clone();

        if tables.names.get(&name) == Some(&site.id) {
            tables.names.remove(&name);
        }
        debug!("Soft-deleted site {} ({})", site.id, name);
        Ok(())
    }

    async fn record_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        let mut tables = self.tables()?;
        let records = tables.deployments.entry(record.site_id).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) if existing.is_closed() => {
                return Err(Error::Validation(format!(
                    "deployment record {} is already closed",
                    record.id
                )));
            }
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>> {
        let tables = self.tables()?;
        let mut records = tables.deployments.get(&site_id).cloned().unwrap_or_default();
        records.reverse();
        Ok(records)
    }
}
