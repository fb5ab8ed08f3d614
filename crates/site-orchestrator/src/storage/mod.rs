//! Persistent descriptor store
//!
//! Sites and their deployment records live behind [`SiteStore`]. Deleted
//! sites are soft-deleted: they disappear from normal queries and release
//! their name, but the record is kept.

mod memory;
mod redis_store;

use async_trait::async_trait;
use ddeployer_common::{DeploymentRecord, Result, Site, SiteFilter};

pub use self::memory::MemorySiteStore;
pub use self::redis_store::RedisSiteStore;

#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Reserve the identifier for a new site.
    async fn allocate_id(&self) -> Result<u64>;

    /// Insert a new site. Fails with a validation error when the name is taken.
    async fn insert_site(&self, site: &Site) -> Result<()>;

    /// Replace the stored copy of an existing site.
    async fn update_site(&self, site: &Site) -> Result<()>;

    /// Fetch a site that has not been deleted.
    async fn get_site(&self, id: u64) -> Result<Option<Site>>;

    /// Sites that have not been deleted, ordered by id.
    async fn list_sites(&self, filter: &SiteFilter) -> Result<Vec<Site>>;

    /// Mark a site deleted and release its name.
    async fn soft_delete_site(&self, site: &Site) -> Result<()>;

    /// Insert a deployment record, or replace it when it is being closed.
    async fn record_deployment(&self, record: &DeploymentRecord) -> Result<()>;

    /// Deployment records of a site, most recent first.
    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>>;
}
