//! Redis storage for site descriptors and deployment records
//!
//! Key layout:
//! - `ddeployer:site:next_id` - id counter
//! - `ddeployer:site:{id}` - site JSON, kept after soft delete
//! - `ddeployer:sites` - set of non-deleted site ids
//! - `ddeployer:site:name:{name}` - id owning a name, removed on delete
//! - `ddeployer:deployment:{id}` - deployment record JSON
//! - `ddeployer:site:{id}:deployments` - record ids, newest first

use async_trait::async_trait;
use chrono::Utc;
use ddeployer_common::{DeploymentRecord, Error, Result, Site, SiteFilter, SiteStatus};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use super::SiteStore;

const NEXT_ID_KEY: &str = "ddeployer:site:next_id";
const SITES_KEY: &str = "ddeployer:sites";

fn site_key(id: u64) -> String {
    format!("ddeployer:site:{}", id)
}

fn name_key(name: &str) -> String {
    format!("ddeployer:site:name:{}", name)
}

fn deployment_key(id: &str) -> String {
    format!("ddeployer:deployment:{}", id)
}

fn site_deployments_key(site_id: u64) -> String {
    format!("ddeployer:site:{}:deployments", site_id)
}

fn storage_err(err: redis::RedisError) -> Error {
    Error::Storage(err.to_string())
}

/// Storage backend for site descriptors
#[derive(Clone)]
pub struct RedisSiteStore {
    conn: ConnectionManager,
}

impl RedisSiteStore {
    /// Create a new storage instance
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(storage_err)?;

        let conn = ConnectionManager::new(client).await.map_err(storage_err)?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Load a site regardless of its deleted flag
    async fn load_site(&self, id: u64) -> Result<Option<Site>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(site_key(id)).await.map_err(storage_err)?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn load_deployment(&self, id: &str) -> Result<Option<DeploymentRecord>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(deployment_key(id)).await.map_err(storage_err)?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SiteStore for RedisSiteStore {
    async fn allocate_id(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.incr(NEXT_ID_KEY, 1u64).await.map_err(storage_err)
    }

    async fn insert_site(&self, site: &Site) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(site)?;

        // Claim the name first; SET NX makes the uniqueness check atomic
        let claimed: bool = conn
            .set_nx(name_key(&site.name), site.id)
            .await
            .map_err(storage_err)?;
        if !claimed {
            return Err(Error::Validation(format!(
                "a site named '{}' already exists",
                site.name
            )));
        }

        let stored = redis::pipe()
            .atomic()
            .set(site_key(site.id), json)
            .ignore()
            .sadd(SITES_KEY, site.id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await;

        if let Err(e) = stored {
            warn!("Failed to store site {}, releasing name '{}'", site.id, site.name);
            let released: redis::RedisResult<()> = conn.del(name_key(&site.name)).await;
            if let Err(release_err) = released {
                warn!("Failed to release name '{}': {}", site.name, release_err);
            }
            return Err(storage_err(e));
        }

        info!("Stored site {} ({})", site.id, site.name);
        Ok(())
    }

    async fn update_site(&self, site: &Site) -> Result<()> {
        match self.load_site(site.id).await? {
            Some(stored) if !stored.is_deleted() => {}
            _ => return Err(Error::NotFound(site.id)),
        }

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(site)?;
        let _: () = conn.set(site_key(site.id), json).await.map_err(storage_err)?;

        debug!("Updated site {} status: {}", site.id, site.status);
        Ok(())
    }

    async fn get_site(&self, id: u64) -> Result<Option<Site>> {
        Ok(self.load_site(id).await?.filter(|s| !s.is_deleted()))
    }

    async fn list_sites(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.smembers(SITES_KEY).await.map_err(storage_err)?;

        let mut sites = Vec::new();
        for id in ids {
            if let Some(site) = self.get_site(id).await? {
                if filter.matches(&site) {
                    sites.push(site);
                }
            }
        }

        sites.sort_by_key(|s| s.id);
        Ok(sites)
    }

    async fn soft_delete_site(&self, site: &Site) -> Result<()> {
        if self.get_site(site.id).await?.is_none() {
            return Err(Error::NotFound(site.id));
        }

        let mut deleted = site.clone();
        deleted.status = SiteStatus::Deleted;
        deleted.deleted_at = Some(Utc::now());

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&deleted)?;
        let _: () = conn.set(site_key(site.id), json).await.map_err(storage_err)?;
        let _: () = conn.srem(SITES_KEY, site.id).await.map_err(storage_err)?;

        let owner: Option<u64> = conn.get(name_key(&site.name)).await.map_err(storage_err)?;
        if owner == Some(site.id) {
            let _: () = conn.del(name_key(&site.name)).await.map_err(storage_err)?;
        }

        info!("Soft-deleted site {} ({})", site.id, site.name);
        Ok(())
    }

    async fn record_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        let existing = self.load_deployment(&record.id).await?;
        if existing.as_ref().is_some_and(|r| r.is_closed()) {
            return Err(Error::Validation(format!(
                "deployment record {} is already closed",
                record.id
            )));
        }

        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let _: () = conn
            .set(deployment_key(&record.id), json)
            .await
            .map_err(storage_err)?;

        if existing.is_none() {
            let _: () = conn
                .lpush(site_deployments_key(record.site_id), &record.id)
                .await
                .map_err(storage_err)?;
        }

        debug!(
            "Recorded deployment {} for site {}: {:?}",
            record.id, record.site_id, record.status
        );
        Ok(())
    }

    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .lrange(site_deployments_key(site_id), 0, -1)
            .await
            .map_err(storage_err)?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_deployment(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddeployer_common::{Credential, DeploymentAction, SiteKind};

    async fn get_test_storage() -> RedisSiteStore {
        RedisSiteStore::new("redis://127.0.0.1:6379/15")
            .await
            .expect("Failed to connect to test Redis")
    }

    async fn new_site(store: &RedisSiteStore, prefix: &str) -> Site {
        let id = store.allocate_id().await.unwrap();
        Site {
            id,
            name: format!("{}-{}", prefix, id),
            kind: SiteKind::GenericPhp,
            domains: vec![format!("{}-{}.localhost", prefix, id)],
            php_version: "8.3".to_string(),
            ssl_enabled: false,
            cache_enabled: false,
            database: None,
            credential: Credential::default(),
            environment: Default::default(),
            status: SiteStatus::Creating,
            revision: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    async fn clean_up(store: &RedisSiteStore, site: &Site) {
        let mut conn = store.conn.clone();
        let _: () = conn
            .del(vec![
                site_key(site.id),
                name_key(&site.name),
                site_deployments_key(site.id),
            ])
            .await
            .unwrap();
        let _: () = conn.srem(SITES_KEY, site.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_name_is_unique_until_deleted() {
        let store = get_test_storage().await;
        let first = new_site(&store, "unique").await;
        store.insert_site(&first).await.unwrap();

        let mut twin = new_site(&store, "unique").await;
        twin.name = first.name.clone();
        let err = store.insert_site(&twin).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        store.soft_delete_site(&first).await.unwrap();
        assert!(store.get_site(first.id).await.unwrap().is_none());
        let kept = store.load_site(first.id).await.unwrap().expect("Site not kept");
        assert_eq!(kept.status, SiteStatus::Deleted);
        assert!(kept.deleted_at.is_some());

        // The name is free again
        store.insert_site(&twin).await.unwrap();
        assert_eq!(store.get_site(twin.id).await.unwrap().unwrap().name, first.name);

        // Clean up
        clean_up(&store, &first).await;
        clean_up(&store, &twin).await;
    }

    #[tokio::test]
    async fn test_update_and_list() {
        let store = get_test_storage().await;
        let mut site = new_site(&store, "listed").await;
        store.insert_site(&site).await.unwrap();

        site.status = SiteStatus::Running;
        store.update_site(&site).await.unwrap();

        let filter = SiteFilter {
            status: Some(SiteStatus::Running),
            kind: Some(SiteKind::GenericPhp),
        };
        let sites = store.list_sites(&filter).await.unwrap();
        assert!(sites.iter().any(|s| s.id == site.id));

        // Clean up
        clean_up(&store, &site).await;
    }

    #[tokio::test]
    async fn test_deployments_newest_first_and_closed_once() {
        let store = get_test_storage().await;
        let site = new_site(&store, "audited").await;

        let mut create = DeploymentRecord::begin(site.id, DeploymentAction::Create, "r1".to_string());
        store.record_deployment(&create).await.unwrap();
        create.succeed("up").unwrap();
        store.record_deployment(&create).await.unwrap();

        let stop = DeploymentRecord::begin(site.id, DeploymentAction::Stop, "r1".to_string());
        store.record_deployment(&stop).await.unwrap();

        let records = store.list_deployments(site.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, DeploymentAction::Stop);
        assert_eq!(records[1].action, DeploymentAction::Create);
        assert!(records[1].is_closed());

        // A closed record cannot be replaced
        assert!(store.record_deployment(&create).await.is_err());

        // Clean up
        let mut conn = store.conn.clone();
        let _: () = conn
            .del(vec![deployment_key(&create.id), deployment_key(&stop.id)])
            .await
            .unwrap();
        clean_up(&store, &site).await;
    }
}
