//! Site lifecycle orchestration
//!
//! Drives a site through compile, write and deploy, and keeps its stored
//! status and deployment records in step with what the engine did. Every
//! mutating operation holds the site's lock for its whole duration.

use chrono::Utc;
use ddeployer_common::{
    DeploymentAction, DeploymentRecord, Error, Result, Site, SiteFilter, SiteStatus,
};
use std::sync::Arc;
use topology_compiler::{CredentialGenerator, TopologyCompiler, TopologyWriter};
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::engine::{ContainerEngine, EngineOutput};
use crate::locks::SiteLocks;
use crate::models::{
    CreateSiteRequest, DeleteReport, DeleteStep, Observation, StatusReport, UpdateSiteRequest,
};
use crate::prober::StatusProber;
use crate::storage::SiteStore;

pub const DEFAULT_LOG_TAIL: usize = 100;
pub const MAX_LOG_TAIL: usize = 10_000;

/// Coordinates compiler, writer, engine and store for every site
pub struct Orchestrator {
    compiler: TopologyCompiler,
    writer: TopologyWriter,
    secrets: CredentialGenerator,
    engine: Arc<dyn ContainerEngine>,
    store: Arc<dyn SiteStore>,
    prober: StatusProber,
    locks: SiteLocks,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        engine: Arc<dyn ContainerEngine>,
        store: Arc<dyn SiteStore>,
    ) -> Self {
        Self {
            compiler: TopologyCompiler::new(config.compiler.clone()),
            writer: TopologyWriter::new(config.sites_path.clone()),
            secrets: CredentialGenerator::new(),
            prober: StatusProber::new(engine.clone()),
            engine,
            store,
            locks: SiteLocks::new(),
        }
    }

    /// Create a site and deploy it.
    ///
    /// Invalid input and topologies that do not compile are rejected before
    /// anything is stored. Once the descriptor exists it is kept even when
    /// the deployment fails; the site is then left in `error`.
    pub async fn create(&self, request: CreateSiteRequest) -> Result<Site> {
        let new = request.validate(self.compiler.config())?;

        let id = self.store.allocate_id().await?;
        let credential = self.secrets.generate(new.kind, new.create_database);
        let now = Utc::now();

        let mut site = Site {
            id,
            database: new
                .create_database
                .then(|| Site::database_account_for(id, &new.name)),
            name: new.name,
            kind: new.kind,
            domains: new.domains,
            php_version: new.php_version,
            ssl_enabled: new.ssl_enabled,
            cache_enabled: new.cache_enabled,
            credential,
            environment: new.environment,
            status: SiteStatus::Creating,
            revision: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.compiler.compile(&site, &site.credential)?;

        let _guard = self.locks.acquire(id).await;
        self.store.insert_site(&site).await?;
        info!("Creating site {} ({}) as {}", site.id, site.name, site.kind);

        self.deploy(&mut site, DeploymentAction::Create).await?;
        Ok(site)
    }

    /// Redeploy a site from its stored descriptor.
    pub async fn start(&self, id: u64) -> Result<Site> {
        let _guard = self.locks.acquire(id).await;
        let mut site = self.load(id).await?;
        ensure_transition(&site, SiteStatus::Running)?;

        info!("Starting site {} ({})", site.id, site.name);
        self.deploy(&mut site, DeploymentAction::Start).await?;
        Ok(site)
    }

    /// Stop a running site. Containers are removed, volumes are kept.
    ///
    /// A failed stop leaves the recorded status unchanged.
    pub async fn stop(&self, id: u64) -> Result<Site> {
        let _guard = self.locks.acquire(id).await;
        let mut site = self.load(id).await?;
        ensure_transition(&site, SiteStatus::Stopped)?;

        info!("Stopping site {} ({})", site.id, site.name);
        let record = self.open_record(&site, DeploymentAction::Stop).await?;
        let manifest = self.manifest_for(&site);

        match self.engine.down(&manifest).await.and_then(EngineOutput::into_result) {
            Ok(output) => {
                set_status(&mut site, SiteStatus::Stopped);
                self.persist_outcome(&site, record, output).await?;
                info!("Site {} stopped", site.id);
                Ok(site)
            }
            Err(e) => {
                error!("Failed to stop site {}: {}", site.id, e);
                self.close_record(record, Err(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Change the mutable settings of a site and redeploy it.
    ///
    /// The candidate descriptor must compile before it replaces the stored
    /// one. Credentials are carried over unchanged.
    pub async fn update(&self, id: u64, request: UpdateSiteRequest) -> Result<Site> {
        let _guard = self.locks.acquire(id).await;
        let site = self.load(id).await?;
        ensure_transition(&site, SiteStatus::Running)?;

        let mut candidate = request.apply(&site, self.compiler.config())?;
        candidate.revision = site.revision + 1;
        candidate.updated_at = Utc::now();
        self.compiler.compile(&candidate, &candidate.credential)?;

        self.store.update_site(&candidate).await?;
        info!(
            "Updating site {} ({}) to {}",
            candidate.id,
            candidate.name,
            candidate.version_tag()
        );

        self.deploy(&mut candidate, DeploymentAction::Update).await?;
        Ok(candidate)
    }

    /// Remove a site, best effort.
    ///
    /// Every step is attempted even when an earlier one fails; the report
    /// lists what went wrong.
    pub async fn delete(&self, id: u64) -> Result<DeleteReport> {
        let _guard = self.locks.acquire(id).await;
        let site = self.load(id).await?;
        ensure_transition(&site, SiteStatus::Deleted)?;

        info!("Deleting site {} ({})", site.id, site.name);
        let record = self.open_record(&site, DeploymentAction::Delete).await?;
        let dir = self.writer.site_dir(&site.container_name());
        let manifest = TopologyWriter::manifest_path(&dir);
        let mut report = DeleteReport::new(id);

        if manifest.exists() {
            let stopped = self
                .engine
                .down(&manifest)
                .await
                .and_then(EngineOutput::into_result);
            report.record(DeleteStep::Stop, stopped.map(drop));

            let removed = self
                .engine
                .teardown(&manifest)
                .await
                .and_then(EngineOutput::into_result);
            report.record(DeleteStep::Teardown, removed.map(drop));
        } else {
            debug!("No manifest for site {}, skipping engine teardown", id);
        }

        report.record(DeleteStep::RemoveDirectory, self.writer.remove(&dir));

        let erased = self.store.soft_delete_site(&site).await;
        let descriptor_gone = erased.is_ok();
        report.record(DeleteStep::EraseDescriptor, erased);

        if report.is_clean() {
            self.close_record(record, Ok(report.summary())).await;
            info!("Site {} deleted", id);
        } else {
            warn!(
                "Site {} deleted with {} failed steps",
                id,
                report.failures().len()
            );
            self.close_record(record, Err(report.summary())).await;
        }

        if descriptor_gone {
            self.locks.forget(id);
        }
        Ok(report)
    }

    /// Compare the recorded status with what the engine reports.
    pub async fn status(&self, id: u64) -> Result<StatusReport> {
        let site = self.load(id).await?;

        let observed = match self.prober.probe(&site).await {
            Ok(snapshot) if snapshot.running => Observation::Running { snapshot },
            Ok(snapshot) => Observation::NotRunning { snapshot },
            Err(e) => {
                warn!("Could not probe site {}: {}", id, e);
                Observation::Unknown {
                    reason: e.to_string(),
                }
            }
        };

        let report = StatusReport::new(&site, observed);
        if report.drift {
            warn!(
                "Site {} is recorded as {} but the engine disagrees",
                id, site.status
            );
        }
        Ok(report)
    }

    /// Recent output of the site's app container.
    pub async fn logs(&self, id: u64, tail: usize) -> Result<String> {
        let site = self.load(id).await?;
        let tail = tail.clamp(1, MAX_LOG_TAIL);

        let output = self
            .engine
            .logs(&site.container_name(), tail)
            .await?
            .into_result()?;
        Ok(output.combined())
    }

    pub async fn get(&self, id: u64) -> Result<Site> {
        self.load(id).await
    }

    pub async fn list(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        self.store.list_sites(filter).await
    }

    pub async fn deployments(&self, id: u64) -> Result<Vec<DeploymentRecord>> {
        self.load(id).await?;
        self.store.list_deployments(id).await
    }

    async fn load(&self, id: u64) -> Result<Site> {
        self.store.get_site(id).await?.ok_or(Error::NotFound(id))
    }

    fn manifest_for(&self, site: &Site) -> std::path::PathBuf {
        TopologyWriter::manifest_path(&self.writer.site_dir(&site.container_name()))
    }

    /// Compile, write and bring up `site`, recording the attempt.
    ///
    /// No retries: the first failure leaves the site in `error`.
    async fn deploy(&self, site: &mut Site, action: DeploymentAction) -> Result<()> {
        let record = self.open_record(site, action).await?;

        match self.apply(site).await {
            Ok(output) => {
                set_status(site, SiteStatus::Running);
                self.persist_outcome(site, record, output).await?;
                info!("Site {} is running at {}", site.id, site.primary_url());
                Ok(())
            }
            Err(e) => {
                error!("Deployment of site {} failed: {}", site.id, e);
                set_status(site, SiteStatus::Error);
                if let Err(store_err) = self.store.update_site(site).await {
                    warn!("Failed to record error status for site {}: {}", site.id, store_err);
                }
                self.close_record(record, Err(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Store the new status of `site`, then close `record`.
    ///
    /// The record is closed even when the status write fails; it is then
    /// marked failed and the store error is returned.
    async fn persist_outcome(
        &self,
        site: &Site,
        record: DeploymentRecord,
        output: EngineOutput,
    ) -> Result<()> {
        match self.store.update_site(site).await {
            Ok(()) => {
                self.close_record(record, Ok(output.combined())).await;
                Ok(())
            }
            Err(e) => {
                error!(
                    "Engine succeeded for site {} but its status could not be stored: {}",
                    site.id, e
                );
                let log = format!(
                    "{}\nfailed to store status {}: {}",
                    output.combined().trim_end(),
                    site.status,
                    e
                );
                self.close_record(record, Err(log)).await;
                Err(e)
            }
        }
    }

    async fn apply(&self, site: &Site) -> Result<EngineOutput> {
        let topology = self.compiler.compile(site, &site.credential)?;
        let manifest = self.writer.write_site(&topology)?;
        self.engine.up(&manifest).await?.into_result()
    }

    async fn open_record(&self, site: &Site, action: DeploymentAction) -> Result<DeploymentRecord> {
        let record = DeploymentRecord::begin(site.id, action, site.version_tag());
        self.store.record_deployment(&record).await?;
        Ok(record)
    }

    /// Close `record` with the outcome's log. Failures here are logged only.
    async fn close_record(
        &self,
        mut record: DeploymentRecord,
        outcome: std::result::Result<String, String>,
    ) {
        let closed = match outcome {
            Ok(log) => record.succeed(log),
            Err(log) => record.fail(log),
        };
        let stored = match closed {
            Ok(()) => self.store.record_deployment(&record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!("Failed to close deployment record {}: {}", record.id, e);
        }
    }
}

fn ensure_transition(site: &Site, next: SiteStatus) -> Result<()> {
    if site.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: site.status,
            to: next,
        })
    }
}

fn set_status(site: &mut Site, status: SiteStatus) {
    site.status = status;
    site.updated_at = Utc::now();
}
