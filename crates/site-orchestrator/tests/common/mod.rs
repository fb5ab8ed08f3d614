//! Shared fixtures: a scripted container engine and an orchestrator over a temp dir

#![allow(dead_code)]

use async_trait::async_trait;
use ddeployer_common::{DeploymentRecord, Error, Result, Site, SiteFilter, SiteStatus};
use site_orchestrator::storage::{MemorySiteStore, SiteStore};
use site_orchestrator::{ContainerEngine, CreateSiteRequest, EngineOutput, Orchestrator, OrchestratorConfig};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ENGINE_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Up,
    Down,
    Teardown,
    List,
    Logs,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub target: String,
}

/// Engine that records every call and answers from a script
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Op, i32>>,
    timeouts: Mutex<HashSet<Op>>,
    listing: Mutex<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call takes `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Make `op` exit with `code` from now on.
    pub fn fail(&self, op: Op, code: i32) {
        self.failures.lock().unwrap().insert(op, code);
    }

    /// Make `op` run past the engine timeout from now on.
    pub fn time_out(&self, op: Op) {
        self.timeouts.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: Op) {
        self.failures.lock().unwrap().remove(&op);
        self.timeouts.lock().unwrap().remove(&op);
    }

    pub fn set_listing(&self, listing: &str) {
        *self.listing.lock().unwrap() = listing.to_string();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    /// Most calls that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, op: Op, target: String) -> Result<EngineOutput> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.calls.lock().unwrap().push(Call {
            op,
            target: target.clone(),
        });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.timeouts.lock().unwrap().contains(&op) {
            return Err(Error::EngineTimeout(ENGINE_TIMEOUT_SECS));
        }

        let code = self.failures.lock().unwrap().get(&op).copied().unwrap_or(0);
        let stdout = match op {
            Op::List => self.listing.lock().unwrap().clone(),
            Op::Logs => "GET / 200\n".to_string(),
            _ => format!("{:?} {}\n", op, target),
        };
        let stderr = if code == 0 {
            String::new()
        } else {
            format!("simulated {:?} failure\n", op)
        };

        Ok(EngineOutput {
            exit_code: Some(code),
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn up(&self, manifest: &Path) -> Result<EngineOutput> {
        self.run(Op::Up, manifest.display().to_string()).await
    }

    async fn down(&self, manifest: &Path) -> Result<EngineOutput> {
        self.run(Op::Down, manifest.display().to_string()).await
    }

    async fn teardown(&self, manifest: &Path) -> Result<EngineOutput> {
        self.run(Op::Teardown, manifest.display().to_string()).await
    }

    async fn list(&self, name_filter: &str) -> Result<EngineOutput> {
        self.run(Op::List, name_filter.to_string()).await
    }

    async fn logs(&self, container: &str, tail: usize) -> Result<EngineOutput> {
        self.run(Op::Logs, format!("{}:{}", container, tail)).await
    }
}

/// Memory store whose status writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySiteStore,
    fail_on: Mutex<Option<SiteStatus>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every `update_site` that writes `status`.
    pub fn fail_updates_to(&self, status: Option<SiteStatus>) {
        *self.fail_on.lock().unwrap() = status;
    }
}

#[async_trait]
impl SiteStore for FlakyStore {
    async fn allocate_id(&self) -> Result<u64> {
        self.inner.allocate_id().await
    }

    async fn insert_site(&self, site: &Site) -> Result<()> {
        self.inner.insert_site(site).await
    }

    async fn update_site(&self, site: &Site) -> Result<()> {
        if *self.fail_on.lock().unwrap() == Some(site.status) {
            return Err(Error::Storage("connection refused".to_string()));
        }
        self.inner.update_site(site).await
    }

    async fn get_site(&self, id: u64) -> Result<Option<Site>> {
        self.inner.get_site(id).await
    }

    async fn list_sites(&self, filter: &SiteFilter) -> Result<Vec<Site>> {
        self.inner.list_sites(filter).await
    }

    async fn soft_delete_site(&self, site: &Site) -> Result<()> {
        self.inner.soft_delete_site(site).await
    }

    async fn record_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        self.inner.record_deployment(record).await
    }

    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>> {
        self.inner.list_deployments(site_id).await
    }
}

pub struct Harness<S = MemorySiteStore> {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<S>,
    pub sites_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(FakeEngine::new())
    }

    pub fn with_engine(engine: FakeEngine) -> Self {
        Harness::build(engine, MemorySiteStore::new())
    }
}

impl Harness<FlakyStore> {
    pub fn flaky() -> Self {
        Harness::build(FakeEngine::new(), FlakyStore::new())
    }
}

impl<S: SiteStore + 'static> Harness<S> {
    fn build(engine: FakeEngine, store: S) -> Self {
        let sites_dir = TempDir::new().unwrap();
        let sites_path = sites_dir.path().display().to_string();
        let config = OrchestratorConfig::from_lookup(|key| {
            (key == "SITES_PATH").then(|| sites_path.clone())
        })
        .unwrap();

        let engine = Arc::new(engine);
        let store = Arc::new(store);
        let orchestrator = Orchestrator::new(
            &config,
            engine.clone() as Arc<dyn ContainerEngine>,
            store.clone() as Arc<dyn SiteStore>,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            engine,
            store,
            sites_dir,
        }
    }

    pub fn site_dir(&self, container: &str) -> std::path::PathBuf {
        self.sites_dir.path().join(container)
    }

    pub fn manifest(&self, container: &str) -> String {
        std::fs::read_to_string(self.site_dir(container).join("docker-compose.yml")).unwrap()
    }
}

pub fn wordpress_request(name: &str, domain: &str) -> CreateSiteRequest {
    CreateSiteRequest {
        name: name.to_string(),
        kind: "wordpress".to_string(),
        domains: vec![domain.to_string()],
        php_version: "8.3".to_string(),
        create_database: true,
        ssl_enabled: false,
        cache_enabled: true,
        environment: BTreeMap::new(),
    }
}
