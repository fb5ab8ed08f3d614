//! Container engine adapter
//!
//! The orchestrator only talks to containers through [`ContainerEngine`].
//! [`DockerComposeEngine`] shells out to the compose and docker CLIs.

use async_trait::async_trait;
use ddeployer_common::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Both streams, for deployment logs.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Convert a non-zero exit into [`Error::Engine`].
    pub fn into_result(self) -> Result<EngineOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::Engine {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Operations the orchestrator needs from the container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create and start every service of the manifest.
    async fn up(&self, manifest: &Path) -> Result<EngineOutput>;

    /// Stop and remove the containers, keeping volumes.
    async fn down(&self, manifest: &Path) -> Result<EngineOutput>;

    /// Remove containers and volumes.
    async fn teardown(&self, manifest: &Path) -> Result<EngineOutput>;

    /// `name\tstatus\tports` lines for containers whose name contains `name_filter`.
    async fn list(&self, name_filter: &str) -> Result<EngineOutput>;

    /// Last `tail` lines of a container's logs.
    async fn logs(&self, container: &str, tail: usize) -> Result<EngineOutput>;
}

/// Engine backed by the docker compose CLI
#[derive(Debug, Clone)]
pub struct DockerComposeEngine {
    compose_command: Vec<String>,
    docker_bin: String,
    timeout: Duration,
}

impl DockerComposeEngine {
    pub fn new(compose_command: Vec<String>, docker_bin: String, timeout: Duration) -> Self {
        Self {
            compose_command,
            docker_bin,
            timeout,
        }
    }

    fn compose(&self, manifest: &Path, args: &[&str]) -> Command {
        let (program, prefix) = match self.compose_command.split_first() {
            Some((program, prefix)) => (program.as_str(), prefix),
            None => ("docker-compose", &[][..]),
        };
        let mut cmd = Command::new(program);
        cmd.args(prefix).arg("-f").arg(manifest).args(args);
        if let Some(dir) = manifest.parent() {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn docker(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(args);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<EngineOutput> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {:?}", cmd.as_std());

        let child = cmd.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "Container engine call exceeded {}s, killing it",
                    self.timeout.as_secs()
                );
                return Err(Error::EngineTimeout(self.timeout.as_secs()));
            }
        };

        Ok(EngineOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ContainerEngine for DockerComposeEngine {
    async fn up(&self, manifest: &Path) -> Result<EngineOutput> {
        self.run(self.compose(manifest, &["up", "-d", "--remove-orphans"]))
            .await
    }

    async fn down(&self, manifest: &Path) -> Result<EngineOutput> {
        self.run(self.compose(manifest, &["down"])).await
    }

    async fn teardown(&self, manifest: &Path) -> Result<EngineOutput> {
        self.run(self.compose(manifest, &["down", "-v", "--remove-orphans"]))
            .await
    }

    async fn list(&self, name_filter: &str) -> Result<EngineOutput> {
        let filter = format!("name={}", name_filter);
        self.run(self.docker(&[
            "ps",
            "-a",
            "--filter",
            &filter,
            "--format",
            "{{.Names}}\t{{.Status}}\t{{.Ports}}",
        ]))
        .await
    }

    async fn logs(&self, container: &str, tail: usize) -> Result<EngineOutput> {
        let tail = tail.to_string();
        self.run(self.docker(&["logs", "--tail", &tail, container]))
            .await
    }
}
