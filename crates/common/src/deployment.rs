//! Deployment audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Outcome of one orchestration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Operator action that opened the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    Create,
    Start,
    Update,
    Stop,
    Delete,
}

/// Append-only audit entry for one orchestration attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,

    pub site_id: u64,

    pub action: DeploymentAction,

    /// Site revision the attempt worked from
    pub version: String,

    pub status: DeploymentStatus,

    /// Captured engine output
    #[serde(default)]
    pub log: String,

    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    /// Open a new record for an attempt that starts now.
    pub fn begin(site_id: u64, action: DeploymentAction, version: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_id,
            action,
            version,
            status: DeploymentStatus::Running,
            log: String::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn succeed(&mut self, log: impl Into<String>) -> Result<()> {
        self.close(DeploymentStatus::Success, log.into())
    }

    pub fn fail(&mut self, log: impl Into<String>) -> Result<()> {
        self.close(DeploymentStatus::Failed, log.into())
    }

    fn close(&mut self, status: DeploymentStatus, log: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Validation(format!(
                "deployment record {} is already closed",
                self.id
            )));
        }
        self.status = status;
        self.log = log;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_closes_once() {
        let mut record = DeploymentRecord::begin(3, DeploymentAction::Start, "r1".to_string());
        assert_eq!(record.status, DeploymentStatus::Running);
        assert!(!record.is_closed());

        record.fail("exit 1: no such image").unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert!(record.completed_at.is_some());

        assert!(record.succeed("late").is_err());
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.log, "exit 1: no such image");
    }
}
