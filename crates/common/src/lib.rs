//! Shared data model for the ddeployer workspace.
//!
//! Site descriptors, generated credentials, deployment audit records and the
//! error taxonomy used by the compiler and the orchestrator.

pub mod credential;
pub mod deployment;
pub mod error;
pub mod site;

pub use credential::{Credential, WordPressSalts};
pub use deployment::{DeploymentAction, DeploymentRecord, DeploymentStatus};
pub use error::{Error, Result};
pub use site::{slugify, DatabaseAccount, Site, SiteFilter, SiteKind, SiteStatus};
