//! IaaS ports for plan-driven host provisioning.
//!
//! The orchestrator decides *what* machines to make and records them first;
//! these ports perform the cloud-side work. Production wires
//! terraform-backed implementations, tests wire scripted fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Host, Plan, Zone};

/// Error type for cloud provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Machine creation failed
    #[error("provisioning failed: {0}")]
    Apply(String),

    /// Machine teardown failed
    #[error("teardown failed: {0}")]
    Destroy(String),

    /// A read-only provider query failed
    #[error("provider query failed: {0}")]
    Query(String),
}

/// Read-only queries against the cloud backing a plan's zones.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Datastore names usable in a zone, in preference order.
    async fn datastores(&self, zone: &Zone) -> Result<Vec<String>, ProviderError>;

    /// Addresses observed in use on the zone's network, whether or not the
    /// store knows about them.
    async fn used_ips(&self, zone: &Zone) -> Result<Vec<String>, ProviderError>;
}

/// Creates and destroys the machines backing host records.
#[async_trait]
pub trait HostProvisioner: Send + Sync {
    /// Bring up machines for every host in the batch.
    async fn apply(&self, hosts: &[Host], plan: &Plan) -> Result<(), ProviderError>;

    /// Tear down the machines backing the batch.
    async fn destroy(&self, hosts: &[Host], plan: &Plan) -> Result<(), ProviderError>;

    /// Probe one host and return the record with refreshed facts
    /// (reachability status, sizing).
    async fn sync(&self, host: Host) -> Result<Host, ProviderError>;
}
