//! fleet-operator library crate
//!
//! Backend core of a Kubernetes fleet-provisioning platform: the cluster
//! lifecycle chains (create, upgrade) and the node membership workflows,
//! built around injected ports for storage, automation, IaaS provisioning,
//! and notifications.

pub mod adm;
pub mod automation;
pub mod config;
pub mod error;
pub mod inventory;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod provider;
pub mod store;

pub use config::Settings;
pub use error::{Error, Result};
pub use orchestrator::{BatchOperation, Orchestrator};
