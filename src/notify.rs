//! Outbound notification port.
//!
//! Every background workflow pushes one message at its terminal state.
//! Delivery is best-effort: failures are logged and never affect the
//! workflow outcome.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Error type for notification delivery
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    ClusterInstall,
    ClusterUpgrade,
    ClusterAddWorker,
    ClusterRemoveWorker,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ClusterInstall => "CLUSTER_INSTALL",
            MessageKind::ClusterUpgrade => "CLUSTER_UPGRADE",
            MessageKind::ClusterAddWorker => "CLUSTER_ADD_WORKER",
            MessageKind::ClusterRemoveWorker => "CLUSTER_REMOVE_WORKER",
        }
    }
}

/// One terminal-state notification.
#[derive(Clone, Debug)]
pub struct Message {
    pub cluster: String,
    pub kind: MessageKind,
    pub success: bool,
    pub detail: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, message: Message) -> Result<(), NotifyError>;
}

/// Discards every message. Default wiring when no channel is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn push(&self, _message: Message) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Push a message, swallowing delivery failures with a log line.
pub async fn push_quietly(notifier: &dyn Notifier, message: Message) {
    let cluster = message.cluster.clone();
    let kind = message.kind;
    if let Err(e) = notifier.push(message).await {
        warn!(cluster = %cluster, kind = kind.as_str(), error = %e, "notification dropped");
    }
}
