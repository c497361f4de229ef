//! Automation driver ports.
//!
//! The core never executes playbooks itself. It hands an inventory and a
//! variable bag to a driver obtained from an [`AutomationConnector`] and
//! observes success or failure; output streams to a log sink the caller
//! owns. Production wires an ansible-runner implementation; tests wire a
//! scripted fake.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::inventory::Inventory;
use crate::model::new_id;

/// Error type for automation driver operations
#[derive(Error, Debug)]
pub enum AutomationError {
    /// A playbook run finished unsuccessfully
    #[error("playbook {playbook} failed: {message}")]
    Playbook { playbook: String, message: String },

    /// Log sink creation or write failure
    #[error("log sink error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for streamed playbook output.
pub type LogSink = Arc<Mutex<dyn Write + Send>>;

/// One connected driver session: a variable bag plus the ability to run
/// named playbooks against the inventory it was connected with.
#[async_trait]
pub trait AutomationDriver: Send {
    /// Stage a variable for subsequent runs.
    fn set_var(&mut self, key: &str, value: &str);

    /// Execute a named playbook, streaming output to the session's log
    /// sink. `tag` narrows the run; empty means the whole playbook.
    async fn run(&mut self, playbook: &str, tag: &str) -> Result<(), AutomationError>;
}

/// Factory for driver sessions. A fresh session is connected per workflow
/// step so each run sees the inventory as it stands.
pub trait AutomationConnector: Send + Sync {
    fn connect(&self, inventory: Inventory, log: LogSink) -> Box<dyn AutomationDriver>;
}

/// Create a file-backed log sink for a cluster operation under `dir`.
///
/// Returns the log identifier (persisted on the cluster so the UI can tail
/// it) and the sink itself.
pub fn create_log_sink(dir: &Path, cluster_name: &str) -> Result<(String, LogSink), AutomationError> {
    std::fs::create_dir_all(dir)?;
    let log_id = format!("{cluster_name}-{}", new_id());
    let file = std::fs::File::create(dir.join(format!("{log_id}.log")))?;
    Ok((log_id, Arc::new(Mutex::new(file))))
}

/// Write one line to a sink, logging failures instead of propagating them:
/// losing a log line must not fail a stage.
pub fn write_log(sink: &LogSink, message: &str) {
    let mut guard = match sink.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(e) = writeln!(guard, "{message}") {
        tracing::error!(error = %e, "failed to write automation log line");
    }
}
