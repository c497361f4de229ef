//! Per-cluster advisory locks.
//!
//! A workflow acquires the lock *before* checking its preconditions and the
//! guard moves into the spawned background task, so release coincides with
//! the workflow's terminal write. This closes the window where two callers
//! both pass the precondition check and both spawn work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Error;

type LockMap = Arc<Mutex<HashMap<String, String>>>;

/// Registry of in-flight cluster operations, keyed by cluster name.
#[derive(Clone, Default)]
pub struct ClusterLocks {
    inner: LockMap,
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a cluster for `holder`. Fails fast when any operation already
    /// holds it; the returned guard releases on drop.
    pub fn try_acquire(&self, cluster: &str, holder: &str) -> Result<LockGuard, Error> {
        let mut map = lock_map(&self.inner);
        if let Some(existing) = map.get(cluster) {
            return Err(Error::OperationInProgress {
                cluster: cluster.to_string(),
                holder: existing.clone(),
            });
        }
        map.insert(cluster.to_string(), holder.to_string());
        debug!(cluster, holder, "cluster lock acquired");
        Ok(LockGuard {
            locks: Arc::clone(&self.inner),
            cluster: cluster.to_string(),
        })
    }

    /// Holder of the cluster's lock, if any.
    pub fn holder(&self, cluster: &str) -> Option<String> {
        lock_map(&self.inner).get(cluster).cloned()
    }
}

/// Releases the cluster's lock on drop.
pub struct LockGuard {
    locks: LockMap,
    cluster: String,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("cluster", &self.cluster)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        lock_map(&self.locks).remove(&self.cluster);
        debug!(cluster = %self.cluster, "cluster lock released");
    }
}

fn lock_map(locks: &LockMap) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
