//! Environment-derived settings.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Tunables read once at startup. Every field has a usable default so the
/// crate runs with an empty environment.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Delay between polls while waiting on provisioned hosts.
    pub provision_poll_interval: Duration,
    /// Bound on concurrent host sync probes after provisioning.
    pub host_sync_workers: usize,
    /// Directory for automation log files.
    pub log_dir: PathBuf,
    /// NTP server injected into the playbook variable bag when set.
    pub ntp_server: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provision_poll_interval: Duration::from_secs(5),
            host_sync_workers: 4,
            log_dir: PathBuf::from("logs"),
            ntp_server: None,
        }
    }
}

impl Settings {
    /// Read settings from `FLEET_*` environment variables, falling back to
    /// defaults (with a warning) on unparseable values.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            provision_poll_interval: env_parse("FLEET_PROVISION_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provision_poll_interval),
            host_sync_workers: env_parse("FLEET_HOST_SYNC_WORKERS")
                .unwrap_or(defaults.host_sync_workers),
            log_dir: std::env::var("FLEET_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            ntp_server: std::env::var("FLEET_NTP_SERVER").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = raw, "ignoring unparseable setting");
            None
        }
    }
}
