//! Tolerant version comparison for upgrade gates.
//!
//! Manifest versions look like `v1.20.8-fo1` and component versions like
//! `3.4.14` or `20.10.7-ce`. Gates only need "is the target newer", so the
//! comparison strips the `v` prefix and any `-suffix` before parsing.

use semver::Version;

/// True when `candidate` is strictly newer than `current`.
///
/// Unparseable inputs fall back to string inequality, which makes a changed
/// version run the stage rather than silently skip it.
pub fn is_newer_than(candidate: &str, current: &str) -> bool {
    match (parse(candidate), parse(current)) {
        (Some(a), Some(b)) => a > b,
        _ => candidate != current,
    }
}

/// Strip a manifest version down to its Kubernetes version (`v1.20.8-fo1`
/// -> `v1.20.8`), as expected by the upgrade playbook.
pub fn kubernetes_version(manifest_version: &str) -> &str {
    match manifest_version.split_once('-') {
        Some((base, _)) => base,
        None => manifest_version,
    }
}

fn parse(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    let base = match trimmed.split_once('-') {
        Some((base, _)) => base,
        None => trimmed,
    };
    // Tolerate two-segment versions like "1.20".
    let mut parts = base.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}
