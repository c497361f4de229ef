//! Condition tracker: the durable progress record of a lifecycle chain.
//!
//! Conditions live on `ClusterStatus` in stage-declaration order. The chain
//! engine appends one per stage as it advances, so "first condition that is
//! not `True`" identifies where to resume after a crash or failure.

use jiff::Timestamp;

use crate::model::{Condition, ConditionStatus};

/// Merge a condition into the list by name.
///
/// An existing condition is updated in place, only overwriting fields that
/// differ; a missing probe time on the incoming condition preserves the
/// stored one. Absent conditions are appended, defaulting the probe time to
/// now. Calling this twice with identical state changes nothing but the
/// probe time.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.name == new.name) {
        if existing.status != new.status {
            existing.status = new.status;
        }
        if existing.message != new.message {
            existing.message = new.message;
        }
        if new.last_probe_time != Timestamp::UNIX_EPOCH
            && existing.last_probe_time != new.last_probe_time
        {
            existing.last_probe_time = new.last_probe_time;
        }
        return;
    }
    let mut new = new;
    if new.last_probe_time == Timestamp::UNIX_EPOCH {
        new.last_probe_time = Timestamp::now();
    }
    conditions.push(new);
}

/// The first condition whose stage has not completed (`False` or `Unknown`),
/// or `None` when every recorded stage is `True`.
pub fn current_condition(conditions: &[Condition]) -> Option<&Condition> {
    conditions
        .iter()
        .find(|c| matches!(c.status, ConditionStatus::False | ConditionStatus::Unknown))
}

/// Drop all conditions. Used only when an upgrade restarts from scratch.
pub fn reset_all(conditions: &mut Vec<Condition>) {
    conditions.clear();
}

/// Flip `False` conditions back to `Unknown`, clearing their messages.
/// Used to resume a failed upgrade in place without discarding completed
/// stages.
pub fn reset_failed(conditions: &mut [Condition]) {
    for condition in conditions.iter_mut() {
        if condition.status == ConditionStatus::False {
            condition.status = ConditionStatus::Unknown;
            condition.message.clear();
        }
    }
}

/// Build a condition record with an explicit probe time.
pub fn condition(name: &str, status: ConditionStatus, message: &str, at: Timestamp) -> Condition {
    Condition {
        name: name.to_string(),
        status,
        message: message.to_string(),
        last_probe_time: at,
    }
}
