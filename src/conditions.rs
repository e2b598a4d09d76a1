//! Kubernetes-standard status condition helpers
//!
//! Conditions follow the API conventions: `lastTransitionTime` only moves
//! when the status value flips.

use crate::crd::ClusterCondition;
use chrono::Utc;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

// Cluster condition types
pub const CLUSTER_CONDITION_READY: &str = "Ready";
pub const CLUSTER_CONDITION_PROGRESSING: &str = "Progressing";

/// Build a condition stamped with the current time.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> ClusterCondition {
    ClusterCondition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when status hasn't changed.
pub fn set_condition(conditions: &mut Vec<ClusterCondition>, new: ClusterCondition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}
