//! Kubernetes-standard status condition helpers
//!
//! Provides constants and helper functions for managing the Stream status
//! condition ledger following the Kubernetes API conventions: at most one
//! condition per type, bounded history.

use crate::crd::StreamCondition;
use chrono::Utc;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// Stream condition types
pub const STREAM_CONDITION_READY: &str = "Ready";

// Finalizer name
pub const STREAM_FINALIZER: &str = "streamlog.io/stream-cleanup";

/// Maximum number of conditions retained on a Stream status.
pub const MAX_CONDITIONS: usize = 10;

/// Build a condition with the current timestamp.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> StreamCondition {
    StreamCondition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Set or update a condition in a list, keyed by type.
///
/// At most one condition per type is retained; an existing entry is replaced
/// in place so list position is preserved. `lastTransitionTime` carries over
/// when the status value hasn't changed.
pub fn upsert_condition(conditions: &mut Vec<StreamCondition>, next: StreamCondition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == next.r#type) {
        if existing.status == next.status {
            existing.reason = next.reason;
            existing.message = next.message;
        } else {
            *existing = next;
        }
    } else {
        conditions.push(next);
    }
}

/// Cap the condition list at [`MAX_CONDITIONS`], evicting oldest entries first.
pub fn prune_conditions(conditions: &mut Vec<StreamCondition>) {
    if conditions.len() <= MAX_CONDITIONS {
        return;
    }
    let excess = conditions.len() - MAX_CONDITIONS;
    conditions.drain(..excess);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_condition() {
        let cond = build_condition(STREAM_CONDITION_READY, CONDITION_TRUE, "Synced", "in sync");
        assert_eq!(cond.r#type, "Ready");
        assert_eq!(cond.status, "True");
        assert!(cond.last_transition_time.is_some());
        assert_eq!(cond.reason.as_deref(), Some("Synced"));
        assert_eq!(cond.message.as_deref(), Some("in sync"));
    }

    #[test]
    fn test_upsert_adds_new() {
        let mut conditions = Vec::new();
        upsert_condition(
            &mut conditions,
            build_condition("Ready", CONDITION_TRUE, "Synced", "ok"),
        );
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_upsert_is_keyed_by_type() {
        let mut conditions = Vec::new();
        upsert_condition(
            &mut conditions,
            build_condition("Ready", CONDITION_FALSE, "Errored", "boom"),
        );
        upsert_condition(
            &mut conditions,
            build_condition("Ready", CONDITION_TRUE, "Synced", "ok"),
        );
        upsert_condition(
            &mut conditions,
            build_condition("Ready", CONDITION_TRUE, "Synced", "still ok"),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, CONDITION_TRUE);
        assert_eq!(conditions[0].message.as_deref(), Some("still ok"));
    }

    #[test]
    fn test_upsert_preserves_transition_time_on_same_status() {
        let mut conditions = vec![StreamCondition {
            r#type: "Ready".to_string(),
            status: CONDITION_TRUE.to_string(),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_string()),
            reason: Some("First".to_string()),
            message: Some("first".to_string()),
        }];

        upsert_condition(
            &mut conditions,
            build_condition("Ready", CONDITION_TRUE, "Second", "second"),
        );

        assert_eq!(conditions.len(), 1);
        // Transition time preserved because status didn't change
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(conditions[0].reason.as_deref(), Some("Second"));
    }

    #[test]
    fn test_upsert_updates_transition_time_on_status_change() {
        let mut conditions = vec![StreamCondition {
            r#type: "Ready".to_string(),
            status: CONDITION_FALSE.to_string(),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_string()),
            reason: Some("Errored".to_string()),
            message: Some("boom".to_string()),
        }];

        upsert_condition(
            &mut conditions,
            build_condition("Ready", CONDITION_TRUE, "Synced", "ok"),
        );

        assert_eq!(conditions.len(), 1);
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let mut conditions = Vec::new();
        for i in 0..15 {
            upsert_condition(
                &mut conditions,
                build_condition(&format!("Type{i}"), CONDITION_TRUE, "R", "m"),
            );
        }
        prune_conditions(&mut conditions);

        assert_eq!(conditions.len(), MAX_CONDITIONS);
        // The 10 most recently upserted survive
        assert_eq!(conditions[0].r#type, "Type5");
        assert_eq!(conditions[9].r#type, "Type14");
    }

    #[test]
    fn test_prune_noop_under_cap() {
        let mut conditions = vec![build_condition("Ready", CONDITION_TRUE, "Synced", "ok")];
        prune_conditions(&mut conditions);
        assert_eq!(conditions.len(), 1);
    }
}
