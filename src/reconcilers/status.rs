// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for `DynaKube` and `EdgeConnect`.
//!
//! Conditions follow the standard Kubernetes format:
//! - `type`: The aspect of the resource being reported (e.g., "Ready", "OneAgentVersion")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the status last flipped
//!
//! All helpers work in memory. Reconcilers collect their changes on a cloned
//! status and persist it once at the end of the pass.
//!
//! # Example
//!
//! ```rust,no_run
//! use dynakube_operator::reconcilers::status::set_condition;
//! use dynakube_operator::crd::Condition;
//!
//! let mut conditions: Vec<Condition> = Vec::new();
//! set_condition(&mut conditions, "Ready", "True", "StatefulSetCreated", "otel collector created");
//! ```

use crate::crd::{Condition, Phase};
use crate::status_reasons::{STATUS_FALSE, STATUS_TRUE};
use chrono::Utc;

/// Create a new condition stamped with the current time.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition.
///
/// The `lastTransitionTime` is preserved when the status value does not
/// change, and refreshed otherwise.
///
/// # Arguments
///
/// * `conditions` - Mutable reference to the conditions list
/// * `condition_type` - The type of condition (e.g., "Ready")
/// * `status` - The status: "True", "False", or "Unknown"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Remove a condition by type. Returns `true` if one was removed.
pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != condition_type);
    conditions.len() != before
}

/// Compare two condition lists ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        current.iter().any(|c| {
            c.r#type == new_cond.r#type
                && c.status == new_cond.status
                && c.reason == new_cond.reason
                && c.message == new_cond.message
        })
    })
}

/// Derive the resource phase from its conditions and the outcome of the pass.
///
/// `Error` wins when the pass returned an error, `Running` requires every
/// condition to be `True`, anything else is still `Deploying`.
#[must_use]
pub fn compute_phase(conditions: &[Condition], errored: bool) -> Phase {
    if errored {
        return Phase::Error;
    }
    if conditions.iter().any(|c| c.status == STATUS_FALSE) {
        return Phase::Deploying;
    }
    if conditions.iter().all(|c| c.status == STATUS_TRUE) {
        Phase::Running
    } else {
        Phase::Deploying
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
