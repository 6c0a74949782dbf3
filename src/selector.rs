// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selector matching utilities.
//!
//! Used by the namespace mapper to decide which namespaces a `DynaKube`
//! governs, and by the webhook mutators to honour namespace selectors.
//!
//! # Example
//!
//! ```rust
//! use dynakube_operator::crd::LabelSelector;
//! use dynakube_operator::selector::matches_selector;
//! use std::collections::BTreeMap;
//!
//! let selector = LabelSelector {
//!     match_labels: Some(BTreeMap::from([("team".to_string(), "web".to_string())])),
//!     match_expressions: None,
//! };
//! let labels = BTreeMap::from([("team".to_string(), "web".to_string())]);
//! assert!(matches_selector(&selector, &labels));
//! ```

use crate::crd::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;
use tracing::warn;

/// Check whether a set of labels satisfies a label selector.
///
/// `matchLabels` and `matchExpressions` are `ANDed`; an empty selector matches
/// everything. Unknown operators never match.
#[must_use]
pub fn matches_selector(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector.match_labels.as_ref().is_none_or(|wanted| {
        wanted
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    });

    labels_match
        && selector
            .match_expressions
            .as_ref()
            .is_none_or(|exprs| exprs.iter().all(|req| matches_requirement(req, labels)))
}

/// Optional selectors match everything when absent.
#[must_use]
pub fn matches_optional_selector(
    selector: Option<&LabelSelector>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector.is_none_or(|s| matches_selector(s, labels))
}

fn matches_requirement(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = req.values.as_deref().unwrap_or_default();
    match req.operator.as_str() {
        "In" => labels.get(&req.key).is_some_and(|v| values.contains(v)),
        "NotIn" => labels.get(&req.key).is_none_or(|v| !values.contains(v)),
        "Exists" => labels.contains_key(&req.key),
        "DoesNotExist" => !labels.contains_key(&req.key),
        other => {
            warn!(operator = %other, key = %req.key, "Unknown label selector operator");
            false
        }
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
