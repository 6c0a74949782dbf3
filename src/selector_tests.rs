// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `selector.rs`

use crate::crd::{LabelSelector, LabelSelectorRequirement};
use crate::selector::{matches_optional_selector, matches_selector};
use std::collections::BTreeMap;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn requirement(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
    LabelSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values: if values.is_empty() {
            None
        } else {
            Some(values.iter().map(|v| (*v).to_string()).collect())
        },
    }
}

#[test]
fn test_empty_selector_matches_everything() {
    let selector = LabelSelector::default();
    assert!(matches_selector(&selector, &labels(&[])));
    assert!(matches_selector(&selector, &labels(&[("a", "b")])));
}

#[test]
fn test_match_labels() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("inject", "true")])),
        match_expressions: None,
    };
    assert!(matches_selector(
        &selector,
        &labels(&[("inject", "true"), ("other", "x")])
    ));
    assert!(!matches_selector(&selector, &labels(&[("inject", "false")])));
    assert!(!matches_selector(&selector, &labels(&[])));
}

#[test]
fn test_match_expressions_operators() {
    let ns = labels(&[("env", "prod"), ("team", "web")]);

    let cases = [
        (requirement("env", "In", &["prod", "stage"]), true),
        (requirement("env", "In", &["dev"]), false),
        (requirement("env", "NotIn", &["dev"]), true),
        (requirement("missing", "NotIn", &["dev"]), true),
        (requirement("team", "Exists", &[]), true),
        (requirement("team", "DoesNotExist", &[]), false),
        (requirement("team", "Bogus", &[]), false),
    ];

    for (req, expected) in cases {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![req.clone()]),
        };
        assert_eq!(
            matches_selector(&selector, &ns),
            expected,
            "operator {} on key {}",
            req.operator,
            req.key
        );
    }
}

#[test]
fn test_labels_and_expressions_are_anded() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("team", "web")])),
        match_expressions: Some(vec![requirement("env", "In", &["prod"])]),
    };
    assert!(matches_selector(
        &selector,
        &labels(&[("team", "web"), ("env", "prod")])
    ));
    assert!(!matches_selector(
        &selector,
        &labels(&[("team", "web"), ("env", "dev")])
    ));
}

#[test]
fn test_optional_selector() {
    assert!(matches_optional_selector(None, &labels(&[])));
    let selector = LabelSelector {
        match_labels: Some(labels(&[("a", "b")])),
        match_expressions: None,
    };
    assert!(!matches_optional_selector(Some(&selector), &labels(&[])));
}
