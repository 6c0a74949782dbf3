// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the webhook state and router

use super::*;
use crate::cluster_fake::FakeCluster;

fn config() -> WebhookConfig {
    WebhookConfig {
        namespace: "dynatrace".to_string(),
        cluster_id: "cluster-uid".to_string(),
        webhook_image: "registry.example.com/dynatrace-operator:1.4.0".to_string(),
    }
}

#[test]
fn test_default_mutators_run_in_order() {
    let state = WebhookState::new(Arc::new(FakeCluster::new()), config());

    let names: Vec<&str> = state.mutators.iter().map(|m| m.name()).collect();

    assert_eq!(names, ["oneagent", "metadata-enrichment", "data-ingest"]);
}

#[test]
fn test_with_mutators_keeps_explicit_list() {
    let state = WebhookState::with_mutators(Arc::new(FakeCluster::new()), config(), Vec::new());

    assert!(state.mutators.is_empty());
    assert_eq!(state.config.cluster_id, "cluster-uid");
}

#[tokio::test]
async fn test_livez() {
    assert_eq!(livez().await, StatusCode::OK);
}

#[test]
fn test_router_builds() {
    let state = Arc::new(WebhookState::new(Arc::new(FakeCluster::new()), config()));
    let _router: Router = router(state);
}
