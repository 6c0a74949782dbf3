// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for context.rs

use super::*;
use crate::cluster_fake::FakeCluster;
use crate::constants::REQUEUE_NOT_READY_SECS;
use crate::crd::DynaKubeSpec;
use crate::version::testing::FakeClientFactory;
use std::time::Duration;

fn context(cluster: Arc<FakeCluster>) -> Context {
    Context::with_parts(
        cluster,
        Arc::new(FakeClientFactory::default()),
        TimeProvider::new(),
        OperatorConfig {
            namespace: "dynatrace".to_string(),
            metrics_addr: "127.0.0.1:8080".parse().unwrap(),
        },
    )
}

#[tokio::test]
async fn test_reconcile_dynakube_goes_through_shared_cluster() {
    let cluster = Arc::new(FakeCluster::new());
    let ctx = context(cluster.clone());
    let mut dk = DynaKube::new(
        "dk",
        DynaKubeSpec {
            api_url: "https://abc123.live.dynatrace.com/api".to_string(),
            ..DynaKubeSpec::default()
        },
    );
    dk.metadata.namespace = Some("dynatrace".to_string());

    let action = ctx.reconcile_dynakube(&dk).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(REQUEUE_NOT_READY_SECS)));
    assert!(cluster.dynakube_status("dynatrace", "dk").is_some());
}

#[test]
fn test_context_clones_share_cluster() {
    let cluster = Arc::new(FakeCluster::new());
    let ctx = context(cluster);
    let copy = ctx.clone();

    assert!(Arc::ptr_eq(&ctx.cluster, &copy.cluster));
    assert_eq!(copy.config.namespace, "dynatrace");
}
