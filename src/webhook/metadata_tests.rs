// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `metadata.rs`

use super::*;
use crate::cluster_fake::FakeCluster;
use crate::crd::{EnrichmentRule, MetadataEnrichmentSpec};
use crate::webhook::install_container::build_install_container;
use crate::webhook::test_fixtures::{base_request, dynakube, namespace, pod, pod_with_annotations};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

fn rule(r#type: EnrichmentRuleType, source: &str, target: &str) -> EnrichmentRule {
    EnrichmentRule {
        r#type,
        source: source.to_string(),
        target: target.to_string(),
    }
}

fn mutation(base: BaseRequest) -> MutationRequest {
    let install = build_install_container("img", "c", &base.pod, &base.dynakube);
    MutationRequest::new(base, install)
}

#[test]
fn test_namespace_metadata_copies_prefixed_annotations_and_rules() {
    let mut dk = dynakube();
    dk.spec.metadata_enrichment = MetadataEnrichmentSpec {
        rules: vec![
            rule(EnrichmentRuleType::Annotation, "team", "dt.owner"),
            rule(EnrichmentRuleType::Label, "missing", "dt.missing"),
            rule(EnrichmentRuleType::Annotation, "team", ""),
        ],
        ..MetadataEnrichmentSpec::default()
    };
    let ns = namespace(&[
        ("metadata.dynatrace.com/cost-center", "42"),
        ("team", "payments"),
        ("unrelated", "x"),
    ]);
    let request = BaseRequest::new(pod(&["app"]), ns, dk);

    let entries = namespace_metadata(&request);

    assert_eq!(
        entries,
        vec![
            ("metadata.dynatrace.com/cost-center".to_string(), "42".to_string()),
            ("metadata.dynatrace.com/dt.owner".to_string(), "payments".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_mutate_writes_workload_annotations() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_owner(
        "shop",
        "ReplicaSet",
        ObjectMeta {
            name: Some("app-7d9f8".to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: "app".to_string(),
                uid: "d-uid".to_string(),
                controller: Some(true),
                ..OwnerReference::default()
            }]),
            ..ObjectMeta::default()
        },
    );
    let mut p = pod(&["app"]);
    p.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: "app-7d9f8".to_string(),
        uid: "rs-uid".to_string(),
        controller: Some(true),
        ..OwnerReference::default()
    }]);
    let mutator = MetadataMutator::new(cluster);
    let mut request = mutation(base_request(p));

    mutator.mutate(&mut request).await.unwrap();

    assert_eq!(request.base.pod_annotation(ANNOTATION_WORKLOAD_KIND), Some("deployment"));
    assert_eq!(request.base.pod_annotation(ANNOTATION_WORKLOAD_NAME), Some("app"));
    assert_eq!(
        request.base.pod_annotation(ANNOTATION_METADATA_ENRICHMENT_INJECTED),
        Some("true")
    );
}

#[tokio::test]
async fn test_mutate_never_overwrites_pod_annotations() {
    let mutator = MetadataMutator::new(Arc::new(FakeCluster::new()));
    let p = pod_with_annotations(&["app"], &[("metadata.dynatrace.com/cost-center", "7")]);
    let ns = namespace(&[("metadata.dynatrace.com/cost-center", "42")]);
    let mut request = mutation(BaseRequest::new(p, ns, dynakube()));

    mutator.mutate(&mut request).await.unwrap();

    assert_eq!(
        request.base.pod_annotation("metadata.dynatrace.com/cost-center"),
        Some("7")
    );
}

#[test]
fn test_disabled_enrichment_disables_mutator() {
    let mut dk = dynakube();
    dk.spec.metadata_enrichment.enabled = Some(false);
    let request = BaseRequest::new(pod(&["app"]), namespace(&[]), dk);

    assert!(!MetadataMutator::new(Arc::new(FakeCluster::new())).enabled(&request));
}

#[test]
fn test_reinvoke_never_changes_pod() {
    let mut request = base_request(pod(&["app"]));
    request.set_pod_annotation(ANNOTATION_METADATA_ENRICHMENT_INJECTED, "true");

    assert!(!MetadataMutator::new(Arc::new(FakeCluster::new())).reinvoke(&mut request));
}
