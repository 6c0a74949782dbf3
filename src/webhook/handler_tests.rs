// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `handler.rs`

use super::*;
use crate::cluster_fake::FakeCluster;
use crate::constants::INSTALL_CONTAINER_NAME;
use crate::crd::DynaKube;
use crate::labels::{ANNOTATION_ONE_AGENT_INJECTED, ANNOTATION_ONE_AGENT_REASON};
use crate::webhook::test_fixtures::{
    container, dynakube, namespace, pod, pod_with_annotations, DK_NAMESPACE, POD_NAMESPACE,
};
use crate::webhook::WebhookConfig;
use k8s_openapi::api::core::v1::Container;
use serde_json::json;

/// Agent injection only, enrichment and ingest off.
fn agent_only_dynakube() -> DynaKube {
    let mut dk = dynakube();
    dk.spec.metadata_enrichment.enabled = Some(false);
    dk
}

fn state_with(dk: DynaKube) -> (Arc<FakeCluster>, WebhookState) {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_namespace(namespace(&[]));
    cluster.insert_dynakube(dk);
    let state = WebhookState::new(
        cluster.clone(),
        WebhookConfig {
            namespace: DK_NAMESPACE.to_string(),
            cluster_id: "cluster-uid".to_string(),
            webhook_image: "registry.example.com/dynatrace-operator:1.4.0".to_string(),
        },
    );
    (cluster, state)
}

fn apply(pod: &Pod, patch: &json_patch::Patch) -> Pod {
    let mut value = serde_json::to_value(pod).unwrap();
    json_patch::patch(&mut value, patch).unwrap();
    serde_json::from_value(value).unwrap()
}

fn admission_request(object: serde_json::Value) -> AdmissionRequest<DynamicObject> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "0df28fbd-5f5f-11e8-bc74-36e6bb280816",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": POD_NAMESPACE,
            "operation": "CREATE",
            "userInfo": {},
            "dryRun": false,
            "object": object,
        }
    }))
    .unwrap();
    review.try_into().unwrap()
}

#[tokio::test]
async fn test_pod_mutation_happy_path() {
    let (_, state) = state_with(agent_only_dynakube());
    let original = pod(&["app"]);

    let patch = patch_for(&state, POD_NAMESPACE, original.clone()).await.unwrap();
    let mutated = apply(&original, &patch);

    let spec = mutated.spec.as_ref().unwrap();
    let init = spec.init_containers.as_ref().unwrap();
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].name, INSTALL_CONTAINER_NAME);
    assert_eq!(
        init[0].image.as_deref(),
        Some("registry.example.com/dynatrace-operator:1.4.0")
    );

    let app = &spec.containers[0];
    assert_eq!(app.volume_mounts.as_ref().unwrap().len(), 3);
    assert_eq!(app.env.as_ref().unwrap().len(), 2);

    let annotations = mutated.metadata.annotations.unwrap();
    assert_eq!(annotations[ANNOTATION_ONE_AGENT_INJECTED], "true");
    assert_eq!(annotations[ANNOTATION_DYNATRACE_INJECTED], "true");
}

#[tokio::test]
async fn test_oc_debug_pod_is_never_mutated() {
    let (_, state) = state_with(agent_only_dynakube());
    let debug_pod = pod_with_annotations(
        &["app"],
        &[
            (ANNOTATION_OC_DEBUG_SOURCE_CONTAINER, "app"),
            (ANNOTATION_OC_DEBUG_SOURCE_RESOURCE, "pods/app-7d9f8-x2k4p"),
        ],
    );

    let patch = patch_for(&state, POD_NAMESPACE, debug_pod).await.unwrap();

    assert!(patch.0.is_empty());
}

#[tokio::test]
async fn test_inject_false_skips_all_mutators() {
    let (_, state) = state_with(dynakube());
    let opted_out = pod_with_annotations(&["app"], &[(ANNOTATION_DYNATRACE_INJECT, "false")]);

    let patch = patch_for(&state, POD_NAMESPACE, opted_out).await.unwrap();

    assert!(patch.0.is_empty());
}

#[tokio::test]
async fn test_namespace_without_dynakube_is_skipped() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_namespace(namespace(&[]));
    let state = WebhookState::new(
        cluster,
        WebhookConfig {
            namespace: DK_NAMESPACE.to_string(),
            ..WebhookConfig::default()
        },
    );

    let patch = patch_for(&state, POD_NAMESPACE, pod(&["app"])).await.unwrap();

    assert!(patch.0.is_empty());
}

#[tokio::test]
async fn test_unknown_namespace_is_skipped() {
    let (_, state) = state_with(dynakube());

    let patch = patch_for(&state, "elsewhere", pod(&["app"])).await.unwrap();

    assert!(patch.0.is_empty());
}

#[tokio::test]
async fn test_reinvocation_without_new_containers_is_empty() {
    let (_, state) = state_with(dynakube());
    let original = pod(&["app"]);
    let patch = patch_for(&state, POD_NAMESPACE, original.clone()).await.unwrap();
    let mutated = apply(&original, &patch);

    let again = patch_for(&state, POD_NAMESPACE, mutated).await.unwrap();

    assert!(again.0.is_empty());
}

#[tokio::test]
async fn test_reinvocation_injects_added_container() {
    let (_, state) = state_with(agent_only_dynakube());
    let original = pod(&["app"]);
    let patch = patch_for(&state, POD_NAMESPACE, original.clone()).await.unwrap();
    let mut mutated = apply(&original, &patch);
    mutated
        .spec
        .as_mut()
        .unwrap()
        .containers
        .push(container("late"));

    let patch = patch_for(&state, POD_NAMESPACE, mutated.clone()).await.unwrap();
    let reinvoked = apply(&mutated, &patch);

    let spec = reinvoked.spec.as_ref().unwrap();
    assert_eq!(spec.init_containers.as_ref().unwrap().len(), 1);
    assert_eq!(spec.containers[1].volume_mounts.as_ref().unwrap().len(), 3);
    let count = spec.init_containers.as_ref().unwrap()[0]
        .env
        .as_ref()
        .unwrap()
        .iter()
        .find(|e| e.name == "CONTAINERS_COUNT")
        .and_then(|e| e.value.clone());
    assert_eq!(count.as_deref(), Some("2"));
}

fn mount_names(container: &Container) -> Vec<&str> {
    container
        .volume_mounts
        .iter()
        .flatten()
        .map(|m| m.name.as_str())
        .collect()
}

fn add_late_container(pod: &mut Pod, name: &str, excluded: bool) {
    pod.spec.as_mut().unwrap().containers.push(container(name));
    if excluded {
        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(format!("container.inject.dynatrace.com/{name}"), "false".to_string());
    }
}

#[tokio::test]
async fn test_reinvocation_skips_excluded_added_container() {
    let (_, state) = state_with(dynakube());
    let original = pod(&["app"]);
    let patch = patch_for(&state, POD_NAMESPACE, original.clone()).await.unwrap();
    let mut mutated = apply(&original, &patch);
    add_late_container(&mut mutated, "late", true);

    let patch = patch_for(&state, POD_NAMESPACE, mutated.clone()).await.unwrap();

    assert!(patch.0.is_empty());
    let reinvoked = apply(&mutated, &patch);
    let late = &reinvoked.spec.as_ref().unwrap().containers[1];
    assert_eq!(late.name, "late");
    assert!(late.volume_mounts.is_none());
    assert!(late.env.is_none());
}

#[tokio::test]
async fn test_reinvocation_mutates_only_non_excluded_added_containers() {
    let (_, state) = state_with(dynakube());
    let original = pod(&["app"]);
    let patch = patch_for(&state, POD_NAMESPACE, original.clone()).await.unwrap();
    let mut mutated = apply(&original, &patch);
    add_late_container(&mut mutated, "sidecar", true);
    add_late_container(&mut mutated, "late", false);

    let patch = patch_for(&state, POD_NAMESPACE, mutated.clone()).await.unwrap();
    let reinvoked = apply(&mutated, &patch);

    let containers = &reinvoked.spec.as_ref().unwrap().containers;
    assert!(containers[1].volume_mounts.is_none());
    let late = mount_names(&containers[2]);
    assert!(late.contains(&"oneagent-bin"));
    assert!(late.contains(&"dynatrace-data-ingest-endpoint"));
    let count = reinvoked.spec.as_ref().unwrap().init_containers.as_ref().unwrap()[0]
        .env
        .as_ref()
        .unwrap()
        .iter()
        .find(|e| e.name == "CONTAINERS_COUNT")
        .and_then(|e| e.value.clone());
    assert_eq!(count.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_soft_failed_pod_is_not_injected_twice() {
    let mut dk = agent_only_dynakube();
    if let Some(status) = dk.status.as_mut() {
        status.one_agent.connection_info.tenant_uuid.clear();
    }
    let (_, state) = state_with(dk);
    let original = pod(&["app"]);

    let patch = patch_for(&state, POD_NAMESPACE, original.clone()).await.unwrap();
    let mutated = apply(&original, &patch);
    assert_eq!(
        mutated.annotations().get(ANNOTATION_ONE_AGENT_REASON).map(String::as_str),
        Some("EmptyTenantUUID")
    );

    let again = patch_for(&state, POD_NAMESPACE, mutated).await.unwrap();
    assert!(again.0.is_empty());
}

#[tokio::test]
async fn test_mutator_failure_names_mutator() {
    let (cluster, state) = state_with(dynakube());
    cluster.fail_writes(true);

    let err = patch_for(&state, POD_NAMESPACE, pod(&["app"])).await.unwrap_err();

    assert!(matches!(err, WebhookError::Mutator { mutator: "data-ingest", .. }));
}

#[tokio::test]
async fn test_review_returns_patch() {
    let (_, state) = state_with(agent_only_dynakube());
    let req = admission_request(serde_json::to_value(pod(&["app"])).unwrap());

    let response = review(&state, &req).await;

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["allowed"], json!(true));
    assert!(body.get("patch").is_some());
    let mutated = crate::metrics::ADMISSION_REQUESTS_TOTAL.with_label_values(&["mutated"]);
    assert!(mutated.get() > 0.0);
    let injected =
        crate::metrics::POD_MUTATIONS_TOTAL.with_label_values(&["oneagent", "injected"]);
    assert!(injected.get() > 0.0);
}

#[tokio::test]
async fn test_review_allows_undecodable_pod_with_warning() {
    let (_, state) = state_with(dynakube());
    let req = admission_request(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "broken", "namespace": POD_NAMESPACE},
        "spec": {"containers": "not-a-list"},
    }));

    let response = review(&state, &req).await;

    assert!(response.allowed);
    assert_eq!(response.warnings.as_ref().map(Vec::len), Some(1));
    let body = serde_json::to_value(&response).unwrap();
    assert!(body.get("patch").is_none());
}

#[tokio::test]
async fn test_review_allows_on_mutator_failure() {
    let (cluster, state) = state_with(dynakube());
    cluster.fail_writes(true);
    let req = admission_request(serde_json::to_value(pod(&["app"])).unwrap());

    let response = review(&state, &req).await;

    assert!(response.allowed);
    assert!(response.warnings.unwrap()[0].contains("data-ingest"));
}
