// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Scaffold of the install init container appended to injected pods.
//!
//! The mutators decorate the scaffold with their own arguments, mounts and
//! environment before it is appended.

use crate::constants::{DEFAULT_INSTALL_CONTAINER_USER, INSTALL_CONTAINER_NAME};
use crate::crd::DynaKube;
use crate::feature_flags::{FAILURE_POLICY_FAIL, FAILURE_POLICY_SILENT};
use crate::labels::ANNOTATION_FAILURE_POLICY;
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, ResourceRequirements,
    SeccompProfile, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use std::collections::BTreeMap;

pub const ENV_FAILURE_POLICY: &str = "FAILURE_POLICY";
pub const ENV_POD_NAME: &str = "K8S_PODNAME";
pub const ENV_POD_UID: &str = "K8S_PODUID";
pub const ENV_BASE_POD_NAME: &str = "K8S_BASEPODNAME";
pub const ENV_CLUSTER_ID: &str = "K8S_CLUSTER_ID";
pub const ENV_NAMESPACE: &str = "K8S_NAMESPACE";
pub const ENV_NODE_NAME: &str = "K8S_NODE_NAME";

const ROOT_ID: i64 = 0;

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn value_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Build the install container for `pod`.
#[must_use]
pub fn build_install_container(image: &str, cluster_id: &str, pod: &Pod, dk: &DynaKube) -> Container {
    Container {
        name: INSTALL_CONTAINER_NAME.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(vec!["init".to_string()]),
        env: Some(vec![
            value_env(ENV_FAILURE_POLICY, failure_policy(pod, dk)),
            field_env(ENV_POD_NAME, "metadata.name"),
            field_env(ENV_POD_UID, "metadata.uid"),
            value_env(ENV_BASE_POD_NAME, &base_pod_name(pod)),
            value_env(ENV_CLUSTER_ID, cluster_id),
            field_env(ENV_NAMESPACE, "metadata.namespace"),
            field_env(ENV_NODE_NAME, "spec.nodeName"),
        ]),
        security_context: Some(security_context(pod, dk)),
        resources: Some(init_resources(dk)),
        ..Default::default()
    }
}

/// Pod annotation when it names a valid policy, then the feature flag.
#[must_use]
pub fn failure_policy(pod: &Pod, dk: &DynaKube) -> &'static str {
    match pod.annotations().get(ANNOTATION_FAILURE_POLICY).map(String::as_str) {
        Some(FAILURE_POLICY_FAIL) => FAILURE_POLICY_FAIL,
        Some(FAILURE_POLICY_SILENT) => FAILURE_POLICY_SILENT,
        _ => dk.feature_flags().injection_failure_policy(),
    }
}

/// Generate name (or name) of the pod up to its last dash.
#[must_use]
pub fn base_pod_name(pod: &Pod) -> String {
    let name = pod
        .metadata
        .generate_name
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(pod.metadata.name.as_deref())
        .unwrap_or_default();
    match name.rfind('-') {
        Some(idx) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

/// User and group of the first container, then of the pod, then the default.
fn run_as(pod: &Pod) -> (i64, i64) {
    let spec = pod.spec.as_ref();
    let container_sc = spec
        .and_then(|s| s.containers.first())
        .and_then(|c| c.security_context.as_ref());
    let pod_sc = spec.and_then(|s| s.security_context.as_ref());

    let user = container_sc
        .and_then(|sc| sc.run_as_user)
        .or_else(|| pod_sc.and_then(|sc| sc.run_as_user))
        .unwrap_or(DEFAULT_INSTALL_CONTAINER_USER);
    let group = container_sc
        .and_then(|sc| sc.run_as_group)
        .or_else(|| pod_sc.and_then(|sc| sc.run_as_group))
        .unwrap_or(DEFAULT_INSTALL_CONTAINER_USER);
    (user, group)
}

fn security_context(pod: &Pod, dk: &DynaKube) -> SecurityContext {
    let (user, group) = run_as(pod);
    SecurityContext {
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        run_as_non_root: Some(!(user == ROOT_ID && group == ROOT_ID)),
        run_as_user: Some(user),
        run_as_group: Some(group),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        seccomp_profile: dk.feature_flags().init_container_seccomp().then(|| SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Resources of the install container: the `DynaKube` value or the defaults.
#[must_use]
pub fn init_resources(dk: &DynaKube) -> ResourceRequirements {
    if let Some(resources) = dk.init_resources() {
        return resources.clone();
    }
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };
    ResourceRequirements {
        requests: Some(quantities("30m", "30Mi")),
        limits: Some(quantities("100m", "60Mi")),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "install_container_tests.rs"]
mod install_container_tests;
