// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Root owner resolution of pods.
//!
//! The walk follows controller owner references through well-known workload
//! kinds only. It stops at the first reference that is not a controller, not a
//! well-known kind, or points at an object that no longer exists.

use crate::cluster::Cluster;
use crate::errors::WebhookError;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;

/// Controller kinds, with their API versions, the walk is allowed to pass through.
pub const WELL_KNOWN_WORKLOADS: [(&str, &str); 8] = [
    ("ReplicaSet", "apps/v1"),
    ("Deployment", "apps/v1"),
    ("ReplicationController", "v1"),
    ("StatefulSet", "apps/v1"),
    ("DaemonSet", "apps/v1"),
    ("Job", "batch/v1"),
    ("CronJob", "batch/v1"),
    ("DeploymentConfig", "apps.openshift.io/v1"),
];

/// Guards against owner reference cycles.
const MAX_OWNER_DEPTH: usize = 10;

/// Kind (lowercased) and name of the root owner of a pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadInfo {
    pub kind: String,
    pub name: String,
}

impl WorkloadInfo {
    fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_lowercase(),
            name: name.to_string(),
        }
    }
}

fn well_known_controller(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references.as_ref()?.iter().find(|owner| {
        owner.controller == Some(true)
            && WELL_KNOWN_WORKLOADS
                .iter()
                .any(|(kind, api_version)| owner.kind == *kind && owner.api_version == *api_version)
    })
}

/// Walk the owner references of `pod` up to its root workload.
///
/// # Errors
///
/// Returns [`WebhookError::Lookup`] when reading an owner fails.
pub async fn find_root_owner(
    cluster: &dyn Cluster,
    namespace: &str,
    pod: &Pod,
) -> Result<WorkloadInfo, WebhookError> {
    let mut kind = "Pod".to_string();
    let mut name = pod.name_any();
    let mut meta = pod.metadata.clone();

    for _ in 0..MAX_OWNER_DEPTH {
        let Some(owner) = well_known_controller(&meta).cloned() else {
            break;
        };
        kind = owner.kind.clone();
        name = owner.name.clone();

        let next = cluster
            .get_owner(namespace, &owner.api_version, &owner.kind, &owner.name)
            .await
            .map_err(|source| WebhookError::Lookup {
                kind: "owner",
                name: format!("{}/{}", owner.kind, owner.name),
                source,
            })?;
        match next {
            Some(next) => meta = next,
            None => break,
        }
    }

    Ok(WorkloadInfo::new(&kind, &name))
}

#[cfg(test)]
#[path = "workload_tests.rs"]
mod workload_tests;
