// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Requests handed to the pod mutators.

use crate::cluster::Cluster;
use crate::crd::DynaKube;
use crate::errors::WebhookError;
use crate::labels::ANNOTATION_CONTAINER_INJECTION_PREFIX;
use crate::webhook::workload::{find_root_owner, WorkloadInfo};
use k8s_openapi::api::core::v1::{Container, EnvVar, Namespace, Pod, Volume, VolumeMount};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// The pod under admission together with what governs it.
#[derive(Clone, Debug)]
pub struct BaseRequest {
    pub pod: Pod,
    pub namespace: Namespace,
    pub dynakube: DynaKube,
}

impl BaseRequest {
    #[must_use]
    pub fn new(pod: Pod, namespace: Namespace, dynakube: DynaKube) -> Self {
        Self {
            pod,
            namespace,
            dynakube,
        }
    }

    #[must_use]
    pub fn pod_annotation(&self, key: &str) -> Option<&str> {
        self.pod.annotations().get(key).map(String::as_str)
    }

    /// Opt-in/out annotation of a mutator, falling back to automatic injection.
    #[must_use]
    pub fn injection_requested(&self, annotation: &str) -> bool {
        match self.pod_annotation(annotation) {
            Some("true") => true,
            Some("false") => false,
            _ => self.dynakube.feature_flags().automatic_injection(),
        }
    }

    /// Set a pod annotation, overwriting any previous value.
    pub fn set_pod_annotation(&mut self, key: &str, value: &str) {
        self.pod
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    /// `true` when the pod or the `DynaKube` excludes `container` from injection.
    #[must_use]
    pub fn is_container_excluded(&self, container: &str) -> bool {
        is_excluded(
            container,
            self.pod.metadata.annotations.as_ref(),
            self.dynakube.metadata.annotations.as_ref(),
        )
    }

    /// User containers that are not excluded from injection.
    pub fn injectable_containers(&mut self) -> Vec<&mut Container> {
        let pod_annotations = self.pod.metadata.annotations.as_ref();
        let dk_annotations = self.dynakube.metadata.annotations.as_ref();
        let Some(spec) = self.pod.spec.as_mut() else {
            return Vec::new();
        };
        spec.containers
            .iter_mut()
            .filter(|c| !is_excluded(&c.name, pod_annotations, dk_annotations))
            .collect()
    }

    /// Add `volume` to the pod unless a volume with that name already exists.
    pub fn ensure_volume(&mut self, volume: Volume) {
        let Some(spec) = self.pod.spec.as_mut() else {
            return;
        };
        let volumes = spec.volumes.get_or_insert_with(Vec::new);
        if !volumes.iter().any(|v| v.name == volume.name) {
            volumes.push(volume);
        }
    }

    /// Install init container already appended by an earlier pass.
    pub fn install_container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.pod
            .spec
            .as_mut()?
            .init_containers
            .as_mut()?
            .iter_mut()
            .find(|c| c.name == name)
    }
}

fn is_excluded(
    container: &str,
    pod_annotations: Option<&BTreeMap<String, String>>,
    dk_annotations: Option<&BTreeMap<String, String>>,
) -> bool {
    let key = format!("{ANNOTATION_CONTAINER_INJECTION_PREFIX}{container}");
    [pod_annotations, dk_annotations]
        .into_iter()
        .flatten()
        .any(|annotations| annotations.get(&key).is_some_and(|v| v == "false"))
}

/// A first-pass mutation: the base request plus the install container being assembled.
#[derive(Clone, Debug)]
pub struct MutationRequest {
    pub base: BaseRequest,
    pub install_container: Container,
    workload: Option<WorkloadInfo>,
}

impl MutationRequest {
    #[must_use]
    pub fn new(base: BaseRequest, install_container: Container) -> Self {
        Self {
            base,
            install_container,
            workload: None,
        }
    }

    /// Root owner of the pod, resolved once per request.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::Lookup`] when an owner cannot be read.
    pub async fn workload(&mut self, cluster: &dyn Cluster) -> Result<WorkloadInfo, WebhookError> {
        if let Some(workload) = &self.workload {
            return Ok(workload.clone());
        }
        let namespace = self.base.namespace.name_any();
        let workload = find_root_owner(cluster, &namespace, &self.base.pod).await?;
        self.workload = Some(workload.clone());
        Ok(workload)
    }
}

// ----------------------------------------------------------------------------
// Container helpers shared by the mutators
// ----------------------------------------------------------------------------

#[must_use]
pub fn find_env<'a>(container: &'a Container, name: &str) -> Option<&'a EnvVar> {
    container.env.as_ref()?.iter().find(|e| e.name == name)
}

/// Append an env var unless one with that name already exists. Returns `true` when added.
pub fn add_env_if_missing(container: &mut Container, env: EnvVar) -> bool {
    let envs = container.env.get_or_insert_with(Vec::new);
    if envs.iter().any(|e| e.name == env.name) {
        return false;
    }
    envs.push(env);
    true
}

/// Set a plain env var, replacing its value when present.
pub fn set_env(container: &mut Container, name: &str, value: String) {
    let envs = container.env.get_or_insert_with(Vec::new);
    match envs.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            existing.value = Some(value);
            existing.value_from = None;
        }
        None => envs.push(EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        }),
    }
}

#[must_use]
pub fn has_volume_mount(container: &Container, volume: &str) -> bool {
    container
        .volume_mounts
        .as_ref()
        .is_some_and(|mounts| mounts.iter().any(|m| m.name == volume))
}

pub fn add_volume_mount(container: &mut Container, mount: VolumeMount) {
    container.volume_mounts.get_or_insert_with(Vec::new).push(mount);
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod request_tests;
