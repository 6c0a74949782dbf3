// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Agent injection.
//!
//! Shares the agent binaries with every user container through two
//! `emptyDir` volumes filled by the install container, and preloads the agent
//! library through `LD_PRELOAD` and `/etc/ld.so.preload`.

use crate::constants::{
    AGENT_CONFIG_MOUNT_PATH, INSTALL_CONTAINER_BIN_PATH, INSTALL_CONTAINER_CONFIG_PATH,
    INSTALL_CONTAINER_NAME, LD_PRELOAD_FILE, PRELOAD_LIBRARY,
};
use crate::crd::DynaKube;
use crate::errors::WebhookError;
use crate::labels::{
    ANNOTATION_ONE_AGENT_INJECT, ANNOTATION_ONE_AGENT_INJECTED, ANNOTATION_ONE_AGENT_INSTALL_PATH,
    ANNOTATION_ONE_AGENT_REASON, ANNOTATION_ONE_AGENT_TECHNOLOGIES, ANNOTATION_RELEASE_BUILD_VERSION,
    ANNOTATION_RELEASE_PRODUCT, ANNOTATION_RELEASE_STAGE, ANNOTATION_RELEASE_VERSION,
    DEFAULT_RELEASE_PRODUCT_PATH, DEFAULT_RELEASE_VERSION_PATH,
};
use crate::selector::matches_optional_selector;
use crate::status_reasons::{
    REASON_EMPTY_CONNECTION_INFO, REASON_EMPTY_TENANT_UUID, REASON_UNKNOWN_CODE_MODULE,
};
use crate::webhook::request::{
    add_env_if_missing, add_volume_mount, find_env, has_volume_mount, set_env, BaseRequest,
    MutationRequest,
};
use crate::webhook::PodMutator;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, ObjectFieldSelector, Volume,
    VolumeMount,
};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const BIN_VOLUME_NAME: &str = "oneagent-bin";
pub const CONFIG_VOLUME_NAME: &str = "oneagent-config";

pub const ENV_LD_PRELOAD: &str = "LD_PRELOAD";
pub const ENV_DEPLOYMENT_METADATA: &str = "DT_DEPLOYMENT_METADATA";
pub const ENV_NETWORK_ZONE: &str = "DT_NETWORK_ZONE";
pub const ENV_RELEASE_VERSION: &str = "DT_RELEASE_VERSION";
pub const ENV_RELEASE_PRODUCT: &str = "DT_RELEASE_PRODUCT";
pub const ENV_RELEASE_STAGE: &str = "DT_RELEASE_STAGE";
pub const ENV_RELEASE_BUILD_VERSION: &str = "DT_RELEASE_BUILD_VERSION";
pub const ENV_CONTAINERS_COUNT: &str = "CONTAINERS_COUNT";

/// Location of the code modules inside the install image.
pub const CODE_MODULES_SOURCE_PATH: &str = "/opt/dynatrace/oneagent";

const PRELOAD_SUB_PATH: &str = "ld.so.preload";

/// Injects the agent into application containers.
pub struct OneAgentMutator {
    cluster_id: String,
}

impl OneAgentMutator {
    #[must_use]
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    /// Orchestrator id: the configured cluster id, else the one the operator recorded.
    fn orchestrator_id(&self, dk: &DynaKube) -> String {
        if self.cluster_id.is_empty() {
            dk.status
                .as_ref()
                .map(|s| s.kube_system_uuid.clone())
                .unwrap_or_default()
        } else {
            self.cluster_id.clone()
        }
    }

    fn container_settings(&self, request: &BaseRequest) -> ContainerSettings {
        let dk = &request.dynakube;
        let install_path = request
            .pod_annotation(ANNOTATION_ONE_AGENT_INSTALL_PATH)
            .filter(|p| !p.is_empty())
            .unwrap_or(dk.install_path())
            .to_string();
        ContainerSettings {
            deployment_metadata: deployment_metadata(dk, &self.orchestrator_id(dk)),
            network_zone: dk.spec.network_zone.clone().filter(|z| !z.is_empty()),
            release_mappings: dk
                .feature_flags()
                .label_version_detection()
                .then(|| release_mappings(request.namespace.annotations())),
            install_path,
        }
    }
}

/// Everything added to one user container.
struct ContainerSettings {
    install_path: String,
    deployment_metadata: String,
    network_zone: Option<String>,
    release_mappings: Option<Vec<(&'static str, String)>>,
}

/// `orchestration_tech=Operator-<mode>;script_version=<version>;orchestrator_id=<cluster>`
#[must_use]
pub fn deployment_metadata(dk: &DynaKube, orchestrator_id: &str) -> String {
    let mode = dk.one_agent_mode().map(|m| m.as_str()).unwrap_or_default();
    format!(
        "orchestration_tech=Operator-{mode};script_version={};orchestrator_id={orchestrator_id}",
        env!("CARGO_PKG_VERSION")
    )
}

/// Field paths of the release env vars. Version and product always have a
/// default; stage and build version only exist when the namespace maps them.
fn release_mappings(namespace_annotations: &BTreeMap<String, String>) -> Vec<(&'static str, String)> {
    let mapped = |annotation: &str| namespace_annotations.get(annotation).cloned();
    let mut mappings = vec![
        (
            ENV_RELEASE_VERSION,
            mapped(ANNOTATION_RELEASE_VERSION).unwrap_or_else(|| DEFAULT_RELEASE_VERSION_PATH.to_string()),
        ),
        (
            ENV_RELEASE_PRODUCT,
            mapped(ANNOTATION_RELEASE_PRODUCT).unwrap_or_else(|| DEFAULT_RELEASE_PRODUCT_PATH.to_string()),
        ),
    ];
    if let Some(path) = mapped(ANNOTATION_RELEASE_STAGE) {
        mappings.push((ENV_RELEASE_STAGE, path));
    }
    if let Some(path) = mapped(ANNOTATION_RELEASE_BUILD_VERSION) {
        mappings.push((ENV_RELEASE_BUILD_VERSION, path));
    }
    mappings
}

/// Append the pre-loader to an existing `LD_PRELOAD`, keeping its separator style.
#[must_use]
pub fn concat_preload(existing: &str, preload: &str) -> String {
    let separator = if existing.contains(' ') { " " } else { ":" };
    format!("{existing}{separator}{preload}")
}

fn mount(name: &str, path: &str, sub_path: Option<String>) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        sub_path,
        ..Default::default()
    }
}

fn inject_container(container: &mut Container, settings: &ContainerSettings) {
    add_volume_mount(
        container,
        mount(CONFIG_VOLUME_NAME, LD_PRELOAD_FILE, Some(PRELOAD_SUB_PATH.to_string())),
    );
    add_volume_mount(container, mount(BIN_VOLUME_NAME, &settings.install_path, None));
    add_volume_mount(
        container,
        mount(
            CONFIG_VOLUME_NAME,
            AGENT_CONFIG_MOUNT_PATH,
            Some(format!("container_{}", container.name)),
        ),
    );

    let preload = format!("{}/{PRELOAD_LIBRARY}", settings.install_path);
    match find_env(container, ENV_LD_PRELOAD).and_then(|e| e.value.clone()) {
        Some(existing) if !existing.is_empty() => {
            set_env(container, ENV_LD_PRELOAD, concat_preload(&existing, &preload));
        }
        _ => set_env(container, ENV_LD_PRELOAD, preload),
    }

    add_env_if_missing(
        container,
        EnvVar {
            name: ENV_DEPLOYMENT_METADATA.to_string(),
            value: Some(settings.deployment_metadata.clone()),
            ..Default::default()
        },
    );
    if let Some(zone) = &settings.network_zone {
        add_env_if_missing(
            container,
            EnvVar {
                name: ENV_NETWORK_ZONE.to_string(),
                value: Some(zone.clone()),
                ..Default::default()
            },
        );
    }
    for (name, field_path) in settings.release_mappings.iter().flatten() {
        add_env_if_missing(
            container,
            EnvVar {
                name: (*name).to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: field_path.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
    }
}

/// Record injected containers on the install container as
/// `CONTAINER_<n>_NAME` / `CONTAINER_<n>_IMAGE`, continuing from `CONTAINERS_COUNT`.
fn record_containers(install: &mut Container, containers: &[(String, String)]) {
    let mut count = find_env(install, ENV_CONTAINERS_COUNT)
        .and_then(|e| e.value.as_deref())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    for (name, image) in containers {
        count += 1;
        set_env(install, &format!("CONTAINER_{count}_NAME"), name.clone());
        set_env(install, &format!("CONTAINER_{count}_IMAGE"), image.clone());
    }
    set_env(install, ENV_CONTAINERS_COUNT, count.to_string());
}

/// Inject every injectable container matching `pending`, returning their names and images.
fn inject_containers(
    request: &mut BaseRequest,
    settings: &ContainerSettings,
    pending: impl Fn(&Container) -> bool,
) -> Vec<(String, String)> {
    let mut injected = Vec::new();
    for container in request.injectable_containers() {
        if !pending(container) {
            continue;
        }
        inject_container(container, settings);
        injected.push((
            container.name.clone(),
            container.image.clone().unwrap_or_default(),
        ));
    }
    injected
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// First unmet precondition, as the reason recorded on the pod.
fn unmet_precondition(dk: &DynaKube) -> Option<&'static str> {
    let status = dk.status.clone().unwrap_or_default();
    let connection = &status.one_agent.connection_info;
    if connection.tenant_uuid.is_empty() {
        return Some(REASON_EMPTY_TENANT_UUID);
    }
    if !connection.route_is_clear() {
        return Some(REASON_EMPTY_CONNECTION_INFO);
    }
    let code_modules_known = !status.code_modules.version.is_empty()
        || !status.code_modules.image_id.is_empty()
        || dk.custom_code_modules_image().is_some();
    if !code_modules_known {
        return Some(REASON_UNKNOWN_CODE_MODULE);
    }
    None
}

#[async_trait]
impl PodMutator for OneAgentMutator {
    fn name(&self) -> &'static str {
        "oneagent"
    }

    fn enabled(&self, request: &BaseRequest) -> bool {
        let dk = &request.dynakube;
        request.injection_requested(ANNOTATION_ONE_AGENT_INJECT)
            && dk.needs_app_injection()
            && matches_optional_selector(dk.one_agent_namespace_selector(), request.namespace.labels())
    }

    fn injected(&self, request: &BaseRequest) -> bool {
        request.pod_annotation(ANNOTATION_ONE_AGENT_INJECTED) == Some("true")
    }

    async fn mutate(&self, request: &mut MutationRequest) -> Result<(), WebhookError> {
        let pod_name = request.base.pod.name_any();
        if let Some(reason) = unmet_precondition(&request.base.dynakube) {
            info!(pod = %pod_name, reason = %reason, "Agent not injected");
            request.base.set_pod_annotation(ANNOTATION_ONE_AGENT_INJECTED, "false");
            request.base.set_pod_annotation(ANNOTATION_ONE_AGENT_REASON, reason);
            return Ok(());
        }

        request.base.ensure_volume(empty_dir(BIN_VOLUME_NAME));
        request.base.ensure_volume(empty_dir(CONFIG_VOLUME_NAME));

        let settings = self.container_settings(&request.base);
        let injected = inject_containers(&mut request.base, &settings, |_| true);

        let technologies = request
            .base
            .pod_annotation(ANNOTATION_ONE_AGENT_TECHNOLOGIES)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let install = &mut request.install_container;
        let mut args = BTreeMap::from([
            ("source", CODE_MODULES_SOURCE_PATH.to_string()),
            ("target", INSTALL_CONTAINER_BIN_PATH.to_string()),
        ]);
        if let Some(technologies) = technologies {
            args.insert("technology", technologies);
        }
        install
            .args
            .get_or_insert_with(Vec::new)
            .extend(args.into_iter().map(|(key, value)| format!("--{key}={value}")));
        add_volume_mount(install, mount(BIN_VOLUME_NAME, INSTALL_CONTAINER_BIN_PATH, None));
        add_volume_mount(install, mount(CONFIG_VOLUME_NAME, INSTALL_CONTAINER_CONFIG_PATH, None));
        record_containers(install, &injected);

        request.base.set_pod_annotation(ANNOTATION_ONE_AGENT_INJECTED, "true");
        debug!(pod = %pod_name, containers = injected.len(), "Agent injected");
        Ok(())
    }

    fn reinvoke(&self, request: &mut BaseRequest) -> bool {
        if !self.injected(request) {
            return false;
        }
        let settings = self.container_settings(request);
        let injected = inject_containers(request, &settings, |c| !has_volume_mount(c, BIN_VOLUME_NAME));
        if injected.is_empty() {
            return false;
        }
        if let Some(install) = request.install_container_mut(INSTALL_CONTAINER_NAME) {
            record_containers(install, &injected);
        }
        true
    }
}

#[cfg(test)]
#[path = "oneagent_tests.rs"]
mod oneagent_tests;
