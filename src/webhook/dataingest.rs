// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data ingest injection.
//!
//! Mounts the enrichment directory and the ingest endpoint secret into user
//! containers. The install container writes workload information into the
//! enrichment directory.

use crate::cluster::Cluster;
use crate::constants::{
    DATA_INGEST_ENDPOINT_KEY, DATA_INGEST_ENDPOINT_MOUNT_PATH, DATA_INGEST_ENDPOINT_SECRET,
    DATA_INGEST_TOKEN_KEY, ENRICHMENT_MOUNT_PATH,
};
use crate::crd::DynaKube;
use crate::errors::WebhookError;
use crate::labels::{
    ANNOTATION_DATA_INGEST_INJECT, ANNOTATION_DATA_INGEST_INJECTED, K8S_MANAGED_BY,
    MANAGED_BY_OPERATOR,
};
use crate::selector::matches_optional_selector;
use crate::webhook::request::{
    add_volume_mount, has_volume_mount, set_env, BaseRequest, MutationRequest,
};
use crate::webhook::PodMutator;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, Secret, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const ENRICHMENT_VOLUME_NAME: &str = "dynatrace-enrichment";
pub const ENDPOINT_VOLUME_NAME: &str = "dynatrace-data-ingest-endpoint";

pub const ENV_WORKLOAD_KIND: &str = "DT_WORKLOAD_KIND";
pub const ENV_WORKLOAD_NAME: &str = "DT_WORKLOAD_NAME";
pub const ENV_DATA_INGEST_INJECTED: &str = "DATA_INGEST_INJECTED";

/// Injects the data ingest endpoint and enrichment files.
pub struct DataIngestMutator {
    cluster: Arc<dyn Cluster>,
}

impl DataIngestMutator {
    #[must_use]
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    /// Create the endpoint secret in the pod namespace unless it already exists.
    async fn ensure_endpoint_secret(&self, namespace: &str, dk: &DynaKube) -> Result<(), WebhookError> {
        let lookup_error = |name: String| {
            move |source: anyhow::Error| WebhookError::Lookup {
                kind: "Secret",
                name,
                source,
            }
        };

        let existing = self
            .cluster
            .get_secret(namespace, DATA_INGEST_ENDPOINT_SECRET)
            .await
            .map_err(lookup_error(format!("{namespace}/{DATA_INGEST_ENDPOINT_SECRET}")))?;
        if existing.is_some() {
            return Ok(());
        }

        let dk_namespace = dk.namespace().unwrap_or_default();
        let tokens = dk.tokens();
        let token = self
            .cluster
            .get_secret(&dk_namespace, &tokens)
            .await
            .map_err(lookup_error(format!("{dk_namespace}/{tokens}")))?
            .and_then(|s| s.data)
            .and_then(|data| data.get(DATA_INGEST_TOKEN_KEY).cloned())
            .and_then(|value| String::from_utf8(value.0).ok());

        let secret = build_endpoint_secret(namespace, dk, token.as_deref());
        self.cluster
            .apply_secret(&secret)
            .await
            .map_err(lookup_error(format!("{namespace}/{DATA_INGEST_ENDPOINT_SECRET}")))?;
        info!(namespace = %namespace, secret = %DATA_INGEST_ENDPOINT_SECRET, "Created data ingest endpoint secret");
        Ok(())
    }
}

/// Properties file read by the agent and by applications to reach the ingest API.
#[must_use]
pub fn endpoint_properties(dk: &DynaKube, token: Option<&str>) -> String {
    let mut properties = format!(
        "DT_METRICS_INGEST_URL={}/v2/metrics/ingest\n",
        dk.spec.api_url.trim_end_matches('/')
    );
    if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
        properties.push_str(&format!("DT_METRICS_INGEST_API_TOKEN={token}\n"));
    }
    properties
}

fn build_endpoint_secret(namespace: &str, dk: &DynaKube, token: Option<&str>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(DATA_INGEST_ENDPOINT_SECRET.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                K8S_MANAGED_BY.to_string(),
                MANAGED_BY_OPERATOR.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            DATA_INGEST_ENDPOINT_KEY.to_string(),
            ByteString(endpoint_properties(dk, token).into_bytes()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

fn enrichment_mount() -> VolumeMount {
    VolumeMount {
        name: ENRICHMENT_VOLUME_NAME.to_string(),
        mount_path: ENRICHMENT_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

fn endpoint_mount() -> VolumeMount {
    VolumeMount {
        name: ENDPOINT_VOLUME_NAME.to_string(),
        mount_path: DATA_INGEST_ENDPOINT_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Mount both volumes into every injectable container still missing them.
fn mount_user_containers(request: &mut BaseRequest) -> usize {
    let mut mounted = 0;
    for container in request.injectable_containers() {
        if has_volume_mount(container, ENDPOINT_VOLUME_NAME) {
            continue;
        }
        add_volume_mount(container, enrichment_mount());
        add_volume_mount(container, endpoint_mount());
        mounted += 1;
    }
    mounted
}

#[async_trait]
impl PodMutator for DataIngestMutator {
    fn name(&self) -> &'static str {
        "data-ingest"
    }

    fn enabled(&self, request: &BaseRequest) -> bool {
        let dk = &request.dynakube;
        request.injection_requested(ANNOTATION_DATA_INGEST_INJECT)
            && dk.metadata_enrichment_enabled()
            && matches_optional_selector(
                dk.spec.metadata_enrichment.namespace_selector.as_ref(),
                request.namespace.labels(),
            )
    }

    fn injected(&self, request: &BaseRequest) -> bool {
        request.pod_annotation(ANNOTATION_DATA_INGEST_INJECTED) == Some("true")
    }

    async fn mutate(&self, request: &mut MutationRequest) -> Result<(), WebhookError> {
        let namespace = request.base.namespace.name_any();
        self.ensure_endpoint_secret(&namespace, &request.base.dynakube)
            .await?;
        let workload = request.workload(self.cluster.as_ref()).await?;

        request.base.ensure_volume(Volume {
            name: ENRICHMENT_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        request.base.ensure_volume(Volume {
            name: ENDPOINT_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(DATA_INGEST_ENDPOINT_SECRET.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mounted = mount_user_containers(&mut request.base);

        let install = &mut request.install_container;
        add_volume_mount(install, enrichment_mount());
        set_env(install, ENV_WORKLOAD_KIND, workload.kind);
        set_env(install, ENV_WORKLOAD_NAME, workload.name);
        set_env(install, ENV_DATA_INGEST_INJECTED, "true".to_string());

        request
            .base
            .set_pod_annotation(ANNOTATION_DATA_INGEST_INJECTED, "true");
        debug!(pod = %request.base.pod.name_any(), containers = mounted, "Data ingest injected");
        Ok(())
    }

    fn reinvoke(&self, request: &mut BaseRequest) -> bool {
        if !self.injected(request) {
            return false;
        }
        mount_user_containers(request) > 0
    }
}

#[cfg(test)]
#[path = "dataingest_tests.rs"]
mod dataingest_tests;
