// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `EdgeConnect` reconciliation.
//!
//! Pins the connector image and converges a `Deployment` named after the
//! resource. The connector image is public, so no tenant token is needed.

use crate::cluster::{is_conflict, Cluster};
use crate::constants::{REQUEUE_FAST_SECS, REQUEUE_NOT_READY_SECS, REQUEUE_STEADY_STATE_SECS};
use crate::crd::{EdgeConnect, EdgeConnectStatus, Phase};
use crate::feature_flags::FeatureFlags;
use crate::hash::set_hash;
use crate::labels::{
    COMPONENT_EDGE_CONNECT, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME, K8S_VERSION,
    MANAGED_BY_OPERATOR,
};
use crate::reconcilers::status::{compute_phase, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_DEPLOYMENT, REASON_DEPLOYMENT_CREATED, REASON_KUBE_API_ERROR, STATUS_FALSE,
    STATUS_TRUE,
};
use crate::timeprovider::TimeProvider;
use crate::version::reconciler::VersionReconciler;
use crate::version::registry::RegistryCredentials;
use crate::version::updater::EdgeConnectUpdater;
use crate::version::{ClientFactory, HttpSettings};
use anyhow::{Context as _, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec,
    SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONTAINER_NAME: &str = "edge-connect";
const DEFAULT_REPLICAS: i32 = 1;

pub const ENV_EDGE_CONNECT_NAME: &str = "EDGE_CONNECT_NAME";
pub const ENV_EDGE_CONNECT_API_ENDPOINT_HOST: &str = "EDGE_CONNECT_API_ENDPOINT_HOST";
pub const ENV_EDGE_CONNECT_HOST_PATTERNS: &str = "EDGE_CONNECT_HOST_PATTERNS";

fn build_match_labels(ec: &EdgeConnect) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_NAME.into(), COMPONENT_EDGE_CONNECT.into()),
        (K8S_INSTANCE.into(), ec.name_any()),
        (K8S_MANAGED_BY.into(), MANAGED_BY_OPERATOR.into()),
    ])
}

fn build_env(ec: &EdgeConnect) -> Vec<EnvVar> {
    let mut env = vec![
        EnvVar {
            name: ENV_EDGE_CONNECT_NAME.into(),
            value: Some(ec.name_any()),
            ..Default::default()
        },
        EnvVar {
            name: ENV_EDGE_CONNECT_API_ENDPOINT_HOST.into(),
            value: Some(ec.spec.api_server.clone()),
            ..Default::default()
        },
    ];
    if !ec.spec.host_patterns.is_empty() {
        env.push(EnvVar {
            name: ENV_EDGE_CONNECT_HOST_PATTERNS.into(),
            value: Some(ec.spec.host_patterns.join(",")),
            ..Default::default()
        });
    }
    env
}

/// Build the connector `Deployment` running `image`.
#[must_use]
pub fn build_deployment(ec: &EdgeConnect, image: &str, version: &str) -> Deployment {
    let name = ec.name_any();
    let match_labels = build_match_labels(ec);
    let mut labels = match_labels.clone();
    labels.insert(K8S_COMPONENT.into(), COMPONENT_EDGE_CONNECT.into());
    if !version.is_empty() {
        labels.insert(K8S_VERSION.into(), version.into());
    }

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: ec.namespace(),
            labels: Some(labels.clone()),
            owner_references: ec.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(ec.spec.replicas.unwrap_or(DEFAULT_REPLICAS)),
            selector: LabelSelector {
                match_labels: Some(match_labels),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.into(),
                        image: Some(image.into()),
                        image_pull_policy: Some("IfNotPresent".into()),
                        env: Some(build_env(ec)),
                        security_context: Some(SecurityContext {
                            allow_privilege_escalation: Some(false),
                            privileged: Some(false),
                            read_only_root_filesystem: Some(true),
                            run_as_non_root: Some(true),
                            capabilities: Some(Capabilities {
                                drop: Some(vec!["ALL".into()]),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    image_pull_secrets: ec
                        .spec
                        .custom_pull_secret
                        .clone()
                        .filter(|s| !s.is_empty())
                        .map(|name| vec![LocalObjectReference { name }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Reconcile one `EdgeConnect`.
///
/// # Errors
///
/// Returns the first error of the pass after writing the `Error` phase.
pub async fn reconcile_edge_connect(
    cluster: &dyn Cluster,
    clients: &dyn ClientFactory,
    time: &TimeProvider,
    ec: &EdgeConnect,
) -> Result<Action> {
    let name = ec.name_any();
    let namespace = ec.namespace().unwrap_or_default();
    info!(namespace = %namespace, name = %name, "Reconciling EdgeConnect");

    let mut status = ec.status.clone().unwrap_or_default();
    let result = run(cluster, clients, time, ec, &mut status).await;

    let phase = compute_phase(&status.conditions, result.is_err());
    status.phase = Some(phase);
    status.observed_generation = ec.metadata.generation;

    let published = if ec.status.as_ref() == Some(&status) {
        Ok(())
    } else {
        cluster
            .patch_edge_connect_status(ec, &status)
            .await
            .with_context(|| format!("failed to update status of EdgeConnect {name}"))
    };

    if let Err(e) = result {
        if let Err(publish_error) = published {
            warn!(namespace = %namespace, name = %name, error = %publish_error, "Failed to write status");
        }
        return Err(e);
    }
    if let Err(e) = published {
        if is_conflict(&e) {
            return Ok(Action::requeue(Duration::from_secs(REQUEUE_FAST_SECS)));
        }
        return Err(e);
    }

    let requeue = if phase == Phase::Running {
        REQUEUE_STEADY_STATE_SECS
    } else {
        REQUEUE_NOT_READY_SECS
    };
    Ok(Action::requeue(Duration::from_secs(requeue)))
}

async fn run(
    cluster: &dyn Cluster,
    clients: &dyn ClientFactory,
    time: &TimeProvider,
    ec: &EdgeConnect,
    status: &mut EdgeConnectStatus,
) -> Result<()> {
    let http = HttpSettings::default();
    let api_url = format!("https://{}/api", ec.spec.api_server);
    let vendor = clients.vendor(&api_url, "", &http)?;
    let registry = clients.registry(RegistryCredentials::default(), &http)?;

    VersionReconciler::new(
        vendor.as_ref(),
        registry.as_ref(),
        time,
        FeatureFlags::new(ec.annotations()).api_request_threshold(),
    )
    .reconcile(&EdgeConnectUpdater::new(ec), status)
    .await
    .context("EdgeConnect image resolution failed")?;

    let mut deployment = build_deployment(ec, &status.version.image_id, &status.version.version);
    set_hash(&mut deployment)?;

    let namespace = ec.namespace().unwrap_or_default();
    let name = ec.name_any();
    match cluster.apply_deployment(&deployment).await {
        Ok(true) => info!(namespace = %namespace, name = %name, image = %status.version.image_id, "EdgeConnect Deployment applied"),
        Ok(false) => debug!(namespace = %namespace, name = %name, "EdgeConnect Deployment unchanged"),
        Err(e) => {
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_DEPLOYMENT,
                STATUS_FALSE,
                REASON_KUBE_API_ERROR,
                &format!("{e:#}"),
            );
            return Err(e).with_context(|| format!("failed to apply Deployment {namespace}/{name}"));
        }
    }

    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_DEPLOYMENT,
        STATUS_TRUE,
        REASON_DEPLOYMENT_CREATED,
        &format!("{name} created"),
    );
    Ok(())
}

#[cfg(test)]
#[path = "edgeconnect_tests.rs"]
mod edgeconnect_tests;
