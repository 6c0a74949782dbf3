// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! OpenTelemetry collector workload.
//!
//! Converges the collector `StatefulSet` and its configuration `ConfigMap`.
//! Pod template annotations carry content hashes of the mounted secrets and
//! of the configuration so a change to any of them rolls the pods.
//!
//! The collector runs when telemetry ingest or extensions are configured.
//! Turning both off deletes the workload.

use crate::cluster::Cluster;
use crate::constants::{
    DATA_INGEST_TOKEN_KEY, DEFAULT_COLLECTOR_IMAGE_REPOSITORY, DEFAULT_COLLECTOR_IMAGE_TAG,
};
use crate::crd::{DynaKube, DynaKubeStatus};
use crate::errors::ConfigError;
use crate::hash::{generate_hash, set_hash};
use crate::labels::{
    ANNOTATION_EXTENSIONS_SECRET_HASH, ANNOTATION_TELEMETRY_INGEST_CONFIG_HASH,
    ANNOTATION_TELEMETRY_INGEST_SECRET_HASH,
};
use crate::otelc::config::{parse_protocols, ConfigBuilder, GeneratedConfig};
use crate::otelc::statefulset::{
    build_config_map, build_stateful_set, exporter_ca_path, receiver_tls_paths,
    ENV_DT_DATA_INGEST_TOKEN, ENV_DT_ENDPOINT,
};
use crate::reconcilers::status::{find_condition, remove_condition, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_COLLECTOR_CONFIG, CONDITION_TYPE_READY, CONDITION_TYPE_TOKENS,
    REASON_CONFIG_GENERATION_FAILED, REASON_CONFIG_OUTDATED, REASON_KUBE_API_ERROR,
    REASON_STATEFULSET_CREATED, REASON_TOKEN_MISSING, STATUS_FALSE, STATUS_TRUE,
};
use anyhow::{Context as _, Result};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Message of the `Tokens` condition when telemetry ingest lacks its token.
pub(crate) const DATA_INGEST_TOKEN_MISSING: &str =
    "Data ingest token is missing, but it is required for telemetry ingest.";

/// Render the collector configuration of `dk`.
///
/// # Errors
///
/// Returns a [`ConfigError`] for unknown protocols.
pub fn generate_config(dk: &DynaKube) -> Result<GeneratedConfig, ConfigError> {
    let protocols = dk
        .spec
        .telemetry_ingest
        .as_ref()
        .map(|t| parse_protocols(&t.protocols))
        .transpose()?
        .unwrap_or_default();

    let mut builder = ConfigBuilder::new(&protocols)
        .with_api_token(format!("${{env:{ENV_DT_DATA_INGEST_TOKEN}}}"))
        .with_exporters_endpoint(format!("${{env:{ENV_DT_ENDPOINT}}}"))
        .with_exporters()
        .with_processors()
        .with_receivers()
        .with_extensions()
        .with_services();
    if let Some(ca) = exporter_ca_path(dk) {
        builder = builder.with_ca(ca);
    }
    if let Some((cert, key)) = receiver_tls_paths(dk) {
        builder = builder.with_tls(cert, key);
    }
    builder.build()
}

/// Converge the collector of `dk`, recording conditions in `status`.
///
/// A missing data ingest token is reported through the `Tokens` condition
/// and is not an error.
///
/// # Errors
///
/// Returns an error if configuration rendering or a cluster API call fails.
pub async fn reconcile_collector(
    cluster: &dyn Cluster,
    dk: &DynaKube,
    status: &mut DynaKubeStatus,
) -> Result<()> {
    if !dk.collector_enabled() {
        cleanup(cluster, dk, status).await;
        return Ok(());
    }

    let namespace = dk.namespace().unwrap_or_default();

    if dk.telemetry_ingest_enabled() && !data_ingest_token_exists(cluster, dk).await? {
        warn!(dynakube = %dk.name_any(), "Data ingest token missing, collector not deployed");
        set_condition(
            &mut status.conditions,
            CONDITION_TYPE_TOKENS,
            STATUS_FALSE,
            REASON_TOKEN_MISSING,
            DATA_INGEST_TOKEN_MISSING,
        );
        return Ok(());
    }

    let mut view = dk.clone();
    view.status = Some(status.clone());

    let result = converge(cluster, &view, status).await;
    if let Err(e) = &result {
        if e.downcast_ref::<ConfigError>().is_none() {
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_READY,
                STATUS_FALSE,
                REASON_KUBE_API_ERROR,
                &format!("{e:#}"),
            );
        }
        warn!(namespace = %namespace, dynakube = %dk.name_any(), error = %e, "Collector reconcile failed");
    }
    result
}

async fn converge(cluster: &dyn Cluster, dk: &DynaKube, status: &mut DynaKubeStatus) -> Result<()> {
    let namespace = dk.namespace().unwrap_or_default();

    if dk.telemetry_ingest_enabled() {
        let config = match generate_config(dk) {
            Ok(config) => config,
            Err(e) => {
                set_condition(
                    &mut status.conditions,
                    CONDITION_TYPE_COLLECTOR_CONFIG,
                    STATUS_FALSE,
                    REASON_CONFIG_GENERATION_FAILED,
                    &e.to_string(),
                );
                return Err(e).context("failed to render collector configuration");
            }
        };
        let changed = cluster
            .apply_config_map(&build_config_map(dk, &config))
            .await
            .with_context(|| {
                format!(
                    "failed to apply ConfigMap {namespace}/{}",
                    dk.telemetry_config_map_name()
                )
            })?;
        if changed {
            info!(namespace = %namespace, name = %dk.telemetry_config_map_name(), "Collector configuration updated");
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_COLLECTOR_CONFIG,
                STATUS_FALSE,
                REASON_CONFIG_OUTDATED,
                "Collector configuration changed, pods are rolling.",
            );
        }
    } else if cluster
        .delete_config_map(&namespace, &dk.telemetry_config_map_name())
        .await?
    {
        info!(namespace = %namespace, name = %dk.telemetry_config_map_name(), "Collector configuration removed");
    }

    let annotations = build_template_annotations(cluster, dk).await?;
    let image = collector_image(status);
    let mut stateful_set = build_stateful_set(dk, &image, annotations);
    set_hash(&mut stateful_set)?;

    let name = dk.otel_collector_statefulset_name();
    let changed = cluster
        .apply_stateful_set(&stateful_set)
        .await
        .with_context(|| format!("failed to apply StatefulSet {namespace}/{name}"))?;
    if changed {
        info!(namespace = %namespace, name = %name, image = %image, "Collector StatefulSet applied");
    } else {
        debug!(namespace = %namespace, name = %name, "Collector StatefulSet unchanged");
    }

    remove_condition(&mut status.conditions, CONDITION_TYPE_COLLECTOR_CONFIG);
    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_READY,
        STATUS_TRUE,
        REASON_STATEFULSET_CREATED,
        &format!("{name} created"),
    );
    Ok(())
}

fn collector_image(status: &DynaKubeStatus) -> String {
    let image_id = &status.otel_collector.image_id;
    if image_id.is_empty() {
        format!("{DEFAULT_COLLECTOR_IMAGE_REPOSITORY}:{DEFAULT_COLLECTOR_IMAGE_TAG}")
    } else {
        image_id.clone()
    }
}

pub(crate) async fn data_ingest_token_exists(cluster: &dyn Cluster, dk: &DynaKube) -> Result<bool> {
    let namespace = dk.namespace().unwrap_or_default();
    let secret = cluster
        .get_secret(&namespace, &dk.tokens())
        .await
        .with_context(|| format!("failed to read tokens secret {namespace}/{}", dk.tokens()))?;
    Ok(secret
        .and_then(|s| s.data)
        .and_then(|data| data.get(DATA_INGEST_TOKEN_KEY).cloned())
        .is_some_and(|token| !token.0.is_empty()))
}

/// Hash of the live data of a secret. A missing secret hashes as empty data.
async fn secret_hash(cluster: &dyn Cluster, namespace: &str, name: &str) -> Result<String> {
    let data = match cluster.get_secret(namespace, name).await? {
        Some(secret) => secret.data.unwrap_or_default(),
        None => {
            warn!(namespace = %namespace, name = %name, "Secret not found, hashing empty data");
            BTreeMap::<String, ByteString>::new()
        }
    };
    generate_hash(&data)
}

/// Content hashes that roll the collector pods when their inputs change.
async fn build_template_annotations(
    cluster: &dyn Cluster,
    dk: &DynaKube,
) -> Result<BTreeMap<String, String>> {
    let namespace = dk.namespace().unwrap_or_default();
    let mut annotations = dk.spec.templates.open_telemetry_collector.annotations.clone();

    if dk.extensions_enabled() {
        let hash = secret_hash(cluster, &namespace, &dk.extensions_tls_secret_name()).await?;
        annotations.insert(ANNOTATION_EXTENSIONS_SECRET_HASH.into(), hash);
    }

    if let Some(tls_ref) = dk.telemetry_ingest_tls_ref() {
        let hash = secret_hash(cluster, &namespace, tls_ref).await?;
        annotations.insert(ANNOTATION_TELEMETRY_INGEST_SECRET_HASH.into(), hash);
    }

    if dk.telemetry_ingest_enabled() {
        let data = cluster
            .get_config_map(&namespace, &dk.telemetry_config_map_name())
            .await?
            .and_then(|cm| cm.data)
            .unwrap_or_default();
        annotations.insert(
            ANNOTATION_TELEMETRY_INGEST_CONFIG_HASH.into(),
            generate_hash(&data)?,
        );
    }

    Ok(annotations)
}

/// Remove the collector once it was deployed. Failures are logged only.
async fn cleanup(cluster: &dyn Cluster, dk: &DynaKube, status: &mut DynaKubeStatus) {
    if find_condition(&status.conditions, CONDITION_TYPE_READY).is_none() {
        return;
    }

    let namespace = dk.namespace().unwrap_or_default();
    let name = dk.otel_collector_statefulset_name();
    match cluster.delete_stateful_set(&namespace, &name).await {
        Ok(true) => info!(namespace = %namespace, name = %name, "Collector StatefulSet deleted"),
        Ok(false) => debug!(namespace = %namespace, name = %name, "Collector StatefulSet already gone"),
        Err(e) => warn!(namespace = %namespace, name = %name, error = %e, "Failed to delete collector StatefulSet"),
    }

    let config_map = dk.telemetry_config_map_name();
    if let Err(e) = cluster.delete_config_map(&namespace, &config_map).await {
        warn!(namespace = %namespace, name = %config_map, error = %e, "Failed to delete collector ConfigMap");
    }

    remove_condition(&mut status.conditions, CONDITION_TYPE_READY);
    remove_condition(&mut status.conditions, CONDITION_TYPE_COLLECTOR_CONFIG);
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod collector_tests;
