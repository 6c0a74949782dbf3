// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `DynaKube` reconciliation.
//!
//! One pass runs, in order:
//!
//! 1. tokens check
//! 2. version pinning of code modules, `ActiveGate`, host agent and collector
//! 3. agent connection info
//! 4. namespace mapping
//! 5. collector workload
//!
//! The status is written back once at the end of the pass, whatever its
//! outcome, and only when it changed.

use crate::cluster::{is_conflict, Cluster};
use crate::constants::{
    API_TOKEN_KEY, DOCKER_CONFIG_JSON_KEY, PROXY_SECRET_KEY, REQUEUE_FAST_SECS,
    REQUEUE_NOT_READY_SECS, REQUEUE_STEADY_STATE_SECS, TRUSTED_CAS_KEY,
};
use crate::crd::{DynaKube, DynaKubeStatus, Phase};
use crate::reconcilers::collector::{
    data_ingest_token_exists, reconcile_collector, DATA_INGEST_TOKEN_MISSING,
};
use crate::reconcilers::connectioninfo::reconcile_connection_info;
use crate::reconcilers::namespaces::map_namespaces;
use crate::reconcilers::status::{compute_phase, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_TOKENS, REASON_TOKEN_MISSING, REASON_TOKEN_READY, STATUS_FALSE, STATUS_TRUE,
};
use crate::timeprovider::TimeProvider;
use crate::version::reconciler::VersionReconciler;
use crate::version::registry::RegistryCredentials;
use crate::version::updater::{
    ActiveGateUpdater, CodeModulesUpdater, CollectorUpdater, OneAgentUpdater,
};
use crate::version::{ClientFactory, HttpSettings};
use anyhow::{Context as _, Result};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconcile one `DynaKube`.
///
/// # Errors
///
/// Returns the first error of the pass. The status, including the `Error`
/// phase, is written before the error is returned.
pub async fn reconcile_dynakube(
    cluster: &dyn Cluster,
    clients: &dyn ClientFactory,
    time: &TimeProvider,
    dk: &DynaKube,
) -> Result<Action> {
    let name = dk.name_any();
    let namespace = dk.namespace().unwrap_or_default();
    info!(namespace = %namespace, name = %name, "Reconciling DynaKube");

    let mut status = dk.status_or_default();
    let result = run(cluster, clients, time, dk, &mut status).await;

    let phase = compute_phase(&status.conditions, result.is_err());
    status.phase = Some(phase);
    status.observed_generation = dk.metadata.generation;

    let published = publish_status(cluster, dk, &status).await;

    if let Err(e) = result {
        if let Err(publish_error) = published {
            warn!(namespace = %namespace, name = %name, error = %publish_error, "Failed to write status");
        }
        return Err(e);
    }

    if let Err(e) = published {
        if is_conflict(&e) {
            info!(namespace = %namespace, name = %name, "Status write conflicted, requeueing");
            return Ok(Action::requeue(Duration::from_secs(REQUEUE_FAST_SECS)));
        }
        return Err(e);
    }

    let requeue = if phase == Phase::Running {
        REQUEUE_STEADY_STATE_SECS
    } else {
        REQUEUE_NOT_READY_SECS
    };
    debug!(namespace = %namespace, name = %name, phase = ?phase, requeue_secs = requeue, "DynaKube reconciled");
    Ok(Action::requeue(Duration::from_secs(requeue)))
}

async fn run(
    cluster: &dyn Cluster,
    clients: &dyn ClientFactory,
    time: &TimeProvider,
    dk: &DynaKube,
    status: &mut DynaKubeStatus,
) -> Result<()> {
    let namespace = dk.namespace().unwrap_or_default();

    if status.kube_system_uuid.is_empty() {
        status.kube_system_uuid = cluster
            .kube_system_uid()
            .await
            .context("failed to read kube-system namespace UID")?;
    }

    let tokens = dk.tokens();
    let Some(api_token) = secret_value(cluster, &namespace, &tokens, API_TOKEN_KEY).await? else {
        warn!(namespace = %namespace, secret = %tokens, "API token missing");
        set_condition(
            &mut status.conditions,
            CONDITION_TYPE_TOKENS,
            STATUS_FALSE,
            REASON_TOKEN_MISSING,
            &format!("Secret {tokens} does not contain {API_TOKEN_KEY}."),
        );
        return Ok(());
    };
    if dk.telemetry_ingest_enabled() && !data_ingest_token_exists(cluster, dk).await? {
        // The collector step reports the same condition
        set_condition(
            &mut status.conditions,
            CONDITION_TYPE_TOKENS,
            STATUS_FALSE,
            REASON_TOKEN_MISSING,
            DATA_INGEST_TOKEN_MISSING,
        );
    } else {
        set_condition(
            &mut status.conditions,
            CONDITION_TYPE_TOKENS,
            STATUS_TRUE,
            REASON_TOKEN_READY,
            "Tokens are present.",
        );
    }

    let http = http_settings(cluster, dk).await?;
    let credentials = registry_credentials(cluster, dk).await?;
    let vendor = clients.vendor(&dk.spec.api_url, &api_token, &http)?;
    let registry = clients.registry(credentials, &http)?;

    let versions = VersionReconciler::new(
        vendor.as_ref(),
        registry.as_ref(),
        time,
        dk.feature_flags().api_request_threshold(),
    );
    let results = [
        versions.reconcile(&CodeModulesUpdater::new(dk), &mut *status).await,
        versions.reconcile(&ActiveGateUpdater::new(dk), &mut *status).await,
        versions.reconcile(&OneAgentUpdater::new(dk), &mut *status).await,
        versions.reconcile(&CollectorUpdater::new(dk), &mut *status).await,
    ];
    if let Some(e) = results.into_iter().find_map(Result::err) {
        return Err(e).context("image version resolution failed");
    }

    reconcile_connection_info(cluster, vendor.as_ref(), time, dk, status).await?;

    let mapped = map_namespaces(cluster, dk)
        .await
        .context("failed to map namespaces")?;
    if mapped > 0 {
        info!(namespace = %namespace, name = %dk.name_any(), changed = mapped, "Namespace labels updated");
    }

    reconcile_collector(cluster, dk, status).await
}

/// Merge-patch the status when it differs from the observed one.
async fn publish_status(cluster: &dyn Cluster, dk: &DynaKube, status: &DynaKubeStatus) -> Result<()> {
    if dk.status.as_ref() == Some(status) {
        debug!(name = %dk.name_any(), "Status unchanged, skipping write");
        return Ok(());
    }
    cluster
        .patch_dynakube_status(dk, status)
        .await
        .with_context(|| format!("failed to update status of DynaKube {}", dk.name_any()))
}

/// A non-empty string value of a secret key.
async fn secret_value(
    cluster: &dyn Cluster,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Option<String>> {
    let secret = cluster
        .get_secret(namespace, name)
        .await
        .with_context(|| format!("failed to read secret {namespace}/{name}"))?;
    Ok(secret
        .and_then(|s| s.data)
        .and_then(|data| data.get(key).cloned())
        .and_then(|value| String::from_utf8(value.0).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// Outbound HTTP settings of the vendor API and registry clients.
async fn http_settings(cluster: &dyn Cluster, dk: &DynaKube) -> Result<HttpSettings> {
    let namespace = dk.namespace().unwrap_or_default();

    let proxy = match &dk.spec.proxy {
        Some(proxy) if proxy.value.as_deref().is_some_and(|v| !v.is_empty()) => proxy.value.clone(),
        Some(proxy) => match proxy.value_from.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret_value(cluster, &namespace, secret, PROXY_SECRET_KEY).await?,
            None => None,
        },
        None => None,
    };

    let trusted_ca_pem = match dk.spec.trusted_cas.as_deref().filter(|s| !s.is_empty()) {
        Some(name) => cluster
            .get_config_map(&namespace, name)
            .await
            .with_context(|| format!("failed to read trusted CA ConfigMap {namespace}/{name}"))?
            .and_then(|cm| cm.data)
            .and_then(|data| data.get(TRUSTED_CAS_KEY).cloned()),
        None => None,
    };

    Ok(HttpSettings {
        proxy,
        trusted_ca_pem,
        skip_cert_check: dk.spec.skip_cert_check,
    })
}

/// Registry credentials from the pull secret. A missing secret means anonymous pulls.
async fn registry_credentials(cluster: &dyn Cluster, dk: &DynaKube) -> Result<RegistryCredentials> {
    let namespace = dk.namespace().unwrap_or_default();
    let name = dk.pull_secret_name();
    let raw = cluster
        .get_secret(&namespace, &name)
        .await
        .with_context(|| format!("failed to read pull secret {namespace}/{name}"))?
        .and_then(|s| s.data)
        .and_then(|data| data.get(DOCKER_CONFIG_JSON_KEY).cloned());

    match raw {
        Some(raw) => RegistryCredentials::from_docker_config(&raw.0)
            .with_context(|| format!("pull secret {namespace}/{name} is not a valid docker config")),
        None => {
            debug!(namespace = %namespace, secret = %name, "No pull secret, using anonymous registry access");
            Ok(RegistryCredentials::default())
        }
    }
}

#[cfg(test)]
#[path = "dynakube_tests.rs"]
mod dynakube_tests;
