// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Agent connection info.
//!
//! The tenant UUID and communication endpoints are fetched from the vendor
//! API and recorded in `status.oneAgent.connectionInfo`. The tenant token is
//! kept in the `<dynakube>-oneagent-tenant-secret` secret. The injected agent
//! cannot phone home until the route is clear.

use crate::cluster::Cluster;
use crate::constants::TENANT_TOKEN_KEY;
use crate::crd::{ConnectionInfo, DynaKube, DynaKubeStatus};
use crate::reconcilers::status::{remove_condition, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_CONNECTION_INFO, REASON_CONNECTION_INFO_UPDATED,
    REASON_EMPTY_COMMUNICATION_HOSTS, STATUS_FALSE, STATUS_TRUE,
};
use crate::timeprovider::TimeProvider;
use crate::version::vendor::VendorApi;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Build the tenant token secret owned by the `DynaKube`.
#[must_use]
pub fn build_tenant_secret(dk: &DynaKube, tenant_token: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(dk.tenant_secret_name()),
            namespace: dk.namespace(),
            owner_references: dk.controller_owner_ref(&()).map(|r| vec![r]),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            TENANT_TOKEN_KEY.to_string(),
            ByteString(tenant_token.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    }
}

/// Refresh the connection info when the tenant secret is missing or the last
/// request is older than the probe threshold.
///
/// An empty endpoint list is reported through the condition and is not an
/// error; the injection path waits for a clear route.
///
/// # Errors
///
/// Returns an error if the vendor API or the cluster API fails.
pub async fn reconcile_connection_info(
    cluster: &dyn Cluster,
    vendor: &dyn VendorApi,
    time: &TimeProvider,
    dk: &DynaKube,
    status: &mut DynaKubeStatus,
) -> Result<()> {
    if !dk.needs_one_agent() && !dk.needs_app_injection() {
        if status.one_agent.connection_info != ConnectionInfo::default() {
            debug!(dynakube = %dk.name_any(), "Agent disabled, clearing connection info");
            status.one_agent.connection_info = ConnectionInfo::default();
        }
        remove_condition(&mut status.conditions, CONDITION_TYPE_CONNECTION_INFO);
        return Ok(());
    }

    let namespace = dk.namespace().unwrap_or_default();
    let secret_name = dk.tenant_secret_name();
    let secret_exists = cluster.get_secret(&namespace, &secret_name).await?.is_some();
    let threshold = dk.feature_flags().api_request_threshold();
    let info = &status.one_agent.connection_info;
    if secret_exists && !time.is_outdated(info.last_request.as_deref(), threshold) {
        debug!(dynakube = %dk.name_any(), "Connection info is recent, skipping");
        return Ok(());
    }

    let fetched = match vendor.one_agent_connection_info().await {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(dynakube = %dk.name_any(), error = %e, "Failed to fetch connection info");
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_CONNECTION_INFO,
                STATUS_FALSE,
                e.condition_reason(),
                &e.to_string(),
            );
            return Err(e).context("failed to fetch agent connection info");
        }
    };

    cluster
        .apply_secret(&build_tenant_secret(dk, &fetched.tenant_token))
        .await
        .with_context(|| format!("failed to apply tenant secret {namespace}/{secret_name}"))?;

    let info = &mut status.one_agent.connection_info;
    info.tenant_uuid = fetched.tenant_uuid;
    info.endpoints = fetched.endpoints;
    info.communication_hosts = fetched.communication_hosts;
    info.last_request = Some(time.now_rfc3339());

    if info.communication_hosts.is_empty() {
        warn!(dynakube = %dk.name_any(), "No communication hosts available for the tenant");
        set_condition(
            &mut status.conditions,
            CONDITION_TYPE_CONNECTION_INFO,
            STATUS_FALSE,
            REASON_EMPTY_COMMUNICATION_HOSTS,
            "No communication endpoints available, agents cannot connect to the tenant.",
        );
        return Ok(());
    }

    info!(
        dynakube = %dk.name_any(),
        tenant = %info.tenant_uuid,
        hosts = info.communication_hosts.len(),
        "Connection info updated"
    );
    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_CONNECTION_INFO,
        STATUS_TRUE,
        REASON_CONNECTION_INFO_UPDATED,
        &format!("Tenant {} reachable via {}", info.tenant_uuid, info.endpoints),
    );
    Ok(())
}

#[cfg(test)]
#[path = "connectioninfo_tests.rs"]
mod connectioninfo_tests;
