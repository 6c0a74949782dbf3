// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic create-or-update and delete helpers for Kubernetes resources.
//!
//! Each helper reports whether it actually changed the cluster so callers can
//! react to changes (for example by marking the collector configuration as
//! outdated). The decision is delegated to a comparator so that data objects
//! compare their payload while workloads compare their structural hash.
//!
//! # Strategies
//!
//! - **Create** when the object is absent
//! - **Apply** (server-side, forced) when the comparator reports a change
//! - **Recreate** for `StatefulSet`s whose immutable selector changed
//!
//! # Example
//!
//! ```rust,no_run
//! use dynakube_operator::reconcilers::resources::{create_or_update, config_map_changed};
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::Client;
//! use anyhow::Result;
//!
//! async fn example(client: &Client, cm: ConfigMap) -> Result<()> {
//!     let changed = create_or_update(client, "dynatrace", &cm, config_map_changed).await?;
//!     println!("changed: {changed}");
//!     Ok(())
//! }
//! ```

use crate::constants::FIELD_MANAGER;
use crate::hash::get_hash;
use crate::metrics;
use anyhow::{Context as _, Result};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, info};

/// Create `resource` or update it when `needs_update(existing, desired)` is true.
///
/// Returns `true` when the cluster was changed.
///
/// # Errors
///
/// Returns an error if:
/// - The resource has no name in its metadata
/// - API operations fail
pub async fn create_or_update<T>(
    client: &Client,
    namespace: &str,
    resource: &T,
    needs_update: fn(&T, &T) -> bool,
) -> Result<bool>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource
        .meta()
        .name
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Resource must have a name"))?;
    let kind = T::kind(&());

    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    debug!(
        namespace = %namespace,
        name = %name,
        kind = %kind,
        "Creating or updating resource"
    );

    match api
        .get_opt(name)
        .await
        .with_context(|| format!("failed to get {kind} {namespace}/{name}"))?
    {
        None => {
            api.create(&PostParams::default(), resource)
                .await
                .with_context(|| format!("failed to create {kind} {namespace}/{name}"))?;
            metrics::record_resource_created(&kind);
            info!("Created {} {}/{}", kind, namespace, name);
            Ok(true)
        }
        Some(existing) if needs_update(&existing, resource) => {
            api.patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(resource),
            )
            .await
            .with_context(|| format!("failed to update {kind} {namespace}/{name}"))?;
            metrics::record_resource_updated(&kind);
            info!("Updated {} {}/{}", kind, namespace, name);
            Ok(true)
        }
        Some(_) => {
            debug!("{} {}/{} is up to date", kind, namespace, name);
            Ok(false)
        }
    }
}

/// Create or update a `StatefulSet`, recreating it when its selector changed.
///
/// # Errors
///
/// Returns an error if any API operation fails.
pub async fn create_or_update_stateful_set(client: &Client, sts: &StatefulSet) -> Result<bool> {
    let namespace = sts.namespace().unwrap_or_default();
    let name = sts.name_any();
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);

    if let Some(existing) = api.get_opt(&name).await? {
        if selector_changed(&existing, sts) {
            info!(
                "Selector of StatefulSet {}/{} changed, recreating",
                namespace, name
            );
            delete_if_exists::<StatefulSet>(client, &namespace, &name).await?;
            api.create(&PostParams::default(), sts)
                .await
                .with_context(|| format!("failed to recreate StatefulSet {namespace}/{name}"))?;
            metrics::record_resource_created("StatefulSet");
            return Ok(true);
        }
    }

    create_or_update(client, &namespace, sts, workload_hash_changed).await
}

/// Delete a resource, treating "not found" as success.
///
/// Returns `true` when something was deleted.
///
/// # Errors
///
/// Returns an error if the API call fails for any reason other than 404.
pub async fn delete_if_exists<T>(client: &Client, namespace: &str, name: &str) -> Result<bool>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let kind = T::kind(&());
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            metrics::record_resource_deleted(&kind);
            info!("Deleted {} {}/{}", kind, namespace, name);
            Ok(true)
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!("{} {}/{} already gone", kind, namespace, name);
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("failed to delete {kind} {namespace}/{name}")),
    }
}

/// `ConfigMap`s differ when their data, labels or owners differ.
#[must_use]
pub fn config_map_changed(existing: &ConfigMap, desired: &ConfigMap) -> bool {
    existing.data != desired.data
        || existing.binary_data != desired.binary_data
        || metadata_drifted(existing, desired)
}

/// `Secret`s differ when their data, type, labels or owners differ.
#[must_use]
pub fn secret_changed(existing: &Secret, desired: &Secret) -> bool {
    existing.data != desired.data
        || existing.type_ != desired.type_
        || metadata_drifted(existing, desired)
}

/// Workloads differ when their stamped structural hash differs or is missing.
#[must_use]
pub fn workload_hash_changed<K: Resource>(existing: &K, desired: &K) -> bool {
    match (get_hash(existing), get_hash(desired)) {
        (Some(a), Some(b)) => a != b,
        _ => true,
    }
}

/// The selector of a `StatefulSet` is immutable; a change needs a recreate.
#[must_use]
pub fn selector_changed(existing: &StatefulSet, desired: &StatefulSet) -> bool {
    let selector = |s: &StatefulSet| s.spec.as_ref().map(|spec| spec.selector.clone());
    selector(existing) != selector(desired)
}

fn metadata_drifted<K: Resource>(existing: &K, desired: &K) -> bool {
    let labels = |k: &K| k.meta().labels.clone().unwrap_or_default();
    let owners = |k: &K| k.meta().owner_references.clone().unwrap_or_default();
    labels(existing) != labels(desired)
        || (!owners(desired).is_empty() && owners(existing) != owners(desired))
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
