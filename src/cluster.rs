// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster access used by the reconcilers and the admission webhook.
//!
//! Every read and write against the Kubernetes API goes through the
//! [`Cluster`] trait. [`KubeCluster`] is the production implementation backed
//! by a [`kube::Client`]; tests use an in-memory fake.
//!
//! Write operations return `true` when they changed the cluster.

use crate::crd::{DynaKube, DynaKubeStatus, EdgeConnect, EdgeConnectStatus};
use crate::reconcilers::resources::{
    config_map_changed, create_or_update, create_or_update_stateful_set, delete_if_exists,
    secret_changed, workload_hash_changed,
};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the namespace whose UID identifies the cluster.
const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Read and write access to the cluster objects the operator manages.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    async fn get_dynakube(&self, namespace: &str, name: &str) -> Result<Option<DynaKube>>;

    /// Metadata of an arbitrary namespaced object, used to walk owner references.
    async fn get_owner(
        &self,
        namespace: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<ObjectMeta>>;

    async fn apply_secret(&self, secret: &Secret) -> Result<bool>;

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<bool>;

    /// Create or update a `StatefulSet`, recreating it when its selector changed.
    async fn apply_stateful_set(&self, stateful_set: &StatefulSet) -> Result<bool>;

    async fn apply_deployment(&self, deployment: &Deployment) -> Result<bool>;

    async fn delete_stateful_set(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Merge labels onto a namespace. A `None` value removes the label.
    async fn set_namespace_labels(
        &self,
        name: &str,
        labels: &BTreeMap<String, Option<String>>,
    ) -> Result<()>;

    /// Write the status subresource. A stale `resource_version` yields a 409.
    async fn patch_dynakube_status(
        &self,
        dynakube: &DynaKube,
        status: &DynaKubeStatus,
    ) -> Result<()>;

    async fn patch_edge_connect_status(
        &self,
        edge_connect: &EdgeConnect,
        status: &EdgeConnectStatus,
    ) -> Result<()>;

    /// UID of the `kube-system` namespace.
    async fn kube_system_uid(&self) -> Result<String>;
}

/// [`Cluster`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Split `apps/v1` into `("apps", "v1")` and `v1` into `("", "v1")`.
#[must_use]
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Status merge patch carrying the observed `resourceVersion` for optimistic concurrency.
fn status_patch<S: serde::Serialize>(resource_version: Option<String>, status: &S) -> serde_json::Value {
    match resource_version {
        Some(rv) => json!({ "metadata": { "resourceVersion": rv }, "status": status }),
        None => json!({ "status": status }),
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("failed to get Secret {namespace}/{name}"))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("failed to get ConfigMap {namespace}/{name}"))
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("failed to get StatefulSet {namespace}/{name}"))
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .with_context(|| format!("failed to get Namespace {name}"))
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("failed to list namespaces")?;
        Ok(list.items)
    }

    async fn get_dynakube(&self, namespace: &str, name: &str) -> Result<Option<DynaKube>> {
        let api: Api<DynaKube> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("failed to get DynaKube {namespace}/{name}"))
    }

    async fn get_owner(
        &self,
        namespace: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        let (group, version) = split_api_version(api_version);
        let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind));
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let object = api
            .get_opt(name)
            .await
            .with_context(|| format!("failed to get {kind} {namespace}/{name}"))?;
        Ok(object.map(|o| o.metadata))
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<bool> {
        let namespace = secret.namespace().unwrap_or_default();
        create_or_update(&self.client, &namespace, secret, secret_changed).await
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<bool> {
        let namespace = config_map.namespace().unwrap_or_default();
        create_or_update(&self.client, &namespace, config_map, config_map_changed).await
    }

    async fn apply_stateful_set(&self, stateful_set: &StatefulSet) -> Result<bool> {
        create_or_update_stateful_set(&self.client, stateful_set).await
    }

    async fn apply_deployment(&self, deployment: &Deployment) -> Result<bool> {
        let namespace = deployment.namespace().unwrap_or_default();
        create_or_update(&self.client, &namespace, deployment, workload_hash_changed).await
    }

    async fn delete_stateful_set(&self, namespace: &str, name: &str) -> Result<bool> {
        delete_if_exists::<StatefulSet>(&self.client, namespace, name).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool> {
        delete_if_exists::<ConfigMap>(&self.client, namespace, name).await
    }

    async fn set_namespace_labels(
        &self,
        name: &str,
        labels: &BTreeMap<String, Option<String>>,
    ) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let patch = json!({ "metadata": { "labels": labels } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("failed to label Namespace {name}"))?;
        debug!(namespace = %name, "Updated namespace labels");
        Ok(())
    }

    async fn patch_dynakube_status(
        &self,
        dynakube: &DynaKube,
        status: &DynaKubeStatus,
    ) -> Result<()> {
        let namespace = dynakube.namespace().unwrap_or_default();
        let name = dynakube.name_any();
        let api: Api<DynaKube> = Api::namespaced(self.client.clone(), &namespace);
        let patch = status_patch(dynakube.resource_version(), status);
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("failed to update status of DynaKube {namespace}/{name}"))?;
        Ok(())
    }

    async fn patch_edge_connect_status(
        &self,
        edge_connect: &EdgeConnect,
        status: &EdgeConnectStatus,
    ) -> Result<()> {
        let namespace = edge_connect.namespace().unwrap_or_default();
        let name = edge_connect.name_any();
        let api: Api<EdgeConnect> = Api::namespaced(self.client.clone(), &namespace);
        let patch = status_patch(edge_connect.resource_version(), status);
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| {
                format!("failed to update status of EdgeConnect {namespace}/{name}")
            })?;
        Ok(())
    }

    async fn kube_system_uid(&self) -> Result<String> {
        let namespace = self
            .get_namespace(KUBE_SYSTEM_NAMESPACE)
            .await?
            .ok_or_else(|| anyhow::anyhow!("namespace {KUBE_SYSTEM_NAMESPACE} not found"))?;
        namespace
            .metadata
            .uid
            .ok_or_else(|| anyhow::anyhow!("namespace {KUBE_SYSTEM_NAMESPACE} has no uid"))
    }
}

/// `true` when the error chain holds a Kubernetes 409 Conflict.
#[must_use]
pub fn is_conflict(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|e| e.downcast_ref::<kube::Error>())
        .any(|e| matches!(e, kube::Error::Api(ae) if ae.code == 409))
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
