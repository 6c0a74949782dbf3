// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` that contains:
//! - The [`Cluster`] used for all reads and writes
//! - The [`ClientFactory`] building tenant API and registry clients
//! - The clock used for status timestamps
//! - The operator settings parsed from the command line

use crate::cluster::{Cluster, KubeCluster};
use crate::reconcilers::{reconcile_dynakube, reconcile_edge_connect};
use crate::crd::{DynaKube, EdgeConnect};
use crate::timeprovider::TimeProvider;
use crate::version::{ClientFactory, ReqwestClientFactory};
use kube::runtime::controller::Action;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;

/// Settings of the operator process.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace the operator and its custom resources live in.
    pub namespace: String,
    /// Listen address of the `/metrics` endpoint.
    pub metrics_addr: SocketAddr,
}

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes access for reconcilers
    pub cluster: Arc<dyn Cluster>,

    /// Builds HTTP clients for the tenant API and image registries
    pub clients: Arc<dyn ClientFactory>,

    /// Source of "now" for probe timestamps
    pub time: TimeProvider,

    pub config: OperatorConfig,
}

impl Context {
    /// Context backed by the API server and real HTTP clients.
    #[must_use]
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self::with_parts(
            Arc::new(KubeCluster::new(client)),
            Arc::new(ReqwestClientFactory),
            TimeProvider::new(),
            config,
        )
    }

    #[must_use]
    pub fn with_parts(
        cluster: Arc<dyn Cluster>,
        clients: Arc<dyn ClientFactory>,
        time: TimeProvider,
        config: OperatorConfig,
    ) -> Self {
        Self {
            cluster,
            clients,
            time,
            config,
        }
    }

    /// Run one `DynaKube` reconcile pass.
    ///
    /// # Errors
    ///
    /// Returns the error of the pass; the status has already been written.
    pub async fn reconcile_dynakube(&self, dk: &DynaKube) -> anyhow::Result<Action> {
        reconcile_dynakube(self.cluster.as_ref(), self.clients.as_ref(), &self.time, dk).await
    }

    /// Run one `EdgeConnect` reconcile pass.
    ///
    /// # Errors
    ///
    /// Returns the error of the pass; the status has already been written.
    pub async fn reconcile_edge_connect(&self, ec: &EdgeConnect) -> anyhow::Result<Action> {
        reconcile_edge_connect(self.cluster.as_ref(), self.clients.as_ref(), &self.time, ec).await
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
