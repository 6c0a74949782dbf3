// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pod mutation webhook.
//!
//! Serves a mutating admission endpoint that injects the agent, metadata
//! enrichment and the data ingest endpoint into pods of namespaces governed
//! by a `DynaKube`.
//!
//! Routes:
//! - `POST /inject`: `AdmissionReview` for pods
//! - `GET /livez`: liveness

pub mod dataingest;
pub mod handler;
pub mod install_container;
pub mod metadata;
pub mod oneagent;
pub mod request;
pub mod workload;

#[cfg(test)]
pub(crate) mod test_fixtures;

use crate::cluster::Cluster;
use crate::errors::WebhookError;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub use dataingest::DataIngestMutator;
pub use metadata::MetadataMutator;
pub use oneagent::OneAgentMutator;
pub use request::{BaseRequest, MutationRequest};

/// One independent step of the pod transformation.
#[async_trait]
pub trait PodMutator: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether this mutator applies to the pod at all.
    fn enabled(&self, request: &BaseRequest) -> bool;

    /// Whether an earlier admission already ran this mutator.
    fn injected(&self, request: &BaseRequest) -> bool;

    /// First-pass mutation. Unmet preconditions are recorded on the pod and
    /// reported as `Ok`.
    async fn mutate(&self, request: &mut MutationRequest) -> Result<(), WebhookError>;

    /// Reinvocation pass. Only touches containers not yet carrying this
    /// mutator's sentinel; returns `true` when the pod changed.
    fn reinvoke(&self, request: &mut BaseRequest) -> bool;
}

/// Settings of the webhook process.
#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// Namespace the `DynaKube` resources live in.
    pub namespace: String,
    /// UID of the `kube-system` namespace, reported as orchestrator id.
    pub cluster_id: String,
    /// Image of the install init container.
    pub webhook_image: String,
}

/// Shared state of the admission handlers.
pub struct WebhookState {
    pub cluster: Arc<dyn Cluster>,
    pub config: WebhookConfig,
    pub mutators: Vec<Box<dyn PodMutator>>,
}

impl WebhookState {
    /// State with the built-in mutators in their fixed order.
    #[must_use]
    pub fn new(cluster: Arc<dyn Cluster>, config: WebhookConfig) -> Self {
        let mutators: Vec<Box<dyn PodMutator>> = vec![
            Box::new(OneAgentMutator::new(config.cluster_id.clone())),
            Box::new(MetadataMutator::new(Arc::clone(&cluster))),
            Box::new(DataIngestMutator::new(Arc::clone(&cluster))),
        ];
        Self::with_mutators(cluster, config, mutators)
    }

    #[must_use]
    pub fn with_mutators(
        cluster: Arc<dyn Cluster>,
        config: WebhookConfig,
        mutators: Vec<Box<dyn PodMutator>>,
    ) -> Self {
        Self {
            cluster,
            config,
            mutators,
        }
    }
}

/// Router of the webhook server.
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/inject", post(handler::inject))
        .route("/livez", get(livez))
        .with_state(state)
}

async fn livez() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
