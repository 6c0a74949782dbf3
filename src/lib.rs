// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # dynakube-operator - Dynatrace Operator for Kubernetes
//!
//! A Kubernetes operator and pod-injection webhook for the Dynatrace
//! observability agent, driven by the `DynaKube` and `EdgeConnect` custom
//! resources.
//!
//! ## Overview
//!
//! This library provides:
//!
//! - Custom Resource Definitions for `DynaKube` and `EdgeConnect`
//! - Version resolution of every deployable component against the tenant API
//!   and image registries
//! - Generation of the OpenTelemetry collector configuration and workload
//! - A mutating admission webhook injecting the agent, metadata enrichment and
//!   the data ingest endpoint into pods
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`version`] - Component version resolution
//! - [`otelc`] - Collector configuration and `StatefulSet`
//! - [`webhook`] - Pod mutation webhook
//! - [`cluster`] - Kubernetes access behind a trait
//! - [`context`] - Shared context for controllers
//!
//! ## Example
//!
//! ```rust,no_run
//! use dynakube_operator::crd::{DynaKube, DynaKubeSpec, TelemetryIngestSpec};
//!
//! let dk = DynaKube::new(
//!     "dynakube",
//!     DynaKubeSpec {
//!         api_url: "https://abc123.live.dynatrace.com/api".to_string(),
//!         telemetry_ingest: Some(TelemetryIngestSpec::default()),
//!         ..DynaKubeSpec::default()
//!     },
//! );
//! assert_eq!(dk.otel_collector_statefulset_name(), "dynakube-otel-collector");
//! ```

pub mod cluster;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod feature_flags;
pub mod hash;
pub mod labels;
pub mod metrics;
pub mod otelc;
pub mod reconcilers;
pub mod selector;
pub mod status_reasons;
pub mod timeprovider;
pub mod version;
pub mod webhook;

#[cfg(test)]
pub mod cluster_fake;

#[cfg(test)]
mod status_reasons_tests;
