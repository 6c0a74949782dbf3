// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for the operator's custom resources.
//!
//! # Reconciliation Architecture
//!
//! Each pass follows the standard Kubernetes controller pattern:
//!
//! 1. **Observe** - Read the resource and everything it references
//! 2. **Resolve** - Pin component versions and connection info into status
//! 3. **Apply** - Create or update owned ConfigMaps and workloads
//! 4. **Status** - Write conditions and phase back once per pass
//!
//! # Available Reconcilers
//!
//! - [`reconcile_dynakube`] - Versions, connection info, namespace mapping and
//!   the telemetry collector of a `DynaKube`
//! - [`reconcile_edge_connect`] - Version and deployment of an `EdgeConnect`
//!
//! All reconcilers go through the [`Cluster`](crate::cluster::Cluster) trait,
//! so unit tests run them against an in-memory cluster.

pub mod collector;
pub mod connectioninfo;
pub mod dynakube;
pub mod edgeconnect;
pub mod namespaces;
pub mod resources;
pub mod status;

pub use collector::reconcile_collector;
pub use dynakube::reconcile_dynakube;
pub use edgeconnect::reconcile_edge_connect;
