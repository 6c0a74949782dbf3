// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! OpenTelemetry collector.
//!
//! - [`config`] - pipeline configuration rendering
//! - [`statefulset`] - `StatefulSet` and `ConfigMap` builders

pub mod config;
pub mod statefulset;
