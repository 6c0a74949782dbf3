// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Clock used by the version resolver.
//!
//! Probe timestamps are stored as RFC3339 strings in status. The provider can
//! be frozen so repeated reconciles in tests observe the same instant.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Source of "now" for status timestamps.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeProvider {
    frozen: Option<DateTime<Utc>>,
}

impl TimeProvider {
    /// A provider following the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self { frozen: None }
    }

    /// A provider pinned to `at`.
    #[must_use]
    pub fn frozen_at(at: DateTime<Utc>) -> Self {
        Self { frozen: Some(at) }
    }

    /// Pin the provider to the current instant.
    pub fn freeze(&mut self) {
        self.frozen = Some(Utc::now());
    }

    /// Move a frozen clock forward. No effect on a live clock.
    pub fn advance(&mut self, by: Duration) {
        if let Some(at) = self.frozen {
            self.frozen = Some(at + ChronoDuration::from_std(by).unwrap_or_default());
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.frozen.unwrap_or_else(Utc::now)
    }

    /// Current instant formatted for status fields.
    #[must_use]
    pub fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }

    /// True when `last` is missing, unparsable or older than `threshold`.
    #[must_use]
    pub fn is_outdated(&self, last: Option<&str>, threshold: Duration) -> bool {
        let Some(last) = last.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok()) else {
            return true;
        };
        let threshold = ChronoDuration::from_std(threshold).unwrap_or_default();
        self.now() - last.with_timezone(&Utc) >= threshold
    }
}

#[cfg(test)]
#[path = "timeprovider_tests.rs"]
mod timeprovider_tests;
