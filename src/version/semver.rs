// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Agent version strings of the form `X.Y.Z.B-R`.
//!
//! The build component `B` and the revision `R` are optional. Timestamps such as
//! `1.203.0.20200908-220956` parse as `(1, 203, 0, 20200908, 220956)`.

use crate::errors::VersionError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// A parsed, totally ordered agent version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AgentVersion {
    pub major: u64,
    pub minor: u64,
    pub release: u64,
    pub build: u64,
    pub revision: u64,
}

impl AgentVersion {
    fn tuple(&self) -> (u64, u64, u64, u64, u64) {
        (self.major, self.minor, self.release, self.build, self.revision)
    }
}

impl Ord for AgentVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tuple().cmp(&other.tuple())
    }
}

impl PartialOrd for AgentVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AgentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}-{}",
            self.major, self.minor, self.release, self.build, self.revision
        )
    }
}

fn parse_part(version: &str, part: &str, what: &str) -> Result<u64, VersionError> {
    part.parse::<u64>().map_err(|_| VersionError::InvalidVersion {
        version: version.to_string(),
        reason: format!("{what} '{part}' is not a number"),
    })
}

impl FromStr for AgentVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionError::InvalidVersion {
                version: s.to_string(),
                reason: "empty".to_string(),
            });
        }

        let (main, revision) = match trimmed.split_once('-') {
            Some((main, rev)) => (main, Some(rev)),
            None => (trimmed, None),
        };

        let parts: Vec<&str> = main.split('.').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(VersionError::InvalidVersion {
                version: s.to_string(),
                reason: format!("expected 3 or 4 dot separated parts, got {}", parts.len()),
            });
        }

        Ok(Self {
            major: parse_part(s, parts[0], "major")?,
            minor: parse_part(s, parts[1], "minor")?,
            release: parse_part(s, parts[2], "release")?,
            build: parts
                .get(3)
                .map(|b| parse_part(s, b, "build"))
                .transpose()?
                .unwrap_or(0),
            revision: revision
                .map(|r| parse_part(s, r, "revision"))
                .transpose()?
                .unwrap_or(0),
        })
    }
}

/// `true` when moving from `previous` to `latest` would go backwards.
///
/// Equal versions are not a downgrade. An empty `previous` means nothing has
/// been pinned yet and is never a downgrade.
///
/// # Errors
///
/// Returns [`VersionError::InvalidVersion`] if either side fails to parse.
pub fn is_downgrade(component: &str, previous: &str, latest: &str) -> Result<bool, VersionError> {
    if previous.is_empty() {
        return Ok(false);
    }
    let previous_version: AgentVersion = previous.parse()?;
    let latest_version: AgentVersion = latest.parse()?;

    let downgrade = latest_version < previous_version;
    if downgrade {
        info!(
            component = %component,
            previous = %previous,
            latest = %latest,
            "Downgrade detected, keeping current version"
        );
    }
    Ok(downgrade)
}

#[cfg(test)]
#[path = "semver_tests.rs"]
mod semver_tests;
