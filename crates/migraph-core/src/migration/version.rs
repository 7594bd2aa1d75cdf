//! Product versions used by the version-filtered runner.

use std::fmt;
use std::str::FromStr;

use semver::{Prerelease, Version};
use serde::{Deserialize, Serialize};

use super::error::MigrationError;

/// A semantic version that also accepts `7` and `7.3` as shorthand.
///
/// Ordering follows semver precedence: a pre-release sorts before the
/// release with the same numbers, and numeric pre-release identifiers
/// compare as numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemVersion(Version);

impl SemVersion {
    /// Create a release version.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// The zero version, used for databases that were never migrated.
    pub const fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Attach a pre-release label such as `beta.2`.
    pub fn with_pre(mut self, pre: &str) -> Result<Self, MigrationError> {
        self.0.pre =
            Prerelease::new(pre).map_err(|_| MigrationError::InvalidVersion(pre.to_string()))?;
        Ok(self)
    }

    /// The underlying semver version.
    pub fn as_version(&self) -> &Version {
        &self.0
    }
}

impl From<Version> for SemVersion {
    fn from(version: Version) -> Self {
        Self(version)
    }
}

impl fmt::Display for SemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SemVersion {
    type Err = MigrationError;

    /// Parse a full semver string, or `1` / `1.2` with the missing parts
    /// taken as zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(['-', '+']).unwrap_or(s.len());
        let (numbers, suffix) = s.split_at(split);

        let mut padded = numbers.to_string();
        for _ in numbers.split('.').count()..3 {
            padded.push_str(".0");
        }
        padded.push_str(suffix);

        Version::parse(&padded)
            .map(Self)
            .map_err(|_| MigrationError::InvalidVersion(s.to_string()))
    }
}
