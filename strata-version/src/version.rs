#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::VersionError;

fn version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^v?(\d+)(\.(\d+))?(\.(\d+))?(-([A-Za-z0-9.\-]+))?(\+([A-Za-z0-9.\-]+))?$")
            .expect("version pattern compiles")
    })
}

/// A semantic version. Backed by `semver::Version`; ordering and equality
/// ignore build metadata, and prereleases compare as plain strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version {
    inner: semver::Version,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            inner: semver::Version::new(major, minor, patch),
        }
    }

    /// Parse `[:]` `[v]` `major[.minor[.patch]][-pre][+build]`. Missing minor
    /// and patch default to zero.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim().trim_start_matches(':');
        let caps = version_pattern()
            .captures(text)
            .ok_or_else(|| VersionError::InvalidVersion(input.to_string()))?;

        let major = caps[1]
            .parse::<u64>()
            .map_err(|_| VersionError::InvalidVersion(input.to_string()))?;
        let minor = caps
            .get(3)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map_err(|_| VersionError::InvalidVersion(input.to_string()))?
            .unwrap_or(0);
        let patch = caps
            .get(5)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map_err(|_| VersionError::InvalidVersion(input.to_string()))?
            .unwrap_or(0);

        let mut inner = semver::Version::new(major, minor, patch);
        if let Some(pre) = caps.get(7) {
            inner.pre = semver::Prerelease::new(pre.as_str())
                .map_err(|_| VersionError::InvalidVersion(input.to_string()))?;
        }
        if let Some(build) = caps.get(9) {
            inner.build = semver::BuildMetadata::new(build.as_str())
                .map_err(|_| VersionError::InvalidVersion(input.to_string()))?;
        }
        Ok(Self { inner })
    }

    pub fn major(&self) -> u64 {
        self.inner.major
    }

    pub fn minor(&self) -> u64 {
        self.inner.minor
    }

    pub fn patch(&self) -> u64 {
        self.inner.patch
    }

    pub fn prerelease(&self) -> Option<&str> {
        if self.inner.pre.is_empty() {
            None
        } else {
            Some(self.inner.pre.as_str())
        }
    }

    pub fn build(&self) -> Option<&str> {
        if self.inner.build.is_empty() {
            None
        } else {
            Some(self.inner.build.as_str())
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.inner.pre.is_empty()
    }

    /// Registry key: `major.minor.patch[-pre]`, build metadata dropped.
    pub fn canonical_key(&self) -> String {
        match self.prerelease() {
            Some(pre) => format!(
                "{}.{}.{}-{pre}",
                self.inner.major, self.inner.minor, self.inner.patch
            ),
            None => format!(
                "{}.{}.{}",
                self.inner.major, self.inner.minor, self.inner.patch
            ),
        }
    }

    pub fn next_major(&self) -> Version {
        Version::new(self.inner.major + 1, 0, 0)
    }

    pub fn next_minor(&self) -> Version {
        Version::new(self.inner.major, self.inner.minor + 1, 0)
    }

    pub fn same_triple(&self, other: &Version) -> bool {
        self.inner.major == other.inner.major
            && self.inner.minor == other.inner.minor
            && self.inner.patch == other.inner.patch
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.inner.major, self.inner.minor, self.inner.patch
        )?;
        if let Some(pre) = self.prerelease() {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = self.build() {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

// Build metadata is excluded so that equality agrees with ordering.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.same_triple(other) && self.inner.pre == other.inner.pre
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.major.hash(state);
        self.inner.minor.hash(state);
        self.inner.patch.hash(state);
        self.inner.pre.as_str().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let triple = (self.inner.major, self.inner.minor, self.inner.patch).cmp(&(
            other.inner.major,
            other.inner.minor,
            other.inner.patch,
        ));
        if triple != Ordering::Equal {
            return triple;
        }
        // A release outranks any prerelease of the same triple; two
        // prereleases compare as plain strings.
        match (self.prerelease(), other.prerelease()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
