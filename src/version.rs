use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a string cannot be parsed as a [`Version`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid version string")]
pub struct ParseVersionError(pub String);

/// A numeric version of the form `major.minor[.build[.revision]]`.
///
/// Ordering is field-wise numeric. An absent trailing field orders before a
/// zero-valued one, so `1.0 < 1.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub build: Option<u64>,
    pub revision: Option<u64>,
}

impl Version {
    pub fn new(major: u64, minor: u64) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    pub fn with_build(major: u64, minor: u64, build: u64) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: None,
        }
    }

    pub fn with_revision(major: u64, minor: u64, build: u64, revision: u64) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: Some(revision),
        }
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError(s.to_string());

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid());
        }

        let mut numbers = Vec::with_capacity(parts.len());
        for part in &parts {
            // `u64::from_str` would accept a leading '+'; versions must be
            // plain decimal digits.
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            numbers.push(part.parse::<u64>().map_err(|_| invalid())?);
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            build: numbers.get(2).copied(),
            revision: numbers.get(3).copied(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}
