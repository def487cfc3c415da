use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Permission granted to a repository member who is not the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ReadWrite => "read-write",
        }
    }

    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "read-write" => Ok(Self::ReadWrite),
            other => Err(Error::InvalidPermission(other.to_string())),
        }
    }
}

/// What an account may do with a repository once ownership and membership
/// have been resolved. Ownership supersedes any member row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectivePermission {
    Owner,
    Member(Permission),
}

impl EffectivePermission {
    /// Every resolved permission includes read access.
    #[must_use]
    pub const fn allows_read(self) -> bool {
        true
    }

    #[must_use]
    pub const fn allows_write(self) -> bool {
        match self {
            Self::Owner => true,
            Self::Member(p) => p.allows_write(),
        }
    }
}
