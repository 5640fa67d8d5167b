use std::fmt;
use std::str::FromStr;

use crate::SyncError;

/// Name of the object holding a principal's keys.
pub const KEY_FILE_NAME: &str = "authorized_keys";

/// Whether a principal is a single user or a group of users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrincipalKind {
    /// An individual user
    User,
    /// A group whose members' keys are combined
    Group,
}

impl PrincipalKind {
    /// The path segment used for this kind in the key store.
    pub fn prefix(&self) -> &'static str {
        match self {
            PrincipalKind::User => "users",
            PrincipalKind::Group => "groups",
        }
    }
}

impl FromStr for PrincipalKind {
    type Err = SyncError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "users" => Ok(PrincipalKind::User),
            "groups" => Ok(PrincipalKind::Group),
            other => Err(SyncError::UnsupportedPrincipalType(other.to_string())),
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A user or group subject to key synchronization.
///
/// Principals are written `users/<name>` or `groups/<name>`. Equality and
/// ordering cover both kind and name, so a user and a group may share a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal {
    kind: PrincipalKind,
    name: String,
}

impl Principal {
    /// Create a principal, rejecting names that are empty or contain `/`.
    pub fn new(kind: PrincipalKind, name: impl Into<String>) -> Result<Self, SyncError> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(SyncError::InvalidPrincipalName(name));
        }
        Ok(Self { kind, name })
    }

    /// Shorthand for a [`PrincipalKind::User`] principal.
    pub fn user(name: impl Into<String>) -> Result<Self, SyncError> {
        Self::new(PrincipalKind::User, name)
    }

    /// Shorthand for a [`PrincipalKind::Group`] principal.
    pub fn group(name: impl Into<String>) -> Result<Self, SyncError> {
        Self::new(PrincipalKind::Group, name)
    }

    /// The kind of principal.
    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// The user or group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object key of this principal's key file, e.g. `users/alice/authorized_keys`.
    pub fn key_path(&self) -> String {
        format!("{}/{}", self, KEY_FILE_NAME)
    }
}

impl FromStr for Principal {
    type Err = SyncError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let (kind, name) = path
            .split_once('/')
            .ok_or_else(|| SyncError::UnsupportedPrincipalType(path.to_string()))?;
        Principal::new(kind.parse()?, name)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_users_and_groups() -> anyhow::Result<()> {
        let alice: Principal = "users/alice".parse()?;
        assert_eq!(alice.kind(), PrincipalKind::User);
        assert_eq!(alice.name(), "alice");

        let ops: Principal = "groups/ops".parse()?;
        assert_eq!(ops.kind(), PrincipalKind::Group);
        assert_eq!(ops.to_string(), "groups/ops");
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_kinds() {
        for path in ["roles/admin", "alice", "Users/alice", ""] {
            let result = path.parse::<Principal>();
            assert!(
                matches!(result, Err(SyncError::UnsupportedPrincipalType(_))),
                "{path:?} parsed as {result:?}"
            );
        }
    }

    #[test]
    fn it_rejects_empty_and_nested_names() {
        for path in ["users/", "groups/a/b"] {
            let result = path.parse::<Principal>();
            assert!(
                matches!(result, Err(SyncError::InvalidPrincipalName(_))),
                "{path:?} parsed as {result:?}"
            );
        }
    }

    #[test]
    fn it_places_key_files_below_the_principal() -> anyhow::Result<()> {
        assert_eq!(
            Principal::user("jane+doe@example.com")?.key_path(),
            "users/jane+doe@example.com/authorized_keys"
        );
        assert_eq!(
            Principal::group("ops")?.key_path(),
            "groups/ops/authorized_keys"
        );
        Ok(())
    }

    #[test]
    fn it_distinguishes_users_and_groups_with_the_same_name() -> anyhow::Result<()> {
        assert_ne!(Principal::user("ops")?, Principal::group("ops")?);
        Ok(())
    }
}
