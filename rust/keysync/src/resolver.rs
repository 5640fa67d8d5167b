//! Resolution of principals into authorized key lines.
//!
//! A user resolves to one line per active key. A group resolves to the lines
//! of each of its members, in member order, with each member's lines kept
//! together. User resolutions are memoized in a [`ResolutionCache`] owned by
//! a single reconciliation pass, so a user reached directly and through any
//! number of groups is looked up in the directory exactly once per pass.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::{Mutex, OnceCell};

use crate::{Directory, Principal, PrincipalKind, SyncError};

/// One line of an `authorized_keys` file.
///
/// Rendered as `environment="SSH_KEY_OWNER=<owner>" <key> <owner>`, which
/// lets the login session see whose key was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    owner: String,
    key: String,
}

impl AuthorizedKey {
    /// Create a line for `key` (`<format> <base64>`) owned by `owner`.
    pub fn new(owner: impl Into<String>, key: impl AsRef<str>) -> Self {
        Self {
            owner: owner.into(),
            key: key.as_ref().trim().to_string(),
        }
    }

    /// The user the key belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl fmt::Display for AuthorizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "environment=\"SSH_KEY_OWNER={}\" {} {}",
            self.owner, self.key, self.owner
        )
    }
}

/// Render the content of a principal key file: one line per key, each
/// terminated by a newline. No keys renders as a lone `"\n"`.
pub fn render_key_file(keys: &[AuthorizedKey]) -> String {
    let lines: Vec<String> = keys.iter().map(AuthorizedKey::to_string).collect();
    format!("{}\n", lines.join("\n"))
}

type Entry = Arc<OnceCell<Vec<AuthorizedKey>>>;

/// Per-pass memo of resolved users.
///
/// Each user gets one cell; the first resolution fills it and concurrent
/// resolutions of the same user wait for that result instead of querying the
/// directory again. A failed resolution leaves the cell empty.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResolutionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users resolved so far.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }

    /// Whether no user has been resolved yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn entry(&self, user: &str) -> Entry {
        let mut entries = self.entries.lock().await;
        entries.entry(user.to_string()).or_default().clone()
    }
}

/// Resolves principals against a [`Directory`], memoizing users in a
/// [`ResolutionCache`].
pub struct Resolver<'a, D> {
    directory: &'a D,
    cache: &'a ResolutionCache,
}

impl<'a, D> Resolver<'a, D>
where
    D: Directory,
{
    /// Create a resolver for one pass.
    pub fn new(directory: &'a D, cache: &'a ResolutionCache) -> Self {
        Self { directory, cache }
    }

    /// All authorized key lines of `principal`.
    pub async fn resolve(&self, principal: &Principal) -> Result<Vec<AuthorizedKey>, SyncError> {
        match principal.kind() {
            PrincipalKind::User => self.resolve_user(principal.name()).await,
            PrincipalKind::Group => self.resolve_group(principal.name()).await,
        }
    }

    async fn resolve_user(&self, user: &str) -> Result<Vec<AuthorizedKey>, SyncError> {
        let entry = self.cache.entry(user).await;
        if let Some(keys) = entry.get() {
            tracing::debug!(user, "resolution cache hit");
            return Ok(keys.clone());
        }

        let keys = entry
            .get_or_try_init(|| async {
                let records = self.directory.list_active_keys(user).await?;
                let materials = try_join_all(records.iter().map(|record| {
                    self.directory
                        .get_key_material(&record.user, &record.key_id)
                }))
                .await?;

                Ok::<_, SyncError>(
                    materials
                        .iter()
                        .map(|material| AuthorizedKey::new(user, material))
                        .collect::<Vec<_>>(),
                )
            })
            .await?;

        Ok(keys.clone())
    }

    async fn resolve_group(&self, group: &str) -> Result<Vec<AuthorizedKey>, SyncError> {
        let members = self.directory.list_group_members(group).await?;
        let resolved = try_join_all(members.iter().map(|member| self.resolve_user(member))).await?;
        Ok(resolved.into_iter().flatten().collect())
    }
}
