//! One reconciliation pass: converge the key store onto the directory.
//!
//! A pass lists stored and live principals concurrently, deletes the key
//! files of principals that left the directory in a single batch and, at the
//! same time, rewrites the key file of every live principal. Both phases
//! work from the listings taken at the start of the pass. Key files are
//! always rewritten, so running a pass twice against an unchanged directory
//! leaves the store unchanged.

use std::collections::BTreeSet;
use std::path::Path;

use futures_util::{StreamExt, join, stream, try_join};

use crate::{
    Directory, KeyStore, Principal, PrincipalKind, ResolutionCache, Resolver, RunLock, SyncError,
    render_key_file,
};

/// Default number of principals resolved and uploaded at the same time.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Detail reported by a successful pass.
pub const SUCCESS_DETAIL: &str = "done!";

/// Detail reported when a pass is skipped because another one holds the lock.
pub const SKIPPED_DETAIL: &str = "skipped: another run is in progress";

/// What a successful pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Principals whose key files were deleted, sorted
    pub deleted: Vec<Principal>,
    /// Principals whose key files were written, sorted
    pub written: Vec<Principal>,
}

/// The externally visible result of one triggered pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the pass completed without error
    pub succeeded: bool,
    /// [`SUCCESS_DETAIL`] on success, otherwise a description of the first error
    pub detail: String,
}

impl Outcome {
    /// A successful outcome with the given detail.
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            detail: detail.into(),
        }
    }

    /// A failed outcome with the given detail.
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            detail: detail.into(),
        }
    }
}

impl From<Result<Report, SyncError>> for Outcome {
    fn from(result: Result<Report, SyncError>) -> Self {
        match result {
            Ok(_) => Outcome::success(SUCCESS_DETAIL),
            Err(error) => Outcome::failure(error.to_string()),
        }
    }
}

/// Drives reconciliation passes of a [`KeyStore`] against a [`Directory`].
///
/// The reconciler holds no state between passes; every pass starts with a
/// fresh [`ResolutionCache`].
#[derive(Debug, Clone)]
pub struct Reconciler<D, S> {
    directory: D,
    store: S,
    concurrency: usize,
}

impl<D, S> Reconciler<D, S>
where
    D: Directory,
    S: KeyStore,
{
    /// Create a reconciler with [`DEFAULT_CONCURRENCY`].
    pub fn new(directory: D, store: S) -> Self {
        Self {
            directory,
            store,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Limit how many principals are resolved and uploaded at the same time.
    /// `0` removes the limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// The directory principals are read from.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// The store key files are written to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass and report what changed.
    ///
    /// Deletion and every upload run to completion even when some of them
    /// fail; the pass then reports the first error. Files already written or
    /// deleted stay that way and the next pass converges the rest.
    pub async fn sync(&self) -> Result<Report, SyncError> {
        tracing::info!("listing principals");
        let (stored, live) = try_join!(self.stored_principals(), self.live_principals())?;

        let stale: Vec<Principal> = stored.difference(&live).cloned().collect();
        tracing::info!(
            stored = stored.len(),
            live = live.len(),
            stale = stale.len(),
            "reconciling"
        );

        let cache = ResolutionCache::new();
        let resolver = Resolver::new(&self.directory, &cache);

        let delete = async {
            if !stale.is_empty() {
                if let Err(error) = self.store.delete_key_files(&stale).await {
                    tracing::warn!(%error, stale = stale.len(), "could not delete key files");
                    return Err(SyncError::from(error));
                }
                for principal in &stale {
                    tracing::info!(%principal, "deleted key file");
                }
            }
            Ok(stale.clone())
        };

        let limit = match self.concurrency {
            0 => live.len().max(1),
            limit => limit,
        };
        let upload = stream::iter(&live)
            .map(|principal| self.publish(&resolver, principal))
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        let (deleted, uploads) = join!(delete, upload);

        let deleted = deleted?;
        let mut written = uploads.into_iter().collect::<Result<Vec<_>, _>>()?;
        written.sort();

        Ok(Report { deleted, written })
    }

    async fn publish(
        &self,
        resolver: &Resolver<'_, D>,
        principal: &Principal,
    ) -> Result<Principal, SyncError> {
        let result = async {
            let keys = resolver.resolve(principal).await?;
            self.store
                .write_key_file(principal, &render_key_file(&keys))
                .await?;
            Ok::<_, SyncError>(keys.len())
        }
        .await;

        match result {
            Ok(keys) => {
                tracing::info!(%principal, keys, "wrote key file");
                Ok(principal.clone())
            }
            Err(error) => {
                tracing::warn!(%principal, %error, "could not write key file");
                Err(error)
            }
        }
    }

    /// Run one pass and fold its result into an [`Outcome`].
    pub async fn run(&self) -> Outcome {
        let result = self.sync().await;
        match &result {
            Ok(report) => tracing::info!(
                deleted = report.deleted.len(),
                written = report.written.len(),
                "sync succeeded"
            ),
            Err(error) => tracing::error!(%error, "sync failed"),
        }
        result.into()
    }

    /// Run one pass unless another process holds the lock at `lock_path`.
    ///
    /// A skipped pass is reported as succeeded with [`SKIPPED_DETAIL`].
    /// Without a lock path this is [`Reconciler::run`].
    pub async fn run_exclusive(&self, lock_path: Option<&Path>) -> Outcome {
        let Some(path) = lock_path else {
            return self.run().await;
        };

        match RunLock::acquire(path) {
            Ok(Some(_lock)) => self.run().await,
            Ok(None) => {
                tracing::warn!(path = %path.display(), "previous run still in progress, skipping");
                Outcome::success(SKIPPED_DETAIL)
            }
            Err(error) => {
                tracing::error!(%error, "could not take run lock");
                Outcome::failure(error.to_string())
            }
        }
    }

    /// Run one pass and hand its [`Outcome`] to `callback`.
    pub async fn trigger<F>(&self, callback: F)
    where
        F: FnOnce(Outcome),
    {
        callback(self.run().await)
    }

    async fn stored_principals(&self) -> Result<BTreeSet<Principal>, SyncError> {
        let (users, groups) = try_join!(
            self.store.list_principals(PrincipalKind::User),
            self.store.list_principals(PrincipalKind::Group),
        )?;
        Ok(users.into_iter().chain(groups).collect())
    }

    async fn live_principals(&self) -> Result<BTreeSet<Principal>, SyncError> {
        let (users, groups) = try_join!(self.directory.list_users(), self.directory.list_groups())?;

        let mut live = BTreeSet::new();
        for user in users {
            live.insert(Principal::user(user)?);
        }
        for group in groups {
            live.insert(Principal::group(group)?);
        }
        Ok(live)
    }
}
