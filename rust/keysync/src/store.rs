use async_trait::async_trait;
use keysync_s3::Bucket;

use crate::{Principal, PrincipalKind, StoreError, SyncError};

/// Where principal key files are published.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Principals of `kind` that currently have a key file. An entry that
    /// does not parse as a principal fails the listing.
    async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<Principal>, SyncError>;

    /// Write (unconditionally overwrite) the key file of `principal`.
    async fn write_key_file(&self, principal: &Principal, content: &str) -> Result<(), StoreError>;

    /// Delete the key file of `principal`. Deleting a missing file succeeds.
    async fn delete_key_file(&self, principal: &Principal) -> Result<(), StoreError>;

    /// Delete the key files of every principal in one batch operation.
    async fn delete_key_files(&self, principals: &[Principal]) -> Result<(), StoreError>;
}

#[async_trait]
impl KeyStore for Bucket {
    async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<Principal>, SyncError> {
        let prefix = format!("{}/", kind.prefix());

        self.list_prefixes(&prefix)
            .await
            .map_err(StoreError::from)?
            .iter()
            .map(|path| path.parse::<Principal>())
            .collect()
    }

    async fn write_key_file(&self, principal: &Principal, content: &str) -> Result<(), StoreError> {
        self.put(&principal.key_path(), content).await?;
        Ok(())
    }

    async fn delete_key_file(&self, principal: &Principal) -> Result<(), StoreError> {
        self.delete(&principal.key_path()).await?;
        Ok(())
    }

    async fn delete_key_files(&self, principals: &[Principal]) -> Result<(), StoreError> {
        let keys: Vec<String> = principals.iter().map(Principal::key_path).collect();
        self.delete_objects(&keys).await?;
        Ok(())
    }
}
