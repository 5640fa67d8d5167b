use async_trait::async_trait;
use keysync_iam::{Iam, KeyStatus};

use crate::DirectoryError;

/// An active SSH key of a user, without its material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// The owning user
    pub user: String,
    /// The directory's identifier for the key
    pub key_id: String,
}

/// A source of principals and their SSH public keys.
///
/// Listings are taken at call time; an entity returned by one call may be
/// gone by the next, in which case lookups fail with
/// [`DirectoryError::NotFound`].
#[async_trait]
pub trait Directory: Send + Sync {
    /// Every user name.
    async fn list_users(&self) -> Result<Vec<String>, DirectoryError>;

    /// Every group name.
    async fn list_groups(&self) -> Result<Vec<String>, DirectoryError>;

    /// Members of `group`, in directory listing order.
    async fn list_group_members(&self, group: &str) -> Result<Vec<String>, DirectoryError>;

    /// Keys of `user` whose status is active.
    async fn list_active_keys(&self, user: &str) -> Result<Vec<KeyRecord>, DirectoryError>;

    /// The OpenSSH encoded material (`<format> <base64>`) of one key.
    async fn get_key_material(&self, user: &str, key_id: &str) -> Result<String, DirectoryError>;
}

#[async_trait]
impl Directory for Iam {
    async fn list_users(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(Iam::list_users(self)
            .await?
            .into_iter()
            .map(|user| user.user_name)
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(Iam::list_groups(self)
            .await?
            .into_iter()
            .map(|group| group.group_name)
            .collect())
    }

    async fn list_group_members(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
        Ok(self
            .get_group(group)
            .await?
            .into_iter()
            .map(|user| user.user_name)
            .collect())
    }

    async fn list_active_keys(&self, user: &str) -> Result<Vec<KeyRecord>, DirectoryError> {
        Ok(self
            .list_ssh_public_keys(user)
            .await?
            .into_iter()
            .filter(|key| key.status == KeyStatus::Active)
            .map(|key| KeyRecord {
                user: key.user_name,
                key_id: key.ssh_public_key_id,
            })
            .collect())
    }

    async fn get_key_material(&self, user: &str, key_id: &str) -> Result<String, DirectoryError> {
        Ok(self
            .get_ssh_public_key(user, key_id)
            .await?
            .ssh_public_key_body)
    }
}
