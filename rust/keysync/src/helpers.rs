//! In-memory [`Directory`] and [`KeyStore`] implementations for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::{
    Directory, DirectoryError, KeyRecord, KeyStore, Principal, PrincipalKind, StoreError,
    SyncError,
};

#[derive(Debug, Clone)]
struct StoredKey {
    id: String,
    material: String,
    active: bool,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: BTreeMap<String, Vec<StoredKey>>,
    groups: BTreeMap<String, Vec<String>>,
    failure: Option<String>,
}

/// A [`Directory`] kept in memory. Users and groups list in name order,
/// group members in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl MemoryDirectory {
    /// Add a user without keys.
    pub async fn add_user(&self, user: &str) {
        self.state
            .write()
            .await
            .users
            .entry(user.to_string())
            .or_default();
    }

    /// Remove a user. Group memberships are kept.
    pub async fn remove_user(&self, user: &str) {
        self.state.write().await.users.remove(user);
    }

    /// Add a key to `user`, creating the user if needed.
    pub async fn add_key(&self, user: &str, key_id: &str, material: &str, active: bool) {
        self.state
            .write()
            .await
            .users
            .entry(user.to_string())
            .or_default()
            .push(StoredKey {
                id: key_id.to_string(),
                material: material.to_string(),
                active,
            });
    }

    /// Create (or replace) a group.
    pub async fn add_group(&self, group: &str, members: &[&str]) {
        self.state.write().await.groups.insert(
            group.to_string(),
            members.iter().map(|member| member.to_string()).collect(),
        );
    }

    /// Remove a group.
    pub async fn remove_group(&self, group: &str) {
        self.state.write().await.groups.remove(group);
    }

    /// Make every subsequent call fail with [`DirectoryError::Unavailable`].
    pub async fn fail_with(&self, message: &str) {
        self.state.write().await.failure = Some(message.to_string());
    }

    fn check(state: &DirectoryState) -> Result<(), DirectoryError> {
        match &state.failure {
            Some(message) => Err(DirectoryError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn list_users(&self) -> Result<Vec<String>, DirectoryError> {
        let state = self.state.read().await;
        Self::check(&state)?;
        Ok(state.users.keys().cloned().collect())
    }

    async fn list_groups(&self) -> Result<Vec<String>, DirectoryError> {
        let state = self.state.read().await;
        Self::check(&state)?;
        Ok(state.groups.keys().cloned().collect())
    }

    async fn list_group_members(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
        let state = self.state.read().await;
        Self::check(&state)?;
        state
            .groups
            .get(group)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("group {}", group)))
    }

    async fn list_active_keys(&self, user: &str) -> Result<Vec<KeyRecord>, DirectoryError> {
        let state = self.state.read().await;
        Self::check(&state)?;
        let keys = state
            .users
            .get(user)
            .ok_or_else(|| DirectoryError::NotFound(format!("user {}", user)))?;

        Ok(keys
            .iter()
            .filter(|key| key.active)
            .map(|key| KeyRecord {
                user: user.to_string(),
                key_id: key.id.clone(),
            })
            .collect())
    }

    async fn get_key_material(&self, user: &str, key_id: &str) -> Result<String, DirectoryError> {
        let state = self.state.read().await;
        Self::check(&state)?;
        state
            .users
            .get(user)
            .and_then(|keys| keys.iter().find(|key| key.id == key_id))
            .map(|key| key.material.clone())
            .ok_or_else(|| DirectoryError::NotFound(format!("key {} of user {}", key_id, user)))
    }
}

/// A [`Directory`] wrapper that counts the lookups made through it.
#[derive(Debug, Clone)]
pub struct MeasuredDirectory<D> {
    inner: D,
    key_listings: Arc<Mutex<HashMap<String, usize>>>,
    material_fetches: Arc<AtomicUsize>,
    member_listings: Arc<AtomicUsize>,
}

impl<D> MeasuredDirectory<D>
where
    D: Directory,
{
    /// Wrap the provided [`Directory`] so that lookups against it may be
    /// measured.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            key_listings: Arc::new(Mutex::new(HashMap::new())),
            material_fetches: Arc::new(AtomicUsize::default()),
            member_listings: Arc::new(AtomicUsize::default()),
        }
    }

    /// The wrapped directory.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// How many times the keys of `user` were listed.
    pub fn key_listings(&self, user: &str) -> usize {
        self.key_listings.lock().get(user).copied().unwrap_or_default()
    }

    /// The aggregate number of key material fetches.
    pub fn material_fetches(&self) -> usize {
        self.material_fetches.load(Ordering::Relaxed)
    }

    /// The aggregate number of group member listings.
    pub fn member_listings(&self) -> usize {
        self.member_listings.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<D> Directory for MeasuredDirectory<D>
where
    D: Directory,
{
    async fn list_users(&self) -> Result<Vec<String>, DirectoryError> {
        self.inner.list_users().await
    }

    async fn list_groups(&self) -> Result<Vec<String>, DirectoryError> {
        self.inner.list_groups().await
    }

    async fn list_group_members(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
        self.member_listings.fetch_add(1, Ordering::Relaxed);
        self.inner.list_group_members(group).await
    }

    async fn list_active_keys(&self, user: &str) -> Result<Vec<KeyRecord>, DirectoryError> {
        *self.key_listings.lock().entry(user.to_string()).or_default() += 1;
        self.inner.list_active_keys(user).await
    }

    async fn get_key_material(&self, user: &str, key_id: &str) -> Result<String, DirectoryError> {
        self.material_fetches.fetch_add(1, Ordering::Relaxed);
        self.inner.get_key_material(user, key_id).await
    }
}

#[derive(Debug, Default)]
struct StoreState {
    files: BTreeMap<Principal, String>,
    writes: Vec<Principal>,
    deletes: Vec<Vec<Principal>>,
    failure: Option<String>,
}

/// A [`KeyStore`] kept in memory that records every write and delete.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryKeyStore {
    /// Store a key file directly, without recording a write.
    pub async fn insert(&self, principal: Principal, content: &str) {
        self.state
            .write()
            .await
            .files
            .insert(principal, content.to_string());
    }

    /// The current key file of `principal`, if any.
    pub async fn file(&self, principal: &Principal) -> Option<String> {
        self.state.read().await.files.get(principal).cloned()
    }

    /// Every principal with a key file, sorted.
    pub async fn principals(&self) -> Vec<Principal> {
        self.state.read().await.files.keys().cloned().collect()
    }

    /// Principals written so far, in write order.
    pub async fn writes(&self) -> Vec<Principal> {
        self.state.read().await.writes.clone()
    }

    /// Every delete call so far. Single deletes are recorded as batches of one.
    pub async fn deletes(&self) -> Vec<Vec<Principal>> {
        self.state.read().await.deletes.clone()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub async fn fail_with(&self, message: &str) {
        self.state.write().await.failure = Some(message.to_string());
    }

    fn check(state: &StoreState) -> Result<(), StoreError> {
        match &state.failure {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<Principal>, SyncError> {
        let state = self.state.read().await;
        Self::check(&state)?;
        Ok(state
            .files
            .keys()
            .filter(|principal| principal.kind() == kind)
            .cloned()
            .collect())
    }

    async fn write_key_file(&self, principal: &Principal, content: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        Self::check(&state)?;
        state.files.insert(principal.clone(), content.to_string());
        state.writes.push(principal.clone());
        Ok(())
    }

    async fn delete_key_file(&self, principal: &Principal) -> Result<(), StoreError> {
        self.delete_key_files(std::slice::from_ref(principal)).await
    }

    async fn delete_key_files(&self, principals: &[Principal]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        Self::check(&state)?;
        for principal in principals {
            state.files.remove(principal);
        }
        state.deletes.push(principals.to_vec());
        Ok(())
    }
}
