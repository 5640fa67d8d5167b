#![warn(missing_docs)]

//! AWS IAM client for the identity directory side of key synchronization.
//!
//! [`Iam`] speaks the IAM Query API (version `2010-05-08`): every call is a
//! presigned `GET` carrying an `Action` and its parameters, answered with an
//! XML document. Only the read-only actions needed to enumerate principals
//! and their SSH public keys are implemented. All list calls follow
//! `Marker`/`IsTruncated` pagination until exhausted.
//!
//! ```no_run
//! use keysync_credentials::Credentials;
//! use keysync_iam::Iam;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let iam = Iam::aws(Credentials::from_env()?)?;
//!
//! for user in iam.list_users().await? {
//!     for key in iam.list_ssh_public_keys(&user.user_name).await? {
//!         let key = iam.get_ssh_public_key(&user.user_name, &key.ssh_public_key_id).await?;
//!         println!("{}", key.ssh_public_key_body);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use keysync_credentials::{AuthorizationError, Session};
use thiserror::Error;
use url::Url;

mod action;
pub use action::*;

mod response;
use response::ErrorResponse;
pub use response::*;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;

/// The global IAM endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://iam.amazonaws.com";

/// IAM is a global service signed in `us-east-1`.
pub const SIGNING_REGION: &str = "us-east-1";

/// The Query API version spoken by this client.
pub const API_VERSION: &str = "2010-05-08";

/// Errors that can occur when talking to IAM
#[derive(Error, Debug)]
pub enum IamError {
    /// The named user, group or key does not exist (IAM `NoSuchEntity`)
    #[error("IAM entity not found: {0}")]
    NotFound(String),

    /// A request could not be authorized
    #[error("Failed to authorize IAM request: {0}")]
    Authorization(#[from] AuthorizationError),

    /// The request did not reach the service or the response was cut short
    #[error("IAM transport error: {0}")]
    Transport(String),

    /// The service answered with an error
    #[error("IAM service error: {code}: {message}")]
    Service {
        /// IAM error code (e.g. `AccessDenied`, `Throttling`)
        code: String,
        /// Human readable message
        message: String,
    },

    /// A response payload could not be deserialized
    #[error("Failed to deserialize IAM response: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for IamError {
    fn from(error: reqwest::Error) -> Self {
        IamError::Transport(error.to_string())
    }
}

/// Client for the IAM Query API.
#[derive(Debug, Clone)]
pub struct Iam {
    endpoint: Url,
    session: Session,
    client: reqwest::Client,
}

impl Iam {
    /// Open a client against an arbitrary IAM-compatible endpoint.
    pub fn open(endpoint: &str, session: impl Into<Session>) -> Result<Self, IamError> {
        let endpoint = Url::parse(endpoint).map_err(AuthorizationError::from)?;
        Ok(Self {
            endpoint,
            session: session.into(),
            client: reqwest::Client::new(),
        })
    }

    /// Open a client against the global AWS IAM endpoint.
    pub fn aws(session: impl Into<Session>) -> Result<Self, IamError> {
        Self::open(DEFAULT_ENDPOINT, session)
    }

    /// List every IAM user.
    pub async fn list_users(&self) -> Result<Vec<User>, IamError> {
        self.paginate::<ListUsersResponse>(Action::new("ListUsers"))
            .await
    }

    /// List every IAM group.
    pub async fn list_groups(&self) -> Result<Vec<Group>, IamError> {
        self.paginate::<ListGroupsResponse>(Action::new("ListGroups"))
            .await
    }

    /// List the users that belong to `group_name`.
    ///
    /// Fails with [`IamError::NotFound`] if the group does not exist.
    pub async fn get_group(&self, group_name: &str) -> Result<Vec<User>, IamError> {
        self.paginate::<GetGroupResponse>(
            Action::new("GetGroup").with("GroupName", group_name),
        )
        .await
    }

    /// List the SSH public keys (metadata only) uploaded for `user_name`.
    pub async fn list_ssh_public_keys(
        &self,
        user_name: &str,
    ) -> Result<Vec<SshPublicKeyMetadata>, IamError> {
        self.paginate::<ListSshPublicKeysResponse>(
            Action::new("ListSSHPublicKeys").with("UserName", user_name),
        )
        .await
    }

    /// Fetch one SSH public key in OpenSSH (`Encoding=SSH`) format.
    ///
    /// Fails with [`IamError::NotFound`] if the key was deleted.
    pub async fn get_ssh_public_key(
        &self,
        user_name: &str,
        key_id: &str,
    ) -> Result<SshPublicKey, IamError> {
        let action = Action::new("GetSSHPublicKey")
            .with("UserName", user_name)
            .with("SSHPublicKeyId", key_id)
            .with("Encoding", "SSH");

        let response: GetSshPublicKeyResponse = self.call(&action).await?;
        Ok(response.result.ssh_public_key)
    }

    async fn paginate<R>(&self, action: Action) -> Result<Vec<R::Item>, IamError>
    where
        R: Page,
    {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = action.clone();
            if let Some(marker) = &marker {
                request = request.with("Marker", marker);
            }

            let page: R = self.call(&request).await?;
            let (page_items, next) = page.into_parts()?;
            items.extend(page_items);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(items)
    }

    async fn call<R>(&self, action: &Action) -> Result<R, IamError>
    where
        R: serde::de::DeserializeOwned,
    {
        let request = action.request(&self.endpoint);
        let authorized = self.session.authorize(&request)?;

        tracing::debug!(action = action.name(), "iam request");

        let mut builder = self.client.get(authorized.url);
        for (key, value) in authorized.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ErrorResponse::into_error(&body, status));
        }

        quick_xml::de::from_str(&body).map_err(|e| {
            IamError::Serialization(format!("{} response: {}", action.name(), e))
        })
    }
}
