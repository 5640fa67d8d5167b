use keysync_iam::IamError;
use keysync_s3::S3Error;
use thiserror::Error;

/// Errors raised while reading the identity directory
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// A user, group or key listed a moment ago no longer exists
    #[error("Directory entry not found: {0}")]
    NotFound(String),

    /// The IAM service could not be reached or answered with an error
    #[error("Directory request failed: {0}")]
    Iam(IamError),

    /// Any other directory failure
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

impl From<IamError> for DirectoryError {
    fn from(error: IamError) -> Self {
        match error {
            IamError::NotFound(message) => DirectoryError::NotFound(message),
            error => DirectoryError::Iam(error),
        }
    }
}

/// Errors raised while reading or writing the key store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The S3 service could not be reached or answered with an error
    #[error("Key store request failed: {0}")]
    S3(#[from] S3Error),

    /// Any other key store failure
    #[error("Key store unavailable: {0}")]
    Unavailable(String),
}

/// The error type of a reconciliation pass
#[derive(Error, Debug)]
pub enum SyncError {
    /// An entity disappeared from the directory between listing and lookup
    #[error("Not found: {0}")]
    NotFound(String),

    /// A principal path whose kind is neither `users` nor `groups`
    #[error("Unsupported principal type: {0}")]
    UnsupportedPrincipalType(String),

    /// A principal name that is empty or contains a `/`
    #[error("Invalid principal name: {0:?}")]
    InvalidPrincipalName(String),

    /// Reading or writing the key store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading the identity directory failed
    #[error(transparent)]
    Directory(DirectoryError),
}

impl From<DirectoryError> for SyncError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::NotFound(message) => SyncError::NotFound(message),
            error => SyncError::Directory(error),
        }
    }
}
