//! Testing helpers: an in-memory S3-compatible server.
//!
//! [`LocalS3`] speaks enough of the S3 REST API (put, get, delete, batch
//! delete, delimiter listing) to exercise [`Bucket`](crate::Bucket) end to end
//! with real SigV4 verification.
//!
//! ```no_run
//! use keysync_s3::helpers::{S3Settings, start};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (address, server) = start(S3Settings::default()).await?;
//! let bucket = address.open()?;
//! bucket.put("users/alice/authorized_keys", b"\n").await?;
//! server.stop();
//! # Ok(())
//! # }
//! ```

use keysync_credentials::Credentials;

use crate::{Address, Bucket, S3Error};

mod server;
pub use server::*;

/// Connection info for a running [`LocalS3`].
#[derive(Debug, Clone)]
pub struct S3Address {
    /// The endpoint URL of the running S3 server (e.g., "http://127.0.0.1:9000")
    pub endpoint: String,
    /// The bucket name to use for testing
    pub bucket: String,
    /// AWS access key ID
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: String,
}

impl S3Address {
    /// Open a signed [`Bucket`] against the test server.
    pub fn open(&self) -> Result<Bucket, S3Error> {
        let credentials = Credentials::new(&self.access_key_id, &self.secret_access_key);
        Ok(
            Bucket::open(Address::new(&self.endpoint, "us-east-1", &self.bucket), credentials)?
                .with_path_style(true),
        )
    }
}

/// Settings for configuring the S3 test server.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// The bucket name to create. Defaults to "test-bucket".
    pub bucket: String,
    /// AWS access key ID. Defaults to "test-access-key".
    pub access_key_id: String,
    /// AWS secret access key. Defaults to "test-secret-key".
    pub secret_access_key: String,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket: "test-bucket".to_string(),
            access_key_id: "test-access-key".to_string(),
            secret_access_key: "test-secret-key".to_string(),
        }
    }
}

/// Start an authenticated local S3 server.
pub async fn start(settings: S3Settings) -> anyhow::Result<(S3Address, LocalS3)> {
    let server = LocalS3::start_with_auth(
        &settings.access_key_id,
        &settings.secret_access_key,
        &[&settings.bucket],
    )
    .await?;
    let address = S3Address {
        endpoint: server.endpoint.clone(),
        bucket: settings.bucket,
        access_key_id: settings.access_key_id,
        secret_access_key: settings.secret_access_key,
    };
    Ok((address, server))
}
