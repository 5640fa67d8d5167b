//! S3 storage address types.

/// Address for S3-compatible storage.
///
/// Combines endpoint, region, and bucket into a simple data struct that can be used
/// with any S3-compatible service (AWS S3, Cloudflare R2, MinIO, etc.).
///
/// This is a plain data type - URL validation happens when a [`Bucket`](crate::Bucket)
/// is opened.
///
/// ```
/// use keysync_s3::Address;
///
/// let addr = Address::new("https://s3.eu-west-1.amazonaws.com", "eu-west-1", "ssh-keys");
/// assert_eq!(addr.bucket(), "ssh-keys");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    endpoint: String,
    region: String,
    bucket: String,
}

impl Address {
    /// Create a new address with the given endpoint, region, and bucket.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            bucket: bucket.into(),
        }
    }

    /// The regional AWS S3 endpoint for `region`.
    pub fn aws(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        let region = region.into();
        Self::new(format!("https://s3.{region}.amazonaws.com"), region, bucket)
    }

    /// Get the endpoint URL string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}
