//! Request types for the S3 REST API.
//!
//! Each request knows how it is signed (via [`Invocation`]) and what it sends
//! (via [`Request`]). The split keeps signing independent of the payload.

use async_trait::async_trait;
use keysync_credentials::{Checksum, Hasher, Invocation};
use url::Url;

use crate::{Bucket, S3Error};

/// A PUT request to upload data.
#[derive(Debug)]
pub struct Put {
    url: Url,
    region: String,
    body: Vec<u8>,
    checksum: Option<Checksum>,
}

impl Put {
    /// Create a new PUT request with the given URL and body.
    ///
    /// Use [`with_checksum`](Self::with_checksum) to add integrity verification.
    pub fn new(url: Url, region: impl Into<String>, body: impl AsRef<[u8]>) -> Self {
        Self {
            url,
            region: region.into(),
            body: body.as_ref().to_vec(),
            checksum: None,
        }
    }

    /// Compute and set the checksum using the given hasher.
    pub fn with_checksum(mut self, hasher: &Hasher) -> Self {
        self.checksum = Some(hasher.checksum(&self.body));
        self
    }
}

impl Invocation for Put {
    fn method(&self) -> &'static str {
        "PUT"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }
}

impl Request for Put {
    fn body(&self) -> Option<&[u8]> {
        Some(&self.body)
    }
}

/// A GET request to retrieve an object.
#[derive(Debug, Clone)]
pub struct Get {
    url: Url,
    region: String,
}

impl Get {
    /// Create a new GET request for the given URL.
    pub fn new(url: Url, region: impl Into<String>) -> Self {
        Self {
            url,
            region: region.into(),
        }
    }
}

impl Invocation for Get {
    fn method(&self) -> &'static str {
        "GET"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        &self.region
    }
}

impl Request for Get {}

/// A DELETE request to remove an object.
#[derive(Debug, Clone)]
pub struct Delete {
    url: Url,
    region: String,
}

impl Delete {
    /// Create a new DELETE request for the given URL.
    pub fn new(url: Url, region: impl Into<String>) -> Self {
        Self {
            url,
            region: region.into(),
        }
    }
}

impl Invocation for Delete {
    fn method(&self) -> &'static str {
        "DELETE"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        &self.region
    }
}

impl Request for Delete {}

/// Executable S3 request with an optional body.
///
/// This trait extends [`Invocation`] with the request body and the ability to
/// execute the request against a [`Bucket`]. [`Invocation`] only carries what
/// signing needs (method, URL, checksum), not the payload.
#[async_trait]
pub trait Request: Invocation + Sized + Sync {
    /// The request body, if any.
    fn body(&self) -> Option<&[u8]> {
        None
    }

    /// Headers sent with the request that are not part of the signature.
    fn headers(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Perform this request against the given bucket.
    async fn perform(&self, bucket: &Bucket) -> Result<reqwest::Response, S3Error> {
        let authorized = bucket.session.authorize(self)?;

        tracing::debug!(method = self.method(), url = %self.url(), "s3 request");

        let method = reqwest::Method::from_bytes(self.method().as_bytes())
            .map_err(|e| S3Error::Transport(format!("Invalid method: {}", e)))?;
        let mut builder = bucket.client.request(method, authorized.url);

        for (key, value) in authorized.headers {
            builder = builder.header(key, value);
        }

        for (key, value) in self.headers() {
            builder = builder.header(key, value);
        }

        if let Some(body) = self.body() {
            builder = builder.body(body.to_vec());
        }

        Ok(builder.send().await?)
    }
}
