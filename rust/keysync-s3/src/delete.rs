//! S3 DeleteObjects (batch delete).
//!
//! Removes up to [`MAX_BATCH`] objects per request. Keys that do not exist
//! are reported as deleted by S3, so a batch delete is idempotent.
//!
//! [DeleteObjects]: https://docs.aws.amazon.com/AmazonS3/latest/API/API_DeleteObjects.html

use base64::Engine;
use keysync_credentials::Invocation;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::list::ErrorResponse;
use crate::{Bucket, Request, S3Error};

/// Maximum number of keys S3 accepts in one DeleteObjects request.
pub const MAX_BATCH: usize = 1000;

/// A POST `?delete` request removing several objects at once.
#[derive(Debug)]
pub struct DeleteObjects {
    url: Url,
    region: String,
    body: Vec<u8>,
}

impl DeleteObjects {
    /// Create a batch delete for `keys` against the given bucket URL.
    pub fn new(
        base_url: Url,
        region: impl Into<String>,
        keys: &[String],
    ) -> Result<Self, S3Error> {
        let mut url = base_url;
        url.query_pairs_mut().append_pair("delete", "");

        Ok(Self {
            url,
            region: region.into(),
            body: render_delete_body(keys)?.into_bytes(),
        })
    }
}

impl Invocation for DeleteObjects {
    fn method(&self) -> &'static str {
        "POST"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        &self.region
    }
}

impl Request for DeleteObjects {
    fn body(&self) -> Option<&[u8]> {
        Some(&self.body)
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let digest = md5::compute(&self.body);
        vec![
            (
                "content-md5",
                base64::engine::general_purpose::STANDARD.encode(digest.0),
            ),
            ("content-type", "application/xml".to_string()),
        ]
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "Delete")]
struct DeleteBody<'a> {
    #[serde(rename = "Quiet")]
    quiet: bool,
    #[serde(rename = "Object")]
    objects: Vec<ObjectIdentifier<'a>>,
}

#[derive(Debug, Serialize)]
struct ObjectIdentifier<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
}

fn render_delete_body(keys: &[String]) -> Result<String, S3Error> {
    let body = DeleteBody {
        quiet: true,
        objects: keys
            .iter()
            .map(|key| ObjectIdentifier { key })
            .collect(),
    };
    quick_xml::se::to_string(&body)
        .map_err(|e| S3Error::Serialization(format!("Failed to render delete body: {}", e)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename = "DeleteResult")]
struct DeleteResult {
    #[serde(rename = "Error", default)]
    errors: Vec<DeleteError>,
}

#[derive(Debug, Deserialize)]
struct DeleteError {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

impl Bucket {
    /// Delete every object in `keys`, batching [`MAX_BATCH`] keys per request.
    ///
    /// Fails if any request fails or if S3 reports a per-key error.
    pub async fn delete_objects(&self, keys: &[String]) -> Result<(), S3Error> {
        for batch in keys.chunks(MAX_BATCH) {
            let request = DeleteObjects::new(self.bucket_url()?, self.address.region(), batch)?;
            let response = request.perform(self).await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                return Err(ErrorResponse::into_error(
                    &body,
                    format!("Failed to delete objects: {}", status),
                ));
            }

            Self::parse_delete_response(&body)?;
        }
        Ok(())
    }

    pub(crate) fn parse_delete_response(xml: &str) -> Result<(), S3Error> {
        if xml.trim().is_empty() || !xml.contains("<Error>") {
            return Ok(());
        }

        let result: DeleteResult = quick_xml::de::from_str(xml)
            .map_err(|e| S3Error::Serialization(format!("Failed to parse XML: {}", e)))?;

        if result.errors.is_empty() {
            return Ok(());
        }

        let failures = result
            .errors
            .iter()
            .map(|error| {
                format!(
                    "{} ({}: {})",
                    error.key,
                    error.code,
                    error.message.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        Err(S3Error::Service(format!(
            "Failed to delete {} objects: {}",
            result.errors.len(),
            failures
        )))
    }
}
