//! S3 ListObjectsV2 operations.
//!
//! Listing with a delimiter groups keys into "common prefixes", which is how
//! the object store exposes the principals that currently have a key file:
//! listing `users/` with delimiter `/` yields `users/alice/`, `users/bob/`, ...
//!
//! [ListObjectsV2]: https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListObjectsV2.html

use keysync_credentials::Invocation;
use serde::Deserialize;
use url::Url;

use crate::{Bucket, Request, S3Error};

/// The path delimiter used to group keys into prefixes.
pub const DELIMITER: &str = "/";

/// A GET request to list objects in a bucket.
#[derive(Debug, Clone)]
pub struct List {
    url: Url,
    region: String,
}

impl List {
    /// Create a new list request for the given bucket URL.
    pub fn new(
        base_url: Url,
        region: impl Into<String>,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Self {
        Self {
            url: build_list_url(base_url, prefix, delimiter, continuation_token),
            region: region.into(),
        }
    }
}

impl Invocation for List {
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

impl Request for List {}

/// Response from S3 ListObjectsV2 API.
#[derive(Debug, Default)]
pub struct ListResult {
    /// Object keys returned in this response.
    pub keys: Vec<String>,
    /// Common prefixes (including the trailing delimiter) returned in this response.
    pub prefixes: Vec<String>,
    /// If true, there are more results to fetch.
    pub is_truncated: bool,
    /// Token to use for fetching the next page of results.
    pub next_continuation_token: Option<String>,
}

/// Root element of ListObjectsV2 XML response.
#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Contents", default)]
    contents: Vec<Contents>,
    #[serde(rename = "CommonPrefixes", default)]
    common_prefixes: Vec<CommonPrefix>,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contents {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
struct CommonPrefix {
    #[serde(rename = "Prefix")]
    prefix: String,
}

/// S3 error response XML structure.
///
/// S3 returns `<Error>` XML responses for bucket-level errors like `NoSuchBucket`
/// or `AccessDenied`.
#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
pub(crate) struct ErrorResponse {
    #[serde(rename = "Code")]
    pub(crate) code: String,
    #[serde(rename = "Message")]
    pub(crate) message: Option<String>,
}

impl ErrorResponse {
    /// Turn an error body into a [`S3Error::Service`], falling back to the status.
    pub(crate) fn into_error(body: &str, fallback: impl std::fmt::Display) -> S3Error {
        match quick_xml::de::from_str::<ErrorResponse>(body) {
            Ok(error) => S3Error::Service(format!(
                "{}: {}",
                error.code,
                error.message.unwrap_or_default()
            )),
            Err(_) => S3Error::Service(fallback.to_string()),
        }
    }
}

fn build_list_url(
    base_url: Url,
    prefix: Option<&str>,
    delimiter: Option<&str>,
    continuation_token: Option<&str>,
) -> Url {
    let mut url = base_url;
    url.query_pairs_mut().append_pair("list-type", "2");
    if let Some(prefix) = prefix {
        url.query_pairs_mut().append_pair("prefix", prefix);
    }
    if let Some(delimiter) = delimiter {
        url.query_pairs_mut().append_pair("delimiter", delimiter);
    }
    if let Some(token) = continuation_token {
        url.query_pairs_mut()
            .append_pair("continuation-token", token);
    }
    url
}

impl Bucket {
    /// Fetch one page of a listing.
    ///
    /// S3 treats `prefix` as a filter, not a path: listing a prefix that
    /// matches nothing returns an empty result rather than an error.
    pub async fn list(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListResult, S3Error> {
        let request = List::new(
            self.bucket_url()?,
            self.address.region(),
            prefix,
            delimiter,
            continuation_token,
        );
        let response = request.perform(self).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ErrorResponse::into_error(
                &body,
                format!("Failed to list objects: {}", status),
            ));
        }

        Self::parse_list_response(&body)
    }

    /// List every common prefix directly below `prefix`, following pagination.
    ///
    /// The trailing delimiter is stripped, so listing `users/` yields
    /// `users/alice`, `users/bob`, ...
    pub async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, S3Error> {
        let mut prefixes = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .list(Some(prefix), Some(DELIMITER), continuation_token.as_deref())
                .await?;

            prefixes.extend(page.prefixes.into_iter().map(|prefix| {
                prefix
                    .strip_suffix(DELIMITER)
                    .map(str::to_string)
                    .unwrap_or(prefix)
            }));

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(token)) => continuation_token = Some(token),
                (true, None) => {
                    return Err(S3Error::Serialization(
                        "Truncated listing without a continuation token".into(),
                    ));
                }
                (false, _) => break,
            }
        }

        Ok(prefixes)
    }

    /// Parse the S3 ListObjectsV2 XML response.
    ///
    /// Returns an error if the XML is an S3 error response (e.g., NoSuchBucket, AccessDenied)
    /// or if the XML doesn't have the expected root element.
    pub(crate) fn parse_list_response(xml: &str) -> Result<ListResult, S3Error> {
        if let Ok(error) = quick_xml::de::from_str::<ErrorResponse>(xml) {
            return Err(S3Error::Service(format!(
                "{}: {}",
                error.code,
                error.message.unwrap_or_default()
            )));
        }

        // quick-xml is lenient and will parse any XML as defaults
        if !xml.contains("<ListBucketResult") {
            return Err(S3Error::Serialization(
                "Unexpected XML response: missing ListBucketResult element".into(),
            ));
        }

        let result: ListBucketResult = quick_xml::de::from_str(xml)
            .map_err(|e| S3Error::Serialization(format!("Failed to parse XML: {}", e)))?;

        Ok(ListResult {
            keys: result.contents.into_iter().map(|c| c.key).collect(),
            prefixes: result
                .common_prefixes
                .into_iter()
                .map(|p| p.prefix)
                .collect(),
            is_truncated: result.is_truncated,
            next_continuation_token: result.next_continuation_token.filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_list_url_with_prefix_and_delimiter() {
        let url = Url::parse("https://s3.amazonaws.com/bucket").unwrap();
        let list_url = build_list_url(url, Some("users/"), Some("/"), None);

        assert!(list_url.as_str().contains("list-type=2"));
        assert!(list_url.as_str().contains("prefix=users%2F"));
        assert!(list_url.as_str().contains("delimiter=%2F"));
    }

    #[test]
    fn it_builds_list_url_with_continuation_token() {
        let url = Url::parse("https://s3.amazonaws.com/bucket").unwrap();
        let list_url = build_list_url(url, None, None, Some("token123"));

        assert!(list_url.as_str().contains("continuation-token=token123"));
    }

    #[test]
    fn it_parses_empty_list_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>false</IsTruncated>
            </ListBucketResult>"#;

        let result = Bucket::parse_list_response(xml).unwrap();
        assert!(result.keys.is_empty());
        assert!(result.prefixes.is_empty());
        assert!(!result.is_truncated);
        assert!(result.next_continuation_token.is_none());
    }

    #[test]
    fn it_parses_common_prefixes() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
                <Name>keys</Name>
                <Prefix>users/</Prefix>
                <Delimiter>/</Delimiter>
                <IsTruncated>false</IsTruncated>
                <CommonPrefixes>
                    <Prefix>users/alice/</Prefix>
                </CommonPrefixes>
                <CommonPrefixes>
                    <Prefix>users/bob/</Prefix>
                </CommonPrefixes>
            </ListBucketResult>"#;

        let result = Bucket::parse_list_response(xml).unwrap();
        assert!(result.keys.is_empty());
        assert_eq!(result.prefixes, vec!["users/alice/", "users/bob/"]);
    }

    #[test]
    fn it_parses_truncated_list_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>abc123</NextContinuationToken>
                <Contents>
                    <Key>key1</Key>
                </Contents>
            </ListBucketResult>"#;

        let result = Bucket::parse_list_response(xml).unwrap();
        assert_eq!(result.keys, vec!["key1"]);
        assert!(result.is_truncated);
        assert_eq!(result.next_continuation_token, Some("abc123".to_string()));
    }

    #[test]
    fn it_errors_on_unexpected_xml_structure() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <SomeUnknownElement>
                <Foo>bar</Foo>
            </SomeUnknownElement>"#;

        let err = Bucket::parse_list_response(xml).unwrap_err();
        assert!(
            matches!(err, S3Error::Serialization(ref msg) if msg.contains("ListBucketResult")),
            "Expected error about missing ListBucketResult, got: {:?}",
            err
        );
    }

    #[test]
    fn it_errors_on_non_xml_input() {
        let err = Bucket::parse_list_response("this is not xml at all").unwrap_err();
        assert!(matches!(err, S3Error::Serialization(_)));
    }

    #[test]
    fn it_parses_no_such_bucket_error() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
                <Code>NoSuchBucket</Code>
                <Message>The specified bucket does not exist</Message>
                <BucketName>nonexistent-bucket</BucketName>
            </Error>"#;

        let err = Bucket::parse_list_response(xml).unwrap_err();
        assert!(
            matches!(err, S3Error::Service(ref msg) if msg.contains("NoSuchBucket")),
            "Expected NoSuchBucket error, got: {:?}",
            err
        );
    }
}
