//! In-memory S3-compatible test server.
use async_trait::async_trait;
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use s3s::dto::{
    CommonPrefix, DeleteObjectInput, DeleteObjectOutput, DeleteObjectsInput, DeleteObjectsOutput,
    DeletedObject, ETag, GetObjectInput, GetObjectOutput, ListObjectsV2Input, ListObjectsV2Output,
    Object, PutObjectInput, PutObjectOutput, StreamingBlob, Timestamp,
};
use s3s::service::S3ServiceBuilder;
use s3s::{S3, S3Request, S3Response, S3Result, s3_error};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Simple in-memory backend for testing.
///
/// Structure: bucket_name -> key -> StoredObject
#[derive(Clone, Default)]
pub struct InMemoryS3 {
    buckets: Arc<RwLock<HashMap<String, BTreeMap<String, StoredObject>>>>,
}

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    e_tag: String,
    last_modified: Timestamp,
}

/// A running S3 test server instance.
pub struct LocalS3 {
    /// The endpoint URL where the server is listening
    pub endpoint: String,
    storage: InMemoryS3,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl LocalS3 {
    /// Start a test server with authentication and pre-created buckets.
    pub async fn start_with_auth(
        access_key: &str,
        secret_key: &str,
        buckets: &[&str],
    ) -> anyhow::Result<LocalS3> {
        let storage = InMemoryS3::default();

        for bucket in buckets {
            storage.create_bucket(bucket).await;
        }

        let mut builder = S3ServiceBuilder::new(storage.clone());
        builder.set_auth(s3s::auth::SimpleAuth::from_single(access_key, secret_key));
        let service = builder.build();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let endpoint = format!("http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let hyper_service = TowerToHyperService::new(service.clone());
                            tokio::spawn(async move {
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), hyper_service)
                                    .await;
                            });
                        }
                    }
                }
            }
        });

        Ok(LocalS3 {
            endpoint,
            storage,
            shutdown_tx,
        })
    }

    /// All keys currently stored in `bucket`, sorted.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let buckets = self.storage.buckets.read().await;
        buckets
            .get(bucket)
            .map(|contents| contents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Store an object directly, bypassing HTTP.
    pub async fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let stored = StoredObject::new(data);
        let mut buckets = self.storage.buckets.write().await;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), stored);
    }

    /// Stop the server.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl StoredObject {
    fn new(data: Vec<u8>) -> Self {
        Self {
            e_tag: format!("{:x}", md5::compute(&data)),
            data,
            last_modified: Timestamp::from(SystemTime::now()),
        }
    }
}

impl InMemoryS3 {
    /// Create a bucket if it doesn't exist.
    pub async fn create_bucket(&self, bucket: &str) {
        let mut buckets = self.buckets.write().await;
        buckets.entry(bucket.to_string()).or_default();
    }
}

#[async_trait]
impl S3 for InMemoryS3 {
    async fn get_object(
        &self,
        req: S3Request<GetObjectInput>,
    ) -> S3Result<S3Response<GetObjectOutput>> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(&req.input.bucket)
            .and_then(|contents| contents.get(&req.input.key))
            .ok_or_else(|| s3_error!(NoSuchKey))?;

        let body = s3s::Body::from(Bytes::from(object.data.clone()));
        let output = GetObjectOutput {
            body: Some(StreamingBlob::from(body)),
            content_length: Some(object.data.len() as i64),
            e_tag: Some(ETag::Strong(object.e_tag.clone())),
            last_modified: Some(object.last_modified.clone()),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn put_object(
        &self,
        req: S3Request<PutObjectInput>,
    ) -> S3Result<S3Response<PutObjectOutput>> {
        let bucket = req.input.bucket.clone();
        let key = req.input.key.clone();

        let data = if let Some(mut body) = req.input.body {
            use futures_util::StreamExt;
            let mut chunks = Vec::new();
            while let Some(result) = body.next().await {
                if let Ok(bytes) = result {
                    chunks.extend_from_slice(&bytes);
                }
            }
            chunks
        } else {
            Vec::new()
        };

        let stored = StoredObject::new(data);
        let e_tag = stored.e_tag.clone();

        let mut buckets = self.buckets.write().await;
        let contents = buckets
            .get_mut(&bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?;
        contents.insert(key, stored);

        let output = PutObjectOutput {
            e_tag: Some(ETag::Strong(e_tag)),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn delete_object(
        &self,
        req: S3Request<DeleteObjectInput>,
    ) -> S3Result<S3Response<DeleteObjectOutput>> {
        let mut buckets = self.buckets.write().await;
        if let Some(contents) = buckets.get_mut(&req.input.bucket) {
            contents.remove(&req.input.key);
        }

        Ok(S3Response::new(DeleteObjectOutput::default()))
    }

    async fn delete_objects(
        &self,
        req: S3Request<DeleteObjectsInput>,
    ) -> S3Result<S3Response<DeleteObjectsOutput>> {
        let mut buckets = self.buckets.write().await;
        let contents = buckets
            .get_mut(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?;

        let quiet = req.input.delete.quiet.unwrap_or(false);
        let mut deleted = Vec::new();
        for object in req.input.delete.objects {
            contents.remove(&object.key);
            deleted.push(DeletedObject {
                key: Some(object.key),
                ..Default::default()
            });
        }

        let output = DeleteObjectsOutput {
            deleted: if quiet { None } else { Some(deleted) },
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn list_objects_v2(
        &self,
        req: S3Request<ListObjectsV2Input>,
    ) -> S3Result<S3Response<ListObjectsV2Output>> {
        let prefix = req.input.prefix.clone().unwrap_or_default();
        let delimiter = req.input.delimiter.clone();

        let buckets = self.buckets.read().await;

        // Matches real S3 behavior for missing buckets
        let contents = buckets
            .get(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?;

        let mut objects = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for (key, object) in contents.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(prefix.as_str()) else {
                break;
            };

            let grouped = delimiter
                .as_deref()
                .filter(|delimiter| !delimiter.is_empty())
                .and_then(|delimiter| {
                    rest.find(delimiter)
                        .map(|at| format!("{}{}", prefix, &rest[..at + delimiter.len()]))
                });

            match grouped {
                Some(common_prefix) => {
                    common_prefixes.insert(common_prefix);
                }
                None => objects.push(Object {
                    key: Some(key.clone()),
                    size: Some(object.data.len() as i64),
                    e_tag: Some(ETag::Strong(object.e_tag.clone())),
                    last_modified: Some(object.last_modified.clone()),
                    ..Default::default()
                }),
            }
        }

        let output = ListObjectsV2Output {
            name: Some(req.input.bucket.clone()),
            prefix: req.input.prefix.clone(),
            delimiter,
            contents: Some(objects),
            common_prefixes: Some(
                common_prefixes
                    .into_iter()
                    .map(|prefix| CommonPrefix {
                        prefix: Some(prefix),
                    })
                    .collect(),
            ),
            is_truncated: Some(false),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }
}
