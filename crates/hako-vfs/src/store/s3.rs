//! S3-compatible object store backend.
//!
//! Works against AWS S3 and against other stores that speak the S3 API
//! (GCS interoperability endpoint, MinIO) via `endpoint_url`.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::{ListStream, ObjectAttributes, ObjectStore, ObjectStream};
use crate::error::{StoreError, StoreResult};

/// Characters left unescaped in a `CopySource` header.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Shared S3 client handle.
pub type S3Client = Client;

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    pub region: String,
    /// Custom endpoint; `None` uses the AWS default for the region.
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    /// Static `(access_key_id, secret_access_key)`; `None` uses the default chain.
    pub credentials: Option<(String, String)>,
}

impl S3StoreConfig {
    /// Build a client from these settings.
    ///
    /// The client is meant to be built once per process and shared by every
    /// session through [`S3Store::new`].
    pub async fn client(&self) -> Client {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));
        if let Some((key_id, secret)) = &self.credentials {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "hako-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(self.force_path_style);
        if let Some(url) = &self.endpoint_url {
            builder = builder.endpoint_url(url.clone());
        }
        Client::from_conf(builder.build())
    }
}

/// Object store bound to one bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Bind a shared client to `bucket`.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Bucket this store reads and writes.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn copy_source(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, utf8_percent_encode(key, COPY_SOURCE))
    }
}

fn backend_error<E>(op: &'static str, key: &str, err: &SdkError<E>) -> StoreError
where
    E: std::error::Error + 'static,
{
    StoreError::backend(op, key, DisplayErrorContext(err))
}

fn system_time(dt: &DateTime) -> Option<SystemTime> {
    let secs = u64::try_from(dt.secs()).ok()?;
    Some(SystemTime::UNIX_EPOCH + Duration::new(secs, dt.subsec_nanos()))
}

fn size_of(len: Option<i64>) -> u64 {
    len.and_then(|l| u64::try_from(l).ok()).unwrap_or(0)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, key: &str) -> StoreResult<ObjectStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StoreError::not_found(key)
                } else {
                    backend_error("get", key, &err)
                }
            })?;

        let key = key.to_string();
        let body = stream::unfold(Some(output.body), move |body| {
            let key = key.clone();
            async move {
                let mut body: ByteStream = body?;
                match body.next().await? {
                    Ok(chunk) => Some((Ok(chunk), Some(body))),
                    // Stop after the first transport error.
                    Err(e) => Some((Err(StoreError::backend("get", key, e)), None)),
                }
            }
        });
        Ok(body.boxed())
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| backend_error("put", key, &err))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        // S3 acknowledges deletes of absent keys, so probe first.
        self.object_attributes(key).await?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| backend_error("delete", key, &err))?;
        Ok(())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(dst)
            .copy_source(self.copy_source(src))
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().and_then(|e| e.code()) == Some("NoSuchKey") {
                    StoreError::not_found(src)
                } else {
                    backend_error("copy", src, &err)
                }
            })?;
        Ok(())
    }

    async fn object_attributes(&self, key: &str) -> StoreResult<ObjectAttributes> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    StoreError::not_found(key)
                } else {
                    backend_error("head", key, &err)
                }
            })?;

        Ok(ObjectAttributes::object(
            key,
            size_of(output.content_length()),
            output.last_modified().and_then(system_time),
        ))
    }

    async fn list_objects(&self, prefix: &str, delimiter: &str) -> StoreResult<ListStream> {
        let mut rows = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                req = req.prefix(prefix);
            }
            if !delimiter.is_empty() {
                req = req.delimiter(delimiter);
            }
            if let Some(token) = continuation_token.take() {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|err| backend_error("list", prefix, &err))?;

            rows.extend(
                resp.common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix())
                    .map(|p| Ok(ObjectAttributes::prefix(p))),
            );
            rows.extend(resp.contents().iter().filter_map(|obj| {
                let key = obj.key()?;
                Some(Ok(ObjectAttributes::object(
                    key,
                    size_of(obj.size()),
                    obj.last_modified().and_then(system_time),
                )))
            }));

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(stream::iter(rows).boxed())
    }
}
