//! S3-compatible remote cache store.
//!
//! Uses the same `in/` and `out/` layout as [`crate::FileCache`], below an
//! optional key prefix. Blobs are compressed; the codec is recorded in the
//! object's `compression` metadata so it can still be read after the
//! configured codec changes.

use crate::compression::{codec_name, compress, decompress, parse_codec};
use crate::keys::fingerprint;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use hone_core::cache::{CacheEntry, CacheManifest, Compression};
use hone_core::config::S3Config;
use hone_core::{CacheStore, Error, Result};
use std::path::Path;
use tracing::{debug, info};

const COMPRESSION_METADATA: &str = "compression";

/// S3-backed [`CacheStore`].
#[derive(Debug, Clone)]
pub struct S3Cache {
    client: Client,
    bucket: String,
    prefix: String,
    compression: Compression,
}

impl S3Cache {
    pub fn new(
        client: Client,
        bucket: impl Into<String>,
        prefix: Option<&str>,
        compression: Compression,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.unwrap_or_default().trim_matches('/').to_string(),
            compression,
        }
    }

    /// Build a client from configuration. Credentials fall back to
    /// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
    pub fn from_config(config: &S3Config) -> Result<Self> {
        let access_key = config
            .access_key
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok());
        let secret_key = config
            .secret_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok());
        let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
            return Err(Error::InvalidConfig(
                "S3 cache requires access_key and secret_key (or AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY)"
                    .to_string(),
            ));
        };
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                access_key,
                secret_key,
                session_token,
                None,
                "hone",
            ));
        if let Some(endpoint) = &config.endpoint {
            // Custom endpoints are S3-compatible servers that rarely support
            // virtual-hosted buckets.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::new(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
            config.prefix.as_deref(),
            config.compression,
        ))
    }

    /// Verify the bucket is reachable with the configured credentials.
    pub async fn init(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                Error::Cache(format!(
                    "Cannot access bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        info!(bucket = %self.bucket, prefix = %self.prefix, "S3 cache ready");
        Ok(())
    }

    fn object_key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn manifest_key(&self, key: &str) -> String {
        self.object_key(&format!("in/{}.json", key))
    }

    fn blob_key(&self, fingerprint: &str) -> String {
        self.object_key(&format!("out/{}", fingerprint))
    }

    async fn blob_exists(&self, object: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(Error::Cache(format!(
                "Failed to stat {}: {}",
                object,
                DisplayErrorContext(&e)
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for S3Cache {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, path: &Path) -> Result<CacheEntry> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Cache(format!("Failed to read {}: {}", path.display(), e)))?;
        let entry = CacheEntry {
            path: path.to_path_buf(),
            fingerprint: fingerprint(&data),
        };

        let object = self.blob_key(&entry.fingerprint);
        if self.blob_exists(&object).await? {
            debug!(object = %object, "Blob already uploaded");
            return Ok(entry);
        }

        let body = compress(&data, self.compression)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object)
            .metadata(COMPRESSION_METADATA, codec_name(self.compression))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                Error::Cache(format!(
                    "Failed to upload {}: {}",
                    object,
                    DisplayErrorContext(&e)
                ))
            })?;
        debug!(object = %object, bytes = data.len(), "Uploaded blob");
        Ok(entry)
    }

    async fn fetch(&self, entry: &CacheEntry) -> Result<()> {
        let object = self.blob_key(&entry.fingerprint);
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(Error::BlobNotFound(entry.fingerprint.clone()));
            }
            Err(e) => {
                return Err(Error::Cache(format!(
                    "Failed to download {}: {}",
                    object,
                    DisplayErrorContext(&e)
                )));
            }
        };

        // Objects without metadata predate compression.
        let codec = match response.metadata().and_then(|m| m.get(COMPRESSION_METADATA)) {
            Some(name) => parse_codec(name).ok_or_else(|| {
                Error::Cache(format!("Unknown compression {:?} on {}", name, object))
            })?,
            None => Compression::None,
        };
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Cache(format!("Failed to read {}: {}", object, e)))?
            .into_bytes();
        let data = decompress(&body, codec)?;

        if let Some(parent) = entry.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Cache(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&entry.path, data).await.map_err(|e| {
            Error::Cache(format!("Failed to restore {}: {}", entry.path.display(), e))
        })?;
        Ok(())
    }

    async fn load_manifest(&self, key: &str) -> Result<Option<Vec<CacheEntry>>> {
        let object = self.manifest_key(key);
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Cache(format!(
                    "Failed to download {}: {}",
                    object,
                    DisplayErrorContext(&e)
                )));
            }
        };
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Cache(format!("Failed to read {}: {}", object, e)))?
            .into_bytes();
        let manifest: CacheManifest = serde_json::from_slice(&body)?;
        Ok(Some(manifest.entries))
    }

    async fn save_manifest(&self, key: &str, entries: &[CacheEntry]) -> Result<()> {
        let object = self.manifest_key(key);
        let manifest = CacheManifest::new(key, entries.to_vec());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object)
            .content_type("application/json")
            .body(ByteStream::from(serde_json::to_vec(&manifest)?))
            .send()
            .await
            .map_err(|e| {
                Error::Cache(format!(
                    "Failed to upload {}: {}",
                    object,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
