//! Bucket-backed object store.
//!
//! Mail services that deliver into S3 (or an S3-compatible service through a
//! custom endpoint) leave one raw message per object. Listing uses
//! `ListObjectsV2` continuation tokens.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::store::{ObjectPage, ObjectStore};
use crate::config::InboundConfig;
use crate::{MailError, Result};

/// Object store over one S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    page_size: i32,
}

impl S3Store {
    /// Build a client from the ambient AWS configuration plus the
    /// `[inbound]` overrides.
    ///
    /// Credentials come from the usual AWS provider chain (environment,
    /// profile, instance role). A non-empty `endpoint` switches to
    /// path-style addressing for S3-compatible services.
    pub async fn connect(config: &InboundConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(MailError::Config(
                "inbound.bucket is required for the s3 backend".to_string(),
            ));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if !config.region.is_empty() {
            loader = loader.region(Region::new(config.region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if !config.endpoint.is_empty() {
            builder = builder
                .endpoint_url(config.endpoint.clone())
                .force_path_style(true);
        }

        info!(bucket = %config.bucket, "Using S3 inbound store");
        Ok(Self::from_client(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
            config.page_size,
        ))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, bucket: impl Into<String>, page_size: usize) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            page_size: i32::try_from(page_size.max(1)).unwrap_or(i32::MAX),
        }
    }

    /// The bucket this store reads.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn store_error<E>(action: &str, key: &str, error: E) -> MailError
where
    E: std::error::Error,
{
    MailError::ObjectStore(format!("{action} {key:?}: {}", DisplayErrorContext(error)))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, continuation: Option<&str>) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(self.page_size)
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(|e| store_error("list", &self.bucket, e))?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        let next = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(bucket = %self.bucket, count = keys.len(), truncated = next.is_some(), "listed objects");
        Ok(ObjectPage { keys, next })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error("get", key, e))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| store_error("read", key, e))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error("delete", key, e))?;
        Ok(())
    }
}
