//! S3-compatible audio storage (AWS S3, MinIO, R2).

use super::{AudioReader, AudioStorage, PresignedUrl, StorageError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;
use tracing::info;

pub struct S3AudioStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3AudioStorage {
    /// Connect to the configured bucket. Credentials come from the standard
    /// AWS environment/profile chain; `endpoint_url` selects a non-AWS
    /// S3-compatible store.
    pub async fn new(
        bucket: String,
        region: Option<String>,
        endpoint_url: Option<String>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint_url) = &endpoint_url {
            // Path-style addressing for MinIO and friends
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        info!(
            "Audio storage: s3 bucket '{}'{}",
            bucket,
            endpoint_url
                .map(|e| format!(" at {}", e))
                .unwrap_or_default()
        );

        Ok(Self { client, bucket })
    }

    fn range_header(start: u64, len: u64) -> String {
        format!("bytes={}-{}", start, start + len - 1)
    }
}

#[async_trait]
impl AudioStorage for S3AudioStorage {
    async fn object_size(&self, key: &str) -> Result<u64, StorageError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match head {
            Ok(output) => output
                .content_length()
                .map(|len| len as u64)
                .ok_or_else(|| anyhow!("HeadObject returned no content length").into()),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Err(StorageError::NotFound(key.to_string()))
                } else {
                    Err(anyhow::Error::from(err)
                        .context("HeadObject failed")
                        .into())
                }
            }
        }
    }

    async fn read_range(
        &self,
        key: &str,
        start: u64,
        len: u64,
    ) -> Result<AudioReader, StorageError> {
        if len == 0 {
            return Ok(Box::new(tokio::io::empty()));
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(Self::range_header(start, len))
            .send()
            .await;

        match result {
            Ok(output) => Ok(Box::new(output.body.into_async_read())),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    Err(StorageError::NotFound(key.to_string()))
                } else {
                    Err(anyhow::Error::from(err).context("GetObject failed").into())
                }
            }
        }
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .context("Invalid presign expiry")
            .map_err(StorageError::Other)?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::Other(anyhow::Error::from(e).context("Presigning failed")))?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            expires_at: chrono::Utc::now().timestamp() + expires_in.as_secs() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_is_inclusive() {
        assert_eq!(S3AudioStorage::range_header(0, 1024), "bytes=0-1023");
        assert_eq!(S3AudioStorage::range_header(100, 1), "bytes=100-100");
        assert_eq!(S3AudioStorage::range_header(500, 500), "bytes=500-999");
    }
}
