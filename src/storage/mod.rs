//! Audio object storage.
//!
//! The catalog stores object keys; this module turns them into bytes. Two
//! backends: an S3-compatible store for deployments and a local media
//! directory for development and tests. Ranged reads are the primary access
//! path; presigned URLs let clients fetch straight from the object store.

mod fs;
mod s3;
mod url_signer;

pub use fs::FsAudioStorage;
pub use s3::S3AudioStorage;
pub use url_signer::{SignatureError, StreamUrlSigner};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("This storage backend cannot presign URLs")]
    PresigningUnsupported,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A time-limited URL granting access to one object without further auth.
#[derive(Clone, Debug, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    /// Unix seconds.
    pub expires_at: i64,
}

pub type AudioReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Size of the stored object in bytes.
    async fn object_size(&self, key: &str) -> Result<u64, StorageError>;

    /// Read `len` bytes starting at `start`. The caller guarantees the range
    /// lies within the object (it resolves ranges against `object_size`).
    async fn read_range(&self, key: &str, start: u64, len: u64) -> Result<AudioReader, StorageError>;

    /// Presign a GET URL for the object, valid for `expires_in`.
    ///
    /// Backends without native presigning return
    /// [`StorageError::PresigningUnsupported`]; the server then falls back to
    /// a locally signed streaming URL.
    async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError>;
}
