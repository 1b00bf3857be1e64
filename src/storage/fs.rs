//! Local-directory audio storage for development and tests.

use super::{AudioReader, AudioStorage, PresignedUrl, StorageError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

pub struct FsAudioStorage {
    media_base_path: PathBuf,
}

impl FsAudioStorage {
    pub fn new<P: AsRef<Path>>(media_base_path: P) -> Self {
        Self {
            media_base_path: media_base_path.as_ref().to_path_buf(),
        }
    }

    /// Object keys come from the database, but keep them inside the media
    /// directory anyway.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let traversal_free = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !traversal_free {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.media_base_path.join(relative))
    }

    async fn open(&self, key: &str) -> Result<File, StorageError> {
        let path = self.resolve(key)?;
        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(anyhow::Error::from(err).into()),
        }
    }
}

#[async_trait]
impl AudioStorage for FsAudioStorage {
    async fn object_size(&self, key: &str) -> Result<u64, StorageError> {
        let file = self.open(key).await?;
        let metadata = file
            .metadata()
            .await
            .map_err(anyhow::Error::from)?;
        Ok(metadata.len())
    }

    async fn read_range(
        &self,
        key: &str,
        start: u64,
        len: u64,
    ) -> Result<AudioReader, StorageError> {
        let mut file = self.open(key).await?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(anyhow::Error::from)?;
        Ok(Box::new(file.take(len)))
    }

    async fn presigned_get_url(
        &self,
        _key: &str,
        _expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        Err(StorageError::PresigningUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn read_all(mut reader: AudioReader) -> Vec<u8> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();
        buffer
    }

    fn make_storage(content: &[u8]) -> (TempDir, FsAudioStorage) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("audio")).unwrap();
        std::fs::write(dir.path().join("audio/lec-1.mp3"), content).unwrap();
        let storage = FsAudioStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn reports_object_size() {
        let (_dir, storage) = make_storage(&[0u8; 512]);
        assert_eq!(storage.object_size("audio/lec-1.mp3").await.unwrap(), 512);
        assert!(matches!(
            storage.object_size("audio/missing.mp3").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reads_exact_ranges() {
        let content: Vec<u8> = (0u8..=255).collect();
        let (_dir, storage) = make_storage(&content);

        let reader = storage.read_range("audio/lec-1.mp3", 0, 256).await.unwrap();
        assert_eq!(read_all(reader).await, content);

        let reader = storage.read_range("audio/lec-1.mp3", 10, 5).await.unwrap();
        assert_eq!(read_all(reader).await, &content[10..15]);

        let reader = storage
            .read_range("audio/lec-1.mp3", 250, 6)
            .await
            .unwrap();
        assert_eq!(read_all(reader).await, &content[250..256]);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let (_dir, storage) = make_storage(&[0u8; 16]);
        assert!(matches!(
            storage.object_size("../outside.mp3").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.object_size("audio/../../outside.mp3").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.object_size("").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn presigning_is_unsupported() {
        let (_dir, storage) = make_storage(&[0u8; 16]);
        assert!(matches!(
            storage
                .presigned_get_url("audio/lec-1.mp3", Duration::from_secs(60))
                .await,
            Err(StorageError::PresigningUnsupported)
        ));
    }
}
