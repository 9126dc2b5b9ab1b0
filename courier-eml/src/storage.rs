//! Content-addressed storage for rendered messages.
//!
//! A message is stored at `<root>/<hh>/<sha256>.eml` where `hh` is the
//! first two hex digits of the digest. Writes go to a temporary file and
//! are renamed into place, so a crash never leaves a partial `.eml`
//! visible to the sender pipe. Storing identical bytes twice is a no-op.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::EmlError;

#[derive(Debug, Clone)]
pub struct EmlStorage {
    root: PathBuf,
}

impl EmlStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the storage root exists and is a directory.
    ///
    /// # Errors
    ///
    /// If the root cannot be created, or exists and is not a directory.
    pub fn init(&self) -> Result<(), EmlError> {
        let root = Path::new(&self.root);
        if !root.try_exists()? {
            std::fs::create_dir_all(root)?;
        } else if !root.is_dir() {
            return Err(EmlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("expected {} to be a directory", root.display()),
            )));
        }

        Ok(())
    }

    /// Persist the rendered bytes, returning the absolute `.eml` path.
    ///
    /// # Errors
    ///
    /// Any filesystem failure while writing.
    pub async fn store(&self, data: &[u8]) -> Result<PathBuf, EmlError> {
        let digest = hex_digest(data);
        let dir = self.root.join(&digest[..2]);
        let final_path = dir.join(format!("{digest}.eml"));

        if fs::try_exists(&final_path).await? {
            return Ok(final_path);
        }

        fs::create_dir_all(&dir).await?;

        let temp_path = dir.join(format!(".tmp_{digest}.eml"));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &final_path).await?;

        tracing::debug!(path = %final_path.display(), bytes = data.len(), "stored eml");
        Ok(final_path)
    }
}

fn hex_digest(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_under_content_address() {
        let dir = tempfile::tempdir().unwrap();
        let storage = EmlStorage::new(dir.path());
        storage.init().unwrap();

        let path = storage.store(b"From: a@x\r\n\r\nhello\r\n").await.unwrap();

        assert!(path.starts_with(dir.path()));
        assert_eq!(path.extension().unwrap(), "eml");
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"From: a@x\r\n\r\nhello\r\n");

        // The shard directory is the first two hex digits of the digest.
        let shard = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(&stem[..2], shard);
        assert_eq!(stem.len(), 64);
    }

    #[tokio::test]
    async fn identical_content_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = EmlStorage::new(dir.path());
        storage.init().unwrap();

        let first = storage.store(b"same bytes").await.unwrap();
        let second = storage.store(b"same bytes").await.unwrap();
        assert_eq!(first, second);

        let third = storage.store(b"different bytes").await.unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = EmlStorage::new(dir.path());
        storage.init().unwrap();

        let path = storage.store(b"payload").await.unwrap();
        let shard_dir = path.parent().unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(shard_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn init_rejects_a_file_at_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").unwrap();

        let storage = EmlStorage::new(&file_path);
        assert!(storage.init().is_err());
    }
}
