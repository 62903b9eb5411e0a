//! Filesystem blob store.
//!
//! One file per document, stored flat under the root as `{id}_{filename}`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use slug::slugify;
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use uuid::Uuid;

use crate::application::repos::{BlobError, BlobStore, StoredBlob};

const FALLBACK_STEM: &str = "blob";

#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(BlobError::InvalidPath);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(
        &self,
        id: Uuid,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredBlob, BlobError> {
        let path = blob_path(id, original_name);
        let absolute = self.resolve(&path)?;

        let file = fs::File::create(&absolute).await?;
        write_or_remove(file, &absolute, &data).await?;

        Ok(StoredBlob {
            path,
            size_bytes: data.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobError> {
        let absolute = self.resolve(path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(path.into())),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let absolute = self.resolve(path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(path.into())),
            Err(err) => Err(err.into()),
        }
    }
}

/// Write and flush `data`, deleting the file at `absolute` if either step fails.
async fn write_or_remove<W>(mut writer: W, absolute: &Path, data: &[u8]) -> Result<(), BlobError>
where
    W: AsyncWrite + Unpin,
{
    let outcome = match writer.write_all(data).await {
        Ok(()) => writer.flush().await,
        Err(err) => Err(err),
    };
    drop(writer);

    if let Err(err) = outcome {
        let _ = fs::remove_file(absolute).await;
        return Err(err.into());
    }
    Ok(())
}

/// Relative path a document's bytes live under.
pub fn blob_path(id: Uuid, original_name: &str) -> String {
    format!("{id}_{}", sanitize_filename(original_name))
}

/// Reduce a client-supplied filename to a slug plus lowercase extension.
fn sanitize_filename(original: &str) -> String {
    // Clients on Windows send backslash-separated paths.
    let basename = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let path = Path::new(basename);

    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .map(slugify)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
