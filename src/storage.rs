use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

pub const FILM_POSTERS: &str = "filmposter";
pub const ACTOR_AVATARS: &str = "actoravatar";
pub const USER_AVATARS: &str = "useravatar";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes an object and returns its public URL.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<String>;

    /// Removing an absent object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()>;
}

/// Buckets are directories under `root`, served back under `public_url`.
pub struct FsObjectStore {
    root: PathBuf,
    public_url: String,
}

impl FsObjectStore {
    pub fn new(root: PathBuf, public_url: impl Into<String>) -> Self {
        Self { root, public_url: public_url.into().trim_end_matches('/').to_string() }
    }

    fn path(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(bucket).join(key);
        anyhow::ensure!(
            rel.components().all(|c| matches!(c, Component::Normal(_))),
            "object key escapes its bucket: {bucket}/{key}"
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let path = self.path(bucket, key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.with_context(|| format!("mkdir {dir:?}"))?;
        }
        tokio::fs::write(&path, bytes).await.with_context(|| format!("write {path:?}"))?;
        debug!(bucket, key, content_type, "object stored");
        Ok(format!("{}/{bucket}/{key}", self.public_url))
    }

    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        let path = self.path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err).context(format!("remove {path:?}"))),
        }
    }
}

/// Deadline-bounded access to an [`ObjectStore`]. Uploads are part of the primary write and
/// fail it; deletes are cleanup and only log.
#[derive(Clone)]
pub struct Assets {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl Assets {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String> {
        match tokio::time::timeout(self.timeout, self.store.put(bucket, key, bytes, content_type))
            .await
        {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(err)) => {
                warn!(bucket, key, error = %err, "object upload failed");
                Err(AppError::UpstreamUnavailable("object store"))
            },
            Err(_) => {
                warn!(bucket, key, "object upload timed out");
                Err(AppError::UpstreamUnavailable("object store"))
            },
        }
    }

    pub async fn delete(&self, bucket: &str, key: &str) {
        match tokio::time::timeout(self.timeout, self.store.delete(bucket, key)).await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => warn!(bucket, key, error = %err, "object delete failed"),
            Err(_) => warn!(bucket, key, "object delete timed out"),
        }
    }
}

pub fn poster_key(film_id: i32) -> String {
    format!("posters/{film_id}.webp")
}

pub fn actor_avatar_key(actor_id: i32) -> String {
    format!("avatars/{actor_id}.webp")
}

pub fn user_avatar_key(user_id: i32, size: &str) -> String {
    format!("avatars/{user_id}/{size}.webp")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_writes_under_bucket_and_deletes_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf(), "http://cdn.test/static/");

        let url = store.put(FILM_POSTERS, &poster_key(7), vec![1, 2, 3], "image/webp").await.unwrap();
        assert_eq!(url, "http://cdn.test/static/filmposter/posters/7.webp");
        assert_eq!(std::fs::read(dir.path().join("filmposter/posters/7.webp")).unwrap(), vec![1, 2, 3]);

        store.delete(FILM_POSTERS, &poster_key(7)).await.unwrap();
        store.delete(FILM_POSTERS, &poster_key(7)).await.unwrap();
        assert!(!dir.path().join("filmposter/posters/7.webp").exists());
    }

    #[tokio::test]
    async fn fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf(), "http://cdn.test");
        assert!(store.put(USER_AVATARS, "../../etc/passwd", vec![], "image/webp").await.is_err());
    }
}
