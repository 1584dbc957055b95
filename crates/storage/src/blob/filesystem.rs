use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;

use super::{BlobError, BlobStore, KeyPage};

const DEFAULT_PAGE_SIZE: usize = 1_000;

/// One directory per bucket under a shared root. Keys become relative paths; a put writes a
/// hidden sibling file and renames it over the target.
pub struct FilesystemBlobStore {
    bucket: String,
    dir: PathBuf,
    page_size: usize,
}

impl FilesystemBlobStore {
    pub fn new(root: impl AsRef<Path>, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let dir = root.as_ref().join(&bucket);
        Self { bucket, dir, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        if key.is_empty() {
            return Err(BlobError::Rejected("object key must not be empty".to_owned()));
        }

        let mut path = self.dir.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment.starts_with('.') || segment.contains('\\') {
                return Err(BlobError::Rejected(format!(
                    "object key `{key}` has an unsupported path segment `{segment}`"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    async fn collect_keys(&self) -> Result<Vec<String>, BlobError> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.dir.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(error) if error.kind() == ErrorKind::NotFound => continue,
                Err(error) => return Err(classify_io(&dir, error)),
            };

            while let Some(entry) =
                entries.next_entry().await.map_err(|error| classify_io(&dir, error))?
            {
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }

                let file_type =
                    entry.file_type().await.map_err(|error| classify_io(&entry.path(), error))?;
                let key = format!("{key_prefix}{name}");
                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{key}/")));
                } else if file_type.is_file() {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn classify_io(path: &Path, error: std::io::Error) -> BlobError {
    let message = format!("{}: {error}", path.display());
    match error.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            BlobError::Transient(message)
        }
        _ => BlobError::Rejected(message),
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), BlobError> {
        let path = self.object_path(key)?;
        let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Err(BlobError::Rejected(format!("object key `{key}` has no file name")));
        };

        tokio::fs::create_dir_all(parent).await.map_err(|error| classify_io(parent, error))?;

        let suffix: u64 = rand::thread_rng().gen();
        let staging =
            parent.join(format!(".{}.{suffix:016x}.tmp", file_name.to_string_lossy()));
        tokio::fs::write(&staging, body).await.map_err(|error| classify_io(&staging, error))?;

        if let Err(error) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(classify_io(&path, error));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(classify_io(&path, error)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(classify_io(&path, error)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<KeyPage, BlobError> {
        let mut keys: Vec<String> = self
            .collect_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| page_token.map_or(true, |token| key.as_str() > token))
            .take(self.page_size + 1)
            .collect();

        let next_page_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        Ok(KeyPage { keys, next_page_token })
    }
}
