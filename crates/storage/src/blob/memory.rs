use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobError, BlobStore, KeyPage};

const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Bucket held in an ordered map. Page tokens are the last key of the previous page.
pub struct InMemoryBlobStore {
    bucket: String,
    page_size: usize,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_page_size(bucket, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(bucket: impl Into<String>, page_size: usize) -> Self {
        Self { bucket: bucket.into(), page_size: page_size.max(1), objects: RwLock::default() }
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), BlobError> {
        if key.is_empty() {
            return Err(BlobError::Rejected("object key must not be empty".to_owned()));
        }
        let mut objects = self.objects.write().await;
        objects.insert(key.to_owned(), body.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<KeyPage, BlobError> {
        let lower = match page_token {
            Some(token) => Bound::Excluded(token.to_owned()),
            None => Bound::Included(prefix.to_owned()),
        };

        let objects = self.objects.read().await;
        let mut keys: Vec<String> = objects
            .range((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .take(self.page_size + 1)
            .cloned()
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

#[cfg(test)]
mod tests {
    use super::InMemoryBlobStore;
    use crate::blob::BlobStore;

    #[tokio::test]
    async fn put_get_delete_roundtrip_is_idempotent_on_delete() {
        let store = InMemoryBlobStore::new("bucket");

        store.put("a/1", b"one").await.expect("put");
        assert_eq!(store.get("a/1").await.expect("get").as_deref(), Some(&b"one"[..]));

        store.delete("a/1").await.expect("delete");
        store.delete("a/1").await.expect("second delete is a no-op");
        assert_eq!(store.get("a/1").await.expect("get"), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_pages_only_cover_the_prefix() {
        let store = InMemoryBlobStore::with_page_size("bucket", 2);
        for key in ["a/1", "a/2", "a/3", "ab/1", "b/1", "0/1"] {
            store.put(key, b"x").await.expect("put");
        }

        let first = store.list_page("a/", None).await.expect("first page");
        assert_eq!(first.keys, vec!["a/1", "a/2"]);
        assert_eq!(first.next_page_token.as_deref(), Some("a/2"));

        let second =
            store.list_page("a/", first.next_page_token.as_deref()).await.expect("second page");
        assert_eq!(second.keys, vec!["a/3"]);
        assert_eq!(second.next_page_token, None);

        let everything = store.list_page("", None).await.expect("unfiltered page");
        assert_eq!(everything.keys, vec!["0/1", "a/1"]);
    }

    #[tokio::test]
    async fn empty_keys_are_rejected() {
        let store = InMemoryBlobStore::new("bucket");

        assert!(store.put("", b"x").await.is_err());
    }
}
