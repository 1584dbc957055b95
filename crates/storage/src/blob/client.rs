use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::{BlobError, BlobStore, KeyPage, RetryPolicy, StorageError};

const PROBE_KEY: &str = "_health/probe";

/// Retrying handle over one bucket. Cloning shares the backend.
#[derive(Clone)]
pub struct BlobClient {
    store: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

struct ListCursor {
    buffered: VecDeque<String>,
    page_token: Option<String>,
    finished: bool,
}

impl BlobClient {
    pub fn new(store: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn put(&self, key: &str, body: &[u8]) -> Result<(), StorageError> {
        let store = &self.store;
        self.with_retry("put", key, move || store.put(key, body)).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let store = &self.store;
        self.with_retry("get", key, move || store.get(key)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let store = &self.store;
        self.with_retry("delete", key, move || store.delete(key)).await
    }

    pub async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<KeyPage, StorageError> {
        let store = &self.store;
        self.with_retry("list", prefix, move || store.list_page(prefix, page_token)).await
    }

    /// Keys under `prefix`, fetched a page at a time as the stream is polled. The stream ends
    /// after the first error; list again to start over.
    pub fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String, StorageError>> {
        let cursor = ListCursor { buffered: VecDeque::new(), page_token: None, finished: false };

        stream::try_unfold(cursor, move |cursor| self.next_listed_key(prefix, cursor)).boxed()
    }

    async fn next_listed_key(
        &self,
        prefix: &str,
        mut cursor: ListCursor,
    ) -> Result<Option<(String, ListCursor)>, StorageError> {
        loop {
            if let Some(key) = cursor.buffered.pop_front() {
                return Ok(Some((key, cursor)));
            }
            if cursor.finished {
                return Ok(None);
            }

            let page = self.list_page(prefix, cursor.page_token.as_deref()).await?;
            cursor.buffered.extend(page.keys);
            cursor.finished = page.next_page_token.is_none();
            cursor.page_token = page.next_page_token;
        }
    }

    pub async fn put_json<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let body = serde_json::to_vec(value).map_err(|error| StorageError::Encode {
            key: key.to_owned(),
            message: error.to_string(),
        })?;
        self.put(key, &body).await
    }

    pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned,
    {
        let Some(body) = self.get(key).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&body).map(Some).map_err(|error| StorageError::Decode {
            bucket: self.bucket().to_owned(),
            key: key.to_owned(),
            message: error.to_string(),
        })
    }

    pub async fn put_text(&self, key: &str, text: &str) -> Result<(), StorageError> {
        self.put(key, text.as_bytes()).await
    }

    pub async fn get_text(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(body) = self.get(key).await? else {
            return Ok(None);
        };

        String::from_utf8(body).map(Some).map_err(|error| StorageError::Decode {
            bucket: self.bucket().to_owned(),
            key: key.to_owned(),
            message: error.to_string(),
        })
    }

    /// Reads a sentinel key once, without retries; a missing object still proves the bucket
    /// is reachable.
    pub async fn probe(&self) -> Result<(), StorageError> {
        let single = BlobClient {
            store: self.store.clone(),
            policy: RetryPolicy { max_attempts: 1, ..self.policy.clone() },
        };
        single.get(PROBE_KEY).await.map(|_| ())
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        call: F,
    ) -> Result<T, StorageError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BlobError>>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BlobError::Transient(format!(
                    "timed out after {}ms",
                    self.policy.timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            event_name = "storage.blob.recovered",
                            bucket = self.bucket(),
                            key,
                            operation,
                            attempt,
                            "blob call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(BlobError::Rejected(message)) => {
                    warn!(
                        event_name = "storage.blob.rejected",
                        bucket = self.bucket(),
                        key,
                        operation,
                        error = %message,
                        "blob call rejected"
                    );
                    return Err(StorageError::Rejected {
                        operation,
                        bucket: self.bucket().to_owned(),
                        key: key.to_owned(),
                        message,
                    });
                }
                Err(BlobError::Transient(message)) => {
                    if attempt >= max_attempts {
                        error!(
                            event_name = "storage.blob.unavailable",
                            bucket = self.bucket(),
                            key,
                            operation,
                            attempts = attempt,
                            error = %message,
                            "blob retries exhausted"
                        );
                        return Err(StorageError::Unavailable {
                            operation,
                            bucket: self.bucket().to_owned(),
                            key: key.to_owned(),
                            attempts: attempt,
                            message,
                        });
                    }

                    let delay = self.policy.backoff(attempt - 1);
                    warn!(
                        event_name = "storage.blob.retrying",
                        bucket = self.bucket(),
                        key,
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient blob failure"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
