use async_trait::async_trait;
use thiserror::Error;

use multireact_core::ApplicationError;

pub mod client;
pub mod filesystem;
pub mod gcs;
pub mod memory;
pub mod retry;

pub use client::BlobClient;
pub use filesystem::FilesystemBlobStore;
pub use gcs::{GcsBlobStore, GcsCredentials};
pub use memory::InMemoryBlobStore;
pub use retry::RetryPolicy;

/// Failure reported by a backend for a single call. Absence of an object is not a failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("transient blob failure: {0}")]
    Transient(String),
    #[error("blob request rejected: {0}")]
    Rejected(String),
}

impl BlobError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure surfaced to stores once retries are settled.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{operation} `{bucket}/{key}` unavailable after {attempts} attempt(s): {message}")]
    Unavailable {
        operation: &'static str,
        bucket: String,
        key: String,
        attempts: u32,
        message: String,
    },
    #[error("{operation} `{bucket}/{key}` rejected: {message}")]
    Rejected { operation: &'static str, bucket: String, key: String, message: String },
    #[error("could not decode `{bucket}/{key}`: {message}")]
    Decode { bucket: String, key: String, message: String },
    #[error("could not encode `{key}`: {message}")]
    Encode { key: String, message: String },
}

impl From<StorageError> for ApplicationError {
    fn from(value: StorageError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyPage {
    pub keys: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Named objects in one bucket. Implementations make a single call and classify its failure;
/// retries belong to [`BlobClient`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<KeyPage, BlobError>;
}
