use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use multireact_core::config::{OAuthConfig, StorageBackend, StorageConfig};

use crate::blob::gcs::MetadataTokenSource;
use crate::blob::{
    BlobClient, BlobError, BlobStore, FilesystemBlobStore, GcsBlobStore, GcsCredentials,
    InMemoryBlobStore, RetryPolicy,
};
use crate::stores::{
    BlobInstallationStore, BlobOAuthStateStore, BlobUserDataStore, InstallationStore,
    OAuthStateStore, UserDataStore,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build http client for object storage: {0}")]
    HttpClient(String),
    #[error("invalid object storage settings for bucket `{bucket}`: {source}")]
    Bucket { bucket: String, source: BlobError },
    #[error("failed to prepare storage directory `{path}`: {source}")]
    Directory { path: String, source: std::io::Error },
    #[error("oauth.state_expiration_secs = {0} is too large to represent as a duration")]
    StateTtl(u64),
}

/// Store handles wired to the configured backend. Each store owns its bucket's client.
#[derive(Clone)]
pub struct Stores {
    pub installations: Arc<dyn InstallationStore>,
    pub oauth_states: Arc<dyn OAuthStateStore>,
    pub user_data: Arc<dyn UserDataStore>,
    /// Bucket clients in installation, state, user data order; used for health probes.
    pub buckets: Vec<BlobClient>,
}

pub async fn open_stores(
    client_id: &str,
    storage: &StorageConfig,
    oauth: &OAuthConfig,
) -> Result<Stores, BackendError> {
    let policy = RetryPolicy::from_config(storage);
    let http = match storage.backend {
        StorageBackend::Gcs => Some(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(storage.timeout_secs))
                .build()
                .map_err(|error| BackendError::HttpClient(error.to_string()))?,
        ),
        StorageBackend::Memory | StorageBackend::Filesystem => None,
    };

    if storage.backend == StorageBackend::Filesystem {
        tokio::fs::create_dir_all(&storage.root_dir).await.map_err(|source| {
            BackendError::Directory { path: storage.root_dir.display().to_string(), source }
        })?;
    }

    let installation_bucket =
        open_bucket(storage, &storage.installation_bucket, http.as_ref(), policy.clone())?;
    let state_bucket = open_bucket(storage, &storage.state_bucket, http.as_ref(), policy.clone())?;
    let user_data_bucket =
        open_bucket(storage, &storage.user_data_bucket, http.as_ref(), policy)?;

    let state_ttl = i64::try_from(oauth.state_expiration_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(BackendError::StateTtl(oauth.state_expiration_secs))?;
    let stores = Stores {
        installations: Arc::new(BlobInstallationStore::new(installation_bucket.clone(), client_id)),
        oauth_states: Arc::new(BlobOAuthStateStore::new(state_bucket.clone(), state_ttl)),
        user_data: Arc::new(BlobUserDataStore::new(user_data_bucket.clone(), client_id)),
        buckets: vec![installation_bucket, state_bucket, user_data_bucket],
    };

    info!(
        event_name = "system.storage.opened",
        backend = ?storage.backend,
        installation_bucket = %storage.installation_bucket,
        state_bucket = %storage.state_bucket,
        user_data_bucket = %storage.user_data_bucket,
        "storage backend opened"
    );
    Ok(stores)
}

fn open_bucket(
    storage: &StorageConfig,
    bucket: &str,
    http: Option<&reqwest::Client>,
    policy: RetryPolicy,
) -> Result<BlobClient, BackendError> {
    let store: Arc<dyn BlobStore> = match (storage.backend, http) {
        (StorageBackend::Gcs, Some(http)) => {
            let credentials = match &storage.gcs_access_token {
                Some(token) => GcsCredentials::Static(token.clone()),
                None => GcsCredentials::MetadataServer(MetadataTokenSource::default()),
            };
            let store = GcsBlobStore::new(http.clone(), &storage.gcs_base_url, bucket, credentials)
                .map_err(|source| BackendError::Bucket { bucket: bucket.to_owned(), source })?;
            Arc::new(store)
        }
        (StorageBackend::Filesystem, _) => {
            Arc::new(FilesystemBlobStore::new(&storage.root_dir, bucket))
        }
        (StorageBackend::Memory, _) | (StorageBackend::Gcs, None) => {
            Arc::new(InMemoryBlobStore::new(bucket))
        }
    };

    Ok(BlobClient::new(store, policy))
}
