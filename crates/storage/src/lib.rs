pub mod backend;
pub mod blob;
pub mod keys;
pub mod stores;

pub use backend::{open_stores, BackendError, Stores};
pub use blob::{BlobClient, BlobError, BlobStore, KeyPage, RetryPolicy, StorageError};
pub use stores::{
    BlobInstallationStore, BlobOAuthStateStore, BlobUserDataStore, ConsumeError,
    InstallationStore, OAuthStateStore, UserDataStore,
};
