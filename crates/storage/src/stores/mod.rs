use async_trait::async_trait;
use thiserror::Error;

use multireact_core::{
    ApplicationError, Bot, EnterpriseId, Installation, InstallationScope, ReactionList,
    StateMetadata, StateToken, TeamId, UserId, WorkspaceUser,
};

use crate::blob::StorageError;

pub mod installation;
pub mod state;
pub mod user_data;

pub use installation::BlobInstallationStore;
pub use state::{BlobOAuthStateStore, RandomTokens, TokenSource};
pub use user_data::BlobUserDataStore;

#[derive(Debug, Error)]
pub enum ConsumeError {
    /// Unknown, malformed, already used or expired.
    #[error("oauth state is invalid or expired")]
    Invalid,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ConsumeError> for ApplicationError {
    fn from(value: ConsumeError) -> Self {
        match value {
            ConsumeError::Invalid => ApplicationError::InvalidOAuthState,
            ConsumeError::Storage(error) => error.into(),
        }
    }
}

#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Writes the bot record, the workspace installer record and, when a user token is present,
    /// the per-user record. Writes are independent; an earlier write is not undone when a later
    /// one fails.
    async fn save(&self, installation: &Installation) -> Result<(), StorageError>;

    async fn find_bot(&self, scope: &InstallationScope) -> Result<Option<Bot>, StorageError>;

    async fn find_user(
        &self,
        scope: &InstallationScope,
        user_id: &UserId,
    ) -> Result<Option<Installation>, StorageError>;

    /// Latest installation of the workspace, whoever performed it.
    async fn find_installation(
        &self,
        scope: &InstallationScope,
    ) -> Result<Option<Installation>, StorageError>;

    async fn delete_bot(&self, scope: &InstallationScope) -> Result<(), StorageError>;

    async fn delete_user(
        &self,
        scope: &InstallationScope,
        user_id: &UserId,
    ) -> Result<(), StorageError>;

    /// Removes every record stored for the workspace and returns how many were deleted.
    async fn delete_all(&self, scope: &InstallationScope) -> Result<usize, StorageError>;
}

#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn issue(&self, metadata: StateMetadata) -> Result<StateToken, StorageError>;

    /// Single use: a successful consume removes the state.
    async fn consume(&self, token: &StateToken) -> Result<StateMetadata, ConsumeError>;

    /// Deletes expired and unreadable states; returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize, StorageError>;
}

#[async_trait]
pub trait UserDataStore: Send + Sync {
    /// Replaces the whole list. Concurrent writers race; the last write wins.
    async fn set_list(&self, user: &WorkspaceUser, list: &ReactionList)
        -> Result<(), StorageError>;

    /// Empty when the user never saved a list.
    async fn get_list(&self, user: &WorkspaceUser) -> Result<ReactionList, StorageError>;

    async fn delete_list(&self, user: &WorkspaceUser) -> Result<(), StorageError>;

    async fn purge_workspace(
        &self,
        enterprise_id: Option<&EnterpriseId>,
        team_id: &TeamId,
    ) -> Result<usize, StorageError>;
}
