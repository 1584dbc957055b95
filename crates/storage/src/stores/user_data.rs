use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{info, warn};

use multireact_core::{EmojiName, EnterpriseId, ReactionList, TeamId, WorkspaceUser};

use super::UserDataStore;
use crate::blob::{BlobClient, StorageError};
use crate::keys::{user_data_key, user_data_prefix};

/// Saved reaction lists stored as space separated emoji names, one object per user.
#[derive(Clone)]
pub struct BlobUserDataStore {
    blob: BlobClient,
    client_id: String,
}

impl BlobUserDataStore {
    pub fn new(blob: BlobClient, client_id: impl Into<String>) -> Self {
        Self { blob, client_id: client_id.into() }
    }
}

fn parse_stored_list(key: &str, text: &str) -> ReactionList {
    text.split_whitespace()
        .filter_map(|name| match EmojiName::parse(name) {
            Ok(emoji) => Some(emoji),
            Err(error) => {
                warn!(
                    event_name = "storage.user_data.invalid_entry",
                    key,
                    error = %error,
                    "skipping unreadable emoji in saved list"
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl UserDataStore for BlobUserDataStore {
    async fn set_list(
        &self,
        user: &WorkspaceUser,
        list: &ReactionList,
    ) -> Result<(), StorageError> {
        let key = user_data_key(&self.client_id, user);
        self.blob.put_text(&key, &list.names().join(" ")).await?;

        info!(
            event_name = "storage.user_data.saved",
            team_id = %user.team_id,
            user_id = %user.user_id,
            count = list.len(),
            "reaction list saved"
        );
        Ok(())
    }

    async fn get_list(&self, user: &WorkspaceUser) -> Result<ReactionList, StorageError> {
        let key = user_data_key(&self.client_id, user);
        let text = self.blob.get_text(&key).await?;
        Ok(text.map(|text| parse_stored_list(&key, &text)).unwrap_or_default())
    }

    async fn delete_list(&self, user: &WorkspaceUser) -> Result<(), StorageError> {
        let key = user_data_key(&self.client_id, user);
        self.blob.delete(&key).await?;

        info!(
            event_name = "storage.user_data.deleted",
            team_id = %user.team_id,
            user_id = %user.user_id,
            "reaction list deleted"
        );
        Ok(())
    }

    async fn purge_workspace(
        &self,
        enterprise_id: Option<&EnterpriseId>,
        team_id: &TeamId,
    ) -> Result<usize, StorageError> {
        let prefix = user_data_prefix(&self.client_id, enterprise_id, team_id);
        let keys: Vec<String> = self.blob.list(&prefix).try_collect().await?;

        for key in &keys {
            self.blob.delete(key).await?;
        }

        info!(
            event_name = "storage.user_data.workspace_purged",
            team_id = %team_id,
            deleted = keys.len(),
            "workspace reaction lists purged"
        );
        Ok(keys.len())
    }
}
