use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use multireact_core::{Bot, EnterpriseId, Installation, InstallationScope, TeamId, UserId};

use super::InstallationStore;
use crate::blob::{BlobClient, StorageError};
use crate::keys::{lookup_order, WorkspacePath};

/// Installation records as JSON documents in one bucket, namespaced by Slack client id.
#[derive(Clone)]
pub struct BlobInstallationStore {
    blob: BlobClient,
    client_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct BotDocument {
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    enterprise_id: Option<String>,
    #[serde(default)]
    enterprise_name: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    team_name: Option<String>,
    #[serde(default)]
    is_enterprise_install: bool,
    bot_token: String,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    bot_user_id: Option<String>,
    #[serde(default)]
    bot_scopes: Vec<String>,
    installed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstallationDocument {
    #[serde(flatten)]
    bot: BotDocument,
    user_id: String,
    #[serde(default)]
    user_token: Option<String>,
    #[serde(default)]
    user_scopes: Vec<String>,
}

impl BotDocument {
    fn from_installation(installation: &Installation) -> Self {
        Self {
            app_id: installation.app_id.clone(),
            enterprise_id: installation.enterprise_id.as_ref().map(|id| id.0.clone()),
            enterprise_name: installation.enterprise_name.clone(),
            team_id: installation.team_id.as_ref().map(|id| id.0.clone()),
            team_name: installation.team_name.clone(),
            is_enterprise_install: installation.is_enterprise_install,
            bot_token: installation.bot_token.expose_secret().to_owned(),
            bot_id: installation.bot_id.clone(),
            bot_user_id: installation.bot_user_id.clone(),
            bot_scopes: installation.bot_scopes.clone(),
            installed_at: installation.installed_at,
        }
    }

    fn into_bot(self) -> Bot {
        Bot {
            app_id: self.app_id,
            enterprise_id: self.enterprise_id.map(EnterpriseId),
            enterprise_name: self.enterprise_name,
            team_id: self.team_id.map(TeamId),
            team_name: self.team_name,
            is_enterprise_install: self.is_enterprise_install,
            bot_token: SecretString::from(self.bot_token),
            bot_id: self.bot_id,
            bot_user_id: self.bot_user_id,
            bot_scopes: self.bot_scopes,
            installed_at: self.installed_at,
        }
    }
}

impl InstallationDocument {
    fn from_installation(installation: &Installation) -> Self {
        Self {
            bot: BotDocument::from_installation(installation),
            user_id: installation.user_id.0.clone(),
            user_token: installation
                .user_token
                .as_ref()
                .map(|token| token.expose_secret().to_owned()),
            user_scopes: installation.user_scopes.clone(),
        }
    }

    fn into_installation(self) -> Installation {
        let bot = self.bot.into_bot();
        Installation {
            app_id: bot.app_id,
            enterprise_id: bot.enterprise_id,
            enterprise_name: bot.enterprise_name,
            team_id: bot.team_id,
            team_name: bot.team_name,
            is_enterprise_install: bot.is_enterprise_install,
            bot_token: bot.bot_token,
            bot_id: bot.bot_id,
            bot_user_id: bot.bot_user_id,
            bot_scopes: bot.bot_scopes,
            user_id: UserId(self.user_id),
            user_token: self.user_token.map(SecretString::from),
            user_scopes: self.user_scopes,
            installed_at: bot.installed_at,
        }
    }
}

impl BlobInstallationStore {
    pub fn new(blob: BlobClient, client_id: impl Into<String>) -> Self {
        Self { blob, client_id: client_id.into() }
    }

    async fn save_records(
        &self,
        path: &WorkspacePath,
        installation: &Installation,
    ) -> Result<(), StorageError> {
        self.blob.put_json(&path.bot_key(), &BotDocument::from_installation(installation)).await?;

        let document = InstallationDocument::from_installation(installation);
        self.blob.put_json(&path.installer_key(), &document).await?;

        if installation.has_user_token() {
            self.blob.put_json(&path.user_key(&installation.user_id), &document).await?;
        }
        Ok(())
    }

    async fn find_first<T>(
        &self,
        scope: &InstallationScope,
        key_for: impl Fn(&WorkspacePath) -> String + Send + Sync,
    ) -> Result<Option<T>, StorageError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        for path in lookup_order(&self.client_id, scope) {
            let key = key_for(&path);
            if let Some(document) = self.blob.get_json::<T>(&key).await? {
                debug!(
                    event_name = "storage.installation.found",
                    bucket = self.blob.bucket(),
                    key = %key,
                    "installation record found"
                );
                return Ok(Some(document));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl InstallationStore for BlobInstallationStore {
    async fn save(&self, installation: &Installation) -> Result<(), StorageError> {
        let path = WorkspacePath::for_scope(&self.client_id, &installation.scope());

        match self.save_records(&path, installation).await {
            Ok(()) => {
                info!(
                    event_name = "storage.installation.saved",
                    workspace = path.as_str(),
                    user_id = %installation.user_id,
                    user_token = installation.has_user_token(),
                    "installation saved"
                );
                Ok(())
            }
            Err(storage_error) => {
                error!(
                    event_name = "storage.installation.save_failed",
                    workspace = path.as_str(),
                    user_id = %installation.user_id,
                    error = %storage_error,
                    "installation save failed; earlier records are left in place"
                );
                Err(storage_error)
            }
        }
    }

    async fn find_bot(&self, scope: &InstallationScope) -> Result<Option<Bot>, StorageError> {
        let document: Option<BotDocument> = self.find_first(scope, WorkspacePath::bot_key).await?;
        Ok(document.map(BotDocument::into_bot))
    }

    async fn find_user(
        &self,
        scope: &InstallationScope,
        user_id: &UserId,
    ) -> Result<Option<Installation>, StorageError> {
        let document: Option<InstallationDocument> =
            self.find_first(scope, |path: &WorkspacePath| path.user_key(user_id)).await?;
        Ok(document.map(InstallationDocument::into_installation))
    }

    async fn find_installation(
        &self,
        scope: &InstallationScope,
    ) -> Result<Option<Installation>, StorageError> {
        let document: Option<InstallationDocument> =
            self.find_first(scope, WorkspacePath::installer_key).await?;
        Ok(document.map(InstallationDocument::into_installation))
    }

    async fn delete_bot(&self, scope: &InstallationScope) -> Result<(), StorageError> {
        let path = WorkspacePath::for_scope(&self.client_id, scope);
        self.blob.delete(&path.bot_key()).await?;
        info!(
            event_name = "storage.installation.bot_deleted",
            workspace = path.as_str(),
            "bot installation deleted"
        );
        Ok(())
    }

    async fn delete_user(
        &self,
        scope: &InstallationScope,
        user_id: &UserId,
    ) -> Result<(), StorageError> {
        let path = WorkspacePath::for_scope(&self.client_id, scope);
        self.blob.delete(&path.user_key(user_id)).await?;
        info!(
            event_name = "storage.installation.user_deleted",
            workspace = path.as_str(),
            user_id = %user_id,
            "user installation deleted"
        );
        Ok(())
    }

    async fn delete_all(&self, scope: &InstallationScope) -> Result<usize, StorageError> {
        let path = WorkspacePath::for_scope(&self.client_id, scope);
        let prefix = path.prefix();
        let keys: Vec<String> = self.blob.list(&prefix).try_collect().await?;

        for key in &keys {
            self.blob.delete(key).await?;
        }

        info!(
            event_name = "storage.installation.workspace_deleted",
            workspace = path.as_str(),
            deleted = keys.len(),
            "workspace installation records deleted"
        );
        Ok(keys.len())
    }
}
