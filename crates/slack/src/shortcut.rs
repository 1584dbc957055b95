use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, warn};

use multireact_core::{ApplicationError, EmojiName, InstallationScope, UserId, WorkspaceUser};
use multireact_storage::{InstallationStore, StorageError, UserDataStore};

use crate::blocks::{self, View};

pub const ADD_REACTIONS_CALLBACK_ID: &str = "add_reactions";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageShortcutPayload {
    pub callback_id: String,
    pub enterprise_id: Option<String>,
    pub team_id: String,
    pub is_enterprise_install: bool,
    pub user_id: String,
    pub channel_id: String,
    pub message_ts: String,
    pub trigger_id: String,
}

impl MessageShortcutPayload {
    pub fn workspace_user(&self) -> WorkspaceUser {
        WorkspaceUser::new(self.enterprise_id.as_deref(), &self.team_id, &self.user_id)
    }

    pub fn installation_scope(&self) -> InstallationScope {
        match (&self.enterprise_id, self.is_enterprise_install) {
            (Some(enterprise_id), true) => InstallationScope::org_wide(enterprise_id.clone()),
            (Some(enterprise_id), false) => {
                InstallationScope::enterprise_team(enterprise_id.clone(), self.team_id.clone())
            }
            (None, _) => InstallationScope::team(self.team_id.clone()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("slack api call `{method}` failed: {message}")]
pub struct SlackApiError {
    pub method: &'static str,
    pub message: String,
}

/// Web API calls the shortcut needs; tokens are passed per call.
#[async_trait]
pub trait ReactionClient: Send + Sync {
    /// Reactions `user_id` already placed on the message.
    async fn existing_reactions(
        &self,
        token: &SecretString,
        channel_id: &str,
        message_ts: &str,
        user_id: &str,
    ) -> Result<Vec<EmojiName>, SlackApiError>;

    async fn add_reaction(
        &self,
        token: &SecretString,
        channel_id: &str,
        message_ts: &str,
        emoji: &EmojiName,
    ) -> Result<(), SlackApiError>;

    async fn open_view(
        &self,
        token: &SecretString,
        trigger_id: &str,
        view: &View,
    ) -> Result<(), SlackApiError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShortcutOutcome {
    Reacted { applied: Vec<EmojiName>, failed: Vec<EmojiName>, already_present: usize },
    /// The user has no saved list; a modal telling them how to set one was opened.
    NoReactionsSaved,
    /// No user token on record; the user has to install the app for themselves first.
    AuthorizationRequired,
}

#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("unsupported shortcut callback: {0}")]
    UnsupportedCallback(String),
    #[error("no bot installation for the workspace")]
    NotInstalled,
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ShortcutError> for ApplicationError {
    fn from(value: ShortcutError) -> Self {
        match value {
            ShortcutError::Storage(error) => error.into(),
            other => ApplicationError::Integration(other.to_string()),
        }
    }
}

/// Replays the user's saved reactions onto a message.
pub struct ShortcutService {
    installations: Arc<dyn InstallationStore>,
    user_data: Arc<dyn UserDataStore>,
    client: Arc<dyn ReactionClient>,
    slash_command: String,
}

impl ShortcutService {
    pub fn new(
        installations: Arc<dyn InstallationStore>,
        user_data: Arc<dyn UserDataStore>,
        client: Arc<dyn ReactionClient>,
        slash_command: impl Into<String>,
    ) -> Self {
        Self { installations, user_data, client, slash_command: slash_command.into() }
    }

    pub async fn add_reactions(
        &self,
        payload: &MessageShortcutPayload,
    ) -> Result<ShortcutOutcome, ShortcutError> {
        if payload.callback_id != ADD_REACTIONS_CALLBACK_ID {
            return Err(ShortcutError::UnsupportedCallback(payload.callback_id.clone()));
        }

        let list = self.user_data.get_list(&payload.workspace_user()).await?;
        let scope = payload.installation_scope();

        if list.is_empty() {
            let bot = self.installations.find_bot(&scope).await?;
            let bot = bot.ok_or(ShortcutError::NotInstalled)?;
            let modal = blocks::no_reactions_modal(&self.slash_command);
            self.client.open_view(&bot.bot_token, &payload.trigger_id, &modal).await?;
            info!(
                event_name = "slack.shortcut.no_reactions",
                user_id = %payload.user_id,
                "user has no saved reactions"
            );
            return Ok(ShortcutOutcome::NoReactionsSaved);
        }

        let user_id = UserId(payload.user_id.clone());
        let token = self
            .installations
            .find_user(&scope, &user_id)
            .await?
            .and_then(|installation| installation.user_token);
        let Some(token) = token else {
            info!(
                event_name = "slack.shortcut.authorization_required",
                user_id = %payload.user_id,
                "no user token on record"
            );
            return Ok(ShortcutOutcome::AuthorizationRequired);
        };

        let existing = self
            .client
            .existing_reactions(&token, &payload.channel_id, &payload.message_ts, &payload.user_id)
            .await?;
        let pending = list.pending_after(&existing);
        let already_present = list.len() - pending.len();

        let mut applied = Vec::with_capacity(pending.len());
        let mut failed = Vec::new();
        for emoji in pending {
            match self
                .client
                .add_reaction(&token, &payload.channel_id, &payload.message_ts, &emoji)
                .await
            {
                Ok(()) => applied.push(emoji),
                Err(error) => {
                    warn!(
                        event_name = "slack.shortcut.reaction_failed",
                        user_id = %payload.user_id,
                        channel_id = %payload.channel_id,
                        message_ts = %payload.message_ts,
                        emoji = %emoji,
                        error = %error,
                        "failed to add reaction"
                    );
                    failed.push(emoji);
                }
            }
        }

        info!(
            event_name = "slack.shortcut.reacted",
            user_id = %payload.user_id,
            channel_id = %payload.channel_id,
            applied = applied.len(),
            failed = failed.len(),
            already_present,
            "saved reactions applied"
        );
        Ok(ShortcutOutcome::Reacted { applied, failed, already_present })
    }
}
