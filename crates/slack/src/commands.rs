use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use multireact_core::{
    extract_emoji, ApplicationError, DomainError, ReactionList, TeamId, WorkspaceUser,
    MAX_REACTIONS,
};
use multireact_storage::{StorageError, UserDataStore};

use crate::blocks::{self, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub enterprise_id: Option<String>,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub request_id: String,
}

impl SlashCommandPayload {
    pub fn workspace_user(&self) -> WorkspaceUser {
        WorkspaceUser::new(self.enterprise_id.as_deref(), &self.team_id, &self.user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReactionCommand {
    Show,
    Save { text: String },
}

pub fn parse_reaction_command(input: &str) -> ReactionCommand {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        ReactionCommand::Show
    } else {
        ReactionCommand::Save { text: trimmed.to_owned() }
    }
}

/// Emoji names usable in a workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KnownEmoji {
    Any,
    Only(HashSet<String>),
}

impl KnownEmoji {
    pub fn filter(&self, list: ReactionList) -> ReactionList {
        match self {
            Self::Any => list,
            Self::Only(names) => list.retain_known(names),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("emoji catalog unavailable: {0}")]
pub struct CatalogError(pub String);

#[async_trait]
pub trait EmojiCatalog: Send + Sync {
    /// Standard and custom emoji of the workspace, by base name.
    async fn known_emoji(&self, team_id: &TeamId) -> Result<KnownEmoji, CatalogError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllEmoji;

#[async_trait]
impl EmojiCatalog for AllowAllEmoji {
    async fn known_emoji(&self, _team_id: &TeamId) -> Result<KnownEmoji, CatalogError> {
        Ok(KnownEmoji::Any)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CommandError> for ApplicationError {
    fn from(value: CommandError) -> Self {
        match value {
            CommandError::UnsupportedCommand(command) => {
                DomainError::InvariantViolation(format!("unsupported command {command}")).into()
            }
            CommandError::Catalog(error) => ApplicationError::Integration(error.to_string()),
            CommandError::Storage(error) => error.into(),
        }
    }
}

/// Saves or shows a user's reaction list.
pub struct ReactionCommandService {
    user_data: Arc<dyn UserDataStore>,
    catalog: Arc<dyn EmojiCatalog>,
    slash_command: String,
}

impl ReactionCommandService {
    pub fn new(
        user_data: Arc<dyn UserDataStore>,
        catalog: Arc<dyn EmojiCatalog>,
        slash_command: impl Into<String>,
    ) -> Self {
        Self { user_data, catalog, slash_command: slash_command.into() }
    }

    pub fn slash_command(&self) -> &str {
        &self.slash_command
    }

    pub async fn handle(
        &self,
        payload: &SlashCommandPayload,
    ) -> Result<MessageTemplate, CommandError> {
        if payload.command != self.slash_command {
            return Err(CommandError::UnsupportedCommand(payload.command.clone()));
        }

        let user = payload.workspace_user();
        match parse_reaction_command(&payload.text) {
            ReactionCommand::Show => self.show(&user).await,
            ReactionCommand::Save { text } => self.save(&user, &text).await,
        }
    }

    async fn show(&self, user: &WorkspaceUser) -> Result<MessageTemplate, CommandError> {
        let list = self.user_data.get_list(user).await?;
        info!(
            event_name = "slack.command.shown",
            user_id = %user.user_id,
            count = list.len(),
            "saved reactions shown"
        );

        if list.is_empty() {
            Ok(blocks::no_reactions_message(&self.slash_command))
        } else {
            Ok(blocks::current_reactions_message(&list, &self.slash_command))
        }
    }

    async fn save(
        &self,
        user: &WorkspaceUser,
        text: &str,
    ) -> Result<MessageTemplate, CommandError> {
        let known = self.catalog.known_emoji(&user.team_id).await?;
        let list = known.filter(extract_emoji(text));

        if list.len() > MAX_REACTIONS {
            info!(
                event_name = "slack.command.too_many",
                user_id = %user.user_id,
                count = list.len(),
                limit = MAX_REACTIONS,
                "reaction list refused"
            );
            return Ok(blocks::too_many_reactions_message());
        }
        if list.is_empty() {
            info!(
                event_name = "slack.command.no_valid",
                user_id = %user.user_id,
                "no valid reactions in command"
            );
            return Ok(blocks::no_valid_reactions_message());
        }

        self.user_data.set_list(user, &list).await?;
        Ok(blocks::reactions_saved_message(&self.slash_command))
    }
}
