use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use multireact_core::{ApplicationError, InterfaceError};

use crate::{
    blocks::{self, MessageTemplate, View},
    commands::{CommandError, ReactionCommandService, SlashCommandPayload},
    lifecycle::{
        AppUninstalledEvent, LifecycleError, LifecycleService, RevocationSummary,
        TokensRevokedEvent, UninstallSummary,
    },
    shortcut::{MessageShortcutPayload, ShortcutError, ShortcutOutcome, ShortcutService},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    MessageShortcut(MessageShortcutPayload),
    TokensRevoked(TokensRevokedEvent),
    AppUninstalled(AppUninstalledEvent),
    AppHomeOpened(AppHomeOpenedEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::MessageShortcut(_) => SlackEventType::MessageShortcut,
            Self::TokensRevoked(_) => SlackEventType::TokensRevoked,
            Self::AppUninstalled(_) => SlackEventType::AppUninstalled,
            Self::AppHomeOpened(_) => SlackEventType::AppHomeOpened,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    MessageShortcut,
    TokensRevoked,
    AppUninstalled,
    AppHomeOpened,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppHomeOpenedEvent {
    pub user_id: String,
    pub tab: String,
    /// Public host the request came in on; enables screenshots in the home tab.
    pub host: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Shortcut(ShortcutOutcome),
    /// View to publish to the user's App Home.
    Publish { user_id: String, view: View },
    Revoked(RevocationSummary),
    Uninstalled(UninstallSummary),
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Shortcut(#[from] ShortcutError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl EventHandlerError {
    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        ApplicationError::from(self).into_interface(correlation_id)
    }

    /// Ephemeral reply shown instead of a command or shortcut result.
    pub fn user_facing(self, correlation_id: &str) -> MessageTemplate {
        let interface = self.into_interface(correlation_id);
        blocks::error_message(interface.user_message(), correlation_id)
    }
}

impl From<EventHandlerError> for ApplicationError {
    fn from(value: EventHandlerError) -> Self {
        match value {
            EventHandlerError::Command(error) => error.into(),
            EventHandlerError::Shortcut(error) => error.into(),
            EventHandlerError::Lifecycle(error) => error.into(),
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            info!(
                event_name = "slack.event.ignored",
                correlation_id = %ctx.correlation_id,
                event_type = ?envelope.event.event_type(),
                "no handler registered"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with every multireact handler registered.
pub fn multireact_dispatcher(
    commands: Arc<ReactionCommandService>,
    shortcuts: Arc<ShortcutService>,
    lifecycle: Arc<LifecycleService>,
) -> EventDispatcher {
    let home = HomeTabHandler::new(commands.slash_command());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(commands));
    dispatcher.register(MessageShortcutHandler::new(shortcuts));
    dispatcher.register(TokensRevokedHandler::new(lifecycle.clone()));
    dispatcher.register(AppUninstalledHandler::new(lifecycle));
    dispatcher.register(home);
    dispatcher
}

pub struct SlashCommandHandler {
    service: Arc<ReactionCommandService>,
}

impl SlashCommandHandler {
    pub fn new(service: Arc<ReactionCommandService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = self.service.handle(payload).await?;
        Ok(HandlerResult::Responded(message))
    }
}

pub struct MessageShortcutHandler {
    service: Arc<ShortcutService>,
}

impl MessageShortcutHandler {
    pub fn new(service: Arc<ShortcutService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for MessageShortcutHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::MessageShortcut
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::MessageShortcut(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = self.service.add_reactions(payload).await?;
        Ok(HandlerResult::Shortcut(outcome))
    }
}

pub struct TokensRevokedHandler {
    service: Arc<LifecycleService>,
}

impl TokensRevokedHandler {
    pub fn new(service: Arc<LifecycleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for TokensRevokedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::TokensRevoked
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::TokensRevoked(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(HandlerResult::Revoked(self.service.tokens_revoked(event).await?))
    }
}

pub struct AppUninstalledHandler {
    service: Arc<LifecycleService>,
}

impl AppUninstalledHandler {
    pub fn new(service: Arc<LifecycleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for AppUninstalledHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppUninstalled
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppUninstalled(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(HandlerResult::Uninstalled(self.service.app_uninstalled(event).await?))
    }
}

pub struct HomeTabHandler {
    slash_command: String,
}

impl HomeTabHandler {
    pub fn new(slash_command: impl Into<String>) -> Self {
        Self { slash_command: slash_command.into() }
    }
}

#[async_trait]
impl EventHandler for HomeTabHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppHomeOpened
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppHomeOpened(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.tab != "home" {
            return Ok(HandlerResult::Ignored);
        }

        let app_url = event.host.as_deref().filter(|host| !host.is_empty()).map(|host| {
            format!("https://{host}")
        });
        let view = blocks::home_tab_view(&self.slash_command, app_url.as_deref());
        Ok(HandlerResult::Publish { user_id: event.user_id.clone(), view })
    }
}
