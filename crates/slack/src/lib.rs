//! Slack-facing services for multireact
//!
//! This crate drives the persistence layer from Slack interactions:
//! - **Slash command** (`commands`) - `/multireact` saves or shows a user's reaction list
//! - **Message shortcut** (`shortcut`) - `add_reactions` replays the list onto a message
//! - **OAuth** (`oauth`) - install link with a single-use state, callback and token storage
//! - **Lifecycle** (`lifecycle`) - `tokens_revoked` and `app_uninstalled` clean-up
//! - **Events** (`events`) - routes verified Slack payloads to the services above
//! - **Block Kit** (`blocks`) - ephemeral replies, the no-reactions modal and the App Home tab
//!
//! Slack Web API calls and the OAuth code exchange are collaborators behind `ReactionClient`,
//! `EmojiCatalog` and `OAuthExchange`; HTTP routing and signature checks live outside.
//!
//! ```text
//! Slack payload → EventDispatcher → Service → Stores (installations, oauth states, user data)
//!                      ↓
//!               HandlerResult (reply, view to publish, summary)
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod lifecycle;
pub mod oauth;
pub mod shortcut;

pub use commands::{
    AllowAllEmoji, CatalogError, CommandError, EmojiCatalog, KnownEmoji, ReactionCommandService,
    SlashCommandPayload,
};
pub use events::{multireact_dispatcher, EventContext, EventDispatcher, HandlerResult};
pub use lifecycle::{AppUninstalledEvent, LifecycleError, LifecycleService, TokensRevokedEvent};
pub use oauth::{OAuthCallback, OAuthError, OAuthExchange, OAuthFlow, OAuthSettings};
pub use shortcut::{
    MessageShortcutPayload, ReactionClient, ShortcutError, ShortcutOutcome, ShortcutService,
    SlackApiError,
};
