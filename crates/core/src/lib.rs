pub mod config;
pub mod domain;
pub mod errors;

pub use domain::installation::{Bot, EnterpriseId, Installation, InstallationScope, TeamId, UserId};
pub use domain::oauth_state::{OAuthState, StateMetadata, StateToken};
pub use domain::reactions::{extract_emoji, EmojiName, ReactionList, WorkspaceUser, MAX_REACTIONS};
pub use errors::{ApplicationError, DomainError, InterfaceError};
