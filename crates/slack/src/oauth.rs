use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;
use tracing::{info, warn};

use multireact_core::config::AppConfig;
use multireact_core::{ApplicationError, Installation, StateMetadata, StateToken};
use multireact_storage::{ConsumeError, InstallationStore, OAuthStateStore, StorageError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub authorize_url: String,
    pub bot_scopes: Vec<String>,
    pub user_scopes: Vec<String>,
    pub redirect_uri: Option<String>,
}

impl OAuthSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            client_id: config.slack.client_id.clone(),
            authorize_url: config.oauth.authorize_url.clone(),
            bot_scopes: config.slack.bot_scopes.clone(),
            user_scopes: config.slack.user_scopes.clone(),
            redirect_uri: config.oauth.redirect_uri.clone(),
        }
    }
}

/// Query parameters of the OAuth redirect back from Slack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizeRedirect {
    pub url: String,
    pub state: StateToken,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("oauth code exchange failed: {0}")]
pub struct ExchangeError(pub String);

/// Trades an authorization code for installation credentials (`oauth.v2.access`).
#[async_trait]
pub trait OAuthExchange: Send + Sync {
    async fn exchange(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Installation, ExchangeError>;
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("oauth state is invalid or expired")]
    InvalidState,
    #[error("authorization was denied: {0}")]
    Denied(String),
    #[error("oauth callback carried no code")]
    MissingCode,
    #[error("invalid authorize url `{0}`")]
    AuthorizeUrl(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ConsumeError> for OAuthError {
    fn from(value: ConsumeError) -> Self {
        match value {
            ConsumeError::Invalid => Self::InvalidState,
            ConsumeError::Storage(error) => Self::Storage(error),
        }
    }
}

impl From<OAuthError> for ApplicationError {
    fn from(value: OAuthError) -> Self {
        match value {
            OAuthError::InvalidState | OAuthError::Denied(_) | OAuthError::MissingCode => {
                ApplicationError::InvalidOAuthState
            }
            OAuthError::AuthorizeUrl(url) => {
                ApplicationError::Configuration(format!("invalid authorize url `{url}`"))
            }
            OAuthError::Exchange(error) => ApplicationError::Integration(error.to_string()),
            OAuthError::Storage(error) => error.into(),
        }
    }
}

pub struct OAuthFlow {
    settings: OAuthSettings,
    states: Arc<dyn OAuthStateStore>,
    installations: Arc<dyn InstallationStore>,
    exchange: Arc<dyn OAuthExchange>,
}

impl OAuthFlow {
    pub fn new(
        settings: OAuthSettings,
        states: Arc<dyn OAuthStateStore>,
        installations: Arc<dyn InstallationStore>,
        exchange: Arc<dyn OAuthExchange>,
    ) -> Self {
        Self { settings, states, installations, exchange }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Issues a state and returns the Slack authorize URL that carries it.
    pub async fn begin(&self, metadata: StateMetadata) -> Result<AuthorizeRedirect, OAuthError> {
        let state = self.states.issue(metadata).await?;
        let url = authorize_url(&self.settings, &state)?;
        Ok(AuthorizeRedirect { url, state })
    }

    /// Validates the state before anything else, then exchanges the code and stores the result.
    pub async fn complete(&self, callback: &OAuthCallback) -> Result<Installation, OAuthError> {
        let state = StateToken(callback.state.clone().unwrap_or_default());
        let consumed = self.states.consume(&state).await;
        if let Err(ConsumeError::Invalid) = &consumed {
            warn!(event_name = "slack.oauth.invalid_state", "oauth callback with invalid state");
        }
        consumed?;

        if let Some(error) = &callback.error {
            info!(event_name = "slack.oauth.denied", error = %error, "installation denied");
            return Err(OAuthError::Denied(error.clone()));
        }
        let code = callback.code.as_deref().filter(|code| !code.is_empty());
        let code = code.ok_or(OAuthError::MissingCode)?;

        let installation =
            self.exchange.exchange(code, self.settings.redirect_uri.as_deref()).await?;
        self.installations.save(&installation).await?;

        info!(
            event_name = "slack.oauth.installed",
            team_id = ?installation.team_id.as_ref().map(|id| id.0.as_str()),
            enterprise_id = ?installation.enterprise_id.as_ref().map(|id| id.0.as_str()),
            user_id = %installation.user_id,
            has_user_token = installation.has_user_token(),
            "app installed"
        );
        Ok(installation)
    }
}

pub fn authorize_url(settings: &OAuthSettings, state: &StateToken) -> Result<String, OAuthError> {
    let mut params = vec![
        ("client_id", settings.client_id.clone()),
        ("scope", settings.bot_scopes.join(",")),
        ("user_scope", settings.user_scopes.join(",")),
        ("state", state.as_str().to_owned()),
    ];
    if let Some(redirect_uri) = &settings.redirect_uri {
        params.push(("redirect_uri", redirect_uri.clone()));
    }

    Url::parse_with_params(&settings.authorize_url, &params)
        .map(String::from)
        .map_err(|_| OAuthError::AuthorizeUrl(settings.authorize_url.clone()))
}
