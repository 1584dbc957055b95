use std::sync::Arc;
use std::time::Duration;

use multireact_core::config::{AppConfig, ConfigError, LoadOptions};
use multireact_slack::{
    multireact_dispatcher, EmojiCatalog, EventDispatcher, LifecycleService, OAuthExchange,
    OAuthFlow, OAuthSettings, ReactionClient, ReactionCommandService, ShortcutService,
};
use multireact_storage::{open_stores, BackendError, OAuthStateStore, Stores};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub stores: Stores,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage backend failed to open: {0}")]
    Storage(#[from] BackendError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        backend = ?config.storage.backend,
        "starting application bootstrap"
    );

    let stores = open_stores(&config.slack.client_id, &config.storage, &config.oauth).await?;
    info!(
        event_name = "system.bootstrap.storage_ready",
        correlation_id = "bootstrap",
        "storage handles constructed"
    );

    Ok(Application { config, stores })
}

impl Application {
    /// Wires the Slack services to this application's stores and the given Web API client.
    pub fn dispatcher(
        &self,
        client: Arc<dyn ReactionClient>,
        catalog: Arc<dyn EmojiCatalog>,
    ) -> EventDispatcher {
        let slash_command = self.config.slack.slash_command.clone();
        let commands = Arc::new(ReactionCommandService::new(
            self.stores.user_data.clone(),
            catalog,
            slash_command.clone(),
        ));
        let shortcuts = Arc::new(ShortcutService::new(
            self.stores.installations.clone(),
            self.stores.user_data.clone(),
            client,
            slash_command,
        ));
        let lifecycle = Arc::new(LifecycleService::new(
            self.stores.installations.clone(),
            self.stores.user_data.clone(),
            self.config.retention.clone(),
        ));
        multireact_dispatcher(commands, shortcuts, lifecycle)
    }

    pub fn oauth_flow(&self, exchange: Arc<dyn OAuthExchange>) -> OAuthFlow {
        OAuthFlow::new(
            OAuthSettings::from_config(&self.config),
            self.stores.oauth_states.clone(),
            self.stores.installations.clone(),
            exchange,
        )
    }

    pub fn spawn_state_sweeper(&self) -> JoinHandle<()> {
        let every = Duration::from_secs(self.config.oauth.state_expiration_secs.max(1));
        spawn_state_sweeper(self.stores.oauth_states.clone(), every)
    }
}

/// Periodically deletes expired OAuth states left behind by abandoned installs.
pub fn spawn_state_sweeper(states: Arc<dyn OAuthStateStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(error) = states.sweep_expired().await {
                warn!(
                    event_name = "system.state_sweeper.failed",
                    error = %error,
                    "oauth state sweep failed"
                );
            }
        }
    })
}
