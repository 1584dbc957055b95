use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use multireact_core::config::RetentionConfig;
use multireact_core::{
    ApplicationError, EnterpriseId, InstallationScope, TeamId, UserId, WorkspaceUser,
};
use multireact_storage::{InstallationStore, StorageError, UserDataStore};

/// `tokens_revoked`: user ids under `oauth`, bot user ids under `bot`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokensRevokedEvent {
    pub enterprise_id: Option<String>,
    pub team_id: Option<String>,
    pub is_enterprise_install: bool,
    pub oauth: Vec<String>,
    pub bot: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppUninstalledEvent {
    pub enterprise_id: Option<String>,
    pub team_id: Option<String>,
    pub is_enterprise_install: bool,
}

fn event_scope(
    enterprise_id: Option<&String>,
    team_id: Option<&String>,
    is_enterprise_install: bool,
) -> Option<InstallationScope> {
    match (enterprise_id, team_id, is_enterprise_install) {
        (Some(enterprise_id), _, true) => Some(InstallationScope::org_wide(enterprise_id.clone())),
        (Some(enterprise_id), Some(team_id), false) => {
            Some(InstallationScope::enterprise_team(enterprise_id.clone(), team_id.clone()))
        }
        (None, Some(team_id), _) => Some(InstallationScope::team(team_id.clone())),
        (Some(_), None, false) | (None, None, _) => None,
    }
}

impl TokensRevokedEvent {
    pub fn scope(&self) -> Option<InstallationScope> {
        event_scope(self.enterprise_id.as_ref(), self.team_id.as_ref(), self.is_enterprise_install)
    }
}

impl AppUninstalledEvent {
    pub fn scope(&self) -> Option<InstallationScope> {
        event_scope(self.enterprise_id.as_ref(), self.team_id.as_ref(), self.is_enterprise_install)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevocationSummary {
    pub users_revoked: usize,
    pub user_lists_deleted: usize,
    pub workspace_records_deleted: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UninstallSummary {
    pub installation_records_deleted: usize,
    pub user_lists_deleted: usize,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("event names neither an enterprise nor a team")]
    MissingWorkspace,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<LifecycleError> for ApplicationError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::MissingWorkspace => {
                ApplicationError::Integration("lifecycle event without workspace".to_owned())
            }
            LifecycleError::Storage(error) => error.into(),
        }
    }
}

/// Removes credentials, and per the retention settings user lists, when access goes away.
pub struct LifecycleService {
    installations: Arc<dyn InstallationStore>,
    user_data: Arc<dyn UserDataStore>,
    retention: RetentionConfig,
}

impl LifecycleService {
    pub fn new(
        installations: Arc<dyn InstallationStore>,
        user_data: Arc<dyn UserDataStore>,
        retention: RetentionConfig,
    ) -> Self {
        Self { installations, user_data, retention }
    }

    pub async fn tokens_revoked(
        &self,
        event: &TokensRevokedEvent,
    ) -> Result<RevocationSummary, LifecycleError> {
        let scope = event.scope().ok_or(LifecycleError::MissingWorkspace)?;
        let mut summary = RevocationSummary::default();

        for user_id in &event.oauth {
            self.installations.delete_user(&scope, &UserId(user_id.clone())).await?;
            summary.users_revoked += 1;

            if !self.retention.purge_user_data_on_token_revoke {
                continue;
            }
            let Some(team_id) = &event.team_id else {
                debug!(
                    event_name = "slack.lifecycle.user_data_skipped",
                    user_id = %user_id,
                    "revocation without team; user list kept"
                );
                continue;
            };
            let user = WorkspaceUser::new(event.enterprise_id.as_deref(), team_id, user_id);
            self.user_data.delete_list(&user).await?;
            summary.user_lists_deleted += 1;
        }

        if !event.bot.is_empty() {
            summary.workspace_records_deleted = self.installations.delete_all(&scope).await?;
        }

        info!(
            event_name = "slack.lifecycle.tokens_revoked",
            team_id = ?event.team_id,
            enterprise_id = ?event.enterprise_id,
            users_revoked = summary.users_revoked,
            user_lists_deleted = summary.user_lists_deleted,
            workspace_records_deleted = summary.workspace_records_deleted,
            "tokens revoked"
        );
        Ok(summary)
    }

    pub async fn app_uninstalled(
        &self,
        event: &AppUninstalledEvent,
    ) -> Result<UninstallSummary, LifecycleError> {
        let scope = event.scope().ok_or(LifecycleError::MissingWorkspace)?;
        let installation_records_deleted = self.installations.delete_all(&scope).await?;

        let user_lists_deleted = match (&event.team_id, self.retention.purge_user_data_on_uninstall)
        {
            (Some(team_id), true) => {
                let enterprise_id = event.enterprise_id.clone().map(EnterpriseId);
                self.user_data
                    .purge_workspace(enterprise_id.as_ref(), &TeamId(team_id.clone()))
                    .await?
            }
            _ => 0,
        };

        info!(
            event_name = "slack.lifecycle.app_uninstalled",
            team_id = ?event.team_id,
            enterprise_id = ?event.enterprise_id,
            installation_records_deleted,
            user_lists_deleted,
            "app uninstalled"
        );
        Ok(UninstallSummary { installation_records_deleted, user_lists_deleted })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use secrecy::SecretString;

    use multireact_core::config::RetentionConfig;
    use multireact_core::{
        extract_emoji, Installation, InstallationScope, TeamId, UserId, WorkspaceUser,
    };
    use multireact_storage::blob::{BlobClient, InMemoryBlobStore, RetryPolicy};
    use multireact_storage::{
        BlobInstallationStore, BlobUserDataStore, InstallationStore, UserDataStore,
    };

    use super::{AppUninstalledEvent, LifecycleError, LifecycleService, TokensRevokedEvent};

    struct Fixture {
        installations: Arc<BlobInstallationStore>,
        user_data: Arc<BlobUserDataStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let client_for = |bucket: &str| {
                BlobClient::new(Arc::new(InMemoryBlobStore::new(bucket)), RetryPolicy::immediate(1))
            };
            Self {
                installations: Arc::new(BlobInstallationStore::new(
                    client_for("installations"),
                    "C1",
                )),
                user_data: Arc::new(BlobUserDataStore::new(client_for("user-data"), "C1")),
            }
        }

        fn service(&self, retention: RetentionConfig) -> LifecycleService {
            LifecycleService::new(self.installations.clone(), self.user_data.clone(), retention)
        }

        async fn seed(&self, user_id: &str) {
            let installation = Installation {
                app_id: Some("A1".to_owned()),
                enterprise_id: None,
                enterprise_name: None,
                team_id: Some(TeamId("T1".to_owned())),
                team_name: None,
                is_enterprise_install: false,
                bot_token: SecretString::from("xoxb-1".to_owned()),
                bot_id: Some("B1".to_owned()),
                bot_user_id: Some("UB1".to_owned()),
                bot_scopes: vec!["commands".to_owned()],
                user_id: UserId(user_id.to_owned()),
                user_token: Some(SecretString::from(format!("xoxp-{user_id}"))),
                user_scopes: vec!["reactions:write".to_owned()],
                installed_at: Utc::now(),
            };
            self.installations.save(&installation).await.expect("install");
            self.user_data
                .set_list(&WorkspaceUser::new(None, "T1", user_id), &extract_emoji(":a:"))
                .await
                .expect("save list");
        }
    }

    fn revoked(oauth: &[&str], bot: &[&str]) -> TokensRevokedEvent {
        TokensRevokedEvent {
            team_id: Some("T1".to_owned()),
            oauth: oauth.iter().map(|id| id.to_string()).collect(),
            bot: bot.iter().map(|id| id.to_string()).collect(),
            ..TokensRevokedEvent::default()
        }
    }

    #[tokio::test]
    async fn user_revocation_removes_token_and_list() {
        let fixture = Fixture::new();
        fixture.seed("U1").await;
        fixture.seed("U2").await;

        let summary = fixture
            .service(RetentionConfig::default())
            .tokens_revoked(&revoked(&["U1"], &[]))
            .await
            .expect("revoke");

        assert_eq!(summary.users_revoked, 1);
        assert_eq!(summary.user_lists_deleted, 1);
        let scope = InstallationScope::team("T1");
        let installations = &fixture.installations;
        let user = |id: &str| UserId(id.to_owned());
        assert!(installations.find_user(&scope, &user("U1")).await.expect("find").is_none());
        assert!(installations.find_user(&scope, &user("U2")).await.expect("find").is_some());
        assert!(installations.find_bot(&scope).await.expect("find").is_some());
        let list = |id: &str| WorkspaceUser::new(None, "T1", id);
        assert!(fixture.user_data.get_list(&list("U1")).await.expect("get").is_empty());
        assert!(!fixture.user_data.get_list(&list("U2")).await.expect("get").is_empty());
    }

    #[tokio::test]
    async fn retention_can_keep_lists_on_revocation() {
        let fixture = Fixture::new();
        fixture.seed("U1").await;
        let retention = RetentionConfig {
            purge_user_data_on_token_revoke: false,
            ..RetentionConfig::default()
        };

        let summary = fixture
            .service(retention)
            .tokens_revoked(&revoked(&["U1"], &[]))
            .await
            .expect("revoke");

        assert_eq!(summary.user_lists_deleted, 0);
        let list = fixture.user_data.get_list(&WorkspaceUser::new(None, "T1", "U1")).await;
        assert_eq!(list.expect("get").names(), vec!["a"]);
    }

    #[tokio::test]
    async fn bot_revocation_clears_the_workspace() {
        let fixture = Fixture::new();
        fixture.seed("U1").await;

        let summary = fixture
            .service(RetentionConfig::default())
            .tokens_revoked(&revoked(&[], &["UB1"]))
            .await
            .expect("revoke");

        assert_eq!(summary.workspace_records_deleted, 3);
        let scope = InstallationScope::team("T1");
        assert!(fixture.installations.find_bot(&scope).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn uninstall_purges_lists_only_when_configured() {
        let fixture = Fixture::new();
        fixture.seed("U1").await;
        let event = AppUninstalledEvent { team_id: Some("T1".to_owned()), ..Default::default() };

        let kept = fixture.service(RetentionConfig::default()).app_uninstalled(&event).await;
        assert_eq!(kept.expect("uninstall").user_lists_deleted, 0);

        fixture.seed("U1").await;
        let retention =
            RetentionConfig { purge_user_data_on_uninstall: true, ..RetentionConfig::default() };
        let purged = fixture.service(retention).app_uninstalled(&event).await.expect("uninstall");

        assert_eq!(purged.installation_records_deleted, 3);
        assert_eq!(purged.user_lists_deleted, 1);
    }

    #[tokio::test]
    async fn events_without_workspace_are_rejected() {
        let fixture = Fixture::new();
        let event = AppUninstalledEvent {
            enterprise_id: Some("E1".to_owned()),
            team_id: None,
            is_enterprise_install: false,
        };

        let result = fixture.service(RetentionConfig::default()).app_uninstalled(&event).await;

        assert!(matches!(result, Err(LifecycleError::MissingWorkspace)));
    }

    #[test]
    fn org_wide_events_scope_to_the_enterprise() {
        let event = TokensRevokedEvent {
            enterprise_id: Some("E1".to_owned()),
            team_id: Some("T1".to_owned()),
            is_enterprise_install: true,
            ..TokensRevokedEvent::default()
        };

        assert_eq!(event.scope(), Some(InstallationScope::org_wide("E1")));
    }
}
