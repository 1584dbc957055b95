use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnterpriseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for EnterpriseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an installation lives: an Enterprise Grid org, a workspace, or a workspace inside an
/// org. For org-wide installs the team is irrelevant to storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstallationScope {
    pub enterprise_id: Option<EnterpriseId>,
    pub team_id: Option<TeamId>,
    pub is_enterprise_install: bool,
}

impl InstallationScope {
    pub fn team(team_id: impl Into<String>) -> Self {
        Self {
            enterprise_id: None,
            team_id: Some(TeamId(team_id.into())),
            is_enterprise_install: false,
        }
    }

    pub fn enterprise_team(enterprise_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            enterprise_id: Some(EnterpriseId(enterprise_id.into())),
            team_id: Some(TeamId(team_id.into())),
            is_enterprise_install: false,
        }
    }

    pub fn org_wide(enterprise_id: impl Into<String>) -> Self {
        Self {
            enterprise_id: Some(EnterpriseId(enterprise_id.into())),
            team_id: None,
            is_enterprise_install: true,
        }
    }
}

/// Credentials granted by one OAuth exchange. Tokens are secrets and never show up in
/// `Debug` output.
#[derive(Clone, Debug)]
pub struct Installation {
    pub app_id: Option<String>,
    pub enterprise_id: Option<EnterpriseId>,
    pub enterprise_name: Option<String>,
    pub team_id: Option<TeamId>,
    pub team_name: Option<String>,
    pub is_enterprise_install: bool,
    pub bot_token: SecretString,
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
    pub bot_scopes: Vec<String>,
    pub user_id: UserId,
    pub user_token: Option<SecretString>,
    pub user_scopes: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

/// Bot-level projection of an [`Installation`], shared by every user of the workspace.
#[derive(Clone, Debug)]
pub struct Bot {
    pub app_id: Option<String>,
    pub enterprise_id: Option<EnterpriseId>,
    pub enterprise_name: Option<String>,
    pub team_id: Option<TeamId>,
    pub team_name: Option<String>,
    pub is_enterprise_install: bool,
    pub bot_token: SecretString,
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
    pub bot_scopes: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

impl Installation {
    pub fn scope(&self) -> InstallationScope {
        InstallationScope {
            enterprise_id: self.enterprise_id.clone(),
            team_id: self.team_id.clone(),
            is_enterprise_install: self.is_enterprise_install,
        }
    }

    pub fn has_user_token(&self) -> bool {
        self.user_token.is_some()
    }

    pub fn to_bot(&self) -> Bot {
        Bot {
            app_id: self.app_id.clone(),
            enterprise_id: self.enterprise_id.clone(),
            enterprise_name: self.enterprise_name.clone(),
            team_id: self.team_id.clone(),
            team_name: self.team_name.clone(),
            is_enterprise_install: self.is_enterprise_install,
            bot_token: self.bot_token.clone(),
            bot_id: self.bot_id.clone(),
            bot_user_id: self.bot_user_id.clone(),
            bot_scopes: self.bot_scopes.clone(),
            installed_at: self.installed_at,
        }
    }
}
