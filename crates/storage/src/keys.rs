//! Object key layout shared by the stores.
//!
//! Installation bucket, per Slack client id:
//!
//! ```text
//! {client_id}/{enterprise_id|none}-{team_id|none}/bot-latest
//! {client_id}/{enterprise_id|none}-{team_id|none}/installer-latest
//! {client_id}/{enterprise_id|none}-{team_id|none}/installer-{user_id}-latest
//! ```
//!
//! User data bucket: `{client_id}/{enterprise_id|none}-{team_id}/{user_id}`.
//! State bucket: the state token itself.

use multireact_core::{EnterpriseId, InstallationScope, TeamId, UserId, WorkspaceUser};

pub const NONE_SEGMENT: &str = "none";

/// `{client_id}/{enterprise}-{team}` directory holding one workspace's installation records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspacePath(String);

impl WorkspacePath {
    pub fn new(
        client_id: &str,
        enterprise_id: Option<&EnterpriseId>,
        team_id: Option<&TeamId>,
    ) -> Self {
        let enterprise = enterprise_id.map_or(NONE_SEGMENT, |id| id.0.as_str());
        let team = team_id.map_or(NONE_SEGMENT, |id| id.0.as_str());
        Self(format!("{client_id}/{enterprise}-{team}"))
    }

    /// Where records for `scope` are written. Org-wide installs drop the team.
    pub fn for_scope(client_id: &str, scope: &InstallationScope) -> Self {
        if scope.is_enterprise_install {
            Self::new(client_id, scope.enterprise_id.as_ref(), None)
        } else {
            Self::new(client_id, scope.enterprise_id.as_ref(), scope.team_id.as_ref())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bot_key(&self) -> String {
        format!("{}/bot-latest", self.0)
    }

    pub fn installer_key(&self) -> String {
        format!("{}/installer-latest", self.0)
    }

    pub fn user_key(&self, user_id: &UserId) -> String {
        format!("{}/installer-{}-latest", self.0, user_id.0)
    }

    /// Listing prefix; the trailing slash keeps `T1` from matching `T10`.
    pub fn prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

/// Candidate workspace paths for a lookup, most general first.
///
/// An org-wide install answers for every workspace in the org, so for a workspace inside an
/// enterprise the enterprise-level path is tried before the workspace's own.
pub fn lookup_order(client_id: &str, scope: &InstallationScope) -> Vec<WorkspacePath> {
    match (&scope.enterprise_id, &scope.team_id) {
        (Some(enterprise_id), _) if scope.is_enterprise_install => {
            vec![WorkspacePath::new(client_id, Some(enterprise_id), None)]
        }
        (Some(enterprise_id), Some(team_id)) => vec![
            WorkspacePath::new(client_id, Some(enterprise_id), None),
            WorkspacePath::new(client_id, Some(enterprise_id), Some(team_id)),
        ],
        (Some(enterprise_id), None) => {
            vec![WorkspacePath::new(client_id, Some(enterprise_id), None)]
        }
        (None, Some(team_id)) => vec![WorkspacePath::new(client_id, None, Some(team_id))],
        (None, None) => Vec::new(),
    }
}

pub fn user_data_key(client_id: &str, user: &WorkspaceUser) -> String {
    let prefix = user_data_prefix(client_id, user.enterprise_id.as_ref(), &user.team_id);
    format!("{prefix}{}", user.user_id.0)
}

pub fn user_data_prefix(
    client_id: &str,
    enterprise_id: Option<&EnterpriseId>,
    team_id: &TeamId,
) -> String {
    let enterprise = enterprise_id.map_or(NONE_SEGMENT, |id| id.0.as_str());
    format!("{client_id}/{enterprise}-{}/", team_id.0)
}
