use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub storage: StorageConfig,
    pub oauth: OAuthConfig,
    pub retention: RetentionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub signing_secret: SecretString,
    pub slash_command: String,
    pub bot_scopes: Vec<String>,
    pub user_scopes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub installation_bucket: String,
    pub state_bucket: String,
    pub user_data_bucket: String,
    pub root_dir: PathBuf,
    pub gcs_base_url: String,
    pub gcs_access_token: Option<SecretString>,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub state_expiration_secs: u64,
    pub authorize_url: String,
    pub redirect_uri: Option<String>,
}

/// What happens to saved reaction lists when credentials go away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionConfig {
    pub purge_user_data_on_token_revoke: bool,
    pub purge_user_data_on_uninstall: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Filesystem,
    Gcs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_client_id: Option<String>,
    pub slack_client_secret: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub storage_backend: Option<StorageBackend>,
    pub storage_root_dir: Option<PathBuf>,
    pub state_expiration_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { purge_user_data_on_token_revoke: true, purge_user_data_on_uninstall: false }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                signing_secret: String::new().into(),
                slash_command: "/multireact".to_string(),
                bot_scopes: vec!["commands".to_string(), "emoji:read".to_string()],
                user_scopes: vec!["reactions:read".to_string(), "reactions:write".to_string()],
            },
            storage: StorageConfig {
                backend: StorageBackend::Gcs,
                installation_bucket: "multireact-installations".to_string(),
                state_bucket: "multireact-oauth-state".to_string(),
                user_data_bucket: "multireact-user-data".to_string(),
                root_dir: PathBuf::from("data"),
                gcs_base_url: "https://storage.googleapis.com".to_string(),
                gcs_access_token: None,
                timeout_secs: 10,
                retry: RetryConfig { max_attempts: 3, base_delay_ms: 100, max_delay_ms: 2_000 },
            },
            oauth: OAuthConfig {
                state_expiration_secs: 600,
                authorize_url: "https://slack.com/oauth/v2/authorize".to_string(),
                redirect_uri: None,
            },
            retention: RetentionConfig::default(),
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Json },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "filesystem" | "fs" => Ok(Self::Filesystem),
            "gcs" => Ok(Self::Gcs),
            other => Err(ConfigError::Validation(format!(
                "unsupported storage backend `{other}` (expected memory|filesystem|gcs)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("multireact.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(client_id) = slack.client_id {
                self.slack.client_id = client_id;
            }
            if let Some(client_secret_value) = slack.client_secret {
                self.slack.client_secret = secret_value(client_secret_value);
            }
            if let Some(signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret_value);
            }
            if let Some(slash_command) = slack.slash_command {
                self.slack.slash_command = slash_command;
            }
            if let Some(bot_scopes) = slack.bot_scopes {
                self.slack.bot_scopes = bot_scopes;
            }
            if let Some(user_scopes) = slack.user_scopes {
                self.slack.user_scopes = user_scopes;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(backend) = storage.backend {
                self.storage.backend = backend;
            }
            if let Some(bucket) = storage.installation_bucket {
                self.storage.installation_bucket = bucket;
            }
            if let Some(bucket) = storage.state_bucket {
                self.storage.state_bucket = bucket;
            }
            if let Some(bucket) = storage.user_data_bucket {
                self.storage.user_data_bucket = bucket;
            }
            if let Some(root_dir) = storage.root_dir {
                self.storage.root_dir = root_dir;
            }
            if let Some(gcs_base_url) = storage.gcs_base_url {
                self.storage.gcs_base_url = gcs_base_url;
            }
            if let Some(gcs_access_token_value) = storage.gcs_access_token {
                self.storage.gcs_access_token = Some(secret_value(gcs_access_token_value));
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = storage.retry_max_attempts {
                self.storage.retry.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = storage.retry_base_delay_ms {
                self.storage.retry.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = storage.retry_max_delay_ms {
                self.storage.retry.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(oauth) = patch.oauth {
            if let Some(state_expiration_secs) = oauth.state_expiration_secs {
                self.oauth.state_expiration_secs = state_expiration_secs;
            }
            if let Some(authorize_url) = oauth.authorize_url {
                self.oauth.authorize_url = authorize_url;
            }
            if let Some(redirect_uri) = oauth.redirect_uri {
                self.oauth.redirect_uri = Some(redirect_uri);
            }
        }

        if let Some(retention) = patch.retention {
            if let Some(purge) = retention.purge_user_data_on_token_revoke {
                self.retention.purge_user_data_on_token_revoke = purge;
            }
            if let Some(purge) = retention.purge_user_data_on_uninstall {
                self.retention.purge_user_data_on_uninstall = purge;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_any(&["MULTIREACT_SLACK_CLIENT_ID", "SLACK_CLIENT_ID"]) {
            self.slack.client_id = value;
        }
        if let Some(value) =
            read_env_any(&["MULTIREACT_SLACK_CLIENT_SECRET", "SLACK_CLIENT_SECRET"])
        {
            self.slack.client_secret = secret_value(value);
        }
        if let Some(value) =
            read_env_any(&["MULTIREACT_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"])
        {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) =
            read_env_any(&["MULTIREACT_SLACK_SLASH_COMMAND", "SLACK_SLASH_COMMAND"])
        {
            self.slack.slash_command = value;
        }
        if let Some(value) = read_env("MULTIREACT_SLACK_BOT_SCOPES") {
            self.slack.bot_scopes = parse_list(&value);
        }
        if let Some(value) = read_env("MULTIREACT_SLACK_USER_SCOPES") {
            self.slack.user_scopes = parse_list(&value);
        }

        if let Some(value) = read_env("MULTIREACT_STORAGE_BACKEND") {
            self.storage.backend = value.parse()?;
        }
        if let Some(value) = read_env_any(&[
            "MULTIREACT_STORAGE_INSTALLATION_BUCKET",
            "SLACK_INSTALLATION_GOOGLE_BUCKET_NAME",
        ]) {
            self.storage.installation_bucket = value;
        }
        if let Some(value) =
            read_env_any(&["MULTIREACT_STORAGE_STATE_BUCKET", "SLACK_STATE_GOOGLE_BUCKET_NAME"])
        {
            self.storage.state_bucket = value;
        }
        if let Some(value) =
            read_env_any(&["MULTIREACT_STORAGE_USER_DATA_BUCKET", "USER_DATA_BUCKET_NAME"])
        {
            self.storage.user_data_bucket = value;
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_ROOT_DIR") {
            self.storage.root_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_GCS_BASE_URL") {
            self.storage.gcs_base_url = value;
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_GCS_ACCESS_TOKEN") {
            self.storage.gcs_access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("MULTIREACT_STORAGE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_RETRY_MAX_ATTEMPTS") {
            self.storage.retry.max_attempts =
                parse_u32("MULTIREACT_STORAGE_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_RETRY_BASE_DELAY_MS") {
            self.storage.retry.base_delay_ms =
                parse_u64("MULTIREACT_STORAGE_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("MULTIREACT_STORAGE_RETRY_MAX_DELAY_MS") {
            self.storage.retry.max_delay_ms =
                parse_u64("MULTIREACT_STORAGE_RETRY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("MULTIREACT_OAUTH_STATE_EXPIRATION_SECS") {
            self.oauth.state_expiration_secs =
                parse_u64("MULTIREACT_OAUTH_STATE_EXPIRATION_SECS", &value)?;
        }
        if let Some(value) = read_env("MULTIREACT_OAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = Some(value);
        }

        if let Some(value) = read_env("MULTIREACT_RETENTION_PURGE_ON_TOKEN_REVOKE") {
            self.retention.purge_user_data_on_token_revoke =
                parse_bool("MULTIREACT_RETENTION_PURGE_ON_TOKEN_REVOKE", &value)?;
        }
        if let Some(value) = read_env("MULTIREACT_RETENTION_PURGE_ON_UNINSTALL") {
            self.retention.purge_user_data_on_uninstall =
                parse_bool("MULTIREACT_RETENTION_PURGE_ON_UNINSTALL", &value)?;
        }

        if let Some(value) = read_env("MULTIREACT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env_any(&["MULTIREACT_SERVER_PORT", "PORT"]) {
            self.server.port = parse_u16("MULTIREACT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MULTIREACT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MULTIREACT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) =
            read_env_any(&["MULTIREACT_LOGGING_LEVEL", "MULTIREACT_LOG_LEVEL", "LOG_LEVEL"])
        {
            self.logging.level = value.to_ascii_lowercase();
        }
        if let Some(value) = read_env_any(&["MULTIREACT_LOGGING_FORMAT", "MULTIREACT_LOG_FORMAT"]) {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(client_id) = overrides.slack_client_id {
            self.slack.client_id = client_id;
        }
        if let Some(client_secret) = overrides.slack_client_secret {
            self.slack.client_secret = secret_value(client_secret);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(backend) = overrides.storage_backend {
            self.storage.backend = backend;
        }
        if let Some(root_dir) = overrides.storage_root_dir {
            self.storage.root_dir = root_dir;
        }
        if let Some(state_expiration_secs) = overrides.state_expiration_secs {
            self.oauth.state_expiration_secs = state_expiration_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_storage(&self.storage)?;
        validate_oauth(&self.oauth)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("multireact.toml"), PathBuf::from("config/multireact.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.client_id is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App Credentials".to_string(),
        ));
    }
    if slack.client_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.client_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App Credentials".to_string(),
        ));
    }
    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App Credentials".to_string(),
        ));
    }

    let command = slack.slash_command.trim();
    if !command.starts_with('/') || command.len() < 2 || command.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "slack.slash_command must look like `/name`, got `{command}`"
        )));
    }

    if slack.bot_scopes.iter().all(|scope| scope != "commands") {
        return Err(ConfigError::Validation(
            "slack.bot_scopes must include `commands` for the slash command to be delivered"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    let buckets = [
        ("storage.installation_bucket", storage.installation_bucket.trim()),
        ("storage.state_bucket", storage.state_bucket.trim()),
        ("storage.user_data_bucket", storage.user_data_bucket.trim()),
    ];
    for (name, bucket) in buckets {
        if bucket.is_empty() {
            return Err(ConfigError::Validation(format!("{name} is required")));
        }
        if bucket.contains('/') {
            return Err(ConfigError::Validation(format!(
                "{name} must be a bare bucket name without `/`"
            )));
        }
    }
    if buckets[0].1 == buckets[1].1 || buckets[0].1 == buckets[2].1 || buckets[1].1 == buckets[2].1
    {
        return Err(ConfigError::Validation(
            "storage buckets must be distinct: installation, state and user data each need their \
             own bucket"
                .to_string(),
        ));
    }

    match storage.backend {
        StorageBackend::Memory => {}
        StorageBackend::Filesystem => {
            if storage.root_dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.root_dir is required for the filesystem backend".to_string(),
                ));
            }
        }
        StorageBackend::Gcs => {
            let base_url = storage.gcs_base_url.trim();
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::Validation(
                    "storage.gcs_base_url must start with http:// or https://".to_string(),
                ));
            }
        }
    }

    if storage.timeout_secs == 0 || storage.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "storage.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let retry = &storage.retry;
    if retry.max_attempts == 0 || retry.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "storage.retry_max_attempts must be in range 1..=10".to_string(),
        ));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::Validation(
            "storage.retry_base_delay_ms must not exceed storage.retry_max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_oauth(oauth: &OAuthConfig) -> Result<(), ConfigError> {
    if oauth.state_expiration_secs == 0 || oauth.state_expiration_secs > 86_400 {
        return Err(ConfigError::Validation(
            "oauth.state_expiration_secs must be in range 1..=86400".to_string(),
        ));
    }

    if !oauth.authorize_url.starts_with("https://") && !oauth.authorize_url.starts_with("http://")
    {
        return Err(ConfigError::Validation(
            "oauth.authorize_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(redirect_uri) = &oauth.redirect_uri {
        if !redirect_uri.starts_with("http://") && !redirect_uri.starts_with("https://") {
            return Err(ConfigError::Validation(
                "oauth.redirect_uri must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| read_env(key))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    storage: Option<StoragePatch>,
    oauth: Option<OAuthPatch>,
    retention: Option<RetentionPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    signing_secret: Option<String>,
    slash_command: Option<String>,
    bot_scopes: Option<Vec<String>>,
    user_scopes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    backend: Option<StorageBackend>,
    installation_bucket: Option<String>,
    state_bucket: Option<String>,
    user_data_bucket: Option<String>,
    root_dir: Option<PathBuf>,
    gcs_base_url: Option<String>,
    gcs_access_token: Option<String>,
    timeout_secs: Option<u64>,
    retry_max_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthPatch {
    state_expiration_secs: Option<u64>,
    authorize_url: Option<String>,
    redirect_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RetentionPatch {
    purge_user_data_on_token_revoke: Option<bool>,
    purge_user_data_on_uninstall: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, StorageBackend};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const SLACK_VARS: [&str; 3] = [
        "MULTIREACT_SLACK_CLIENT_ID",
        "MULTIREACT_SLACK_CLIENT_SECRET",
        "MULTIREACT_SLACK_SIGNING_SECRET",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_slack_credentials() {
        env::set_var("MULTIREACT_SLACK_CLIENT_ID", "1234.5678");
        env::set_var("MULTIREACT_SLACK_CLIENT_SECRET", "client-secret-value");
        env::set_var("MULTIREACT_SLACK_SIGNING_SECRET", "signing-secret-value");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SLACK_CLIENT_SECRET", "secret-from-env");
        env::set_var("TEST_SLACK_SIGNING_SECRET", "signing-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("multireact.toml");
            fs::write(
                &path,
                r#"
[slack]
client_id = "1111.2222"
client_secret = "${TEST_SLACK_CLIENT_SECRET}"
signing_secret = "${TEST_SLACK_SIGNING_SECRET}"

[storage]
backend = "filesystem"
root_dir = "/var/lib/multireact"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.client_secret.expose_secret() == "secret-from-env",
                "client secret should be interpolated from environment",
            )?;
            ensure(
                config.slack.signing_secret.expose_secret() == "signing-from-env",
                "signing secret should be interpolated from environment",
            )?;
            ensure(
                config.storage.backend == StorageBackend::Filesystem,
                "storage backend should come from the file",
            )?;
            ensure(
                config.storage.root_dir == PathBuf::from("/var/lib/multireact"),
                "root dir should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SLACK_CLIENT_SECRET", "TEST_SLACK_SIGNING_SECRET"]);
        result
    }

    #[test]
    fn legacy_deployment_variables_are_honoured() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SLACK_CLIENT_ID", "legacy.id");
        env::set_var("SLACK_CLIENT_SECRET", "legacy-secret");
        env::set_var("SLACK_SIGNING_SECRET", "legacy-signing");
        env::set_var("SLACK_INSTALLATION_GOOGLE_BUCKET_NAME", "legacy-installations");
        env::set_var("SLACK_STATE_GOOGLE_BUCKET_NAME", "legacy-states");
        env::set_var("USER_DATA_BUCKET_NAME", "legacy-user-data");
        env::set_var("LOG_LEVEL", "DEBUG");
        env::set_var("PORT", "8081");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.slack.client_id == "legacy.id", "client id alias should apply")?;
            ensure(
                config.storage.installation_bucket == "legacy-installations",
                "installation bucket alias should apply",
            )?;
            ensure(
                config.storage.state_bucket == "legacy-states",
                "state bucket alias should apply",
            )?;
            ensure(
                config.storage.user_data_bucket == "legacy-user-data",
                "user data bucket alias should apply",
            )?;
            ensure(config.logging.level == "debug", "log level alias should be normalized")?;
            ensure(config.server.port == 8081, "PORT alias should apply")?;
            Ok(())
        })();

        clear_vars(&[
            "SLACK_CLIENT_ID",
            "SLACK_CLIENT_SECRET",
            "SLACK_SIGNING_SECRET",
            "SLACK_INSTALLATION_GOOGLE_BUCKET_NAME",
            "SLACK_STATE_GOOGLE_BUCKET_NAME",
            "USER_DATA_BUCKET_NAME",
            "LOG_LEVEL",
            "PORT",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_slack_credentials();
        env::set_var("MULTIREACT_OAUTH_STATE_EXPIRATION_SECS", "300");
        env::set_var("MULTIREACT_STORAGE_STATE_BUCKET", "states-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("multireact.toml");
            fs::write(
                &path,
                r#"
[storage]
state_bucket = "states-from-file"
user_data_bucket = "users-from-file"

[oauth]
state_expiration_secs = 120

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    state_expiration_secs: Some(60),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.oauth.state_expiration_secs == 60,
                "override expiration should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.storage.state_bucket == "states-from-env",
                "env state bucket should win over file",
            )?;
            ensure(
                config.storage.user_data_bucket == "users-from-file",
                "file user data bucket should win over defaults",
            )?;
            ensure(
                config.storage.installation_bucket == "multireact-installations",
                "untouched bucket should keep its default",
            )?;
            Ok(())
        })();

        clear_vars(&SLACK_VARS);
        clear_vars(&["MULTIREACT_OAUTH_STATE_EXPIRATION_SECS", "MULTIREACT_STORAGE_STATE_BUCKET"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MULTIREACT_SLACK_CLIENT_SECRET", "client-secret-value");
        env::set_var("MULTIREACT_SLACK_SIGNING_SECRET", "signing-secret-value");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("slack.client_id")
            );
            ensure(has_message, "validation failure should mention slack.client_id")
        })();

        clear_vars(&SLACK_VARS);
        result
    }

    #[test]
    fn shared_buckets_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_slack_credentials();
        env::set_var("MULTIREACT_STORAGE_STATE_BUCKET", "shared");
        env::set_var("MULTIREACT_STORAGE_USER_DATA_BUCKET", "shared");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected shared buckets to be rejected".to_string()),
                Err(error) => error,
            };
            let mentions_distinct = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("distinct")
            );
            ensure(
                mentions_distinct,
                "validation failure should mention distinct buckets",
            )
        })();

        clear_vars(&SLACK_VARS);
        clear_vars(&["MULTIREACT_STORAGE_STATE_BUCKET", "MULTIREACT_STORAGE_USER_DATA_BUCKET"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_slack_credentials();
        env::set_var("MULTIREACT_STORAGE_RETRY_MAX_ATTEMPTS", "three");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid override to fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "MULTIREACT_STORAGE_RETRY_MAX_ATTEMPTS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&SLACK_VARS);
        clear_vars(&["MULTIREACT_STORAGE_RETRY_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_slack_credentials();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("client-secret-value"),
                "debug output should not contain client secret",
            )?;
            ensure(
                !debug.contains("signing-secret-value"),
                "debug output should not contain signing secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "default logging format should be json",
            )?;
            ensure(config.oauth.state_expiration_secs == 600, "default state ttl is ten minutes")?;
            ensure(config.storage.retry.max_attempts == 3, "default retry cap is three attempts")?;
            Ok(())
        })();

        clear_vars(&SLACK_VARS);
        result
    }
}
