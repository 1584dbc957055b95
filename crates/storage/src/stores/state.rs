use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use multireact_core::{OAuthState, StateMetadata, StateToken};

use super::{ConsumeError, OAuthStateStore};
use crate::blob::{BlobClient, StorageError};

pub trait TokenSource: Send + Sync {
    fn next_token(&self) -> StateToken;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn next_token(&self) -> StateToken {
        StateToken::generate()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    created_at: DateTime<Utc>,
    #[serde(default)]
    metadata: StateMetadata,
}

/// OAuth states keyed by token in their own bucket.
///
/// Consuming is a read followed by a delete, not an atomic swap: two callbacks racing on one
/// token can both succeed before the delete lands.
#[derive(Clone)]
pub struct BlobOAuthStateStore {
    blob: BlobClient,
    ttl: Duration,
    tokens: Arc<dyn TokenSource>,
}

impl BlobOAuthStateStore {
    pub fn new(blob: BlobClient, ttl: Duration) -> Self {
        Self::with_token_source(blob, ttl, Arc::new(RandomTokens))
    }

    pub fn with_token_source(
        blob: BlobClient,
        ttl: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self { blob, ttl, tokens }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn decode(token: &StateToken, body: &[u8]) -> Option<OAuthState> {
        match serde_json::from_slice::<StateDocument>(body) {
            Ok(document) => Some(OAuthState {
                token: token.clone(),
                created_at: document.created_at,
                metadata: document.metadata,
            }),
            Err(error) => {
                warn!(
                    event_name = "storage.oauth_state.undecodable",
                    error = %error,
                    "stored oauth state could not be decoded"
                );
                None
            }
        }
    }
}

#[async_trait]
impl OAuthStateStore for BlobOAuthStateStore {
    async fn issue(&self, metadata: StateMetadata) -> Result<StateToken, StorageError> {
        let token = self.tokens.next_token();
        let document = StateDocument { created_at: Utc::now(), metadata };
        self.blob.put_json(token.as_str(), &document).await?;

        debug!(event_name = "storage.oauth_state.issued", "oauth state issued");
        Ok(token)
    }

    async fn consume(&self, token: &StateToken) -> Result<StateMetadata, ConsumeError> {
        if !token.is_well_formed() {
            debug!(event_name = "storage.oauth_state.malformed", "malformed oauth state rejected");
            return Err(ConsumeError::Invalid);
        }

        let Some(body) = self.blob.get(token.as_str()).await? else {
            debug!(event_name = "storage.oauth_state.unknown", "unknown oauth state");
            return Err(ConsumeError::Invalid);
        };

        self.blob.delete(token.as_str()).await?;

        let Some(state) = Self::decode(token, &body) else {
            return Err(ConsumeError::Invalid);
        };
        if state.is_expired_at(Utc::now(), self.ttl) {
            info!(
                event_name = "storage.oauth_state.expired",
                created_at = %state.created_at,
                "expired oauth state consumed"
            );
            return Err(ConsumeError::Invalid);
        }

        Ok(state.metadata)
    }

    async fn sweep_expired(&self) -> Result<usize, StorageError> {
        let keys: Vec<String> = self.blob.list("").try_collect().await?;
        let now = Utc::now();
        let mut removed = 0;

        for key in keys {
            let Some(body) = self.blob.get(&key).await? else {
                continue;
            };
            let token = StateToken(key);
            let stale = match Self::decode(&token, &body) {
                Some(state) => state.is_expired_at(now, self.ttl),
                None => true,
            };
            if stale {
                self.blob.delete(token.as_str()).await?;
                removed += 1;
            }
        }

        info!(event_name = "storage.oauth_state.swept", removed, "expired oauth states swept");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, Utc};
    use serde_json::json;

    use multireact_core::{StateMetadata, StateToken};

    use super::{BlobOAuthStateStore, TokenSource};
    use crate::blob::{
        BlobClient, BlobError, BlobStore, InMemoryBlobStore, KeyPage, RetryPolicy, StorageError,
    };
    use crate::stores::{ConsumeError, OAuthStateStore};

    struct ScriptedTokens {
        tokens: Mutex<VecDeque<String>>,
    }

    impl ScriptedTokens {
        fn new(tokens: &[&str]) -> Arc<Self> {
            Arc::new(Self { tokens: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()) })
        }
    }

    impl TokenSource for ScriptedTokens {
        fn next_token(&self) -> StateToken {
            let next = self.tokens.lock().ok().and_then(|mut tokens| tokens.pop_front());
            next.map(StateToken).unwrap_or_else(StateToken::generate)
        }
    }

    fn store(ttl: Duration, tokens: &[&str]) -> (Arc<InMemoryBlobStore>, BlobOAuthStateStore) {
        let blob = Arc::new(InMemoryBlobStore::new("oauth-state"));
        let client = BlobClient::new(blob.clone(), RetryPolicy::immediate(1));
        (blob, BlobOAuthStateStore::with_token_source(client, ttl, ScriptedTokens::new(tokens)))
    }

    #[tokio::test]
    async fn fresh_token_is_consumed_exactly_once() {
        let (blob, states) = store(Duration::seconds(600), &["abc123"]);

        let token = states
            .issue(StateMetadata::new().with("team", "T1"))
            .await
            .expect("issue");
        assert_eq!(token, StateToken("abc123".to_owned()));

        let metadata = states.consume(&token).await.expect("first consume");
        assert_eq!(metadata.get("team"), Some("T1"));

        assert!(matches!(states.consume(&token).await, Err(ConsumeError::Invalid)));
        assert!(blob.is_empty().await);
    }

    #[tokio::test]
    async fn expired_token_is_invalid_and_removed() {
        let (blob, states) = store(Duration::seconds(600), &[]);
        let stale = json!({ "created_at": Utc::now() - Duration::seconds(601), "metadata": {} });
        blob.put("stale1", stale.to_string().as_bytes()).await.expect("seed");

        let result = states.consume(&StateToken("stale1".to_owned())).await;

        assert!(matches!(result, Err(ConsumeError::Invalid)));
        assert!(blob.is_empty().await);
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let (_, states) = store(Duration::zero(), &[]);

        let token = states.issue(StateMetadata::new()).await.expect("issue");

        assert!(matches!(states.consume(&token).await, Err(ConsumeError::Invalid)));
    }

    #[tokio::test]
    async fn very_long_ttl_keeps_states_valid() {
        let (blob, states) = store(Duration::seconds(1_000_000_000_000_000), &["forever"]);

        let token = states.issue(StateMetadata::new()).await.expect("issue");
        assert_eq!(states.sweep_expired().await.expect("sweep"), 0);

        assert!(states.consume(&token).await.is_ok());
        assert!(blob.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens_are_invalid() {
        let (blob, states) = store(Duration::seconds(600), &[]);
        blob.put("elsewhere/secret", b"{}").await.expect("seed");

        for token in ["never-issued", "", "../elsewhere/secret", "elsewhere/secret"] {
            let result = states.consume(&StateToken(token.to_owned())).await;
            assert!(matches!(result, Err(ConsumeError::Invalid)), "token {token:?}");
        }
        assert_eq!(blob.len().await, 1);
    }

    #[tokio::test]
    async fn undecodable_state_is_invalid() {
        let (blob, states) = store(Duration::seconds(600), &[]);
        blob.put("garbled", b"not json").await.expect("seed");

        let result = states.consume(&StateToken("garbled".to_owned())).await;

        assert!(matches!(result, Err(ConsumeError::Invalid)));
        assert!(blob.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_states() {
        let (blob, states) = store(Duration::seconds(600), &["live"]);
        states.issue(StateMetadata::new()).await.expect("issue");
        let stale = json!({ "created_at": Utc::now() - Duration::hours(2) });
        blob.put("old", stale.to_string().as_bytes()).await.expect("seed stale");
        blob.put("junk", b"\xff").await.expect("seed junk");

        let removed = states.sweep_expired().await.expect("sweep");

        assert_eq!(removed, 2);
        assert_eq!(blob.len().await, 1);
        assert!(blob.get("live").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn storage_failures_are_not_reported_as_invalid() {
        let states = BlobOAuthStateStore::new(
            BlobClient::new(Arc::new(Unreachable), RetryPolicy::immediate(2)),
            Duration::seconds(600),
        );

        let result = states.consume(&StateToken("abc123".to_owned())).await;

        assert!(matches!(
            result,
            Err(ConsumeError::Storage(StorageError::Unavailable { attempts: 2, .. }))
        ));
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl BlobStore for Unreachable {
        fn bucket(&self) -> &str {
            "oauth-state"
        }

        async fn put(&self, _key: &str, _body: &[u8]) -> Result<(), BlobError> {
            Err(BlobError::Transient("connection refused".to_owned()))
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BlobError> {
            Err(BlobError::Transient("connection refused".to_owned()))
        }

        async fn delete(&self, _key: &str) -> Result<(), BlobError> {
            Err(BlobError::Transient("connection refused".to_owned()))
        }

        async fn list_page(
            &self,
            _prefix: &str,
            _page_token: Option<&str>,
        ) -> Result<KeyPage, BlobError> {
            Err(BlobError::Transient("connection refused".to_owned()))
        }
    }
}
