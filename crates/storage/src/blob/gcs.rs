use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BlobError, BlobStore, KeyPage};

pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const LIST_PAGE_SIZE: u32 = 1_000;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// How requests are authorized.
pub enum GcsCredentials {
    /// No `Authorization` header; for emulators and public test buckets.
    Anonymous,
    Static(SecretString),
    /// Service-account token from the instance metadata server, cached until shortly before
    /// it expires.
    MetadataServer(MetadataTokenSource),
}

pub struct MetadataTokenSource {
    endpoint: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectResource {
    name: String,
}

impl MetadataTokenSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), cached: Mutex::new(None) }
    }

    /// The cache lock is only held to read or store a token, never across the metadata request.
    /// Callers that find the cache stale at the same time each fetch their own token.
    async fn token(&self, http: &reqwest::Client) -> Result<SecretString, BlobError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let response = http
            .get(&self.endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(classify_transport)?;
        let response = ensure_success(response).await?;
        let body: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|error| BlobError::Transient(format!("metadata token response: {error}")))?;

        let lifetime =
            Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let token = SecretString::from(body.access_token);
        *self.cached.lock().await =
            Some(CachedToken { token: token.clone(), refresh_at: Instant::now() + lifetime });
        debug!(
            event_name = "storage.gcs.token_refreshed",
            expires_in_secs = body.expires_in,
            "refreshed metadata server access token"
        );
        Ok(token)
    }

    async fn cached_token(&self) -> Option<SecretString> {
        let cached = self.cached.lock().await;
        cached
            .as_ref()
            .filter(|token| Instant::now() < token.refresh_at)
            .map(|token| token.token.clone())
    }
}

impl Default for MetadataTokenSource {
    fn default() -> Self {
        Self::new(METADATA_TOKEN_URL)
    }
}

/// Google Cloud Storage bucket over the JSON API.
pub struct GcsBlobStore {
    http: reqwest::Client,
    base_url: Url,
    bucket: String,
    credentials: GcsCredentials,
    page_size: u32,
}

impl GcsBlobStore {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        bucket: impl Into<String>,
        credentials: GcsCredentials,
    ) -> Result<Self, BlobError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|error| BlobError::Rejected(format!("invalid gcs base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BlobError::Rejected(format!("gcs base url `{base_url}` cannot be a base")));
        }

        Ok(Self { http, base_url, bucket: bucket.into(), credentials, page_size: LIST_PAGE_SIZE })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, BlobError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::Rejected("gcs base url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url, BlobError> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", key])
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, BlobError> {
        match &self.credentials {
            GcsCredentials::Anonymous => Ok(request),
            GcsCredentials::Static(token) => Ok(request.bearer_auth(token.expose_secret())),
            GcsCredentials::MetadataServer(source) => {
                let token = source.token(&self.http).await?;
                Ok(request.bearer_auth(token.expose_secret()))
            }
        }
    }
}

fn classify_transport(error: reqwest::Error) -> BlobError {
    if error.is_builder() {
        BlobError::Rejected(error.to_string())
    } else {
        BlobError::Transient(error.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> BlobError {
    let message = format!("http {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        BlobError::Transient(message)
    } else {
        BlobError::Rejected(message)
    }
}

async fn ensure_success(response: Response) -> Result<Response, BlobError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), BlobError> {
        let url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        let request = self
            .http
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body.to_vec());
        let response = self.authorize(request).await?.send().await.map_err(classify_transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let url = self.object_url(key)?;
        let request = self.http.get(url).query(&[("alt", "media")]);
        let response = self.authorize(request).await?.send().await.map_err(classify_transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let body = response.bytes().await.map_err(classify_transport)?;
        Ok(Some(body.to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let url = self.object_url(key)?;
        let request = self.http.delete(url);
        let response = self.authorize(request).await?.send().await.map_err(classify_transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await.map(|_| ())
    }

    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<KeyPage, BlobError> {
        let url = self.url(&["storage", "v1", "b", &self.bucket, "o"])?;
        let page_size = self.page_size.to_string();
        let mut query = vec![
            ("prefix", prefix),
            ("maxResults", page_size.as_str()),
            ("fields", "items(name),nextPageToken"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let request = self.http.get(url).query(&query);
        let response = self.authorize(request).await?.send().await.map_err(classify_transport)?;
        let response = ensure_success(response).await?;
        let body: ObjectListResponse = response
            .json()
            .await
            .map_err(|error| BlobError::Transient(format!("object list response: {error}")))?;

        Ok(KeyPage {
            keys: body.items.into_iter().map(|item| item.name).collect(),
            next_page_token: body.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Bytes;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::json;
    use tokio::sync::{Barrier, Mutex};

    use super::{classify_status, GcsBlobStore, GcsCredentials, MetadataTokenSource};
    use crate::blob::{BlobError, BlobStore};

    #[derive(Clone, Default)]
    struct FakeGcs {
        objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
        seen_auth: Arc<Mutex<Vec<String>>>,
        token_requests: Arc<Mutex<usize>>,
        /// When set, each token request waits here until the barrier fills.
        token_barrier: Option<Arc<Barrier>>,
    }

    async fn record_auth(state: &FakeGcs, headers: &HeaderMap) {
        if let Some(value) = headers.get("authorization").and_then(|value| value.to_str().ok()) {
            state.seen_auth.lock().await.push(value.to_owned());
        }
    }

    async fn upload(
        State(state): State<FakeGcs>,
        Path(_bucket): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        record_auth(&state, &headers).await;
        if query.get("uploadType").map(String::as_str) != Some("media") {
            return StatusCode::BAD_REQUEST;
        }
        let Some(name) = query.get("name") else {
            return StatusCode::BAD_REQUEST;
        };
        state.objects.lock().await.insert(name.clone(), body.to_vec());
        StatusCode::OK
    }

    async fn download(
        State(state): State<FakeGcs>,
        Path((_bucket, object)): Path<(String, String)>,
        headers: HeaderMap,
    ) -> Result<Vec<u8>, StatusCode> {
        record_auth(&state, &headers).await;
        if object == "forbidden" {
            return Err(StatusCode::FORBIDDEN);
        }
        if object == "flaky" {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
        state.objects.lock().await.get(&object).cloned().ok_or(StatusCode::NOT_FOUND)
    }

    async fn remove(
        State(state): State<FakeGcs>,
        Path((_bucket, object)): Path<(String, String)>,
    ) -> StatusCode {
        match state.objects.lock().await.remove(&object) {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::NOT_FOUND,
        }
    }

    async fn list(
        State(state): State<FakeGcs>,
        Path(_bucket): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        let prefix = query.get("prefix").cloned().unwrap_or_default();
        let max: usize =
            query.get("maxResults").and_then(|value| value.parse().ok()).unwrap_or(1000);
        let after = query.get("pageToken").cloned();

        let objects = state.objects.lock().await;
        let mut names: Vec<String> = objects
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .filter(|name| after.as_ref().map_or(true, |token| name.as_str() > token.as_str()))
            .take(max + 1)
            .cloned()
            .collect();
        let next = if names.len() > max {
            names.truncate(max);
            names.last().cloned()
        } else {
            None
        };
        let items: Vec<_> = names.into_iter().map(|name| json!({ "name": name })).collect();
        match next {
            Some(token) => Json(json!({ "items": items, "nextPageToken": token })),
            None => Json(json!({ "items": items })),
        }
    }

    async fn metadata_token(
        State(state): State<FakeGcs>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("metadata-flavor").and_then(|value| value.to_str().ok()) != Some("Google") {
            return Err(StatusCode::FORBIDDEN);
        }
        *state.token_requests.lock().await += 1;
        if let Some(barrier) = &state.token_barrier {
            barrier.wait().await;
        }
        Ok(Json(json!({
            "access_token": "ya29.metadata",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
    }

    async fn spawn_fake(state: FakeGcs) -> String {
        let router = Router::new()
            .route("/upload/storage/v1/b/{bucket}/o", post(upload))
            .route("/storage/v1/b/{bucket}/o", get(list))
            .route("/storage/v1/b/{bucket}/o/{object}", get(download).delete(remove))
            .route("/token", get(metadata_token))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake gcs");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn objects_with_slashes_roundtrip_and_list_in_pages() {
        let fake = FakeGcs::default();
        let base_url = spawn_fake(fake.clone()).await;
        let store = GcsBlobStore::new(
            reqwest::Client::new(),
            &base_url,
            "installations",
            GcsCredentials::Static(SecretString::from("static-token".to_owned())),
        )
        .expect("store")
        .with_page_size(1);

        store.put("C1/none-T1/bot-latest", b"bot").await.expect("put bot");
        store.put("C1/none-T1/installer-latest", b"installer").await.expect("put installer");

        let body = store.get("C1/none-T1/bot-latest").await.expect("get");
        assert_eq!(body.as_deref(), Some(&b"bot"[..]));
        assert_eq!(store.get("C1/none-T1/missing").await.expect("get missing"), None);

        let first = store.list_page("C1/none-T1/", None).await.expect("first page");
        assert_eq!(first.keys, vec!["C1/none-T1/bot-latest"]);
        let second = store
            .list_page("C1/none-T1/", first.next_page_token.as_deref())
            .await
            .expect("second page");
        assert_eq!(second.keys, vec!["C1/none-T1/installer-latest"]);

        store.delete("C1/none-T1/bot-latest").await.expect("delete");
        store.delete("C1/none-T1/bot-latest").await.expect("delete of missing object");
        assert_eq!(store.get("C1/none-T1/bot-latest").await.expect("get deleted"), None);

        let seen = fake.seen_auth.lock().await.clone();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|value| value == "Bearer static-token"));
    }

    #[tokio::test]
    async fn http_failures_are_classified() {
        let base_url = spawn_fake(FakeGcs::default()).await;
        let store = GcsBlobStore::new(
            reqwest::Client::new(),
            &base_url,
            "bucket",
            GcsCredentials::Anonymous,
        )
        .expect("store");

        assert!(matches!(store.get("forbidden").await, Err(BlobError::Rejected(_))));
        assert!(matches!(store.get("flaky").await, Err(BlobError::Transient(_))));

        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND, "").is_transient());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let store = GcsBlobStore::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            "bucket",
            GcsCredentials::Anonymous,
        )
        .expect("store");

        assert!(matches!(store.get("anything").await, Err(BlobError::Transient(_))));
    }

    #[tokio::test]
    async fn metadata_tokens_are_cached() {
        let fake = FakeGcs::default();
        let base_url = spawn_fake(fake.clone()).await;
        let store = GcsBlobStore::new(
            reqwest::Client::new(),
            &base_url,
            "bucket",
            GcsCredentials::MetadataServer(MetadataTokenSource::new(format!("{base_url}/token"))),
        )
        .expect("store");

        store.put("a", b"1").await.expect("first put");
        store.put("b", b"2").await.expect("second put");

        assert_eq!(*fake.token_requests.lock().await, 1);
        let seen = fake.seen_auth.lock().await.clone();
        assert_eq!(seen, vec!["Bearer ya29.metadata", "Bearer ya29.metadata"]);
    }

    #[tokio::test]
    async fn slow_token_refresh_does_not_block_other_callers() {
        let fake = FakeGcs { token_barrier: Some(Arc::new(Barrier::new(2))), ..FakeGcs::default() };
        let base_url = spawn_fake(fake.clone()).await;
        let store = Arc::new(
            GcsBlobStore::new(
                reqwest::Client::new(),
                &base_url,
                "bucket",
                GcsCredentials::MetadataServer(MetadataTokenSource::new(format!(
                    "{base_url}/token"
                ))),
            )
            .expect("store"),
        );

        // Both refreshes must reach the metadata endpoint before either can finish.
        let first = tokio::spawn({
            let store = store.clone();
            async move { store.put("a", b"1").await }
        });
        let second = tokio::spawn({
            let store = store.clone();
            async move { store.put("b", b"2").await }
        });
        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await, second.await)
        })
        .await
        .expect("refreshes should run concurrently");

        assert!(matches!(joined, (Ok(Ok(())), Ok(Ok(())))));
        assert_eq!(*fake.token_requests.lock().await, 2);
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        let result = GcsBlobStore::new(
            reqwest::Client::new(),
            "not a url",
            "bucket",
            GcsCredentials::Anonymous,
        );
        assert!(matches!(result, Err(BlobError::Rejected(_))));
    }
}
