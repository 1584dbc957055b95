use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use futures::future::join_all;
use multireact_storage::BlobClient;
use serde::Serialize;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    buckets: Vec<BlobClient>,
}

impl HealthState {
    pub fn new(buckets: Vec<BlobClient>) -> Self {
        Self { buckets }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BucketCheck {
    pub bucket: String,
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub storage: Vec<BucketCheck>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Running health listener; dropping the sender also stops it.
pub struct HealthServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HealthServer {
    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.shutdown.send(());
        self.task.await
    }
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    state: HealthState,
) -> std::io::Result<HealthServer> {
    let address = format!("{bind_address}:{port}");
    let listener = TcpListener::bind(&address).await?;
    let (shutdown, signal) = oneshot::channel::<()>();

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    let task = tokio::spawn(async move {
        let server = axum::serve(listener, router(state)).with_graceful_shutdown(async move {
            let _ = signal.await;
        });
        if let Err(error) = server.await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(HealthServer { shutdown, task })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = join_all(state.buckets.iter().map(bucket_check)).await;
    let ready = storage.iter().all(|check| check.status == "ready");

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "multireact-server runtime initialized".to_string(),
        },
        storage,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn bucket_check(bucket: &BlobClient) -> BucketCheck {
    match bucket.probe().await {
        Ok(()) => BucketCheck {
            bucket: bucket.bucket().to_owned(),
            status: "ready",
            detail: "bucket probe succeeded".to_string(),
        },
        Err(error) => BucketCheck {
            bucket: bucket.bucket().to_owned(),
            status: "degraded",
            detail: format!("bucket probe failed: {error}"),
        },
    }
}
