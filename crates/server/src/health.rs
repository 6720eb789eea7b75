use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use vinoteka_core::domain::sync::SyncTaskState;
use vinoteka_db::repositories::SyncQueueRepository;
use vinoteka_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    queue: Arc<dyn SyncQueueRepository>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, queue: Arc<dyn SyncQueueRepository>) -> Self {
        Self { db_pool, queue }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

/// Queue depth snapshot. Informational only; it never fails readiness.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub queued: u64,
    pub running: u64,
    pub retry_scheduled: u64,
    pub failed_terminal: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub sync_queue: Option<QueueSnapshot>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let sync_queue = if ready { queue_snapshot(state.queue.as_ref()).await } else { None };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        sync_queue,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn queue_snapshot(queue: &dyn SyncQueueRepository) -> Option<QueueSnapshot> {
    let counts = queue.count_by_state().await.ok()?;
    let mut snapshot = QueueSnapshot::default();
    for (state, count) in counts {
        match state {
            SyncTaskState::Queued => snapshot.queued = count,
            SyncTaskState::Running => snapshot.running = count,
            SyncTaskState::RetryableFailed => snapshot.retry_scheduled = count,
            SyncTaskState::FailedTerminal => snapshot.failed_terminal = count,
            SyncTaskState::Completed => {}
        }
    }
    Some(snapshot)
}
