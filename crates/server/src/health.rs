use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use overburden_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub active_threshold: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Degraded when the database is unreachable. A missing active threshold is
/// reported but does not fail the check; reconciliation falls back to the
/// configured limit.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let active_threshold = if ready {
        threshold_check(&state.db_pool).await
    } else {
        HealthCheck { status: "unknown", detail: "database unavailable".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "overburden-server runtime initialized".to_string(),
        },
        database,
        active_threshold,
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

async fn threshold_check(pool: &DbPool) -> HealthCheck {
    let active = sqlx::query_scalar::<_, String>("SELECT id FROM threshold WHERE active = 1")
        .fetch_optional(pool)
        .await;

    match active {
        Ok(Some(id)) => HealthCheck { status: "ready", detail: format!("active threshold `{id}`") },
        Ok(None) => HealthCheck {
            status: "missing",
            detail: "no active threshold; fallback limit applies".to_string(),
        },
        Err(error) => {
            HealthCheck { status: "unknown", detail: format!("threshold lookup failed: {error}") }
        }
    }
}
