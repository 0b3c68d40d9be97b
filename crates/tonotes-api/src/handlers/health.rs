//! Liveness and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tonotes_db::HealthStatus;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub time: DateTime<Utc>,
}

/// Reachability of the document store and the key/value store
#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub document_store: bool,
    pub key_value_store: bool,
}

impl From<HealthStatus> for Readiness {
    fn from(health: HealthStatus) -> Self {
        Self {
            status: if health.healthy { "ready" } else { "not_ready" },
            document_store: health.mongo,
            key_value_store: health.store,
        }
    }
}

/// Process is up; touches nothing
pub async fn health_check() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        time: Utc::now(),
    })
}

/// Both stores answer a ping
///
/// The in-memory backends are always ready.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Readiness>) {
    let health = match &state.db {
        Some(db) => db.health_check().await,
        None => HealthStatus {
            mongo: true,
            store: true,
            healthy: true,
        },
    };

    let code = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(Readiness::from(health)))
}
