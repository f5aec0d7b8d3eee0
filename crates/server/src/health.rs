use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use octorelay_db::repositories::AssociationRepository;

/// Repository name used only to exercise the store's read path. It is never
/// connected, so the probe always returns an empty result set on success.
const PROBE_REPO: &str = "octorelay/health-probe";

#[derive(Clone)]
struct HealthState {
    store: Arc<dyn AssociationRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub name: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ready: bool,
    pub checks: Vec<ProbeResult>,
    pub checked_at: DateTime<Utc>,
}

pub fn router(store: Arc<dyn AssociationRepository>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    store: Arc<dyn AssociationRepository>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(event_name = "health.listening", bind_address = %address, "health endpoint listening");

    tokio::spawn(async move {
        if let Err(serve_error) = axum::serve(listener, router(store)).await {
            error!(
                event_name = "health.serve_error",
                error = %serve_error,
                "health endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Readiness is the association-store probe: the relay is useless when it
/// cannot resolve rooms for a delivery, even if the process itself is up.
async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let store = probe_store(state.store.as_ref()).await;
    let ready = store.ok;

    let report = HealthReport {
        ready,
        checks: vec![ProbeResult { name: "service", ok: true, detail: None }, store],
        checked_at: Utc::now(),
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}

async fn probe_store(store: &dyn AssociationRepository) -> ProbeResult {
    match store.rooms_for_repo(PROBE_REPO).await {
        Ok(_) => ProbeResult { name: "association_store", ok: true, detail: None },
        Err(store_error) => {
            error!(
                event_name = "health.store_probe_failed",
                error = %store_error,
                "association store probe failed"
            );
            ProbeResult {
                name: "association_store",
                ok: false,
                detail: Some(store_error.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::Json;

    use octorelay_core::config::DatabaseConfig;
    use octorelay_db::connect;
    use octorelay_db::migrations::run_pending;
    use octorelay_db::repositories::SqlAssociationRepository;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ready_when_the_store_answers() {
        let pool = connect(&DatabaseConfig::memory()).await.expect("pool should connect");
        run_pending(&pool).await.expect("migrations should apply");
        let store = Arc::new(SqlAssociationRepository::new(pool.clone()));

        let (status, Json(report)) = health(State(HealthState { store })).await;

        assert_eq!(status, StatusCode::OK);
        assert!(report.ready);
        assert!(report.checks.iter().all(|check| check.ok));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_the_store_is_unreachable() {
        let pool = connect(&DatabaseConfig::memory()).await.expect("pool should connect");
        pool.close().await;
        let store = Arc::new(SqlAssociationRepository::new(pool));

        let (status, Json(report)) = health(State(HealthState { store })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!report.ready);

        let probe = report
            .checks
            .iter()
            .find(|check| check.name == "association_store")
            .expect("store probe");
        assert!(!probe.ok);
        assert!(probe.detail.is_some());
    }
}
