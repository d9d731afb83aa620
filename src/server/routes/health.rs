//! `GET /healthz` (spec §6): unauthenticated liveness/readiness probe.

use crate::server::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Serialize)]
struct ProviderSummary {
    id: String,
    healthy: bool,
    latency_ms: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    providers: Vec<ProviderSummary>,
}

pub async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.registry.snapshot();
    let providers: Vec<ProviderSummary> = snapshot
        .iter()
        .map(|p| ProviderSummary {
            id: p.provider.id().to_string(),
            healthy: p.healthy,
            latency_ms: p.latency_ms,
        })
        .collect();

    let status = if providers.is_empty() || providers.iter().any(|p| p.healthy) {
        "ok"
    } else {
        "degraded"
    };

    HttpResponse::Ok().json(HealthResponse { status, providers })
}
