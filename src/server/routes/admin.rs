//! `GET /admin/providers` (spec §6): bearer-admin-gated provider status
//! dump, the one operator-facing surface this gateway exposes directly
//! (the rest of `litellm-rs`'s admin surface — billing plans, the CLI — is
//! out of scope per spec §1).

use crate::server::middleware::auth::require_admin;
use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

#[derive(Serialize)]
struct ProviderStatus {
    id: String,
    name: String,
    healthy: bool,
    latency_ms: u64,
    model_count: usize,
}

pub async fn list_providers(
    state: web::Data<AppState>,
    http_req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&http_req, state.config.admin_api_key.as_deref())?;

    let statuses: Vec<ProviderStatus> = state
        .registry
        .snapshot()
        .iter()
        .map(|p| ProviderStatus {
            id: p.provider.id().to_string(),
            name: p.provider.name().to_string(),
            healthy: p.healthy,
            latency_ms: p.latency_ms,
            model_count: p.models.len(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(statuses))
}
