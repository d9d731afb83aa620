//! `GET /v1/models` (spec §6): the OpenAI-compatible model listing,
//! aggregated across every healthy provider's catalog.

use crate::server::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<crate::core::types::ModelInfo>,
}

pub async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    let data = state
        .registry
        .snapshot()
        .iter()
        .filter(|p| p.healthy)
        .flat_map(|p| p.models.clone())
        .collect();

    HttpResponse::Ok().json(ModelList { object: "list", data })
}
