//! `GET /metrics` (ambient observability surface, not named by spec §6 but
//! carried the way `litellm-rs` carries its own metrics export alongside
//! request handling): unauthenticated Prometheus text exposition.

use crate::server::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(state.metrics.gather())
}
