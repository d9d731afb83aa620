//! `POST /v1/embeddings` (spec §6).

use crate::core::types::EmbeddingRequest;
use crate::server::middleware::auth::bearer_token;
use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::info;

pub async fn create_embeddings(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    body: web::Json<EmbeddingRequest>,
) -> Result<HttpResponse, GatewayError> {
    let api_key = bearer_token(&http_req)?;
    let request = body.into_inner();
    info!(model = %request.model, "embeddings request");

    let response = state.pipeline.handle_embeddings(request, &api_key).await?;
    Ok(HttpResponse::Ok().json(response))
}
