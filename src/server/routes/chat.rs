//! `POST /v1/chat/completions` (spec §6).
//!
//! Buffered requests return a `ChatResponse` directly; streaming requests
//! return an SSE body framed exactly as the spec requires: `data: <json>\n\n`
//! per chunk, terminated by a literal `data: [DONE]\n\n`. Modeled on
//! `litellm-rs`'s own `chat_completions` handler in
//! `server/routes/ai/chat.rs`, which makes the same streaming-vs-buffered
//! branch on `request.stream`.

use crate::core::types::ChatRequest;
use crate::server::middleware::auth::bearer_token;
use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use tracing::{error, info};

pub async fn chat_completions(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse, GatewayError> {
    let api_key = bearer_token(&http_req)?;
    let request = body.into_inner();
    info!(model = %request.model, stream = request.stream, "chat completion request");

    if request.stream {
        stream_chat(state, request, api_key).await
    } else {
        let response = state.pipeline.handle_chat(request, &api_key).await?;
        Ok(HttpResponse::Ok().json(response))
    }
}

async fn stream_chat(
    state: web::Data<AppState>,
    request: ChatRequest,
    api_key: String,
) -> Result<HttpResponse, GatewayError> {
    let pipeline = std::sync::Arc::clone(&state.pipeline);
    let mut chunks = pipeline.handle_chat_stream(request, &api_key).await?;

    let body = async_stream::stream! {
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => match serde_json::to_string(&chunk) {
                    Ok(json) => yield Ok::<_, actix_web::Error>(web::Bytes::from(format!("data: {json}\n\n"))),
                    Err(e) => {
                        error!(error = %e, "failed to serialize stream chunk");
                        break;
                    }
                },
                Err(e) => {
                    error!(error = %e, "upstream stream terminated with an error");
                    let envelope = serde_json::json!({"error": {"message": e.to_string(), "type": e.error_type()}});
                    yield Ok(web::Bytes::from(format!("data: {envelope}\n\n")));
                    break;
                }
            }
        }
        yield Ok(web::Bytes::from_static(b"data: [DONE]\n\n"));
    };

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(body))
}
