//! Shared plumbing for vendors that speak the OpenAI chat-completions wire
//! format (OpenAI itself, Groq, Together, and Ollama's compatibility layer).
//! Each concrete adapter supplies only its base URL, auth header, pricing
//! table, and static model catalog.

use crate::core::providers::{UpstreamError, estimate_tokens};
use crate::core::types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, CostEstimate, FinishReason, GatewayMetadata,
    Role, StreamChunk, Usage,
};
use async_stream::try_stream;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiCompatibleClient {
    pub http: reqwest::Client,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn to_wire<'a>(req: &'a ChatRequest, stream: bool) -> WireRequest<'a> {
    WireRequest {
        model: &req.model,
        messages: req
            .messages
            .iter()
            .map(|m| WireMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect(),
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_tokens,
        stream,
    }
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct WireChoice {
    index: u32,
    message: WireChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

fn finish_reason(s: Option<&str>) -> Option<FinishReason> {
    match s {
        Some("stop") => Some(FinishReason::Stop),
        Some("length") => Some(FinishReason::Length),
        Some("content_filter") => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Perform a non-streaming chat completion against an OpenAI-compatible
/// `/chat/completions` endpoint, translating the vendor response into the
/// canonical `ChatResponse`. `cost_usd` is computed by the caller since
/// pricing differs per vendor/model.
pub async fn chat(
    client: &OpenAiCompatibleClient,
    provider_id: &'static str,
    req: &ChatRequest,
    cost_usd: impl FnOnce(u32, u32) -> f64,
) -> Result<ChatResponse, UpstreamError> {
    let body = to_wire(req, false);
    let started = std::time::Instant::now();
    let resp = client
        .request("/chat/completions")
        .json(&body)
        .send()
        .await
        .map_err(|e| UpstreamError::network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(UpstreamError::from_status(status.as_u16(), text));
    }

    let parsed: WireResponse = resp
        .json()
        .await
        .map_err(|e| UpstreamError::network(format!("decode error: {e}")))?;
    let latency_ms = started.elapsed().as_millis() as u64;

    let usage = parsed
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    let choices = parsed
        .choices
        .into_iter()
        .map(|c| Choice {
            index: c.index,
            message: ChatMessage {
                role: Role::Assistant,
                content: c.message.content,
            },
            finish_reason: finish_reason(c.finish_reason.as_deref()),
        })
        .collect();

    Ok(ChatResponse {
        id: ChatResponse::new_id(),
        object: "chat.completion".into(),
        created: chrono::Utc::now().timestamp(),
        model: req.model.clone(),
        choices,
        usage: usage.clone(),
        gateway: GatewayMetadata {
            provider: provider_id.into(),
            routing_decision: String::new(),
            latency_ms,
            cost_usd: cost_usd(usage.prompt_tokens, usage.completion_tokens),
            cache_hit: false,
            fallback_used: false,
        },
    })
}

#[derive(Deserialize)]
struct WireChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireChunkChoice {
    index: u32,
    delta: WireChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChunkChoice>,
    usage: Option<WireUsage>,
}

/// Stream a chat completion, translating the vendor's `data: {json}\n\n` SSE
/// framing into canonical `StreamChunk`s. A malformed or mid-stream failure
/// surfaces as a terminal `Err` item rather than silently truncating.
pub async fn chat_stream(
    client: OpenAiCompatibleClient,
    req: ChatRequest,
) -> Result<BoxStream<'static, Result<StreamChunk, UpstreamError>>, UpstreamError> {
    let body = to_wire(&req, true);
    let resp = client
        .request("/chat/completions")
        .json(&body)
        .send()
        .await
        .map_err(|e| UpstreamError::network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(UpstreamError::from_status(status.as_u16(), text));
    }

    let id = ChatResponse::new_id();
    let model = req.model.clone();
    let created = chrono::Utc::now().timestamp();
    let mut byte_stream = resp.bytes_stream();

    let s = try_stream! {
        let mut buf = String::new();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| UpstreamError::network(e.to_string()))?;
            buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buf.find("\n\n") {
                let event = buf[..pos].to_string();
                buf.drain(..pos + 2);
                let Some(data) = event.strip_prefix("data: ") else { continue };
                if data.trim() == "[DONE]" {
                    return;
                }
                let parsed: WireChunk = serde_json::from_str(data)
                    .map_err(|e| UpstreamError::network(format!("decode error: {e}")))?;

                yield StreamChunk {
                    id: id.clone(),
                    object: "chat.completion.chunk".into(),
                    created,
                    model: model.clone(),
                    choices: parsed
                        .choices
                        .into_iter()
                        .map(|c| crate::core::types::ChunkChoice {
                            index: c.index,
                            delta: crate::core::types::Delta {
                                role: None,
                                content: c.delta.content,
                            },
                            finish_reason: finish_reason(c.finish_reason.as_deref()),
                        })
                        .collect(),
                    usage: parsed.usage.map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
                };
            }
        }
    };

    Ok(Box::pin(s))
}

#[derive(Serialize)]
struct WireEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct WireEmbedData {
    index: u32,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct WireEmbedResponse {
    data: Vec<WireEmbedData>,
    usage: Option<WireUsage>,
}

/// Call a vendor's `/embeddings` endpoint. Only OpenAI and Together expose
/// one among the adapters this gateway ships; the rest fall back to
/// `providers::pseudo_embedding`.
pub async fn embed(
    client: &OpenAiCompatibleClient,
    req: &crate::core::types::EmbeddingRequest,
) -> Result<crate::core::types::EmbeddingResponse, UpstreamError> {
    let inputs = req.input.as_vec();
    let body = WireEmbedRequest {
        model: &req.model,
        input: inputs,
    };

    let resp = client
        .request("/embeddings")
        .json(&body)
        .send()
        .await
        .map_err(|e| UpstreamError::network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(UpstreamError::from_status(status.as_u16(), text));
    }

    let parsed: WireEmbedResponse = resp
        .json()
        .await
        .map_err(|e| UpstreamError::network(format!("decode error: {e}")))?;

    let usage = parsed
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(crate::core::types::EmbeddingResponse {
        object: "list".into(),
        data: parsed
            .data
            .into_iter()
            .map(|d| crate::core::types::EmbeddingData {
                index: d.index,
                embedding: d.embedding,
                object: "embedding".into(),
            })
            .collect(),
        model: req.model.clone(),
        usage,
    })
}

/// Shared estimate-cost helper: heuristic token counting, caller supplies
/// the per-1k pricing.
pub fn estimate_cost(
    req: &ChatRequest,
    cost_per_1k_input: f64,
    cost_per_1k_output: f64,
) -> CostEstimate {
    let input_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
    let estimated_input_tokens = estimate_tokens(&"a".repeat(input_chars));
    let estimated_output_tokens = req.max_tokens.unwrap_or(256);
    let cost = (estimated_input_tokens as f64 / 1000.0) * cost_per_1k_input
        + (estimated_output_tokens as f64 / 1000.0) * cost_per_1k_output;
    CostEstimate {
        estimated_input_tokens,
        estimated_output_tokens,
        estimated_cost_usd: cost,
    }
}
