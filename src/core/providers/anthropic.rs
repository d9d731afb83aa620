//! Anthropic adapter (spec §4.1) — the Messages API, which differs enough
//! from the OpenAI wire shape (separate `system` field, `x-api-key` auth,
//! distinct SSE event types) that it gets its own translation layer rather
//! than reusing `openai_compatible`.

use super::{HealthProbe, ProviderAdapter, UpstreamError, estimate_tokens, pseudo_embedding};
use crate::core::types::{
    Capability, ChatMessage, ChatRequest, ChatResponse, Choice, CostEstimate, EmbeddingRequest,
    EmbeddingResponse, FinishReason, GatewayMetadata, ModelInfo, Role, StreamChunk, Usage,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const EMBED_DIMS: usize = 384;

pub struct AnthropicAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client"),
            base_url: DEFAULT_BASE_URL.into(),
            api_key,
        }
    }

    fn pricing(model: &str) -> (f64, f64) {
        match model {
            "claude-3-5-sonnet-20241022" => (0.003, 0.015),
            "claude-3-5-haiku-20241022" => (0.0008, 0.004),
            "claude-3-opus-20240229" => (0.015, 0.075),
            _ => (0.003, 0.015),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

/// Anthropic requires `max_tokens`; spec requests may omit it, so fall back
/// to a conservative default rather than rejecting the request upstream.
const DEFAULT_MAX_TOKENS: u32 = 4_096;

fn split_system(messages: &[ChatMessage]) -> (Option<&str>, Vec<WireMessage<'_>>) {
    let mut system = None;
    let mut rest = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::System => system = Some(m.content.as_str()),
            Role::User => rest.push(WireMessage {
                role: "user",
                content: &m.content,
            }),
            Role::Assistant => rest.push(WireMessage {
                role: "assistant",
                content: &m.content,
            }),
        }
    }
    (system, rest)
}

fn to_wire<'a>(req: &'a ChatRequest, stream: bool) -> WireRequest<'a> {
    let (system, messages) = split_system(&req.messages);
    WireRequest {
        model: &req.model,
        messages,
        system,
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature,
        top_p: req.top_p,
        stream,
    }
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct WireContentBlock {
    text: String,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

fn finish_reason(s: Option<&str>) -> Option<FinishReason> {
    match s {
        Some("end_turn") | Some("stop_sequence") => Some(FinishReason::Stop),
        Some("max_tokens") => Some(FinishReason::Length),
        _ => None,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> &'static str {
        "anthropic"
    }

    fn name(&self) -> &'static str {
        "Anthropic"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
        let body = to_wire(req, false);
        let started = Instant::now();
        let resp = self
            .request("/messages")
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
        let usage = Usage::new(parsed.usage.input_tokens, parsed.usage.output_tokens);
        let (input_cost, output_cost) = Self::pricing(&req.model);
        let cost_usd = (usage.prompt_tokens as f64 / 1000.0) * input_cost
            + (usage.completion_tokens as f64 / 1000.0) * output_cost;

        let content = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            id: ChatResponse::new_id(),
            object: "chat.completion".into(),
            created: chrono::Utc::now().timestamp(),
            model: req.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: finish_reason(parsed.stop_reason.as_deref()),
            }],
            usage: usage.clone(),
            gateway: GatewayMetadata {
                provider: self.id().into(),
                routing_decision: String::new(),
                latency_ms,
                cost_usd,
                cache_hit: false,
                fallback_used: false,
            },
        })
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, UpstreamError>>, UpstreamError> {
        let body = to_wire(req, true);
        let resp = self
            .request("/messages")
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

                    let data_line = event.lines().find(|l| l.starts_with("data: "));
                    let Some(data_line) = data_line else { continue };
                    let data = &data_line["data: ".len()..];

                    let value: serde_json::Value = serde_json::from_str(data)
                        .map_err(|e| UpstreamError::network(format!("decode error: {e}")))?;
                    let event_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("");

                    match event_type {
                        "content_block_delta" => {
                            let text = value
                                .pointer("/delta/text")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string();
                            yield StreamChunk {
                                id: id.clone(),
                                object: "chat.completion.chunk".into(),
                                created,
                                model: model.clone(),
                                choices: vec![crate::core::types::ChunkChoice {
                                    index: 0,
                                    delta: crate::core::types::Delta {
                                        role: None,
                                        content: Some(text),
                                    },
                                    finish_reason: None,
                                }],
                                usage: None,
                            };
                        }
                        "message_delta" => {
                            let stop_reason = value
                                .pointer("/delta/stop_reason")
                                .and_then(|v| v.as_str());
                            let output_tokens = value
                                .pointer("/usage/output_tokens")
                                .and_then(|v| v.as_u64())
                                .unwrap_or(0) as u32;
                            yield StreamChunk {
                                id: id.clone(),
                                object: "chat.completion.chunk".into(),
                                created,
                                model: model.clone(),
                                choices: vec![crate::core::types::ChunkChoice {
                                    index: 0,
                                    delta: crate::core::types::Delta { role: None, content: None },
                                    finish_reason: finish_reason(stop_reason),
                                }],
                                usage: Some(Usage::new(0, output_tokens)),
                            };
                        }
                        "message_stop" => return,
                        _ => continue,
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }

    async fn embed(&self, req: &EmbeddingRequest) -> Result<EmbeddingResponse, UpstreamError> {
        let inputs = req.input.as_vec();
        let total_chars: usize = inputs.iter().map(|s| s.len()).sum();
        let data = inputs
            .iter()
            .enumerate()
            .map(|(i, text)| crate::core::types::EmbeddingData {
                index: i as u32,
                embedding: pseudo_embedding(text, EMBED_DIMS),
                object: "embedding".into(),
            })
            .collect();
        Ok(EmbeddingResponse {
            object: "list".into(),
            data,
            model: req.model.clone(),
            usage: Usage::new(estimate_tokens(&"a".repeat(total_chars)), 0),
        })
    }

    fn estimate_cost(&self, req: &ChatRequest) -> CostEstimate {
        let (input, output) = Self::pricing(&req.model);
        let input_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        let estimated_input_tokens = estimate_tokens(&"a".repeat(input_chars));
        let estimated_output_tokens = req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let cost = (estimated_input_tokens as f64 / 1000.0) * input
            + (estimated_output_tokens as f64 / 1000.0) * output;
        CostEstimate {
            estimated_input_tokens,
            estimated_output_tokens,
            estimated_cost_usd: cost,
        }
    }

    async fn health_check(&self) -> HealthProbe {
        let started = Instant::now();
        let probe_req = ChatRequest {
            model: "claude-3-5-haiku-20241022".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "ping".into(),
            }],
            temperature: None,
            top_p: None,
            max_tokens: Some(1),
            presence_penalty: None,
            frequency_penalty: None,
            stop: None,
            stream: false,
            n: 1,
            routing_strategy: None,
            prefer_provider: None,
            cache: false,
            budget_key: None,
        };
        let body = to_wire(&probe_req, false);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            self.request("/messages").json(&body).send(),
        )
        .await;

        match result {
            Ok(Ok(resp)) if resp.status().is_success() || resp.status().as_u16() == 400 => {
                HealthProbe {
                    healthy: true,
                    latency_ms: started.elapsed().as_millis() as u64,
                    message: None,
                }
            }
            Ok(Ok(resp)) => HealthProbe {
                healthy: false,
                latency_ms: started.elapsed().as_millis() as u64,
                message: Some(format!("status {}", resp.status())),
            },
            Ok(Err(e)) => HealthProbe {
                healthy: false,
                latency_ms: started.elapsed().as_millis() as u64,
                message: Some(e.to_string()),
            },
            Err(_) => HealthProbe {
                healthy: false,
                latency_ms: 5_000,
                message: Some("health check timed out".into()),
            },
        }
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "claude-3-5-sonnet-20241022".into(),
                provider: self.id().into(),
                context_window: 200_000,
                cost_per_1k_input: 0.003,
                cost_per_1k_output: 0.015,
                capabilities: std::collections::HashSet::from([
                    Capability::General,
                    Capability::Code,
                    Capability::Reasoning,
                    Capability::LongContext,
                    Capability::InstructionFollowing,
                ]),
                quality_score: 0.95,
                avg_latency_ms: 1_100,
            },
            ModelInfo {
                id: "claude-3-5-haiku-20241022".into(),
                provider: self.id().into(),
                context_window: 200_000,
                cost_per_1k_input: 0.0008,
                cost_per_1k_output: 0.004,
                capabilities: std::collections::HashSet::from([
                    Capability::General,
                    Capability::InstructionFollowing,
                    Capability::LongContext,
                ]),
                quality_score: 0.8,
                avg_latency_ms: 500,
            },
        ]
    }
}
