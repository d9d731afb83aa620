//! Groq adapter (spec §4.1) — OpenAI-compatible wire format, LPU-hosted
//! open models. No embeddings endpoint, so `embed` falls back to the
//! shared deterministic pseudo-embedding.

use super::openai_compatible::{self, OpenAiCompatibleClient};
use super::{HealthProbe, ProviderAdapter, UpstreamError, pseudo_embedding};
use crate::core::types::{
    Capability, ChatRequest, ChatResponse, CostEstimate, EmbeddingRequest, EmbeddingResponse,
    ModelInfo, StreamChunk, Usage,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashSet;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const EMBED_DIMS: usize = 384;

pub struct GroqAdapter {
    client: OpenAiCompatibleClient,
}

impl GroqAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: OpenAiCompatibleClient::new(DEFAULT_BASE_URL, Some(api_key)),
        }
    }

    fn pricing(model: &str) -> (f64, f64) {
        match model {
            "llama-3.3-70b-versatile" => (0.00059, 0.00079),
            "llama-3.1-8b-instant" => (0.00005, 0.00008),
            "mixtral-8x7b-32768" => (0.00024, 0.00024),
            _ => (0.0001, 0.0001),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
    fn id(&self) -> &'static str {
        "groq"
    }

    fn name(&self) -> &'static str {
        "Groq"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
        let (input, output) = Self::pricing(&req.model);
        openai_compatible::chat(&self.client, self.id(), req, |pt, ct| {
            (pt as f64 / 1000.0) * input + (ct as f64 / 1000.0) * output
        })
        .await
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, UpstreamError>>, UpstreamError> {
        let client = OpenAiCompatibleClient::new(
            self.client.base_url.clone(),
            self.client.api_key.clone(),
        );
        openai_compatible::chat_stream(client, req.clone()).await
    }

    async fn embed(&self, req: &EmbeddingRequest) -> Result<EmbeddingResponse, UpstreamError> {
        let inputs = req.input.as_vec();
        let data = inputs
            .iter()
            .enumerate()
            .map(|(i, text)| crate::core::types::EmbeddingData {
                index: i as u32,
                embedding: pseudo_embedding(text, EMBED_DIMS),
                object: "embedding".into(),
            })
            .collect();
        let total_chars: usize = inputs.iter().map(|s| s.len()).sum();
        Ok(EmbeddingResponse {
            object: "list".into(),
            data,
            model: req.model.clone(),
            usage: Usage::new(super::estimate_tokens(&"a".repeat(total_chars)), 0),
        })
    }

    fn estimate_cost(&self, req: &ChatRequest) -> CostEstimate {
        let (input, output) = Self::pricing(&req.model);
        openai_compatible::estimate_cost(req, input, output)
    }

    async fn health_check(&self) -> HealthProbe {
        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            self.client.http.get(format!("{}/models", self.client.base_url)).send(),
        )
        .await;

        match result {
            Ok(Ok(resp)) if resp.status().is_success() => HealthProbe {
                healthy: true,
                latency_ms: started.elapsed().as_millis() as u64,
                message: None,
            },
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
                id: "llama-3.3-70b-versatile".into(),
                provider: self.id().into(),
                context_window: 128_000,
                cost_per_1k_input: 0.00059,
                cost_per_1k_output: 0.00079,
                capabilities: HashSet::from([
                    Capability::General,
                    Capability::Code,
                    Capability::InstructionFollowing,
                ]),
                quality_score: 0.85,
                avg_latency_ms: 250,
            },
            ModelInfo {
                id: "llama-3.1-8b-instant".into(),
                provider: self.id().into(),
                context_window: 128_000,
                cost_per_1k_input: 0.00005,
                cost_per_1k_output: 0.00008,
                capabilities: HashSet::from([Capability::General, Capability::InstructionFollowing]),
                quality_score: 0.68,
                avg_latency_ms: 120,
            },
        ]
    }
}
