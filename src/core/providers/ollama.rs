//! Ollama adapter (spec §4.1) — local inference server, OpenAI-compatible
//! `/v1/chat/completions` endpoint, zero cost. No API key, no embeddings
//! endpoint reused here (Ollama's `/api/embeddings` has its own wire shape
//! we don't bother speaking); falls back to the shared pseudo-embedding.

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

const EMBED_DIMS: usize = 384;

pub struct OllamaAdapter {
    client: OpenAiCompatibleClient,
    models: Vec<String>,
}

impl OllamaAdapter {
    pub fn new(base_url: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            client: OpenAiCompatibleClient::new(base_url, None),
            models,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> &'static str {
        "ollama"
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
        openai_compatible::chat(&self.client, self.id(), req, |_, _| 0.0).await
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, UpstreamError>>, UpstreamError> {
        let client = OpenAiCompatibleClient::new(self.client.base_url.clone(), None);
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
        Ok(EmbeddingResponse {
            object: "list".into(),
            data,
            model: req.model.clone(),
            usage: Usage::default(),
        })
    }

    fn estimate_cost(&self, _req: &ChatRequest) -> CostEstimate {
        CostEstimate {
            estimated_input_tokens: 0,
            estimated_output_tokens: 0,
            estimated_cost_usd: 0.0,
        }
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
        self.models
            .iter()
            .map(|m| ModelInfo {
                id: m.clone(),
                provider: self.id().into(),
                context_window: 8_192,
                cost_per_1k_input: 0.0,
                cost_per_1k_output: 0.0,
                capabilities: HashSet::from([Capability::General, Capability::InstructionFollowing]),
                quality_score: 0.6,
                avg_latency_ms: 1_500,
            })
            .collect()
    }
}
