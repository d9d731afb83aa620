//! Together AI adapter (spec §4.1) — OpenAI-compatible wire format, hosts a
//! broad catalog of open models and exposes a real `/embeddings` endpoint.

use super::openai_compatible::{self, OpenAiCompatibleClient};
use super::{HealthProbe, ProviderAdapter, UpstreamError};
use crate::core::types::{
    Capability, ChatRequest, ChatResponse, CostEstimate, EmbeddingRequest, EmbeddingResponse,
    ModelInfo, StreamChunk,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashSet;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";

pub struct TogetherAdapter {
    client: OpenAiCompatibleClient,
}

impl TogetherAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: OpenAiCompatibleClient::new(DEFAULT_BASE_URL, Some(api_key)),
        }
    }

    fn pricing(model: &str) -> (f64, f64) {
        match model {
            "meta-llama/Llama-3.3-70B-Instruct-Turbo" => (0.00088, 0.00088),
            "Qwen/Qwen2.5-72B-Instruct-Turbo" => (0.0012, 0.0012),
            "google/gemma-2-27b-it" => (0.0008, 0.0008),
            _ => (0.0009, 0.0009),
        }
    }
}

#[async_trait]
impl ProviderAdapter for TogetherAdapter {
    fn id(&self) -> &'static str {
        "together"
    }

    fn name(&self) -> &'static str {
        "Together AI"
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
        openai_compatible::embed(&self.client, req).await
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
                id: "meta-llama/Llama-3.3-70B-Instruct-Turbo".into(),
                provider: self.id().into(),
                context_window: 131_072,
                cost_per_1k_input: 0.00088,
                cost_per_1k_output: 0.00088,
                capabilities: HashSet::from([
                    Capability::General,
                    Capability::Code,
                    Capability::InstructionFollowing,
                ]),
                quality_score: 0.84,
                avg_latency_ms: 700,
            },
            ModelInfo {
                id: "Qwen/Qwen2.5-72B-Instruct-Turbo".into(),
                provider: self.id().into(),
                context_window: 32_768,
                cost_per_1k_input: 0.0012,
                cost_per_1k_output: 0.0012,
                capabilities: HashSet::from([
                    Capability::General,
                    Capability::Code,
                    Capability::Math,
                ]),
                quality_score: 0.86,
                avg_latency_ms: 800,
            },
        ]
    }
}
