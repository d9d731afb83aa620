//! OpenAI adapter (spec §4.1).

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiAdapter {
    client: OpenAiCompatibleClient,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client: OpenAiCompatibleClient::new(base_url, Some(api_key)),
        }
    }

    fn pricing(model: &str) -> (f64, f64) {
        match model {
            "gpt-4o" => (0.0025, 0.01),
            "gpt-4o-mini" => (0.00015, 0.0006),
            "gpt-4-turbo" => (0.01, 0.03),
            "o1" => (0.015, 0.06),
            "o1-mini" => (0.003, 0.012),
            _ => (0.0005, 0.0015),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &'static str {
        "openai"
    }

    fn name(&self) -> &'static str {
        "OpenAI"
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
                id: "gpt-4o".into(),
                provider: self.id().into(),
                context_window: 128_000,
                cost_per_1k_input: 0.0025,
                cost_per_1k_output: 0.01,
                capabilities: HashSet::from([
                    Capability::General,
                    Capability::Code,
                    Capability::Reasoning,
                    Capability::Vision,
                    Capability::InstructionFollowing,
                ]),
                quality_score: 0.93,
                avg_latency_ms: 900,
            },
            ModelInfo {
                id: "gpt-4o-mini".into(),
                provider: self.id().into(),
                context_window: 128_000,
                cost_per_1k_input: 0.00015,
                cost_per_1k_output: 0.0006,
                capabilities: HashSet::from([
                    Capability::General,
                    Capability::Code,
                    Capability::InstructionFollowing,
                ]),
                quality_score: 0.82,
                avg_latency_ms: 450,
            },
            ModelInfo {
                id: "o1".into(),
                provider: self.id().into(),
                context_window: 200_000,
                cost_per_1k_input: 0.015,
                cost_per_1k_output: 0.06,
                capabilities: HashSet::from([
                    Capability::General,
                    Capability::Reasoning,
                    Capability::Math,
                    Capability::Code,
                ]),
                quality_score: 0.97,
                avg_latency_ms: 4_500,
            },
        ]
    }
}
