//! Provider adapters (C2, spec §4.1) and the provider registry (C3, spec §4.2).
//!
//! Five vendor adapters are supported. Rather than `dyn ProviderAdapter`
//! trait objects, they're dispatched through a closed `Provider` enum —
//! matching `litellm-rs`'s enum-based `Provider` dispatch in
//! `core/providers/mod.rs`, since the adapter set is fixed at compile time
//! and the enum form avoids a vtable indirection on the hot path.

mod anthropic;
mod groq;
mod ollama;
mod openai;
mod openai_compatible;
pub mod registry;
mod together;

pub use anthropic::AnthropicAdapter;
pub use groq::GroqAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use registry::{ProviderRegistry, ProviderState};
pub use together::TogetherAdapter;

use crate::core::types::{
    ChatRequest, ChatResponse, CostEstimate, EmbeddingRequest, EmbeddingResponse, ModelInfo,
    StreamChunk,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Uniform view of an upstream vendor (spec §4.1).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamError>;

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, UpstreamError>>, UpstreamError>;

    async fn embed(&self, req: &EmbeddingRequest) -> Result<EmbeddingResponse, UpstreamError>;

    /// Pure, local, deterministic cost estimate — no network access.
    fn estimate_cost(&self, req: &ChatRequest) -> CostEstimate;

    async fn health_check(&self) -> HealthProbe;

    fn list_models(&self) -> Vec<ModelInfo>;
}

/// Outcome of a single health probe (spec §4.1, §4.2).
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub healthy: bool,
    pub latency_ms: u64,
    pub message: Option<String>,
}

/// `UpstreamError(status, retryable)` from spec §4.1. `408`, `429`, and `5xx`
/// are retryable; everything else is not.
#[derive(Debug, Clone, thiserror::Error)]
#[error("upstream error ({status}): {message}")]
pub struct UpstreamError {
    pub status: u16,
    pub retryable: bool,
    pub message: String,
}

impl UpstreamError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let retryable = status == 408 || status == 429 || status >= 500;
        Self {
            status,
            retryable,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            retryable: true,
            message: message.into(),
        }
    }
}

impl From<UpstreamError> for crate::utils::error::GatewayError {
    fn from(e: UpstreamError) -> Self {
        crate::utils::error::GatewayError::Upstream {
            provider: "unknown".into(),
            status: if e.status == 0 { 502 } else { e.status },
            retryable: e.retryable,
            message: e.message,
        }
    }
}

/// Token estimation heuristic shared by every adapter (spec §4.1):
/// `ceil(chars / 4)` for English text, deterministic for a given input.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil().max(1.0) as u32
}

/// Deterministic local embedding for vendors with no embeddings endpoint
/// (Anthropic, Groq, Ollama). Derived from a SHA-256 of the input so the
/// same text always maps to the same vector — good enough for the semantic
/// cache's near-hit lookup (spec §4.7), not a substitute for a real
/// embedding model.
pub fn pseudo_embedding(text: &str, dims: usize) -> Vec<f32> {
    use sha2::{Digest, Sha256};

    let mut out = Vec::with_capacity(dims);
    let mut counter: u32 = 0;
    while out.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if out.len() == dims {
                break;
            }
            let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            out.push((bits as f64 / u32::MAX as f64) as f32 * 2.0 - 1.0);
        }
        counter += 1;
    }

    let norm: f32 = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in out.iter_mut() {
            *v /= norm;
        }
    }
    out
}

/// Closed, enum-dispatched provider set.
#[derive(Clone)]
pub enum Provider {
    OpenAi(std::sync::Arc<OpenAiAdapter>),
    Anthropic(std::sync::Arc<AnthropicAdapter>),
    Groq(std::sync::Arc<GroqAdapter>),
    Together(std::sync::Arc<TogetherAdapter>),
    Ollama(std::sync::Arc<OllamaAdapter>),
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            Provider::OpenAi(p) => p.$method($($arg),*),
            Provider::Anthropic(p) => p.$method($($arg),*),
            Provider::Groq(p) => p.$method($($arg),*),
            Provider::Together(p) => p.$method($($arg),*),
            Provider::Ollama(p) => p.$method($($arg),*),
        }
    };
}

impl Provider {
    pub fn id(&self) -> &'static str {
        dispatch!(self, id)
    }

    pub fn name(&self) -> &'static str {
        dispatch!(self, name)
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
        match self {
            Provider::OpenAi(p) => p.chat(req).await,
            Provider::Anthropic(p) => p.chat(req).await,
            Provider::Groq(p) => p.chat(req).await,
            Provider::Together(p) => p.chat(req).await,
            Provider::Ollama(p) => p.chat(req).await,
        }
    }

    pub async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, UpstreamError>>, UpstreamError> {
        match self {
            Provider::OpenAi(p) => p.chat_stream(req).await,
            Provider::Anthropic(p) => p.chat_stream(req).await,
            Provider::Groq(p) => p.chat_stream(req).await,
            Provider::Together(p) => p.chat_stream(req).await,
            Provider::Ollama(p) => p.chat_stream(req).await,
        }
    }

    pub async fn embed(&self, req: &EmbeddingRequest) -> Result<EmbeddingResponse, UpstreamError> {
        match self {
            Provider::OpenAi(p) => p.embed(req).await,
            Provider::Anthropic(p) => p.embed(req).await,
            Provider::Groq(p) => p.embed(req).await,
            Provider::Together(p) => p.embed(req).await,
            Provider::Ollama(p) => p.embed(req).await,
        }
    }

    pub fn estimate_cost(&self, req: &ChatRequest) -> CostEstimate {
        dispatch!(self, estimate_cost, req)
    }

    pub async fn health_check(&self) -> HealthProbe {
        match self {
            Provider::OpenAi(p) => p.health_check().await,
            Provider::Anthropic(p) => p.health_check().await,
            Provider::Groq(p) => p.health_check().await,
            Provider::Together(p) => p.health_check().await,
            Provider::Ollama(p) => p.health_check().await,
        }
    }

    pub fn list_models(&self) -> Vec<ModelInfo> {
        dispatch!(self, list_models)
    }
}
