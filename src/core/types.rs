//! Canonical request/response shapes (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Virtual model aliases the router resolves via strategy.
pub const VIRTUAL_MODELS: [&str; 4] = ["auto", "fast", "cheap", "quality"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StopSequence {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    Cost,
    Quality,
    Latency,
    Balanced,
}

impl std::str::FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cost" => Ok(RoutingStrategy::Cost),
            "quality" => Ok(RoutingStrategy::Quality),
            "latency" => Ok(RoutingStrategy::Latency),
            "balanced" => Ok(RoutingStrategy::Balanced),
            other => Err(format!("unknown routing strategy: {other}")),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_n() -> u32 {
    1
}

/// Canonical inbound chat-completion request (spec §3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub stop: Option<StopSequence>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_n")]
    pub n: u32,

    #[serde(rename = "x-routing-strategy", default)]
    pub routing_strategy: Option<String>,
    #[serde(rename = "x-prefer-provider", default)]
    pub prefer_provider: Option<String>,
    #[serde(rename = "x-cache", default = "default_true")]
    pub cache: bool,
    #[serde(rename = "x-budget-key", default)]
    pub budget_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMetadata {
    pub provider: String,
    pub routing_decision: String,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub cache_hit: bool,
    pub fallback_used: bool,
}

/// Canonical, vendor-normalized chat-completion response (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    #[serde(rename = "x-gateway")]
    pub gateway: GatewayMetadata,
}

impl ChatResponse {
    pub fn new_id() -> String {
        format!("chatcmpl-{}", uuid::Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

/// A single streamed chunk (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    General,
    Code,
    Math,
    Creative,
    Reasoning,
    InstructionFollowing,
    Vision,
    LongContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub context_window: u32,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
    pub capabilities: HashSet<Capability>,
    pub quality_score: f32,
    pub avg_latency_ms: u32,
}

/// Request for the `/v1/embeddings` endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    One(String),
    Many(Vec<String>),
}

impl EmbeddingInput {
    pub fn as_vec(&self) -> Vec<&str> {
        match self {
            EmbeddingInput::One(s) => vec![s.as_str()],
            EmbeddingInput::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub index: u32,
    pub embedding: Vec<f32>,
    pub object: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: Usage,
}

/// Estimate produced locally by `ProviderAdapter::estimate_cost` (spec §4.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimate {
    pub estimated_input_tokens: u32,
    pub estimated_output_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Classifier output (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub complexity: Complexity,
    pub required_capabilities: HashSet<Capability>,
    pub estimated_tokens: u32,
    pub reasoning: String,
}

/// A `(provider, resolved_model)` pair that survived health/capability
/// filtering (spec §4.4 "Candidate").
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: String,
    pub model: String,
}

/// In-process view of a caller's API key (spec §3 `ApiKeyRecord`). Loaded
/// from durable storage on first use per request; the pipeline holds a
/// shared read view for the duration of a single request (spec §3
/// "Ownership & lifecycle").
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: String,
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub monthly_token_budget: Option<u64>,
    pub monthly_cost_budget_usd: Option<f64>,
    pub rate_limit_rpm: u32,
    pub rate_limit_tpm: u32,
    pub tokens_used_this_month: u64,
    pub cost_used_this_month_usd: f64,
    /// Whether this key's plan permits following the router's fallback
    /// chain past the first candidate (spec §4.4 step 4).
    pub platform_fallback: bool,
}
