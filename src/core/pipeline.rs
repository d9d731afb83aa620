//! Request pipeline (C10, spec §4.9): the orchestrator that wires every
//! other core component into the ten steps a chat-completion request walks
//! through, for both the buffered and streaming response shapes.
//!
//! Built the way `litellm-rs`'s own request handler composes its pieces —
//! one struct holding `Arc`s to every subsystem, a single `GatewayError` flowing
//! out of each step, `tracing` spans at the request boundary (added by the
//! `server` layer, not here, so this module stays transport-agnostic and
//! testable without `actix-web`).

use crate::core::budget::{BudgetEnforcer, KeyBudget};
use crate::core::cache::SemanticCache;
use crate::core::classifier::Classifier;
use crate::core::logger::{redact_prompt, RequestLogEntry, RequestLogger};
use crate::core::providers::registry::ProviderRegistry;
use crate::core::providers::estimate_tokens;
use crate::core::rate_limiter::RateLimiter;
use crate::core::router::{Router, RoutingPlan};
use crate::core::types::{
    ApiKeyRecord, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Role,
    RoutingStrategy, StreamChunk,
};
use crate::core::validation::Validator;
use crate::storage::database::Database;
use crate::utils::error::{GatewayError, Result};
use async_stream::stream;
use dashmap::DashMap;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-attempt upstream timeout for the buffered chat path (spec §4.9).
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the pipeline needs from `main.rs`'s wiring, gathered behind
/// `Arc`s so handlers (and tests) can clone the whole thing cheaply.
pub struct Pipeline {
    registry: Arc<ProviderRegistry>,
    budget: Arc<BudgetEnforcer>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<SemanticCache>,
    logger: Arc<RequestLogger>,
    database: Option<Arc<Database>>,
    /// Cache of `raw key -> ApiKeyRecord`, fronting the database the way
    /// `BudgetEnforcer`'s own per-key counters front theirs (spec §3
    /// "Ownership & lifecycle": loaded on first use, held for the request).
    keys: DashMap<String, ApiKeyRecord>,
    default_strategy: RoutingStrategy,
    redact_prompts: bool,
}

/// Outcome of a successful fallback-chain attempt, used internally to carry
/// which index in the chain finally succeeded.
struct DispatchOutcome<T> {
    value: T,
    fallback_used: bool,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        budget: Arc<BudgetEnforcer>,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<SemanticCache>,
        logger: Arc<RequestLogger>,
        database: Option<Arc<Database>>,
        default_strategy: RoutingStrategy,
        redact_prompts: bool,
    ) -> Self {
        Self {
            registry,
            budget,
            rate_limiter,
            cache,
            logger,
            database,
            keys: DashMap::new(),
            default_strategy,
            redact_prompts,
        }
    }

    /// Register or refresh a key directly, bypassing the database — used by
    /// the admin bootstrap path and by tests that run without a `Database`.
    pub fn register_key(&self, record: ApiKeyRecord) {
        self.budget.upsert_key(
            record.id.clone(),
            KeyBudget {
                monthly_token_budget: record.monthly_token_budget,
                monthly_cost_budget_usd: record.monthly_cost_budget_usd,
            },
            record.tokens_used_this_month,
            record.cost_used_this_month_usd,
        );
        self.keys.insert(record.key.clone(), record);
    }

    async fn resolve_key(&self, auth_key: &str) -> Result<ApiKeyRecord> {
        if let Some(record) = self.keys.get(auth_key) {
            return Ok(record.clone());
        }

        let Some(db) = &self.database else {
            return Err(GatewayError::Authentication("unknown API key".into()));
        };
        let row = db.find_api_key(auth_key).await?;
        let Some(row) = row else {
            return Err(GatewayError::Authentication("unknown API key".into()));
        };
        let record: ApiKeyRecord = row.into();
        self.register_key(record.clone());
        Ok(record)
    }

    /// Steps 1-4 of spec §4.9, shared by both the buffered and streaming
    /// entry points: validate, resolve the key, enforce budget, enforce rate
    /// limits. Returns the resolved key and the caller's routing-strategy
    /// override, if any.
    async fn admit(
        &self,
        req: &ChatRequest,
        auth_key: &str,
    ) -> Result<(ApiKeyRecord, Option<RoutingStrategy>)> {
        let strategy_override = Validator::validate_chat_request(req)?;

        let key = self.resolve_key(auth_key).await?;
        if !key.enabled {
            return Err(GatewayError::KeyDisabled(key.id.clone()));
        }

        let accounting_key = req.budget_key.as_deref().unwrap_or(&key.id);

        let budget_check = self.budget.check_budget(accounting_key);
        if !budget_check.allowed {
            return Err(GatewayError::BudgetExceeded(
                budget_check.reason.unwrap_or_else(|| "budget exceeded".into()),
            ));
        }
        if let Some(threshold) = budget_check.alert_threshold {
            warn!(key_id = %key.id, threshold, "budget usage alert threshold crossed");
        }

        let estimated_tokens = estimate_tokens(&concatenated_content(req)) as u64
            + req.max_tokens.unwrap_or(256) as u64;
        let decision = self
            .rate_limiter
            .check(accounting_key, key.rate_limit_rpm, key.rate_limit_tpm, estimated_tokens);
        if !decision.allowed {
            return Err(GatewayError::RateLimited {
                message: "rate limit exceeded".into(),
                retry_after_secs: decision.retry_after_ms.div_ceil(1000),
            });
        }

        Ok((key, strategy_override))
    }

    /// The buffered chat-completion path: steps 5-10 of spec §4.9.
    pub async fn handle_chat(&self, req: ChatRequest, auth_key: &str) -> Result<ChatResponse> {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();

        let (key, strategy_override) = self.admit(&req, auth_key).await?;
        let accounting_key = req.budget_key.clone().unwrap_or_else(|| key.id.clone());
        let classification = Classifier::classify(&req.messages);

        if req.cache && !req.stream {
            if let Some(hit) = self.cache.lookup(&req).await {
                let mut response = hit.response;
                response.gateway.cache_hit = true;
                response.gateway.fallback_used = false;
                response.gateway.latency_ms = start.elapsed().as_millis() as u64;

                self.logger
                    .log(RequestLogEntry {
                        request_id,
                        api_key_id: key.id.clone(),
                        model: req.model.clone(),
                        provider: response.gateway.provider.clone(),
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        cost_usd: 0.0,
                        latency_ms: response.gateway.latency_ms,
                        cache_hit: true,
                        fallback_used: false,
                        status: "ok".into(),
                        prompt_preview: redact_prompt(&concatenated_content(&req), self.redact_prompts),
                    })
                    .await;

                return Ok(response);
            }
        }

        let strategy = strategy_override.unwrap_or(self.default_strategy);
        let plan = RoutingPlan {
            platform_fallback: key.platform_fallback,
        };
        let snapshot = self.registry.snapshot();
        let chain = Router::select(
            &snapshot,
            &classification,
            &req.model,
            strategy,
            req.prefer_provider.as_deref(),
            plan,
            None,
        );
        drop(snapshot);

        if chain.is_empty() {
            let err = GatewayError::AllProvidersFailed("no healthy provider matched this request".into());
            self.log_failure(&request_id, &key.id, &req, start, &err).await;
            return Err(err);
        }

        let mut last_err: Option<GatewayError> = None;
        let mut outcome: Option<DispatchOutcome<ChatResponse>> = None;

        for (idx, candidate) in chain.iter().enumerate() {
            let Some(provider) = self.registry.provider_by_id(&candidate.provider) else {
                continue;
            };
            let mut candidate_req = req.clone();
            candidate_req.model = candidate.model.clone();

            let estimate = provider.estimate_cost(&candidate_req);
            debug!(
                provider = candidate.provider.as_str(),
                model = candidate.model.as_str(),
                estimated_input_tokens = estimate.estimated_input_tokens,
                estimated_output_tokens = estimate.estimated_output_tokens,
                estimated_cost_usd = estimate.estimated_cost_usd,
                "pre-dispatch cost estimate"
            );

            match tokio::time::timeout(DISPATCH_TIMEOUT, provider.chat(&candidate_req)).await {
                Ok(Ok(response)) => {
                    outcome = Some(DispatchOutcome {
                        value: response,
                        fallback_used: idx > 0,
                    });
                    break;
                }
                Ok(Err(e)) if e.retryable => {
                    last_err = Some(e.into());
                    continue;
                }
                Ok(Err(e)) => {
                    let err: GatewayError = e.into();
                    self.log_failure(&request_id, &key.id, &req, start, &err).await;
                    return Err(err);
                }
                Err(_elapsed) => {
                    last_err = Some(GatewayError::Upstream {
                        provider: candidate.provider.clone(),
                        status: 504,
                        retryable: true,
                        message: "upstream request timed out".into(),
                    });
                    continue;
                }
            }
        }

        let Some(outcome) = outcome else {
            let err = last_err
                .unwrap_or_else(|| GatewayError::AllProvidersFailed("every candidate in the fallback chain failed".into()));
            self.log_failure(&request_id, &key.id, &req, start, &err).await;
            return Err(err);
        };

        let mut response = outcome.value;
        let latency_ms = start.elapsed().as_millis() as u64;
        response.gateway.cache_hit = false;
        response.gateway.fallback_used = outcome.fallback_used;
        response.gateway.latency_ms = latency_ms;
        response.gateway.routing_decision = classification.reasoning.clone();

        self.budget.record_usage(
            &accounting_key,
            response.usage.total_tokens as u64,
            response.gateway.cost_usd,
        );
        if let Some(db) = &self.database {
            if let Err(e) = db
                .record_api_key_usage(&accounting_key, response.usage.total_tokens as u64, response.gateway.cost_usd)
                .await
            {
                warn!(error = %e, key_id = %accounting_key, "failed to persist budget usage");
            }
        }

        if req.cache && !req.stream {
            self.cache.insert(&req, response.clone()).await;
        }

        self.logger
            .log(RequestLogEntry {
                request_id,
                api_key_id: key.id.clone(),
                model: req.model.clone(),
                provider: response.gateway.provider.clone(),
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens,
                cost_usd: response.gateway.cost_usd,
                latency_ms,
                cache_hit: false,
                fallback_used: outcome.fallback_used,
                status: "ok".into(),
                prompt_preview: redact_prompt(&concatenated_content(&req), self.redact_prompts),
            })
            .await;

        Ok(response)
    }

    /// The streaming path: same admission and routing as `handle_chat`, but
    /// dispatch yields a `StreamChunk` stream instead of a single response.
    /// Cache lookups are skipped entirely — streaming responses are never
    /// cache-eligible (spec §4.7) — and usage accounting happens once the
    /// stream is fully drained, from whichever chunk carried a `usage` field
    /// or, failing that, a running character count (spec §4.9/§9 Open
    /// Question (a)).
    pub async fn handle_chat_stream(
        self: Arc<Self>,
        mut req: ChatRequest,
        auth_key: &str,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        req.stream = true;
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();

        let (key, strategy_override) = self.admit(&req, auth_key).await?;
        let accounting_key = req.budget_key.clone().unwrap_or_else(|| key.id.clone());
        let classification = Classifier::classify(&req.messages);

        let strategy = strategy_override.unwrap_or(self.default_strategy);
        let plan = RoutingPlan {
            platform_fallback: key.platform_fallback,
        };
        let snapshot = self.registry.snapshot();
        let chain = Router::select(
            &snapshot,
            &classification,
            &req.model,
            strategy,
            req.prefer_provider.as_deref(),
            plan,
            None,
        );
        drop(snapshot);

        if chain.is_empty() {
            let err = GatewayError::AllProvidersFailed("no healthy provider matched this request".into());
            self.log_failure(&request_id, &key.id, &req, start, &err).await;
            return Err(err);
        }

        let mut last_err: Option<GatewayError> = None;
        let mut opened: Option<DispatchOutcome<BoxStream<'static, Result<StreamChunk, crate::core::providers::UpstreamError>>>> = None;

        let mut opened_provider = String::new();
        let mut opened_model = String::new();
        for (idx, candidate) in chain.iter().enumerate() {
            let Some(provider) = self.registry.provider_by_id(&candidate.provider) else {
                continue;
            };
            let mut candidate_req = req.clone();
            candidate_req.model = candidate.model.clone();

            let estimate = provider.estimate_cost(&candidate_req);
            debug!(
                provider = candidate.provider.as_str(),
                model = candidate.model.as_str(),
                estimated_input_tokens = estimate.estimated_input_tokens,
                estimated_output_tokens = estimate.estimated_output_tokens,
                estimated_cost_usd = estimate.estimated_cost_usd,
                "pre-dispatch cost estimate"
            );

            match provider.chat_stream(&candidate_req).await {
                Ok(inner) => {
                    opened_provider = candidate.provider.clone();
                    opened_model = candidate.model.clone();
                    opened = Some(DispatchOutcome {
                        value: inner,
                        fallback_used: idx > 0,
                    });
                    break;
                }
                Err(e) if e.retryable => {
                    last_err = Some(e.into());
                    continue;
                }
                Err(e) => {
                    let err: GatewayError = e.into();
                    self.log_failure(&request_id, &key.id, &req, start, &err).await;
                    return Err(err);
                }
            }
        }

        let Some(opened) = opened else {
            let err = last_err
                .unwrap_or_else(|| GatewayError::AllProvidersFailed("every candidate in the fallback chain failed".into()));
            self.log_failure(&request_id, &key.id, &req, start, &err).await;
            return Err(err);
        };

        let pipeline = self;
        let fallback_used = opened.fallback_used;
        let prompt_preview = redact_prompt(&concatenated_content(&req), pipeline.redact_prompts);
        let prompt_tokens_estimate = estimate_tokens(&concatenated_content(&req));

        let mut inner = opened.value;
        let mut running_chars: usize = 0;
        let mut final_usage: Option<crate::core::types::Usage> = None;

        let out = stream! {
            loop {
                match futures_util::StreamExt::next(&mut inner).await {
                    Some(Ok(chunk)) => {
                        for choice in &chunk.choices {
                            if let Some(content) = &choice.delta.content {
                                running_chars += content.chars().count();
                            }
                        }
                        if let Some(u) = &chunk.usage {
                            final_usage = Some(u.clone());
                        }
                        yield Ok(chunk);
                    }
                    Some(Err(e)) => {
                        yield Err(GatewayError::from(e));
                        return;
                    }
                    None => break,
                }
            }

            let latency_ms = start.elapsed().as_millis() as u64;
            let usage = final_usage.unwrap_or_else(|| {
                let completion_tokens = estimate_tokens(&"a".repeat(running_chars.max(1)));
                crate::core::types::Usage::new(prompt_tokens_estimate, completion_tokens)
            });

            let cost_usd = pipeline
                .estimate_streamed_cost(&opened_provider, &opened_model, usage.prompt_tokens, usage.completion_tokens)
                .unwrap_or(0.0);

            pipeline.budget.record_usage(&accounting_key, usage.total_tokens as u64, cost_usd);
            if let Some(db) = &pipeline.database {
                if let Err(e) = db
                    .record_api_key_usage(&accounting_key, usage.total_tokens as u64, cost_usd)
                    .await
                {
                    warn!(error = %e, key_id = %accounting_key, "failed to persist streamed budget usage");
                }
            }

            pipeline
                .logger
                .log(RequestLogEntry {
                    request_id: request_id.clone(),
                    api_key_id: key.id.clone(),
                    model: req.model.clone(),
                    provider: opened_provider,
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    cost_usd,
                    latency_ms,
                    cache_hit: false,
                    fallback_used,
                    status: "ok".into(),
                    prompt_preview,
                })
                .await;
        };

        Ok(Box::pin(out))
    }

    /// Best-effort cost estimate for a streamed response, using the pricing
    /// of whichever (provider, model) candidate actually served the request.
    fn estimate_streamed_cost(
        &self,
        provider_id: &str,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Option<f64> {
        let snapshot = self.registry.snapshot();
        let state = snapshot.iter().find(|s| s.provider.id() == provider_id)?;
        let model = state.models.iter().find(|m| m.id == model_id)?;
        Some(
            (prompt_tokens as f64 / 1000.0) * model.cost_per_1k_input
                + (completion_tokens as f64 / 1000.0) * model.cost_per_1k_output,
        )
    }

    /// `POST /v1/embeddings` (spec §6). Outside the five hard subsystems
    /// named in spec §1, so it skips the classifier/router/cache machinery
    /// entirely and resolves a provider directly from the model id, the same
    /// way `ProviderRegistry::find_provider_for_model` is used as a fallback
    /// inside the router itself.
    pub async fn handle_embeddings(
        &self,
        req: EmbeddingRequest,
        auth_key: &str,
    ) -> Result<EmbeddingResponse> {
        if req.input.as_vec().is_empty() {
            return Err(GatewayError::InvalidRequest("input must not be empty".into()));
        }

        let key = self.resolve_key(auth_key).await?;
        if !key.enabled {
            return Err(GatewayError::KeyDisabled(key.id.clone()));
        }

        let budget_check = self.budget.check_budget(&key.id);
        if !budget_check.allowed {
            return Err(GatewayError::BudgetExceeded(
                budget_check.reason.unwrap_or_else(|| "budget exceeded".into()),
            ));
        }

        let decision = self.rate_limiter.check(&key.id, key.rate_limit_rpm, key.rate_limit_tpm, 0);
        if !decision.allowed {
            return Err(GatewayError::RateLimited {
                message: "rate limit exceeded".into(),
                retry_after_secs: decision.retry_after_ms.div_ceil(1000),
            });
        }

        let provider = self
            .registry
            .find_provider_for_model(&req.model)
            .ok_or_else(|| GatewayError::AllProvidersFailed("no provider resolves this model".into()))?;

        let response = provider.embed(&req).await?;
        self.budget.record_usage(&key.id, response.usage.total_tokens as u64, 0.0);
        if let Some(db) = &self.database {
            if let Err(e) = db.record_api_key_usage(&key.id, response.usage.total_tokens as u64, 0.0).await {
                warn!(error = %e, key_id = %key.id, "failed to persist embeddings budget usage");
            }
        }

        Ok(response)
    }

    async fn log_failure(
        &self,
        request_id: &str,
        api_key_id: &str,
        req: &ChatRequest,
        start: Instant,
        err: &GatewayError,
    ) {
        self.logger
            .log(RequestLogEntry {
                request_id: request_id.to_string(),
                api_key_id: api_key_id.to_string(),
                model: req.model.clone(),
                provider: String::new(),
                prompt_tokens: 0,
                completion_tokens: 0,
                cost_usd: 0.0,
                latency_ms: start.elapsed().as_millis() as u64,
                cache_hit: false,
                fallback_used: false,
                status: err.error_type().to_string(),
                prompt_preview: redact_prompt(&concatenated_content(req), self.redact_prompts),
            })
            .await;
    }
}

fn concatenated_content(req: &ChatRequest) -> String {
    req.messages
        .iter()
        .filter(|m| matches!(m.role, Role::User))
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::GlobalBudgetConfig;
    use crate::core::providers::{OllamaAdapter, Provider};
    use crate::core::types::{ChatMessage, Role};

    fn test_pipeline() -> (Arc<Pipeline>, Arc<ProviderRegistry>) {
        let registry = Arc::new(ProviderRegistry::new());
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&registry),
            Arc::new(BudgetEnforcer::new(GlobalBudgetConfig::default())),
            Arc::new(RateLimiter::new()),
            Arc::new(SemanticCache::new(3600, 100, 0.95)),
            Arc::new(RequestLogger::new(None, 50, "quiet".into())),
            None,
            RoutingStrategy::Balanced,
            false,
        ));
        (pipeline, registry)
    }

    fn sample_request() -> ChatRequest {
        ChatRequest {
            model: "cheap".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "hello there".into(),
            }],
            temperature: None,
            top_p: None,
            max_tokens: Some(64),
            presence_penalty: None,
            frequency_penalty: None,
            stop: None,
            stream: false,
            n: 1,
            routing_strategy: None,
            prefer_provider: None,
            cache: true,
            budget_key: None,
        }
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let (pipeline, _registry) = test_pipeline();
        let err = pipeline.handle_chat(sample_request(), "sk-unknown").await.unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(_)));
    }

    #[tokio::test]
    async fn disabled_key_is_rejected() {
        let (pipeline, _registry) = test_pipeline();
        pipeline.register_key(ApiKeyRecord {
            id: "key-1".into(),
            key: "sk-test".into(),
            name: "test".into(),
            enabled: false,
            monthly_token_budget: None,
            monthly_cost_budget_usd: None,
            rate_limit_rpm: 60,
            rate_limit_tpm: 100_000,
            tokens_used_this_month: 0,
            cost_used_this_month_usd: 0.0,
            platform_fallback: true,
        });
        let err = pipeline.handle_chat(sample_request(), "sk-test").await.unwrap_err();
        assert!(matches!(err, GatewayError::KeyDisabled(_)));
    }

    #[tokio::test]
    async fn no_healthy_providers_yields_all_providers_failed() {
        let (pipeline, _registry) = test_pipeline();
        pipeline.register_key(ApiKeyRecord {
            id: "key-1".into(),
            key: "sk-test".into(),
            name: "test".into(),
            enabled: true,
            monthly_token_budget: None,
            monthly_cost_budget_usd: None,
            rate_limit_rpm: 60,
            rate_limit_tpm: 100_000,
            tokens_used_this_month: 0,
            cost_used_this_month_usd: 0.0,
            platform_fallback: true,
        });
        let err = pipeline.handle_chat(sample_request(), "sk-test").await.unwrap_err();
        assert!(matches!(err, GatewayError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn budget_exceeded_short_circuits_before_routing() {
        let (pipeline, registry) = test_pipeline();
        registry
            .register(Provider::Ollama(Arc::new(OllamaAdapter::new(
                "http://localhost:11434/v1",
                vec!["llama3".into()],
            ))))
            .await;
        registry.run_health_checks().await;

        pipeline.register_key(ApiKeyRecord {
            id: "key-1".into(),
            key: "sk-test".into(),
            name: "test".into(),
            enabled: true,
            monthly_token_budget: Some(10),
            monthly_cost_budget_usd: None,
            rate_limit_rpm: 60,
            rate_limit_tpm: 100_000,
            tokens_used_this_month: 10,
            cost_used_this_month_usd: 0.0,
            platform_fallback: true,
        });
        let err = pipeline.handle_chat(sample_request(), "sk-test").await.unwrap_err();
        assert!(matches!(err, GatewayError::BudgetExceeded(_)));
    }

    #[tokio::test]
    async fn rate_limit_exceeded_returns_retry_after() {
        let (pipeline, _registry) = test_pipeline();
        pipeline.register_key(ApiKeyRecord {
            id: "key-1".into(),
            key: "sk-test".into(),
            name: "test".into(),
            enabled: true,
            monthly_token_budget: None,
            monthly_cost_budget_usd: None,
            rate_limit_rpm: 1,
            rate_limit_tpm: 100_000,
            tokens_used_this_month: 0,
            cost_used_this_month_usd: 0.0,
            platform_fallback: true,
        });
        // First request has no healthy provider so it fails downstream, but
        // admission (including the rate-limit counter) still runs.
        let _ = pipeline.handle_chat(sample_request(), "sk-test").await;
        let err = pipeline.handle_chat(sample_request(), "sk-test").await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { .. }));
    }
}
