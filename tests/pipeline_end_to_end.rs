//! End-to-end pipeline scenarios (spec §8 "End-to-end scenarios"): a real
//! `Pipeline` wired to in-process `wiremock` servers standing in for
//! upstream vendors, exercising the cache, fallback chain, and streaming
//! paths exactly as a client hitting `/v1/chat/completions` would.

use gateway_core::core::budget::{BudgetEnforcer, GlobalBudgetConfig};
use gateway_core::core::cache::SemanticCache;
use gateway_core::core::logger::RequestLogger;
use gateway_core::core::pipeline::Pipeline;
use gateway_core::core::providers::{OllamaAdapter, OpenAiAdapter, Provider, ProviderRegistry};
use gateway_core::core::rate_limiter::RateLimiter;
use gateway_core::core::types::{ApiKeyRecord, ChatMessage, ChatRequest, Role, RoutingStrategy};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_key(id: &str, raw_key: &str) -> ApiKeyRecord {
    ApiKeyRecord {
        id: id.into(),
        key: raw_key.into(),
        name: "integration-test".into(),
        enabled: true,
        monthly_token_budget: None,
        monthly_cost_budget_usd: None,
        rate_limit_rpm: 1_000,
        rate_limit_tpm: 1_000_000,
        tokens_used_this_month: 0,
        cost_used_this_month_usd: 0.0,
        platform_fallback: true,
    }
}

fn chat_request(model: &str) -> ChatRequest {
    ChatRequest {
        model: model.into(),
        messages: vec![ChatMessage {
            role: Role::User,
            content: "Hello".into(),
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

fn new_pipeline(registry: Arc<ProviderRegistry>) -> (Arc<Pipeline>, Arc<SemanticCache>) {
    let cache = Arc::new(SemanticCache::new(3600, 100, 0.95));
    let pipeline = Arc::new(Pipeline::new(
        registry,
        Arc::new(BudgetEnforcer::new(GlobalBudgetConfig::default())),
        Arc::new(RateLimiter::new()),
        Arc::clone(&cache),
        Arc::new(RequestLogger::new(None, 50, "quiet".into())),
        None,
        RoutingStrategy::Cost,
        false,
    ));
    (pipeline, cache)
}

/// Scenario 1 + 2 (spec §8): buffered chat, cache miss -> upstream success,
/// then the identical request repeated hits the cache and never reaches the
/// upstream mock a second time.
#[tokio::test]
async fn buffered_chat_cache_miss_then_hit() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {"content": "Hello there!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let registry = Arc::new(ProviderRegistry::new());
    registry
        .register(Provider::Ollama(Arc::new(OllamaAdapter::new(
            upstream.uri(),
            vec!["llama3".into()],
        ))))
        .await;

    let (pipeline, _cache) = new_pipeline(Arc::clone(&registry));
    pipeline.register_key(test_key("key-1", "sk-test"));

    let first = pipeline
        .handle_chat(chat_request("cheap"), "sk-test")
        .await
        .expect("first request should succeed");
    assert!(!first.gateway.cache_hit);
    assert!(!first.gateway.fallback_used);
    assert_eq!(first.usage.prompt_tokens, 5);
    assert_eq!(first.usage.completion_tokens, 7);
    assert_eq!(first.usage.total_tokens, 12);

    let second = pipeline
        .handle_chat(chat_request("cheap"), "sk-test")
        .await
        .expect("second request should hit the cache");
    assert!(second.gateway.cache_hit);
    assert!(!second.gateway.fallback_used);
    assert_eq!(second.usage.total_tokens, 12);

    // `upstream.expect(1)` above is verified when `upstream` drops.
}

/// Scenario 3 (spec §8): the first candidate in the fallback chain fails
/// with a retryable upstream error, the router advances to the next
/// candidate, and the response reflects `fallback_used = true`.
#[tokio::test]
async fn fallback_chain_advances_on_retryable_failure() {
    let primary = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "overloaded"})))
        .mount(&primary)
        .await;

    let secondary = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {"content": "served by the fallback"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 9}
        })))
        .mount(&secondary)
        .await;

    let registry = Arc::new(ProviderRegistry::new());
    registry
        .register(Provider::Ollama(Arc::new(OllamaAdapter::new(
            primary.uri(),
            vec!["llama3".into()],
        ))))
        .await;
    registry
        .register(Provider::OpenAi(Arc::new(OpenAiAdapter::with_base_url(
            secondary.uri(),
            "sk-test".into(),
        ))))
        .await;

    let (pipeline, _cache) = new_pipeline(Arc::clone(&registry));
    pipeline.register_key(test_key("key-1", "sk-test"));

    let response = pipeline
        .handle_chat(chat_request("cheap"), "sk-test")
        .await
        .expect("the fallback candidate should succeed");

    assert!(response.gateway.fallback_used);
    assert_eq!(response.gateway.provider, "openai");
    assert_eq!(response.usage.total_tokens, 14);
}

/// Scenario 5 (spec §8): a streaming request forwards chunks to the caller
/// in the order they arrive from the upstream SSE stream, and the
/// streaming response never reaches the semantic cache.
#[tokio::test]
async fn streaming_chat_forwards_chunks_in_order_and_is_not_cached() {
    let upstream = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_body))
        .mount(&upstream)
        .await;

    let registry = Arc::new(ProviderRegistry::new());
    registry
        .register(Provider::Ollama(Arc::new(OllamaAdapter::new(
            upstream.uri(),
            vec!["llama3".into()],
        ))))
        .await;

    let (pipeline, cache) = new_pipeline(Arc::clone(&registry));
    pipeline.register_key(test_key("key-1", "sk-test"));
    let mut req = chat_request("cheap");
    req.stream = true;

    let mut stream = Arc::clone(&pipeline)
        .handle_chat_stream(req, "sk-test")
        .await
        .expect("stream should open against the healthy candidate");

    let mut assembled = String::new();
    while let Some(chunk) = futures_util::StreamExt::next(&mut stream).await {
        let chunk = chunk.expect("no terminal error expected mid-stream");
        for choice in &chunk.choices {
            if let Some(content) = &choice.delta.content {
                assembled.push_str(content);
            }
        }
    }

    assert_eq!(assembled, "Hello");

    // Give the trailing accounting/logging tail of the stream a chance to
    // run before asserting the cache was never written to.
    tokio::task::yield_now().await;
    assert_eq!(cache.entry_count(), 0);
}
