//! Throughput benchmarks for the two hottest paths in the gateway: router
//! candidate selection (C4, spec §4.4) and the semantic cache's exact and
//! near-hit lookups (C7, spec §4.7). Modeled on `litellm-rs`'s own
//! `benches/performance_benchmarks.rs`, which benchmarks its router and
//! cache manager the same way: criterion groups, varying input size, async
//! work driven through a single `tokio::runtime::Runtime`.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gateway_core::core::cache::SemanticCache;
use gateway_core::core::providers::registry::ProviderState;
use gateway_core::core::providers::{OpenAiAdapter, Provider};
use gateway_core::core::router::{Router, RoutingPlan};
use gateway_core::core::types::{
    Capability, ChatMessage, ChatRequest, ChatResponse, Choice, Classification, Complexity,
    FinishReason, GatewayMetadata, ModelInfo, Role, RoutingStrategy, Usage,
};
use std::collections::HashSet;
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn model_info(id: &str, provider: &str) -> ModelInfo {
    let mut capabilities = HashSet::new();
    capabilities.insert(Capability::General);
    capabilities.insert(Capability::InstructionFollowing);
    ModelInfo {
        id: id.to_string(),
        provider: provider.to_string(),
        context_window: 8192,
        cost_per_1k_input: 0.001,
        cost_per_1k_output: 0.002,
        capabilities,
        quality_score: 0.8,
        avg_latency_ms: 400,
    }
}

fn provider_states(count: usize) -> Vec<ProviderState> {
    (0..count)
        .map(|i| ProviderState {
            provider: Provider::OpenAi(Arc::new(OpenAiAdapter::new(format!("sk-bench-{i}")))),
            healthy: true,
            latency_ms: 200,
            models: vec![model_info(&format!("gpt-4-{i}"), "openai")],
        })
        .collect()
}

fn sample_classification() -> Classification {
    let mut required = HashSet::new();
    required.insert(Capability::General);
    Classification {
        complexity: Complexity::Simple,
        required_capabilities: required,
        estimated_tokens: 64,
        reasoning: "benchmark".into(),
    }
}

fn bench_router_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_select");

    for provider_count in [1usize, 5, 20, 50] {
        let providers = provider_states(provider_count);
        let classification = sample_classification();

        group.bench_with_input(
            BenchmarkId::new("balanced", provider_count),
            &provider_count,
            |b, _| {
                b.iter(|| {
                    black_box(Router::select(
                        &providers,
                        &classification,
                        "auto",
                        RoutingStrategy::Balanced,
                        None,
                        RoutingPlan { platform_fallback: true },
                        None,
                    ))
                });
            },
        );
    }

    group.finish();
}

fn sample_request(model: &str) -> ChatRequest {
    serde_json::from_value(serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "what is the capital of France?"}],
    }))
    .expect("valid chat request")
}

fn sample_response() -> ChatResponse {
    ChatResponse {
        id: ChatResponse::new_id(),
        object: "chat.completion".into(),
        created: 0,
        model: "gpt-4".into(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage { role: Role::Assistant, content: "Paris.".into() },
            finish_reason: Some(FinishReason::Stop),
        }],
        usage: Usage::new(12, 4),
        gateway: GatewayMetadata {
            provider: "openai".into(),
            routing_decision: "balanced".into(),
            latency_ms: 120,
            cost_usd: 0.0001,
            cache_hit: false,
            fallback_used: false,
        },
    }
}

fn bench_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("semantic_cache");

    group.bench_function("insert_then_exact_lookup", |b| {
        let cache = Arc::new(SemanticCache::new(3600, 10_000, 0.95));
        let request = sample_request("gpt-4");

        b.iter(|| {
            rt.block_on(async {
                cache.insert(&request, sample_response()).await;
                black_box(cache.lookup(&request).await)
            })
        });
    });

    group.bench_function("miss_lookup", |b| {
        let cache = Arc::new(SemanticCache::new(3600, 10_000, 0.95));
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            let request = sample_request(&format!("gpt-4-{counter}"));
            rt.block_on(async { black_box(cache.lookup(&request).await) })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_router_select, bench_cache);
criterion_main!(benches);
