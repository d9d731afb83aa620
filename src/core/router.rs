//! Router (C5, spec §4.4): turns a validated request + classification +
//! registry snapshot into an ordered fallback chain of `(provider, model)`
//! candidates.
//!
//! Candidate lists use `SmallVec<[Candidate; 4]>` — K is small and bounded
//! (default 3) — to avoid heap churn on the hot path, matching `litellm-rs`'s
//! performance-conscious dependency stack (`smallvec`, `ahash`).

use crate::core::providers::registry::ProviderState;
use crate::core::types::{Candidate, Classification, ModelInfo, RoutingStrategy, VIRTUAL_MODELS};
use smallvec::SmallVec;

const DEFAULT_TOP_K: usize = 3;

/// Per-key plan capabilities relevant to routing (spec §4.4 step 4).
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingPlan {
    pub platform_fallback: bool,
}

pub struct Router;

struct ScoredModel<'a> {
    provider_id: &'a str,
    model: &'a ModelInfo,
    estimated_cost_usd: f64,
}

fn estimate_cost_for(model: &ModelInfo, classification: &Classification) -> f64 {
    let input_tokens = classification.estimated_tokens as f64;
    let output_tokens = (classification.estimated_tokens as f64 * 0.5).max(64.0);
    (input_tokens / 1000.0) * model.cost_per_1k_input
        + (output_tokens / 1000.0) * model.cost_per_1k_output
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        0.0
    } else {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }
}

impl Router {
    /// Produce the ordered fallback chain (spec §4.4 "Selection procedure").
    pub fn select(
        providers: &[ProviderState],
        classification: &Classification,
        requested_model: &str,
        strategy: RoutingStrategy,
        prefer_provider: Option<&str>,
        plan: RoutingPlan,
        top_k: Option<usize>,
    ) -> SmallVec<[Candidate; 4]> {
        let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
        let mut chain: SmallVec<[Candidate; 4]> = SmallVec::new();

        // Step 1: pinned preferred provider, if healthy. The spec (§9 Open
        // Question b) resolves ambiguity by falling through silently when
        // the preferred provider is unhealthy or has no matching model.
        if let Some(pref) = prefer_provider {
            if let Some(state) = providers.iter().find(|s| s.healthy && s.provider.id() == pref) {
                if let Some(model) = best_matching_model(state, classification, requested_model) {
                    chain.push(Candidate {
                        provider: state.provider.id().into(),
                        model: model.id.clone(),
                    });
                }
            }
        }

        let is_virtual = VIRTUAL_MODELS.contains(&requested_model);
        let mut pool: Vec<ScoredModel> = Vec::new();

        if is_virtual {
            for state in providers.iter().filter(|s| s.healthy) {
                for model in &state.models {
                    if model.capabilities.is_superset(&classification.required_capabilities) {
                        pool.push(ScoredModel {
                            provider_id: state.provider.id(),
                            model,
                            estimated_cost_usd: estimate_cost_for(model, classification),
                        });
                    }
                }
            }
        } else {
            // (a) exact match on its native provider.
            for state in providers.iter().filter(|s| s.healthy) {
                if let Some(model) = state.models.iter().find(|m| m.id == requested_model) {
                    pool.push(ScoredModel {
                        provider_id: state.provider.id(),
                        model,
                        estimated_cost_usd: estimate_cost_for(model, classification),
                    });
                }
            }
            // (b) capability-equivalent models on other healthy providers.
            // The baseline is the classifier's required-capability set
            // (spec §4.4 step 2b "⊇ required capabilities"), not the exact
            // match's own capabilities — those are frequently a strict
            // superset and would wrongly exclude an otherwise-equivalent
            // fallback provider missing one of the incumbent's extra
            // capabilities the request never needed.
            let required_capabilities = &classification.required_capabilities;
            for state in providers.iter().filter(|s| s.healthy) {
                for model in &state.models {
                    if model.id == requested_model {
                        continue;
                    }
                    if model.capabilities.is_superset(required_capabilities) {
                        pool.push(ScoredModel {
                            provider_id: state.provider.id(),
                            model,
                            estimated_cost_usd: estimate_cost_for(model, classification),
                        });
                    }
                }
            }
        }

        // Step 5: filter providers exceeding their own latency threshold —
        // a simple fixed ceiling since no per-provider SLA config exists yet.
        const LATENCY_CEILING_MS: u32 = 30_000;
        pool.retain(|m| m.model.avg_latency_ms <= LATENCY_CEILING_MS);

        sort_pool(&mut pool, strategy);

        for scored in pool.into_iter().take(top_k) {
            let candidate = Candidate {
                provider: scored.provider_id.into(),
                model: scored.model.id.clone(),
            };
            if chain.iter().any(|c| c.provider == candidate.provider && c.model == candidate.model) {
                continue;
            }
            chain.push(candidate);
        }

        // Step 4: key's plan disables platform fallback -> only the first
        // candidate survives.
        if !plan.platform_fallback && chain.len() > 1 {
            chain.truncate(1);
        }

        chain
    }
}

fn best_matching_model<'a>(
    state: &'a ProviderState,
    classification: &Classification,
    requested_model: &str,
) -> Option<&'a ModelInfo> {
    if !VIRTUAL_MODELS.contains(&requested_model) {
        if let Some(m) = state.models.iter().find(|m| m.id == requested_model) {
            return Some(m);
        }
    }
    state
        .models
        .iter()
        .filter(|m| m.capabilities.is_superset(&classification.required_capabilities))
        .max_by(|a, b| a.quality_score.partial_cmp(&b.quality_score).unwrap())
        .or_else(|| state.models.first())
}

fn sort_pool(pool: &mut [ScoredModel], strategy: RoutingStrategy) {
    match strategy {
        RoutingStrategy::Cost => pool.sort_by(|a, b| {
            a.estimated_cost_usd
                .partial_cmp(&b.estimated_cost_usd)
                .unwrap()
                .then_with(|| b.model.quality_score.partial_cmp(&a.model.quality_score).unwrap())
        }),
        RoutingStrategy::Latency => pool.sort_by(|a, b| {
            a.model
                .avg_latency_ms
                .cmp(&b.model.avg_latency_ms)
                .then_with(|| a.estimated_cost_usd.partial_cmp(&b.estimated_cost_usd).unwrap())
        }),
        RoutingStrategy::Quality => pool.sort_by(|a, b| {
            b.model
                .quality_score
                .partial_cmp(&a.model.quality_score)
                .unwrap()
                .then_with(|| a.estimated_cost_usd.partial_cmp(&b.estimated_cost_usd).unwrap())
        }),
        RoutingStrategy::Balanced => {
            if pool.is_empty() {
                return;
            }
            let (min_cost, max_cost) = min_max(pool.iter().map(|m| m.estimated_cost_usd));
            let (min_lat, max_lat) = min_max(pool.iter().map(|m| m.model.avg_latency_ms as f64));
            pool.sort_by(|a, b| {
                balanced_score(a, min_cost, max_cost, min_lat, max_lat)
                    .partial_cmp(&balanced_score(b, min_cost, max_cost, min_lat, max_lat))
                    .unwrap()
                    .then_with(|| a.provider_id.cmp(b.provider_id))
            });
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}

fn balanced_score(m: &ScoredModel, min_cost: f64, max_cost: f64, min_lat: f64, max_lat: f64) -> f64 {
    let norm_cost = normalize(m.estimated_cost_usd, min_cost, max_cost);
    let norm_latency = normalize(m.model.avg_latency_ms as f64, min_lat, max_lat);
    0.4 * norm_cost + 0.3 * (1.0 - m.model.quality_score as f64) + 0.3 * norm_latency
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::{OllamaAdapter, OpenAiAdapter, Provider};
    use crate::core::types::{Capability, Complexity};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn classification() -> Classification {
        Classification {
            complexity: Complexity::Simple,
            required_capabilities: HashSet::from([Capability::General, Capability::InstructionFollowing]),
            estimated_tokens: 50,
            reasoning: "test".into(),
        }
    }

    fn ollama_state() -> ProviderState {
        let adapter = OllamaAdapter::new("http://localhost:11434/v1", vec!["llama3".into()]);
        let models = adapter.list_models();
        ProviderState {
            provider: Provider::Ollama(Arc::new(adapter)),
            healthy: true,
            latency_ms: 50,
            models,
        }
    }

    fn openai_state() -> ProviderState {
        let adapter = OpenAiAdapter::new("sk-test".into());
        let models = adapter.list_models();
        ProviderState {
            provider: Provider::OpenAi(Arc::new(adapter)),
            healthy: true,
            latency_ms: 500,
            models,
        }
    }

    #[test]
    fn cheap_virtual_model_with_cost_strategy_prefers_ollama() {
        let providers = vec![ollama_state(), openai_state()];
        let chain = Router::select(
            &providers,
            &classification(),
            "cheap",
            RoutingStrategy::Cost,
            None,
            RoutingPlan { platform_fallback: true },
            None,
        );
        assert_eq!(chain.first().unwrap().provider, "ollama");
    }

    #[test]
    fn prefer_provider_is_pinned_first() {
        let providers = vec![ollama_state(), openai_state()];
        let chain = Router::select(
            &providers,
            &classification(),
            "gpt-4o",
            RoutingStrategy::Balanced,
            Some("ollama"),
            RoutingPlan { platform_fallback: true },
            None,
        );
        assert_eq!(chain.first().unwrap().provider, "ollama");
    }

    #[test]
    fn unhealthy_prefer_provider_falls_through_silently() {
        let mut providers = vec![ollama_state(), openai_state()];
        providers[0].healthy = false;
        let chain = Router::select(
            &providers,
            &classification(),
            "gpt-4o",
            RoutingStrategy::Balanced,
            Some("ollama"),
            RoutingPlan { platform_fallback: true },
            None,
        );
        assert!(!chain.is_empty());
        assert_eq!(chain.first().unwrap().provider, "openai");
    }

    #[test]
    fn platform_fallback_disabled_truncates_chain() {
        let providers = vec![ollama_state(), openai_state()];
        let chain = Router::select(
            &providers,
            &classification(),
            "cheap",
            RoutingStrategy::Cost,
            None,
            RoutingPlan { platform_fallback: false },
            None,
        );
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn concrete_model_resolves_to_native_provider_first() {
        let providers = vec![ollama_state(), openai_state()];
        let chain = Router::select(
            &providers,
            &classification(),
            "gpt-4o",
            RoutingStrategy::Balanced,
            None,
            RoutingPlan { platform_fallback: true },
            None,
        );
        assert_eq!(chain.first().unwrap().model, "gpt-4o");
        assert_eq!(chain.first().unwrap().provider, "openai");
    }
}
