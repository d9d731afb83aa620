//! Provider registry (C3, spec §4.2): owns the adapters, runs periodic
//! health probes, and resolves `modelId -> Provider`.
//!
//! Readers take a consistent snapshot via `ArcSwap` — the provider set is
//! effectively append-only after startup, so the hot path (every routing
//! decision) never blocks behind a writer. Mutation (`register`/
//! `deregister`) goes through a `tokio::sync::Mutex` since it's rare and
//! only ever driven from the control plane.

use super::{HealthProbe, Provider};
use crate::core::types::{ModelInfo, VIRTUAL_MODELS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

/// A registered provider plus its most recently observed health and model
/// catalog.
#[derive(Clone)]
pub struct ProviderState {
    pub provider: Provider,
    pub healthy: bool,
    pub latency_ms: u64,
    pub models: Vec<ModelInfo>,
}

pub struct ProviderRegistry {
    snapshot: arc_swap::ArcSwap<Vec<ProviderState>>,
    write_lock: Mutex<()>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: arc_swap::ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<ProviderState>> {
        self.snapshot.load_full()
    }

    /// Register an adapter. Overwrites any existing entry with the same id.
    pub async fn register(&self, provider: Provider) {
        let _guard = self.write_lock.lock().await;
        let models = provider.list_models();
        let mut next: Vec<ProviderState> = (**self.snapshot.load())
            .iter()
            .filter(|s| s.provider.id() != provider.id())
            .cloned()
            .collect();
        next.push(ProviderState {
            provider,
            healthy: true,
            latency_ms: 0,
            models,
        });
        self.snapshot.store(Arc::new(next));
    }

    pub async fn deregister(&self, id: &str) {
        let _guard = self.write_lock.lock().await;
        let next: Vec<ProviderState> = (**self.snapshot.load())
            .iter()
            .filter(|s| s.provider.id() != id)
            .cloned()
            .collect();
        self.snapshot.store(Arc::new(next));
    }

    /// Resolution order from spec §4.2.
    pub fn find_provider_for_model(&self, model_id: &str) -> Option<Provider> {
        let snapshot = self.snapshot.load();

        if VIRTUAL_MODELS.contains(&model_id) {
            return snapshot
                .iter()
                .find(|s| s.healthy)
                .map(|s| s.provider.clone());
        }

        if let Some(state) = snapshot
            .iter()
            .find(|s| s.healthy && s.models.iter().any(|m| m.id == model_id))
        {
            return Some(state.provider.clone());
        }

        let prefix_order: &[&str] = if model_id.starts_with("gpt-") || model_id.starts_with("o1") {
            &["openai"]
        } else if model_id.starts_with("claude-") {
            &["anthropic"]
        } else if model_id.contains("llama") || model_id.contains("mixtral") || model_id.contains("gemma")
        {
            &["groq", "together", "ollama"]
        } else {
            &[]
        };

        for id in prefix_order {
            if let Some(state) = snapshot.iter().find(|s| s.provider.id() == *id) {
                return Some(state.provider.clone());
            }
        }

        snapshot
            .iter()
            .find(|s| s.provider.id() == "ollama")
            .map(|s| s.provider.clone())
    }

    /// Resolve a provider by its registry id, used by the router/pipeline to
    /// turn a fallback-chain `Candidate` back into a dispatchable adapter.
    pub fn provider_by_id(&self, id: &str) -> Option<Provider> {
        self.snapshot
            .load()
            .iter()
            .find(|s| s.provider.id() == id)
            .map(|s| s.provider.clone())
    }

    /// Fire every provider's `healthCheck` in parallel, failure-isolated:
    /// one adapter erroring never prevents the others' results from being
    /// collected (spec §4.2).
    pub async fn run_health_checks(&self) {
        let current = (**self.snapshot.load()).clone();
        let probes = futures::future::join_all(current.iter().map(|state| {
            let provider = state.provider.clone();
            async move {
                let probe = tokio::time::timeout(Duration::from_secs(5), provider.health_check())
                    .await
                    .unwrap_or(HealthProbe {
                        healthy: false,
                        latency_ms: 5_000,
                        message: Some("health check timed out".into()),
                    });
                (provider, probe)
            }
        }))
        .await;

        let _guard = self.write_lock.lock().await;
        let mut next = Vec::with_capacity(current.len());
        for (provider, probe) in probes {
            // Model refresh preserves the previous catalog on failure.
            let models = if probe.healthy {
                let fresh = provider.list_models();
                if fresh.is_empty() {
                    current
                        .iter()
                        .find(|s| s.provider.id() == provider.id())
                        .map(|s| s.models.clone())
                        .unwrap_or_default()
                } else {
                    fresh
                }
            } else {
                current
                    .iter()
                    .find(|s| s.provider.id() == provider.id())
                    .map(|s| s.models.clone())
                    .unwrap_or_default()
            };

            if !probe.healthy {
                warn!(provider = provider.id(), message = ?probe.message, "provider unhealthy");
            }

            next.push(ProviderState {
                provider,
                healthy: probe.healthy,
                latency_ms: probe.latency_ms,
                models,
            });
        }
        self.snapshot.store(Arc::new(next));
    }

    /// Spawn the background health-check loop: immediate probe, then every
    /// `interval`. Cancellation is cooperative — `stop()` wakes a pending
    /// sleep within a 5 s grace window rather than aborting mid-probe.
    pub fn start_health_check_loop(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let notify = Arc::clone(&self.shutdown_notify);

        tokio::spawn(async move {
            registry.run_health_checks().await;
            info!("initial provider health probe complete");

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }
                        registry.run_health_checks().await;
                    }
                    _ = notify.notified() => {
                        break;
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.shutdown_notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::{OllamaAdapter, OpenAiAdapter};

    #[tokio::test]
    async fn unknown_model_falls_back_to_ollama() {
        let registry = ProviderRegistry::new();
        registry
            .register(Provider::Ollama(Arc::new(OllamaAdapter::new(
                "http://localhost:11434/v1",
                vec!["llama3".into()],
            ))))
            .await;
        registry
            .register(Provider::OpenAi(Arc::new(OpenAiAdapter::new("sk-test".into()))))
            .await;

        let resolved = registry.find_provider_for_model("some-unknown-model");
        assert_eq!(resolved.unwrap().id(), "ollama");
    }

    #[tokio::test]
    async fn prefix_inference_resolves_openai_and_anthropic() {
        let registry = ProviderRegistry::new();
        registry
            .register(Provider::OpenAi(Arc::new(OpenAiAdapter::new("sk-test".into()))))
            .await;
        registry
            .register(Provider::Ollama(Arc::new(OllamaAdapter::new(
                "http://localhost:11434/v1",
                vec![],
            ))))
            .await;

        assert_eq!(
            registry.find_provider_for_model("gpt-4o").unwrap().id(),
            "openai"
        );
        // No anthropic adapter registered: falls through to ollama.
        assert_eq!(
            registry.find_provider_for_model("claude-3-5-sonnet-20241022").unwrap().id(),
            "ollama"
        );
    }

    #[tokio::test]
    async fn deregister_removes_provider() {
        let registry = ProviderRegistry::new();
        registry
            .register(Provider::OpenAi(Arc::new(OpenAiAdapter::new("sk-test".into()))))
            .await;
        registry.deregister("openai").await;
        assert!(registry.snapshot().is_empty());
    }
}
