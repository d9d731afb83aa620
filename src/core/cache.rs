//! Semantic cache (C8, spec §4.7).
//!
//! Two tiers: an exact-fingerprint tier backed by `moka::future::Cache`
//! (TTL + bounded size for free, matching `litellm-rs`'s own dependency on
//! `moka`), and an embedding-similarity tier — a `DashMap<model, Vec<entry>>`
//! linear scan, acceptable at the bounded scale `CACHE_MAX_ENTRIES` targets.
//! Streaming responses are never cached (spec §4.7).

use crate::core::providers::pseudo_embedding;
use crate::core::types::{ChatRequest, ChatResponse, StopSequence};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const EMBED_DIMS: usize = 32;

/// Cosine similarity shared by the cache and the test suite (spec §4.7).
/// Returns 0 for mismatched lengths or either zero-length/zero-magnitude
/// vector, rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A stored near-hit candidate, keyed by model for the embedding scan.
#[derive(Clone)]
struct NearHitEntry {
    fingerprint: String,
    embedding: Vec<f32>,
    response: ChatResponse,
    inserted_at: u64,
    hit_count: Arc<AtomicU64>,
}

use std::sync::Arc;

fn stop_repr(stop: &Option<StopSequence>) -> String {
    match stop {
        None => String::new(),
        Some(StopSequence::One(s)) => s.clone(),
        Some(StopSequence::Many(v)) => v.join("\u{1}"),
    }
}

/// Deterministic fingerprint over `(model, normalized messages, temperature,
/// top_p, max_tokens, stop)` (spec §4.7), hex-encoded SHA-256.
pub fn fingerprint(req: &ChatRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.model.as_bytes());
    for m in &req.messages {
        hasher.update(format!("{:?}", m.role).as_bytes());
        hasher.update(m.content.trim().as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(req.temperature.unwrap_or_default().to_le_bytes());
    hasher.update(req.top_p.unwrap_or_default().to_le_bytes());
    hasher.update(req.max_tokens.unwrap_or_default().to_le_bytes());
    hasher.update(stop_repr(&req.stop).as_bytes());
    hex::encode(hasher.finalize())
}

fn concatenated_user_content(req: &ChatRequest) -> String {
    req.messages
        .iter()
        .filter(|m| matches!(m.role, crate::core::types::Role::User))
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Exact + embedding-similarity cache (C8).
pub struct SemanticCache {
    exact: moka::future::Cache<String, ChatResponse>,
    near: DashMap<String, Vec<NearHitEntry>>,
    /// Total entry count across every model bucket in `near`, kept in lock
    /// step with each bucket mutation so the near tier is bounded by
    /// `CACHE_MAX_ENTRIES` as a single shared budget (spec §4.7), not a
    /// per-model one.
    near_count: AtomicU64,
    max_near_entries: usize,
    similarity_threshold: f32,
}

/// Outcome of [`SemanticCache::lookup`].
pub struct CacheHit {
    pub response: ChatResponse,
    pub near_hit: bool,
}

impl SemanticCache {
    pub fn new(ttl_seconds: u64, max_entries: usize, similarity_threshold: f32) -> Self {
        Self {
            exact: moka::future::Cache::builder()
                .max_capacity(max_entries as u64)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build(),
            near: DashMap::new(),
            near_count: AtomicU64::new(0),
            max_near_entries: max_entries,
            similarity_threshold,
        }
    }

    /// Exact-key lookup, then (if eligible) an embedding-similarity scan
    /// across entries for the same model (spec §4.7).
    pub async fn lookup(&self, req: &ChatRequest) -> Option<CacheHit> {
        let key = fingerprint(req);
        if let Some(response) = self.exact.get(&key).await {
            return Some(CacheHit {
                response,
                near_hit: false,
            });
        }

        let query_embedding = pseudo_embedding(&concatenated_user_content(req), EMBED_DIMS);
        let bucket = self.near.get(&req.model)?;
        let mut best: Option<(&NearHitEntry, f32)> = None;
        for entry in bucket.iter() {
            let sim = cosine_similarity(&query_embedding, &entry.embedding);
            if best.map(|(_, s)| sim > s).unwrap_or(true) {
                best = Some((entry, sim));
            }
        }
        let (entry, score) = best?;
        if score >= self.similarity_threshold {
            entry.hit_count.fetch_add(1, Ordering::Relaxed);
            Some(CacheHit {
                response: entry.response.clone(),
                near_hit: true,
            })
        } else {
            None
        }
    }

    /// Insert a buffered, cache-eligible response into both tiers. Streaming
    /// responses must never reach this method (spec §4.7).
    pub async fn insert(&self, req: &ChatRequest, response: ChatResponse) {
        let key = fingerprint(req);
        self.exact.insert(key.clone(), response.clone()).await;

        let embedding = pseudo_embedding(&concatenated_user_content(req), EMBED_DIMS);
        if self.near_count.load(Ordering::Relaxed) as usize >= self.max_near_entries {
            self.evict_global_lru();
        }
        let mut bucket = self.near.entry(req.model.clone()).or_default();
        bucket.push(NearHitEntry {
            fingerprint: key,
            embedding,
            response,
            inserted_at: now_secs(),
            hit_count: Arc::new(AtomicU64::new(0)),
        });
        self.near_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Evict the entry with the lowest `inserted_at + hit_count` score across
    /// every model bucket (spec §4.7's LRU/combined-score eviction, applied
    /// against the shared `CACHE_MAX_ENTRIES` budget rather than per model).
    fn evict_global_lru(&self) {
        let mut worst: Option<(String, usize, u64)> = None;
        for bucket in self.near.iter() {
            for (idx, entry) in bucket.value().iter().enumerate() {
                let score = entry.inserted_at + entry.hit_count.load(Ordering::Relaxed);
                if worst.as_ref().map(|(_, _, s)| score < *s).unwrap_or(true) {
                    worst = Some((bucket.key().clone(), idx, score));
                }
            }
        }
        if let Some((model, idx, _)) = worst {
            if let Some(mut bucket) = self.near.get_mut(&model) {
                bucket.remove(idx);
                self.near_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.exact.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChatMessage, Choice, GatewayMetadata, Role, Usage};

    fn sample_request(content: &str) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: content.into(),
            }],
            temperature: None,
            top_p: None,
            max_tokens: None,
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

    fn sample_response() -> ChatResponse {
        ChatResponse {
            id: "chatcmpl-test".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "gpt-4o".into(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: Role::Assistant,
                    content: "hi".into(),
                },
                finish_reason: None,
            }],
            usage: Usage::new(1, 1),
            gateway: GatewayMetadata {
                provider: "openai".into(),
                routing_decision: String::new(),
                latency_ms: 1,
                cost_usd: 0.0001,
                cache_hit: false,
                fallback_used: false,
            },
        }
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_opposite_is_negative_one() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_unequal_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_scaled_vector_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        let b: Vec<f32> = a.iter().map(|x| x * 4.0).collect();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let req = sample_request("hello");
        assert_eq!(fingerprint(&req), fingerprint(&req));
    }

    #[test]
    fn fingerprint_differs_on_content() {
        assert_ne!(
            fingerprint(&sample_request("hello")),
            fingerprint(&sample_request("goodbye"))
        );
    }

    #[tokio::test]
    async fn exact_hit_round_trips() {
        let cache = SemanticCache::new(3600, 100, 0.95);
        let req = sample_request("hello");
        cache.insert(&req, sample_response()).await;
        let hit = cache.lookup(&req).await.expect("expected cache hit");
        assert!(!hit.near_hit);
        assert_eq!(hit.response.id, sample_response().id);
    }

    #[tokio::test]
    async fn miss_on_unseen_request() {
        let cache = SemanticCache::new(3600, 100, 0.95);
        assert!(cache.lookup(&sample_request("never seen")).await.is_none());
    }

    #[tokio::test]
    async fn near_hit_for_identical_content_different_fingerprint_fields() {
        let cache = SemanticCache::new(3600, 100, 0.95);
        let mut stored = sample_request("explain quantum computing in detail");
        stored.temperature = Some(0.1);
        cache.insert(&stored, sample_response()).await;

        let mut query = sample_request("explain quantum computing in detail");
        query.temperature = Some(0.9); // different fingerprint, same content
        let hit = cache.lookup(&query).await.expect("expected near hit");
        assert!(hit.near_hit);
    }
}
