//! Request logger (C9, spec §4.8).
//!
//! Always emits a structured line via `tracing` for `debug`/`info` log
//! levels. When a database handle is configured, entries are additionally
//! buffered in a lock-free `crossbeam_queue::SegQueue` and drained under a
//! single `tokio::sync::Mutex` held only for the drain — released before the
//! batched insert, matching the locking discipline in spec §5.

use crate::core::metrics::GatewayMetrics;
use crate::storage::database::Database;
use crossbeam_queue::SegQueue;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// One row of the `request_logs` table (spec §6 "Persisted state").
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub api_key_id: String,
    pub model: String,
    pub provider: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub fallback_used: bool,
    pub status: String,
    /// `messages[].content` is replaced with `<redacted:len>` here when
    /// `REDACT_PROMPTS` is set (spec §9 Open Question c) — the redaction
    /// applies only at the log-entry construction site, never to the
    /// response returned to the client.
    pub prompt_preview: String,
}

enum LogLevel {
    Debug,
    InfoOnly,
    Quiet,
}

fn level_from_str(s: &str) -> LogLevel {
    match s {
        "debug" => LogLevel::Debug,
        "info" => LogLevel::InfoOnly,
        _ => LogLevel::Quiet,
    }
}

/// Structured stdout line + batched durable append (C9).
pub struct RequestLogger {
    buffer: Arc<SegQueue<RequestLogEntry>>,
    buffer_len: Arc<AtomicUsize>,
    drain_lock: Arc<Mutex<()>>,
    database: Option<Arc<Database>>,
    batch_size: usize,
    log_level: String,
    metrics: Arc<GatewayMetrics>,
}

impl RequestLogger {
    pub fn new(database: Option<Arc<Database>>, batch_size: usize, log_level: String) -> Self {
        Self::with_metrics(database, batch_size, log_level, Arc::new(GatewayMetrics::new()))
    }

    /// Same as [`RequestLogger::new`], but shares a `GatewayMetrics` registry
    /// with the rest of the process (so the `/metrics` route reflects what
    /// this logger records) instead of creating its own.
    pub fn with_metrics(
        database: Option<Arc<Database>>,
        batch_size: usize,
        log_level: String,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            buffer: Arc::new(SegQueue::new()),
            buffer_len: Arc::new(AtomicUsize::new(0)),
            drain_lock: Arc::new(Mutex::new(())),
            database,
            batch_size,
            log_level,
            metrics,
        }
    }

    /// Record one request: emit the stdout line, then enqueue for durable
    /// persistence if a database is configured.
    pub async fn log(&self, entry: RequestLogEntry) {
        self.metrics.record(&entry);

        match level_from_str(&self.log_level) {
            LogLevel::Debug => debug!(
                request_id = %entry.request_id, model = %entry.model, provider = %entry.provider,
                cost_usd = entry.cost_usd, latency_ms = entry.latency_ms, cache_hit = entry.cache_hit,
                fallback_used = entry.fallback_used, status = %entry.status,
                "request completed"
            ),
            LogLevel::InfoOnly => info!(
                request_id = %entry.request_id, model = %entry.model, provider = %entry.provider,
                cost_usd = entry.cost_usd, latency_ms = entry.latency_ms,
                "request completed"
            ),
            LogLevel::Quiet => {}
        }

        if self.database.is_none() {
            return;
        }

        self.buffer.push(entry);
        let len = self.buffer_len.fetch_add(1, Ordering::AcqRel) + 1;
        if len >= self.batch_size {
            self.flush().await;
        }
    }

    /// Drain the buffer and write one batched insert. On failure, the
    /// drained entries are prepended back (order preserved, nothing
    /// dropped) so the next flush retries them — at-least-once, never
    /// exactly-once (spec §1).
    pub async fn flush(&self) {
        let Some(db) = &self.database else { return };

        let _guard = self.drain_lock.lock().await;
        let mut drained = Vec::new();
        while let Some(entry) = self.buffer.pop() {
            drained.push(entry);
            self.buffer_len.fetch_sub(1, Ordering::AcqRel);
        }
        drop(_guard);

        if drained.is_empty() {
            return;
        }

        if let Err(e) = db.insert_request_logs(&drained).await {
            error!(error = %e, count = drained.len(), "failed to persist request log batch, retrying next flush");
            for entry in drained.into_iter().rev() {
                self.buffer.push(entry);
                self.buffer_len.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// Spawn the periodic flush loop (default 5000 ms).
    pub fn start_flush_loop(self: &Arc<Self>, interval_ms: u64) -> tokio::task::JoinHandle<()> {
        let logger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                logger.flush().await;
            }
        })
    }

    /// Final flush on shutdown.
    pub async fn shutdown(&self) {
        self.flush().await;
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer_len.load(Ordering::Acquire)
    }
}

pub fn redact_prompt(content: &str, redact: bool) -> String {
    if redact {
        format!("<redacted:{}>", content.chars().count())
    } else {
        content.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> RequestLogEntry {
        RequestLogEntry {
            request_id: "req-1".into(),
            api_key_id: "key-1".into(),
            model: "gpt-4o".into(),
            provider: "openai".into(),
            prompt_tokens: 5,
            completion_tokens: 7,
            cost_usd: 0.0004,
            latency_ms: 120,
            cache_hit: false,
            fallback_used: false,
            status: "ok".into(),
            prompt_preview: "Hello".into(),
        }
    }

    #[tokio::test]
    async fn logging_without_database_does_not_buffer() {
        let logger = RequestLogger::new(None, 50, "info".into());
        logger.log(sample_entry()).await;
        assert_eq!(logger.buffered_len(), 0);
    }

    #[test]
    fn redact_prompt_replaces_content_with_length_marker() {
        assert_eq!(redact_prompt("hello", true), "<redacted:5>");
        assert_eq!(redact_prompt("hello", false), "hello");
    }
}
