//! Application state shared across HTTP handlers.
//!
//! Mirrors `litellm-rs`'s `server::state::AppState`: one `Clone`-able struct
//! of `Arc`s, constructed once in `main.rs` and handed to every handler via
//! `web::Data`.

use crate::config::GatewayConfig;
use crate::core::metrics::GatewayMetrics;
use crate::core::pipeline::Pipeline;
use crate::core::providers::registry::ProviderRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<ProviderRegistry>,
        pipeline: Arc<Pipeline>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            pipeline,
            metrics,
        }
    }
}
