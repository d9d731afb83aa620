//! An LLM gateway core: provider registry, cost/quality/latency-aware
//! router, budget and rate-limit enforcement, a two-tier semantic cache, and
//! the request pipeline that ties them together behind an OpenAI-compatible
//! HTTP surface.
//!
//! Structured the way `litellm-rs` structures its own gateway: `config` for
//! environment-driven settings, `core` for the provider-agnostic machinery,
//! `storage` for the SQLite-backed durable state, `server` for the
//! Actix-web HTTP surface, and `utils` for the shared error type.

pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::GatewayConfig;
pub use server::{run_server, run_server_with_config_file, GatewayServer};
pub use utils::error::{GatewayError, Result};

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Build-time provenance, surfaced for diagnostics (not on the HTTP surface —
/// spec §6 doesn't ask for a version endpoint).
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_time: &'static str,
    pub git_hash: &'static str,
    pub rust_version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: VERSION,
            build_time: env!("BUILD_TIME"),
            git_hash: env!("GIT_HASH"),
            rust_version: env!("RUST_VERSION"),
        }
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_reports_crate_version() {
        let info = build_info();
        assert_eq!(info.version, VERSION);
    }
}
