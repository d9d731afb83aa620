//! Actix-web application: construction of shared state from `GatewayConfig`,
//! route registration, and the `HttpServer` run loop.
//!
//! Modeled on `litellm-rs`'s `server::server::HttpServer` /
//! `server::builder::run_server`: one struct that owns the bound config plus
//! an `AppState`, a `create_app` closure handed to `actix_web::HttpServer`,
//! and a free `run_server` function that does config loading + provider
//! bootstrap before handing off to it.

use crate::config::GatewayConfig;
use crate::core::budget::{BudgetEnforcer, GlobalBudgetConfig};
use crate::core::cache::SemanticCache;
use crate::core::logger::RequestLogger;
use crate::core::metrics::GatewayMetrics;
use crate::core::pipeline::Pipeline;
use crate::core::providers::registry::ProviderRegistry;
use crate::core::providers::{
    AnthropicAdapter, GroqAdapter, OllamaAdapter, OpenAiAdapter, Provider, TogetherAdapter,
};
use crate::core::rate_limiter::RateLimiter;
use crate::server::routes;
use crate::server::state::AppState;
use crate::storage::database::Database;
use crate::utils::error::{GatewayError, Result};
use actix_cors::Cors;
use actix_web::{error::InternalError, middleware::DefaultHeaders, web, App, ResponseError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

/// A bound, not-yet-running gateway: config plus fully wired `AppState`.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    state: AppState,
    logger: Arc<RequestLogger>,
}

impl GatewayServer {
    /// Wire every subsystem from a loaded `GatewayConfig`: registers
    /// whichever provider adapters have credentials configured, opens the
    /// optional database, and constructs the `Pipeline` that backs every
    /// route.
    pub async fn new(config: GatewayConfig) -> Result<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(ProviderRegistry::new());

        if let Some(key) = &config.openai_api_key {
            registry
                .register(Provider::OpenAi(Arc::new(OpenAiAdapter::new(key.clone()))))
                .await;
            info!("registered openai provider");
        }
        if let Some(key) = &config.anthropic_api_key {
            registry
                .register(Provider::Anthropic(Arc::new(AnthropicAdapter::new(key.clone()))))
                .await;
            info!("registered anthropic provider");
        }
        if let Some(key) = &config.groq_api_key {
            registry
                .register(Provider::Groq(Arc::new(GroqAdapter::new(key.clone()))))
                .await;
            info!("registered groq provider");
        }
        if let Some(key) = &config.together_api_key {
            registry
                .register(Provider::Together(Arc::new(TogetherAdapter::new(key.clone()))))
                .await;
            info!("registered together provider");
        }
        if let Some(url) = &config.ollama_url {
            let models = vec!["llama3".to_string(), "mistral".to_string()];
            registry
                .register(Provider::Ollama(Arc::new(OllamaAdapter::new(url.clone(), models))))
                .await;
            info!("registered ollama provider");
        }

        if registry.snapshot().is_empty() {
            warn!("no providers configured; the gateway will reject every request until at least one {{OPENAI,ANTHROPIC,GROQ,TOGETHER}}_API_KEY or OLLAMA_URL is set");
        }

        let database = match &config.database_url {
            Some(url) => Some(Arc::new(Database::connect(url).await.map_err(|e| {
                GatewayError::Internal(format!("failed to connect to database: {e}"))
            })?)),
            None => None,
        };

        let budget = Arc::new(BudgetEnforcer::new(GlobalBudgetConfig {
            monthly_usd: config.global_monthly_usd_budget,
            monthly_tokens: config.global_monthly_token_budget,
        }));
        if let Some(db) = &database {
            if let Ok((tokens, cost)) = db.global_usage_this_month().await {
                budget.seed_global_usage(tokens, cost);
            }
        }

        let rate_limiter = Arc::new(RateLimiter::new());
        let cache = Arc::new(SemanticCache::new(
            config.cache_ttl_seconds,
            config.cache_max_entries,
            config.cache_similarity_threshold,
        ));
        let metrics = Arc::new(GatewayMetrics::new());
        let logger = Arc::new(RequestLogger::with_metrics(
            database.clone(),
            config.log_batch_size,
            config.log_level.clone(),
            Arc::clone(&metrics),
        ));

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&registry),
            budget,
            Arc::clone(&rate_limiter),
            cache,
            Arc::clone(&logger),
            database,
            config.routing_strategy(),
            config.redact_prompts,
        ));

        let health_check_interval = Duration::from_secs(config.health_check_interval_secs);
        registry.start_health_check_loop(health_check_interval);
        logger.start_flush_loop(config.log_flush_interval_ms);

        // Piggy-back the rate limiter's stale-bucket sweep on the same
        // cadence as the health-check loop (spec §4.6: memory reclamation,
        // not correctness, so any interval is safe).
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(health_check_interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                rate_limiter.sweep_expired();
            }
        });

        let state = AppState::new(Arc::clone(&config), registry, pipeline, metrics);

        Ok(Self { config, state, logger })
    }

    fn create_app(
        state: web::Data<AppState>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(state)
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .wrap(DefaultHeaders::new().add(("Server", "gateway-core")))
            .route("/healthz", web::get().to(routes::health::healthz))
            .route("/metrics", web::get().to(routes::metrics::metrics))
            .route("/v1/models", web::get().to(routes::models::list_models))
            .route(
                "/v1/chat/completions",
                web::post().to(routes::chat::chat_completions),
            )
            .route(
                "/v1/embeddings",
                web::post().to(routes::embeddings::create_embeddings),
            )
            .route(
                "/admin/providers",
                web::get().to(routes::admin::list_providers),
            )
    }

    /// Bind and run until the process is signaled to stop. Reverse-order
    /// teardown on the way out (spec §9 "Global process state"): the
    /// provider registry's health-check loop stops first, then the logger
    /// gets its final flush (spec §4.8 "Shutdown must trigger a final
    /// flush").
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.config.port);
        info!(%bind_addr, "starting gateway HTTP server");

        let registry = Arc::clone(&self.state.registry);
        let logger = Arc::clone(&self.logger);
        let state = web::Data::new(self.state);
        let run_result = actix_web::HttpServer::new(move || Self::create_app(state.clone()))
            .workers(num_cpus::get())
            .bind(&bind_addr)
            .map_err(|e| GatewayError::Internal(format!("failed to bind {bind_addr}: {e}")))?
            .run()
            .await;

        registry.stop();
        logger.shutdown().await;

        run_result.map_err(|e| GatewayError::Internal(format!("server error: {e}")))?;
        Ok(())
    }
}

/// Routes malformed-body and schema-mismatch errors (e.g. an unrecognized
/// `role`) through the spec §7 `{error:{message,type}}` envelope instead of
/// Actix's plaintext default, so every rejection on `/v1/*` is shaped the
/// same way regardless of whether `Validator` or the JSON extractor caught it.
fn json_error_handler(err: actix_web::error::JsonPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    InternalError::from_response(
        err.to_string(),
        GatewayError::InvalidRequest(err.to_string()).error_response(),
    )
    .into()
}

/// Load configuration from the environment and run the gateway. The single
/// entry point `main.rs` calls.
pub async fn run_server() -> Result<()> {
    run_server_with_config_file(None).await
}

/// Same as [`run_server`], but loads configuration from a YAML file instead
/// of the environment when `config_path` is given.
pub async fn run_server_with_config_file(config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => GatewayConfig::from_file(path).await?,
        None => GatewayConfig::from_env()?,
    };
    let server = GatewayServer::new(config).await?;
    server.run().await
}
