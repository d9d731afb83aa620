//! HTTP middleware.
//!
//! Request tracing/correlation (`x-request-id`-equivalent spans) is handled
//! by `tracing_actix_web::TracingLogger` directly in `server::server`,
//! matching `litellm-rs`'s dependency on `tracing-actix-web` rather than a
//! hand-rolled Transform — this crate only needs bearer-token extraction of
//! its own.

pub mod auth;
