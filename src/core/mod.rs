//! Core request-handling plane: the five hard subsystems named in spec §1
//! (provider registry, router, budget/rate-limit enforcement, semantic
//! cache, request pipeline) plus their supporting types, classifier, and
//! validator.

pub mod budget;
pub mod cache;
pub mod classifier;
pub mod logger;
pub mod metrics;
pub mod pipeline;
pub mod providers;
pub mod rate_limiter;
pub mod router;
pub mod types;
pub mod validation;
