//! HTTP route handlers, one module per spec §6 surface.

pub mod admin;
pub mod chat;
pub mod embeddings;
pub mod health;
pub mod metrics;
pub mod models;
