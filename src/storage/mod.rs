//! Durable storage: SQLite via SeaORM, narrowed to the two tables spec §6
//! actually names (`request_logs`, `api_keys`). `litellm-rs`'s own
//! `storage/database` module is SeaORM-based; this crate keeps that choice
//! and drops the Postgres/Redis/vector-store/file-storage backends it also
//! carries, since nothing in this spec's scope needs them.

pub mod database;

pub use database::Database;
