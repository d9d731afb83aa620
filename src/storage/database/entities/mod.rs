//! SeaORM entities for the two tables this crate owns (spec §6).

pub mod api_key;
pub mod request_log;
