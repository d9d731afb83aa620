//! `api_keys` table (spec §3 `ApiKeyRecord`, §6 "Persisted state").
//!
//! Rows are keyed by `(key_id, year_month)` so a new calendar month is a
//! fresh row rather than an in-place counter reset — `ApiKeyRecord`'s
//! "counters reset at the start of each calendar month" invariant falls out
//! of the primary key shape for free.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub key_id: String,
    #[sea_orm(unique)]
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub monthly_token_budget: Option<i64>,
    pub monthly_cost_budget_usd: Option<f64>,
    pub rate_limit_rpm: i32,
    pub rate_limit_tpm: i32,
    /// `YYYYMM`, e.g. `202607`.
    pub year_month: i32,
    pub tokens_used_this_month: i64,
    pub cost_used_this_month_usd: f64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
