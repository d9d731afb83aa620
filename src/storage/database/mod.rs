//! SQLite-backed database handle (spec §6). Owns the connection pool and
//! the two tables this crate persists: `api_keys` and `request_logs`.

pub mod entities;
pub mod migration;

use crate::core::logger::RequestLogEntry;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use entities::{api_key, request_log};
use migration::Migrator;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database as SeaDatabase, DatabaseConnection, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tracing::info;

pub struct Database {
    conn: DatabaseConnection,
}

impl Database {
    /// Connect and run pending migrations. `url` is typically
    /// `sqlite://path/to/gateway.db?mode=rwc` for a file, or
    /// `sqlite::memory:` for tests.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %redact_url(url), "connecting to database");
        let conn = SeaDatabase::connect(url)
            .await
            .map_err(GatewayError::Database)?;
        Migrator::up(&conn, None)
            .await
            .map_err(GatewayError::Database)?;
        Ok(Self { conn })
    }

    /// Look up an API key by its opaque secret, resolving (or lazily
    /// creating) the row for the current calendar month (spec §3
    /// `ApiKeyRecord`, §6 `(key_id, year_month)` reset semantics).
    pub async fn find_api_key(&self, key: &str) -> Result<Option<api_key::Model>> {
        let ym = current_year_month();
        let existing = api_key::Entity::find()
            .filter(api_key::Column::Key.eq(key))
            .one(&self.conn)
            .await
            .map_err(GatewayError::Database)?;

        let Some(row) = existing else { return Ok(None) };
        if row.year_month == ym {
            return Ok(Some(row));
        }

        // New calendar month: start a fresh counters row for this key,
        // carrying forward its static configuration.
        let fresh = api_key::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            key_id: Set(row.key_id.clone()),
            key: Set(row.key.clone()),
            name: Set(row.name.clone()),
            enabled: Set(row.enabled),
            monthly_token_budget: Set(row.monthly_token_budget),
            monthly_cost_budget_usd: Set(row.monthly_cost_budget_usd),
            rate_limit_rpm: Set(row.rate_limit_rpm),
            rate_limit_tpm: Set(row.rate_limit_tpm),
            year_month: Set(ym),
            tokens_used_this_month: Set(0),
            cost_used_this_month_usd: Set(0.0),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let inserted = fresh.insert(&self.conn).await.map_err(GatewayError::Database)?;
        Ok(Some(inserted))
    }

    /// Insert a brand-new key (admin/bootstrap path).
    pub async fn create_api_key(
        &self,
        key_id: &str,
        key: &str,
        name: &str,
        monthly_token_budget: Option<i64>,
        monthly_cost_budget_usd: Option<f64>,
        rate_limit_rpm: i32,
        rate_limit_tpm: i32,
    ) -> Result<api_key::Model> {
        let model = api_key::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            key_id: Set(key_id.to_string()),
            key: Set(key.to_string()),
            name: Set(name.to_string()),
            enabled: Set(true),
            monthly_token_budget: Set(monthly_token_budget),
            monthly_cost_budget_usd: Set(monthly_cost_budget_usd),
            rate_limit_rpm: Set(rate_limit_rpm),
            rate_limit_tpm: Set(rate_limit_tpm),
            year_month: Set(current_year_month()),
            tokens_used_this_month: Set(0),
            cost_used_this_month_usd: Set(0.0),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        model.insert(&self.conn).await.map_err(GatewayError::Database)
    }

    /// Persist accounted usage for `(key_id, current year_month)`.
    pub async fn record_api_key_usage(&self, key_id: &str, tokens: u64, cost_usd: f64) -> Result<()> {
        let ym = current_year_month();
        let txn = self.conn.begin().await.map_err(GatewayError::Database)?;
        if let Some(row) = api_key::Entity::find()
            .filter(api_key::Column::KeyId.eq(key_id))
            .filter(api_key::Column::YearMonth.eq(ym))
            .one(&txn)
            .await
            .map_err(GatewayError::Database)?
        {
            let mut active: api_key::ActiveModel = row.into();
            let new_tokens = match &active.tokens_used_this_month {
                sea_orm::ActiveValue::Unchanged(v) | sea_orm::ActiveValue::Set(v) => v + tokens as i64,
                _ => tokens as i64,
            };
            let new_cost = match &active.cost_used_this_month_usd {
                sea_orm::ActiveValue::Unchanged(v) | sea_orm::ActiveValue::Set(v) => v + cost_usd,
                _ => cost_usd,
            };
            active.tokens_used_this_month = Set(new_tokens);
            active.cost_used_this_month_usd = Set(new_cost);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(GatewayError::Database)?;
        }
        txn.commit().await.map_err(GatewayError::Database)
    }

    /// Batched insert for a drained `RequestLogger` buffer (spec §4.8).
    pub async fn insert_request_logs(&self, entries: &[RequestLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let models: Vec<request_log::ActiveModel> = entries
            .iter()
            .map(|e| request_log::ActiveModel {
                id: sea_orm::ActiveValue::NotSet,
                request_id: Set(e.request_id.clone()),
                api_key_id: Set(e.api_key_id.clone()),
                model: Set(e.model.clone()),
                provider: Set(e.provider.clone()),
                prompt_tokens: Set(e.prompt_tokens as i32),
                completion_tokens: Set(e.completion_tokens as i32),
                cost_usd: Set(e.cost_usd),
                latency_ms: Set(e.latency_ms as i64),
                cache_hit: Set(e.cache_hit),
                fallback_used: Set(e.fallback_used),
                status: Set(e.status.clone()),
                prompt_preview: Set(e.prompt_preview.clone()),
                inserted_at: Set(Utc::now()),
            })
            .collect();

        request_log::Entity::insert_many(models)
            .exec(&self.conn)
            .await
            .map_err(GatewayError::Database)?;
        Ok(())
    }

    /// Sum of all recorded usage across every key for the current month —
    /// used to seed `BudgetEnforcer`'s global counters at startup.
    pub async fn global_usage_this_month(&self) -> Result<(u64, f64)> {
        let ym = current_year_month();
        let rows = api_key::Entity::find()
            .filter(api_key::Column::YearMonth.eq(ym))
            .all(&self.conn)
            .await
            .map_err(GatewayError::Database)?;
        let tokens = rows.iter().map(|r| r.tokens_used_this_month.max(0) as u64).sum();
        let cost = rows.iter().map(|r| r.cost_used_this_month_usd).sum();
        Ok((tokens, cost))
    }
}

impl From<api_key::Model> for crate::core::types::ApiKeyRecord {
    fn from(row: api_key::Model) -> Self {
        crate::core::types::ApiKeyRecord {
            id: row.key_id,
            key: row.key,
            name: row.name,
            enabled: row.enabled,
            monthly_token_budget: row.monthly_token_budget.map(|v| v.max(0) as u64),
            monthly_cost_budget_usd: row.monthly_cost_budget_usd,
            rate_limit_rpm: row.rate_limit_rpm.max(0) as u32,
            rate_limit_tpm: row.rate_limit_tpm.max(0) as u32,
            tokens_used_this_month: row.tokens_used_this_month.max(0) as u64,
            cost_used_this_month_usd: row.cost_used_this_month_usd,
            platform_fallback: true,
        }
    }
}

fn current_year_month() -> i32 {
    use chrono::Datelike;
    let now = Utc::now();
    now.year() * 100 + now.month() as i32
}

fn redact_url(url: &str) -> String {
    // Never log embedded credentials (`sqlite://` has none, but guard anyway
    // for whatever DATABASE_URL shape an operator supplies).
    match url.find('@') {
        Some(at) => match url.find("://") {
            Some(scheme_end) => format!("{}://***{}", &url[..scheme_end], &url[at..]),
            None => "***".into(),
        },
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_find_api_key_round_trips() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.create_api_key("key-1", "sk-abc123", "test key", Some(1000), None, 60, 10_000)
            .await
            .unwrap();
        let found = db.find_api_key("sk-abc123").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().key_id, "key-1");
    }

    #[tokio::test]
    async fn record_usage_accumulates() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.create_api_key("key-1", "sk-abc123", "test key", Some(1000), None, 60, 10_000)
            .await
            .unwrap();
        db.record_api_key_usage("key-1", 100, 0.01).await.unwrap();
        db.record_api_key_usage("key-1", 50, 0.02).await.unwrap();
        let row = db.find_api_key("sk-abc123").await.unwrap().unwrap();
        assert_eq!(row.tokens_used_this_month, 150);
        assert!((row.cost_used_this_month_usd - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn insert_request_logs_batch() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let entries = vec![RequestLogEntry {
            request_id: "r1".into(),
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
            prompt_preview: "hi".into(),
        }];
        db.insert_request_logs(&entries).await.unwrap();
    }
}
