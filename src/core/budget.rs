//! Budget enforcer (C6, spec §4.5).
//!
//! Per-key counters are fronted by a `DashMap` so the hot path
//! (`check_budget`/`record_usage`) never blocks on a database round trip; the
//! storage layer is consulted only on first use of a key and to persist
//! updated counters. Global counters are atomics, cost tracked in
//! micro-dollars so the counter stays integral.

use chrono::{Datelike, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Per-key budget configuration and live counters, mirroring the persisted
/// `ApiKeyRecord` shape (spec §3).
#[derive(Debug, Clone)]
pub struct KeyBudget {
    pub monthly_token_budget: Option<u64>,
    pub monthly_cost_budget_usd: Option<f64>,
}

#[derive(Debug)]
struct KeyCounters {
    year_month: u32,
    tokens_used: AtomicU64,
    cost_used_micros: AtomicI64,
}

impl KeyCounters {
    fn new(year_month: u32) -> Self {
        Self {
            year_month,
            tokens_used: AtomicU64::new(0),
            cost_used_micros: AtomicI64::new(0),
        }
    }
}

fn current_year_month() -> u32 {
    let now = Utc::now();
    now.year() as u32 * 100 + now.month()
}

fn usd_to_micros(usd: f64) -> i64 {
    (usd * 1_000_000.0).round() as i64
}

fn micros_to_usd(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Outcome of [`BudgetEnforcer::check_budget`] (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub token_usage_percent: f64,
    pub cost_usage_percent: f64,
    pub alert_threshold: Option<u8>,
}

/// Process-wide budget configuration (spec §4.5's `{monthlyUsd?, monthlyTokens?}`).
#[derive(Debug, Clone, Default)]
pub struct GlobalBudgetConfig {
    pub monthly_usd: Option<f64>,
    pub monthly_tokens: Option<u64>,
}

/// Per-key and process-wide budget enforcement (C6).
pub struct BudgetEnforcer {
    keys: DashMap<String, (KeyBudget, Arc<KeyCounters>)>,
    global: GlobalBudgetConfig,
    global_tokens: AtomicU64,
    global_cost_micros: AtomicI64,
    global_year_month: AtomicU64,
}

impl BudgetEnforcer {
    pub fn new(global: GlobalBudgetConfig) -> Self {
        Self {
            keys: DashMap::new(),
            global,
            global_tokens: AtomicU64::new(0),
            global_cost_micros: AtomicI64::new(0),
            global_year_month: AtomicU64::new(current_year_month() as u64),
        }
    }

    /// Seed global counters from durable storage at startup (spec §4.5:
    /// "optionally seeded from storage").
    pub fn seed_global_usage(&self, tokens: u64, cost_usd: f64) {
        self.global_tokens.store(tokens, Ordering::Relaxed);
        self.global_cost_micros
            .store(usd_to_micros(cost_usd), Ordering::Relaxed);
    }

    /// Register (or update the budget configuration of) a key. Existing
    /// counters are reset only if the calendar month has rolled over.
    pub fn upsert_key(&self, key_id: impl Into<String>, budget: KeyBudget, seed_tokens: u64, seed_cost_usd: f64) {
        let key_id = key_id.into();
        let ym = current_year_month();
        self.keys
            .entry(key_id)
            .and_modify(|(b, counters)| {
                *b = budget.clone();
                Self::roll_if_needed(counters, ym);
            })
            .or_insert_with(|| {
                let counters = Arc::new(KeyCounters::new(ym));
                counters.tokens_used.store(seed_tokens, Ordering::Relaxed);
                counters
                    .cost_used_micros
                    .store(usd_to_micros(seed_cost_usd), Ordering::Relaxed);
                (budget, counters)
            });
    }

    fn roll_if_needed(entry: &mut (KeyBudget, Arc<KeyCounters>), ym: u32) {
        if entry.1.year_month != ym {
            entry.1 = Arc::new(KeyCounters::new(ym));
        }
    }

    fn counters_for(&self, key_id: &str) -> Arc<KeyCounters> {
        let ym = current_year_month();
        let mut entry = self
            .keys
            .entry(key_id.to_string())
            .or_insert_with(|| (KeyBudget { monthly_token_budget: None, monthly_cost_budget_usd: None }, Arc::new(KeyCounters::new(ym))));
        Self::roll_if_needed(&mut entry, ym);
        entry.1.clone()
    }

    fn global_counters(&self) -> (u64, f64) {
        let ym = current_year_month() as u64;
        if self.global_year_month.swap(ym, Ordering::AcqRel) != ym {
            self.global_tokens.store(0, Ordering::Relaxed);
            self.global_cost_micros.store(0, Ordering::Relaxed);
        }
        (
            self.global_tokens.load(Ordering::Relaxed),
            micros_to_usd(self.global_cost_micros.load(Ordering::Relaxed)),
        )
    }

    /// Pre-admission check (spec §4.5).
    pub fn check_budget(&self, key_id: &str) -> BudgetCheck {
        let ym = current_year_month();
        let budget = self
            .keys
            .get(key_id)
            .map(|e| e.0.clone())
            .unwrap_or(KeyBudget {
                monthly_token_budget: None,
                monthly_cost_budget_usd: None,
            });
        let counters = self.counters_for(key_id);
        // counters_for may have just reset a stale month; re-read budget too
        // in case upsert_key hadn't been called (new key, unlimited budget).
        let _ = ym;

        let tokens_used = counters.tokens_used.load(Ordering::Relaxed);
        let cost_used = micros_to_usd(counters.cost_used_micros.load(Ordering::Relaxed));

        let token_usage_percent = match budget.monthly_token_budget {
            Some(b) if b > 0 => (tokens_used as f64 / b as f64) * 100.0,
            _ => 0.0,
        };
        let cost_usage_percent = match budget.monthly_cost_budget_usd {
            Some(b) if b > 0.0 => (cost_used / b) * 100.0,
            _ => 0.0,
        };

        if budget.monthly_token_budget.is_some() && token_usage_percent >= 100.0 {
            return BudgetCheck {
                allowed: false,
                reason: Some("token budget exceeded".into()),
                token_usage_percent,
                cost_usage_percent,
                alert_threshold: None,
            };
        }
        if budget.monthly_cost_budget_usd.is_some() && cost_usage_percent >= 100.0 {
            return BudgetCheck {
                allowed: false,
                reason: Some("cost budget exceeded".into()),
                token_usage_percent,
                cost_usage_percent,
                alert_threshold: None,
            };
        }

        let (global_tokens, global_cost) = self.global_counters();
        if let Some(limit) = self.global.monthly_tokens {
            if limit > 0 && global_tokens >= limit {
                return BudgetCheck {
                    allowed: false,
                    reason: Some("Global monthly token budget exceeded".into()),
                    token_usage_percent,
                    cost_usage_percent,
                    alert_threshold: None,
                };
            }
        }
        if let Some(limit) = self.global.monthly_usd {
            if limit > 0.0 && global_cost >= limit {
                return BudgetCheck {
                    allowed: false,
                    reason: Some("Global monthly cost budget exceeded".into()),
                    token_usage_percent,
                    cost_usage_percent,
                    alert_threshold: None,
                };
            }
        }

        let max_usage = token_usage_percent.max(cost_usage_percent);
        let alert_threshold = if max_usage >= 95.0 {
            Some(95)
        } else if max_usage >= 80.0 {
            Some(80)
        } else {
            None
        };

        BudgetCheck {
            allowed: true,
            reason: None,
            token_usage_percent,
            cost_usage_percent,
            alert_threshold,
        }
    }

    /// Atomically add usage to both the key's and the process-wide counters
    /// (spec §4.5). Monotone non-decreasing within a calendar month.
    pub fn record_usage(&self, key_id: &str, tokens: u64, cost_usd: f64) {
        let counters = self.counters_for(key_id);
        counters.tokens_used.fetch_add(tokens, Ordering::Relaxed);
        counters
            .cost_used_micros
            .fetch_add(usd_to_micros(cost_usd), Ordering::Relaxed);

        self.global_counters(); // rolls global counters if the month changed
        self.global_tokens.fetch_add(tokens, Ordering::Relaxed);
        self.global_cost_micros
            .fetch_add(usd_to_micros(cost_usd), Ordering::Relaxed);
    }

    /// Sum of every `record_usage` call's token argument since startup or the
    /// last monthly rollover — used by tests and the `/admin` surface.
    pub fn global_usage(&self) -> (u64, f64) {
        self.global_counters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> BudgetEnforcer {
        BudgetEnforcer::new(GlobalBudgetConfig::default())
    }

    #[test]
    fn null_budget_never_rejects() {
        let e = enforcer();
        e.upsert_key(
            "k1",
            KeyBudget {
                monthly_token_budget: None,
                monthly_cost_budget_usd: None,
            },
            0,
            0.0,
        );
        e.record_usage("k1", 1_000_000, 500.0);
        assert!(e.check_budget("k1").allowed);
    }

    #[test]
    fn usage_at_or_above_budget_is_rejected() {
        let e = enforcer();
        e.upsert_key(
            "k1",
            KeyBudget {
                monthly_token_budget: Some(100_000),
                monthly_cost_budget_usd: None,
            },
            100_000,
            0.0,
        );
        let check = e.check_budget("k1");
        assert!(!check.allowed);
        assert!(check
            .reason
            .unwrap()
            .to_lowercase()
            .contains("token budget exceeded"));
    }

    #[test]
    fn usage_below_budget_is_allowed() {
        let e = enforcer();
        e.upsert_key(
            "k1",
            KeyBudget {
                monthly_token_budget: Some(100_000),
                monthly_cost_budget_usd: None,
            },
            50_000,
            0.0,
        );
        assert!(e.check_budget("k1").allowed);
    }

    #[test]
    fn alert_threshold_crosses_at_80_and_95() {
        let e = enforcer();
        e.upsert_key(
            "k1",
            KeyBudget {
                monthly_token_budget: Some(100_000),
                monthly_cost_budget_usd: None,
            },
            85_000,
            0.0,
        );
        assert_eq!(e.check_budget("k1").alert_threshold, Some(80));

        e.upsert_key(
            "k2",
            KeyBudget {
                monthly_token_budget: Some(100_000),
                monthly_cost_budget_usd: None,
            },
            96_000,
            0.0,
        );
        assert_eq!(e.check_budget("k2").alert_threshold, Some(95));

        e.upsert_key(
            "k3",
            KeyBudget {
                monthly_token_budget: Some(100_000),
                monthly_cost_budget_usd: None,
            },
            50_000,
            0.0,
        );
        assert_eq!(e.check_budget("k3").alert_threshold, None);
    }

    #[test]
    fn global_budget_exceeded_rejects_even_with_room_on_key() {
        let e = BudgetEnforcer::new(GlobalBudgetConfig {
            monthly_usd: Some(10.0),
            monthly_tokens: None,
        });
        e.upsert_key(
            "k1",
            KeyBudget {
                monthly_token_budget: None,
                monthly_cost_budget_usd: None,
            },
            0,
            0.0,
        );
        e.record_usage("k1", 0, 10.0);
        let check = e.check_budget("k1");
        assert!(!check.allowed);
        assert!(check.reason.unwrap().starts_with("Global monthly"));
    }

    #[test]
    fn global_usage_equals_sum_of_recorded_calls() {
        let e = enforcer();
        e.record_usage("a", 100, 1.0);
        e.record_usage("b", 200, 2.0);
        let (tokens, cost) = e.global_usage();
        assert_eq!(tokens, 300);
        assert!((cost - 3.0).abs() < 1e-9);
    }
}
