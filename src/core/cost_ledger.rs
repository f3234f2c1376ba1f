//! Running spend per provider.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Spend totals for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLedgerEntry {
    pub provider_id: String,
    pub daily_total: f64,
    pub monthly_total: f64,
    /// Start of the current daily window.
    pub window_started_at: DateTime<Utc>,
    /// Billable calls recorded since the ledger was created.
    pub calls: u64,
}

impl CostLedgerEntry {
    fn new(provider_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            daily_total: 0.0,
            monthly_total: 0.0,
            window_started_at: now,
            calls: 0,
        }
    }

    /// Reset the daily and monthly totals when `now` is in a later UTC day or month.
    fn roll(&mut self, now: DateTime<Utc>) {
        let started = self.window_started_at;
        if (now.year(), now.month()) != (started.year(), started.month()) {
            self.monthly_total = 0.0;
        }
        if now.date_naive() != started.date_naive() {
            self.daily_total = 0.0;
            self.window_started_at = now;
        }
    }
}

/// Per-provider spend with UTC day/month rollover.
#[derive(Debug)]
pub struct CostLedger {
    default_ceiling: f64,
    ceilings: HashMap<String, f64>,
    entries: Mutex<HashMap<String, CostLedgerEntry>>,
    /// Lifetime spend across all providers; not reset by rollover.
    total: Mutex<f64>,
}

impl CostLedger {
    /// Create a ledger with a global daily ceiling and per-provider overrides.
    #[must_use]
    pub fn new(default_ceiling: f64, ceilings: HashMap<String, f64>) -> Self {
        Self {
            default_ceiling,
            ceilings,
            entries: Mutex::new(HashMap::new()),
            total: Mutex::new(0.0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CostLedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one billable call.
    pub fn record(&self, provider_id: &str, cost: f64) {
        self.record_at(provider_id, cost, Utc::now());
    }

    /// Record one billable call at an explicit time.
    pub fn record_at(&self, provider_id: &str, cost: f64, now: DateTime<Utc>) {
        let cost = cost.max(0.0);
        {
            let mut entries = self.lock();
            let entry = entries
                .entry(provider_id.to_string())
                .or_insert_with(|| CostLedgerEntry::new(provider_id, now));
            entry.roll(now);
            entry.daily_total += cost;
            entry.monthly_total += cost;
            entry.calls += 1;
        }
        *self.total.lock().unwrap_or_else(PoisonError::into_inner) += cost;
    }

    /// Current entry for a provider, rolled forward to `now`.
    #[must_use]
    pub fn entry_at(&self, provider_id: &str, now: DateTime<Utc>) -> Option<CostLedgerEntry> {
        let mut entries = self.lock();
        entries.get_mut(provider_id).map(|entry| {
            entry.roll(now);
            entry.clone()
        })
    }

    /// Spend today for a provider.
    #[must_use]
    pub fn daily_total(&self, provider_id: &str) -> f64 {
        self.entry_at(provider_id, Utc::now())
            .map_or(0.0, |e| e.daily_total)
    }

    /// Daily ceiling that applies to a provider.
    #[must_use]
    pub fn ceiling_for(&self, provider_id: &str) -> f64 {
        self.ceilings
            .get(provider_id)
            .copied()
            .unwrap_or(self.default_ceiling)
    }

    /// Whether today's spend for a provider is above its ceiling.
    #[must_use]
    pub fn over_daily_ceiling(&self, provider_id: &str) -> bool {
        self.daily_total(provider_id) > self.ceiling_for(provider_id)
    }

    /// Lifetime spend across providers.
    #[must_use]
    pub fn total_spend(&self) -> f64 {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lifetime billable calls across providers.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.lock().values().map(|e| e.calls).sum()
    }

    /// Mean cost of a recorded call, if any call was recorded.
    #[must_use]
    pub fn average_call_cost(&self) -> Option<f64> {
        let calls = self.total_calls();
        #[allow(clippy::cast_precision_loss)]
        (calls > 0).then(|| self.total_spend() / calls as f64)
    }
}
