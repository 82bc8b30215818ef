//! Cache-aside rate provider with stale serving and a hardcoded last resort

use super::rate::{CachedRate, DEFAULT_RATE, RateError, RateOutcome, ensure_positive};
use super::source::{Clock, RateSource};
use chrono::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RateProviderOptions {
    /// Maximum age before a cached rate is refreshed
    pub ttl: Duration,
    /// Served when refresh fails and nothing was ever cached
    pub default_rate: f64,
}

impl Default for RateProviderOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(1),
            default_rate: DEFAULT_RATE,
        }
    }
}

/// Answers "what is the current rate" from a single process-wide cache slot.
///
/// Reads within the TTL never touch the network. Expired reads refresh from
/// the [`RateSource`]; refreshes are collapsed so that callers arriving while
/// one is in flight reuse its result. A failed refresh serves the previous
/// value if there is one, otherwise `default_rate`.
pub struct RateProvider {
    source: Arc<dyn RateSource>,
    clock: Arc<dyn Clock>,
    options: RateProviderOptions,
    cache: RwLock<Option<CachedRate>>,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl RateProvider {
    pub fn new(
        source: Arc<dyn RateSource>,
        clock: Arc<dyn Clock>,
        options: RateProviderOptions,
    ) -> Self {
        Self {
            source,
            clock,
            options,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Snapshot of the cache slot, fresh or not.
    pub fn cached(&self) -> Option<CachedRate> {
        *self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current rate. Always positive, never fails.
    pub async fn get_rate(&self) -> f64 {
        self.resolve().await.value()
    }

    /// Current rate, tagged with the tier that produced it.
    pub async fn resolve(&self) -> RateOutcome {
        if let Some(rate) = self.fresh_entry() {
            debug!(rate = rate.value, "Cache HIT");
            return RateOutcome::Fresh(rate);
        }
        debug!("Cache MISS or expired");

        let seen = self.refreshes.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        if let Some(rate) = self.fresh_entry() {
            return RateOutcome::Fresh(rate);
        }
        // A refresh failed while we waited; don't hit the upstream again
        if self.refreshes.load(Ordering::Acquire) != seen {
            return self.fallback();
        }

        let result = self.refresh().await;
        self.refreshes.fetch_add(1, Ordering::Release);

        match result {
            Ok(rate) => RateOutcome::Fresh(rate),
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Rate refresh failed");
                self.fallback()
            }
        }
    }

    fn fresh_entry(&self) -> Option<CachedRate> {
        let now = self.clock.now();
        self.cached().filter(|rate| now - rate.fetched_at < self.options.ttl)
    }

    async fn refresh(&self) -> Result<CachedRate, RateError> {
        let raw = self.source.fetch_raw_rate_text().await?;
        // Cached values stay positive whatever `parse_rate` returns
        let value = ensure_positive(self.source.parse_rate(&raw)?, &raw)?;
        let rate = CachedRate {
            value,
            fetched_at: self.clock.now(),
        };

        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(rate);
        info!(source = self.source.name(), rate = value, "Refreshed rate");
        Ok(rate)
    }

    fn fallback(&self) -> RateOutcome {
        match self.cached() {
            Some(rate) => {
                warn!(
                    rate = rate.value,
                    fetched_at = %rate.fetched_at,
                    "Serving stale rate"
                );
                RateOutcome::Stale(rate)
            }
            None => {
                warn!(
                    rate = self.options.default_rate,
                    "No rate was ever fetched, serving default"
                );
                RateOutcome::Default(self.options.default_rate)
            }
        }
    }
}
