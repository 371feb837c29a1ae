//! Cached, rate-limited reverse geocoding
//!
//! Every lookup goes cache, then rate limiter, then provider. A hit never
//! touches the limiter or the network. A miss waits for a rate slot within
//! the caller's budget and hands the provider whatever budget is left.
//! Only successful resolutions are cached; every failure degrades to
//! [`LookupOutcome::Unavailable`] so callers can carry on without an
//! address.

use crate::cache::TtlCache;
use crate::clock::deadline_after;
use crate::error::{LookupError, ProviderError};
use crate::provider::{build_provider, ReverseGeocoder};
use crate::rate_limit::RateLimiter;
use crate::{CoordKey, Coordinate};
use core_config::LookupSettings;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Served from the cache
    Cached(String),
    /// Resolved by the provider and now cached
    Resolved(String),
    /// No address; the reason is for logs and metrics only
    Unavailable(LookupError),
}

impl LookupOutcome {
    pub fn address(&self) -> Option<&str> {
        match self {
            LookupOutcome::Cached(address) | LookupOutcome::Resolved(address) => Some(address),
            LookupOutcome::Unavailable(_) => None,
        }
    }

    pub fn into_address(self) -> Option<String> {
        match self {
            LookupOutcome::Cached(address) | LookupOutcome::Resolved(address) => Some(address),
            LookupOutcome::Unavailable(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, LookupOutcome::Cached(_))
    }
}

/// Counter snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_calls: u64,
    pub provider_failures: u64,
    pub rate_limit_timeouts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    provider_calls: AtomicU64,
    provider_failures: AtomicU64,
    rate_limit_timeouts: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    fn snapshot(&self) -> Metrics {
        Metrics {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            rate_limit_timeouts: self.rate_limit_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Configuration view reported by status endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupStatus {
    pub enabled: bool,
    pub provider: String,
    pub provider_url: Option<String>,
    pub rate_limit_rps: f64,
    pub cache_ttl_sec: u64,
    pub cache_entries: usize,
    pub metrics: Metrics,
}

/// Reverse geocoding with a shared cache and a shared rate limiter
#[derive(Debug)]
pub struct GeocodingService {
    settings: LookupSettings,
    provider: Arc<dyn ReverseGeocoder>,
    limiter: RateLimiter,
    cache: Arc<TtlCache<CoordKey, String>>,
    counters: Counters,
}

impl GeocodingService {
    /// Build the service and the provider named in `settings`
    pub fn new(settings: LookupSettings) -> Result<Self, ProviderError> {
        let provider = build_provider(&settings)?;
        Ok(Self::with_provider(settings, provider))
    }

    /// Build the service around an existing provider
    pub fn with_provider(settings: LookupSettings, provider: Arc<dyn ReverseGeocoder>) -> Self {
        let limiter = RateLimiter::new(settings.rate_limit_rps);
        let cache = Arc::new(TtlCache::new(settings.cache_ttl));

        info!(
            enabled = settings.enabled,
            provider = provider.name(),
            rps = settings.rate_limit_rps,
            cache_ttl = ?settings.cache_ttl,
            "Geocoding service initialized"
        );

        Self {
            settings,
            provider,
            limiter,
            cache,
            counters: Counters::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn settings(&self) -> &LookupSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn cache(&self) -> &Arc<TtlCache<CoordKey, String>> {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> Metrics {
        self.counters.snapshot()
    }

    pub fn status(&self) -> LookupStatus {
        LookupStatus {
            enabled: self.settings.enabled,
            provider: self.provider.name().to_string(),
            provider_url: self.settings.provider_url.clone(),
            rate_limit_rps: self.settings.rate_limit_rps,
            cache_ttl_sec: self.settings.cache_ttl.as_secs(),
            cache_entries: self.cache.len(),
            metrics: self.metrics(),
        }
    }

    /// Resolve `coord` within `timeout`, rate-limit wait included
    pub async fn lookup(&self, coord: Coordinate, timeout: Duration) -> LookupOutcome {
        match self.try_lookup(coord, timeout).await {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(%coord, error = %err, "Address unavailable");
                LookupOutcome::Unavailable(err)
            }
        }
    }

    /// Resolve `coord` within the configured lookup budget
    pub async fn lookup_default(&self, coord: Coordinate) -> LookupOutcome {
        self.lookup(coord, self.settings.lookup_timeout).await
    }

    async fn try_lookup(
        &self,
        coord: Coordinate,
        timeout: Duration,
    ) -> Result<LookupOutcome, LookupError> {
        if !self.settings.enabled {
            return Err(LookupError::Disabled);
        }
        if !coord.is_valid() {
            return Err(LookupError::InvalidCoordinate(coord.to_string()));
        }

        let deadline = deadline_after(Instant::now(), timeout);
        let key = coord.key(self.settings.cache_key_precision);

        if let Some(address) = self.cache.get(&key) {
            bump(&self.counters.cache_hits);
            debug!(%key, "Geocoding cache hit");
            return Ok(LookupOutcome::Cached(address));
        }
        bump(&self.counters.cache_misses);

        let wait = deadline.saturating_duration_since(Instant::now());
        if let Err(err) = self.limiter.acquire_slot(wait).await {
            bump(&self.counters.rate_limit_timeouts);
            return Err(err);
        }

        let budget = deadline
            .saturating_duration_since(Instant::now())
            .min(self.settings.call_timeout);
        if budget.is_zero() {
            return Err(LookupError::BudgetExhausted);
        }

        bump(&self.counters.provider_calls);
        let call = self.provider.reverse_geocode(coord, budget);
        let result = match tokio::time::timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        match result {
            Ok(address) => {
                self.cache.insert(key, address.clone());
                debug!(%key, provider = self.provider.name(), "Address resolved");
                Ok(LookupOutcome::Resolved(address))
            }
            Err(err) => {
                bump(&self.counters.provider_failures);
                warn!(
                    %coord,
                    provider = self.provider.name(),
                    error = %err,
                    "Reverse geocoding failed"
                );
                Err(err.into())
            }
        }
    }
}
