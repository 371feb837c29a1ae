//! Lookup service tests against a scripted provider

use crate::error::{LookupError, ProviderError};
use crate::provider::ReverseGeocoder;
use crate::{Coordinate, GeocodingService, LookupOutcome, LookupQueue};
use async_trait::async_trait;
use core_config::{LookupSettings, Settings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Provider that records call times and answers from a script
#[derive(Debug)]
struct MockProvider {
    calls: AtomicUsize,
    started: Mutex<Vec<Instant>>,
    latency: Duration,
    fail_with: Mutex<Option<ProviderError>>,
}

impl MockProvider {
    fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            latency,
            fail_with: Mutex::new(None),
        })
    }

    fn fail_with(&self, err: Option<ProviderError>) {
        *self.fail_with.lock().unwrap() = err;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn started(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReverseGeocoder for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn reverse_geocode(
        &self,
        coord: Coordinate,
        _timeout: Duration,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(format!("Address near {:.2}, {:.2}", coord.lat, coord.lon))
    }
}

fn settings(rps: f64) -> LookupSettings {
    LookupSettings {
        enabled: true,
        rate_limit_rps: rps,
        ..Settings::default().lookup
    }
}

fn service(rps: f64, provider: &Arc<MockProvider>) -> Arc<GeocodingService> {
    let provider: Arc<dyn ReverseGeocoder> = provider.clone();
    Arc::new(GeocodingService::with_provider(settings(rps), provider))
}

const BAKU: Coordinate = Coordinate {
    lat: 40.41,
    lon: 49.87,
};

#[tokio::test(start_paused = true)]
async fn test_miss_then_hit() {
    let provider = MockProvider::new();
    let service = service(1.0, &provider);

    let first = service.lookup(BAKU, Duration::from_secs(5)).await;
    assert!(matches!(first, LookupOutcome::Resolved(_)));

    let second = service.lookup(BAKU, Duration::from_secs(5)).await;
    assert!(second.is_cached());
    assert_eq!(first.address(), second.address());

    assert_eq!(provider.calls(), 1);
    let metrics = service.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.provider_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_rate_limiter() {
    let provider = MockProvider::new();
    let service = service(1.0, &provider);
    service.lookup(BAKU, Duration::from_secs(5)).await;

    // The limiter's next slot is a second away; hits must not wait for it
    let started = Instant::now();
    for _ in 0..10 {
        assert!(service.lookup(BAKU, Duration::ZERO).await.is_cached());
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(service.limiter().granted(), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nearby_coordinates_share_cache_entry() {
    let provider = MockProvider::new();
    let service = service(0.0, &provider);

    service
        .lookup(Coordinate::new(40.409_261, 49.867_092), Duration::from_secs(5))
        .await;
    let nearby = service
        .lookup(Coordinate::new(40.409_259, 49.867_088), Duration::from_secs(5))
        .await;

    assert!(nearby.is_cached());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_provider_failure_is_not_cached() {
    let provider = MockProvider::new();
    provider.fail_with(Some(ProviderError::Status(503)));
    let service = service(0.0, &provider);

    let outcome = service.lookup(BAKU, Duration::from_secs(5)).await;
    assert_eq!(
        outcome,
        LookupOutcome::Unavailable(LookupError::Provider(ProviderError::Status(503)))
    );
    assert!(service.cache().is_empty());

    // The next lookup tries the provider again
    provider.fail_with(None);
    let outcome = service.lookup(BAKU, Duration::from_secs(5)).await;
    assert!(matches!(outcome, LookupOutcome::Resolved(_)));
    assert_eq!(provider.calls(), 2);
    assert_eq!(service.metrics().provider_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_are_spaced_by_rate() {
    let provider = MockProvider::new();
    let service = service(1.0, &provider);

    let a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .lookup(Coordinate::new(40.41, 49.87), Duration::from_secs(5))
                .await
        })
    };
    let b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .lookup(Coordinate::new(40.38, 49.83), Duration::from_secs(5))
                .await
        })
    };

    assert!(a.await.unwrap().address().is_some());
    assert!(b.await.unwrap().address().is_some());

    let started = provider.started();
    assert_eq!(started.len(), 2);
    assert!(started[1] - started[0] >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_budget_resolves() {
    let provider = MockProvider::new();
    let service = service(1.0, &provider);

    let outcome = service.lookup(BAKU, Duration::MAX).await;
    assert!(matches!(outcome, LookupOutcome::Resolved(_)));
    assert!(service.lookup(BAKU, Duration::MAX).await.is_cached());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_wait_beyond_budget_is_unavailable() {
    let provider = MockProvider::new();
    let service = service(0.5, &provider);

    service.lookup(BAKU, Duration::from_secs(5)).await;
    let outcome = service
        .lookup(Coordinate::new(41.0, 49.0), Duration::from_millis(500))
        .await;

    assert!(matches!(
        outcome,
        LookupOutcome::Unavailable(LookupError::RateLimitTimeout { .. })
    ));
    assert_eq!(provider.calls(), 1);
    assert_eq!(service.metrics().rate_limit_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_is_cut_off_at_call_timeout() {
    let provider = MockProvider::with_latency(Duration::from_secs(30));
    let service = service(0.0, &provider);

    let started = Instant::now();
    let outcome = service.lookup(BAKU, Duration::from_secs(60)).await;

    assert_eq!(
        outcome,
        LookupOutcome::Unavailable(LookupError::Provider(ProviderError::Timeout))
    );
    // Default CALL_TIMEOUT_SEC bounds the provider even with budget to spare
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert!(service.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_goes_back_to_provider() {
    let provider = MockProvider::new();
    let service = service(0.0, &provider);

    service.lookup(BAKU, Duration::from_secs(5)).await;
    tokio::time::advance(Duration::from_secs(86_400)).await;

    let outcome = service.lookup(BAKU, Duration::from_secs(5)).await;
    assert!(matches!(outcome, LookupOutcome::Resolved(_)));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_disabled_and_invalid_inputs() {
    let provider = MockProvider::new();
    let disabled = GeocodingService::with_provider(Settings::default().lookup, provider.clone());
    assert_eq!(
        disabled.lookup(BAKU, Duration::from_secs(1)).await,
        LookupOutcome::Unavailable(LookupError::Disabled)
    );

    let enabled = service(0.0, &provider);
    let outcome = enabled
        .lookup(Coordinate::new(120.0, 10.0), Duration::from_secs(1))
        .await;
    assert!(matches!(
        outcome,
        LookupOutcome::Unavailable(LookupError::InvalidCoordinate(_))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_status_reports_configuration() {
    let provider = MockProvider::new();
    let service = service(1.0, &provider);
    service.lookup(BAKU, Duration::from_secs(5)).await;

    let status = service.status();
    assert!(status.enabled);
    assert_eq!(status.provider, "mock");
    assert_eq!(status.rate_limit_rps, 1.0);
    assert_eq!(status.cache_ttl_sec, 86_400);
    assert_eq!(status.cache_entries, 1);
    assert_eq!(status.metrics.provider_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_runs_continuations() {
    let provider = MockProvider::new();
    let service = service(1.0, &provider);
    let queue = LookupQueue::spawn(Arc::clone(&service), 16, Duration::from_secs(10));

    let results = Arc::new(Mutex::new(Vec::new()));
    for lat in [40.1, 40.2, 40.3] {
        let results = Arc::clone(&results);
        queue
            .submit(Coordinate::new(lat, 49.8), move |outcome| async move {
                results.lock().unwrap().push(outcome.into_address());
            })
            .unwrap();
    }

    queue.close().await;

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(Option::is_some));
    // Queued jobs still honour the shared limiter
    let started = provider.started();
    assert!(started[2] - started[0] >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_queue_isolates_panicking_continuation() {
    let provider = MockProvider::new();
    let service = service(0.0, &provider);
    let queue = LookupQueue::spawn(Arc::clone(&service), 4, Duration::from_secs(1));

    let ran = Arc::new(AtomicUsize::new(0));
    queue
        .submit(BAKU, |_| async move { panic!("continuation failed") })
        .unwrap();
    {
        let ran = Arc::clone(&ran);
        queue
            .submit(Coordinate::new(41.0, 49.0), move |_| async move {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    queue.close().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(provider.calls(), 2);
}
