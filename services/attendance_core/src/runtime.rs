//! Process runtime

use backend_pool::{
    ConnectionPool, ConnectionSource, Connector, Dialect, PoolConfig, PoolError, PoolStats,
    TcpConnector,
};
use core_config::{ConfigError, PoolSettings, Settings};
use geocoding_service::{
    spawn_sweeper, GeocodingService, LookupQueue, LookupStatus, ProviderError,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Background lookups waiting for the worker before submissions are refused
const LOOKUP_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Geocoding provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Read-only operator view of the process
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub provider: String,
    pub rate_limit_rps: f64,
    pub cache_ttl_sec: u64,
    pub current_pool_size: usize,
    pub idle_count: usize,
    pub backend: String,
    /// Full pool counters
    pub pool: PoolStats,
    /// Full lookup configuration and counters
    pub lookup: LookupStatus,
}

/// Pool sizing and waits from settings
pub fn pool_config(settings: &PoolSettings) -> PoolConfig {
    PoolConfig::new(settings.min_connections, settings.max_connections)
        .with_acquire_timeout(settings.acquire_timeout)
        .with_health_check(settings.health_check_on_acquire)
}

/// Everything the request handlers share
pub struct CoreRuntime<C: Connector = TcpConnector> {
    settings: Settings,
    pool: ConnectionPool<C>,
    connections: ConnectionSource<C>,
    geocoding: Arc<GeocodingService>,
    queue: Option<LookupQueue>,
    sweeper: Option<JoinHandle<()>>,
    stop_sweeper: watch::Sender<bool>,
}

impl CoreRuntime<TcpConnector> {
    /// Connect to the configured backend and start every component
    pub async fn start(settings: Settings) -> Result<Self, RuntimeError> {
        let connector =
            TcpConnector::from_dsn(&settings.pool.backend_dsn, settings.pool.acquire_timeout)?;
        let geocoding = Arc::new(GeocodingService::new(settings.lookup.clone())?);
        Self::start_with(settings, connector, geocoding).await
    }
}

impl<C: Connector> CoreRuntime<C> {
    /// Start with an explicit connector and geocoding service
    pub async fn start_with(
        settings: Settings,
        connector: C,
        geocoding: Arc<GeocodingService>,
    ) -> Result<Self, RuntimeError> {
        let pool = ConnectionPool::with_name(connector, pool_config(&settings.pool), "backend")?;
        pool.initialize().await?;

        let dialect = Dialect::from_dsn(&settings.pool.backend_dsn);
        let connections = ConnectionSource::pooled(pool.clone()).with_dialect(dialect);

        let (stop_sweeper, sweeper_stopped) = watch::channel(false);
        let sweeper = spawn_sweeper(
            Arc::clone(geocoding.cache()),
            settings.lookup.cache_sweep_interval,
            sweeper_stopped,
        );

        let queue = LookupQueue::spawn(
            Arc::clone(&geocoding),
            LOOKUP_QUEUE_CAPACITY,
            settings.lookup.lookup_timeout,
        );

        info!(
            backend = %pool.connector().describe(),
            ?dialect,
            lookups_enabled = geocoding.is_enabled(),
            "Core runtime started"
        );

        Ok(Self {
            settings,
            pool,
            connections,
            geocoding,
            queue: Some(queue),
            sweeper: Some(sweeper),
            stop_sweeper,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Source handed to request handlers
    pub fn connections(&self) -> &ConnectionSource<C> {
        &self.connections
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn geocoding(&self) -> &Arc<GeocodingService> {
        &self.geocoding
    }

    /// Background lookup queue; `None` after shutdown
    pub fn lookup_queue(&self) -> Option<&LookupQueue> {
        self.queue.as_ref()
    }

    pub fn status(&self) -> StatusReport {
        let pool = self.pool.stats();
        let lookup = self.geocoding.status();

        StatusReport {
            enabled: lookup.enabled,
            provider: lookup.provider.clone(),
            rate_limit_rps: lookup.rate_limit_rps,
            cache_ttl_sec: lookup.cache_ttl_sec,
            current_pool_size: pool.live,
            idle_count: pool.idle,
            backend: self.pool.connector().describe(),
            pool,
            lookup,
        }
    }

    /// Stop the sweeper, drain queued lookups and close every pooled
    /// connection. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        let _ = self.stop_sweeper.send(true);
        if let Some(sweeper) = self.sweeper.take() {
            if let Err(e) = sweeper.await {
                error!("Cache sweeper failed: {}", e);
            }
        }

        if let Some(queue) = self.queue.take() {
            queue.close().await;
        }

        self.pool.shutdown();
        info!("Core runtime stopped");
    }
}
