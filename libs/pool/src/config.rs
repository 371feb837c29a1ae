use crate::PoolError;
use std::time::Duration;

/// Sizing and timing for a [`ConnectionPool`](crate::ConnectionPool)
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections created eagerly by `initialize()` and kept as a floor
    /// when broken connections are discarded
    pub min_size: usize,

    /// Maximum live connections (idle + checked out)
    pub max_size: usize,

    /// Bounded wait for a connection when the pool is at its ceiling
    pub acquire_timeout: Duration,

    /// Ping idle connections before handing them out
    pub health_check_on_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 20,
            acquire_timeout: Duration::from_secs(5),
            health_check_on_acquire: true,
        }
    }
}

impl PoolConfig {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            ..Default::default()
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check_on_acquire = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::invalid_config("max_size must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::invalid_config(format!(
                "min_size {} exceeds max_size {}",
                self.min_size, self.max_size
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::invalid_config("acquire_timeout must be non-zero"));
        }
        Ok(())
    }
}
