//! Default values and limits
//!
//! Constants shared by the settings loader and by services that need a
//! sensible value when a key is absent from the environment.

/// Longest timeout, TTL or rate-limit interval accepted (10 years, seconds)
pub const MAX_DURATION_SECS: f64 = 10.0 * 365.0 * 86_400.0;

/// Connection pool defaults
pub mod pool {
    /// Connections opened eagerly at initialize
    pub const MIN_CONNECTIONS: usize = 2;

    /// Hard ceiling on live backend connections
    pub const MAX_CONNECTIONS: usize = 20;

    /// Backend used when `BACKEND_DSN` is not set
    pub const BACKEND_DSN: &str = "tcp://127.0.0.1:5432";

    /// Bounded wait for an idle connection (seconds)
    pub const ACQUIRE_TIMEOUT_SECS: f64 = 5.0;

    /// Ping idle connections before handing them out
    pub const HEALTH_CHECK_ON_ACQUIRE: bool = true;
}

/// Reverse geocoding defaults
pub mod lookup {
    /// Lookups are opt-in
    pub const ENABLED: bool = false;

    /// Public provider unless configured otherwise
    pub const PROVIDER: &str = "public";

    /// Nominatim usage policy requires an identifying agent
    pub const USER_AGENT: &str = "attendance-core/0.1 (attendance bot)";

    /// Overall budget for one provider call (seconds)
    pub const CALL_TIMEOUT_SECS: f64 = 3.0;

    /// Outbound requests per second; `<= 0` disables limiting
    pub const RATE_LIMIT_RPS: f64 = 1.0;

    /// 24 hours
    pub const CACHE_TTL_SECS: u64 = 86_400;

    /// Decimal places kept in cache keys (~1.1 m at the equator)
    pub const CACHE_KEY_PRECISION: u32 = 5;

    /// Upper bound accepted for `CACHE_KEY_PRECISION`
    pub const MAX_CACHE_KEY_PRECISION: u32 = 9;

    /// Overall budget for a queued lookup, rate-limit wait included (seconds)
    pub const LOOKUP_TIMEOUT_SECS: f64 = 10.0;

    /// Interval between background cache sweeps (seconds)
    pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 600;
}
