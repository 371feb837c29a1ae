//! Geocoding Service
//!
//! Turns coordinates into human-readable addresses for attendance records.
//! Lookups are cached per rounded coordinate, paced by a process-wide rate
//! limiter to respect the provider's usage policy, and never fail the
//! caller: a lookup that cannot be served in time yields no address.
//!
//! Features:
//! - Public (Nominatim) or self-hosted (Photon) providers, chosen by config
//! - FIFO rate limiting with a bounded wait
//! - TTL cache keyed by coordinates rounded to a configurable precision
//! - Background queue for lookups off the request path
//! - Periodic sweep of expired cache entries

pub mod cache;
pub mod clock;
pub mod coordinate;
pub mod error;
pub mod provider;
pub mod queue;
pub mod rate_limit;
pub mod service;
pub mod sweeper;

pub use cache::TtlCache;
pub use coordinate::{CoordKey, Coordinate};
pub use error::{LookupError, ProviderError, QueueError};
pub use provider::{build_provider, NominatimProvider, PhotonProvider, ReverseGeocoder};
pub use queue::LookupQueue;
pub use rate_limit::RateLimiter;
pub use service::{GeocodingService, LookupOutcome, LookupStatus, Metrics};
pub use sweeper::spawn_sweeper;

#[cfg(test)]
mod tests;
