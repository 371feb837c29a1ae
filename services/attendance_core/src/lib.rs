//! Attendance Core
//!
//! Wires the backend connection pool and the geocoding service into one
//! process-wide runtime: settings in, a started pool, connection source,
//! lookup queue and cache sweeper out, and an orderly shutdown.

pub mod runtime;

pub use runtime::{pool_config, CoreRuntime, RuntimeError, StatusReport};
