//! # Backend Connection Pool
//!
//! A bounded pool of live backend connections shared by many concurrent
//! request handlers, plus a compatibility layer that lets handler code keep
//! its one-connection-per-call `open()`/`close()` shape.
//!
//! ## Components
//!
//! - [`ConnectionPool`]: acquire/release with min/max sizing and bounded waits
//! - [`ConnectionSource`] / [`PooledHandle`]: legacy connect/close over the pool
//! - [`Dialect`]: placeholder translation for handler SQL
//! - [`TcpConnector`]: connector for TCP-reachable backends
//!
//! ## Usage
//!
//! ```rust,no_run
//! use backend_pool::{ConnectionPool, ConnectionSource, PoolConfig, TcpConnector};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), backend_pool::PoolError> {
//! let connector = TcpConnector::from_dsn("tcp://127.0.0.1:5432", Duration::from_secs(3))?;
//! let pool = ConnectionPool::new(connector, PoolConfig::new(2, 20))?;
//! pool.initialize().await?;
//!
//! let source = ConnectionSource::pooled(pool.clone());
//! let mut handle = source.open().await?;
//! let conn = handle.connection()?;
//! // ... use conn ...
//! handle.close(); // back to the pool, not destroyed
//! # Ok(())
//! # }
//! ```

pub mod compat;
pub mod config;
pub mod dialect;
pub mod error;
pub mod pool;
pub mod tcp;
pub mod test_utils;

use async_trait::async_trait;

pub use compat::{ConnectionSource, PooledHandle};
pub use config::PoolConfig;
pub use dialect::Dialect;
pub use error::PoolError;
pub use pool::{ConnectionPool, PoolEntry, PoolPhase, PoolStats};
pub use tcp::{TcpConnection, TcpConnector};

/// Opens backend connections for a pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Establish one new connection (handshake and auth included)
    async fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Human-readable target for logs
    fn describe(&self) -> String {
        "backend".to_string()
    }
}

/// One live backend connection
#[async_trait]
pub trait Connection: Send + 'static {
    /// Cheap check; true once the transport has failed
    fn is_broken(&self) -> bool;

    /// Round-trip health check
    async fn ping(&mut self) -> Result<(), PoolError>;
}
