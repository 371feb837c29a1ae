//! Legacy connect/close over the pool
//!
//! Request handlers were written against a "connect, use, close" API. A
//! [`ConnectionSource`] keeps that shape: `open()` hands out a
//! [`PooledHandle`] and `close()` on it either returns the connection to the
//! pool or really closes a standalone connection, depending on where the
//! connection came from. The same call sites work with pooling on or off.

use crate::{ConnectionPool, Connector, Dialect, PoolEntry, PoolError};
use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{trace, warn};

enum Source<C: Connector> {
    Pooled(ConnectionPool<C>),
    Standalone(Arc<C>),
}

/// Where handler code gets its connections from; chosen once at startup
pub struct ConnectionSource<C: Connector> {
    source: Source<C>,
    dialect: Dialect,
}

impl<C: Connector> Clone for ConnectionSource<C> {
    fn clone(&self) -> Self {
        let source = match &self.source {
            Source::Pooled(pool) => Source::Pooled(pool.clone()),
            Source::Standalone(connector) => Source::Standalone(Arc::clone(connector)),
        };
        Self {
            source,
            dialect: self.dialect,
        }
    }
}

impl<C: Connector> Debug for ConnectionSource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Pooled(_) => "pooled",
            Source::Standalone(_) => "standalone",
        };
        f.debug_struct("ConnectionSource")
            .field("kind", &kind)
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl<C: Connector> ConnectionSource<C> {
    /// Serve connections from `pool`
    pub fn pooled(pool: ConnectionPool<C>) -> Self {
        Self {
            source: Source::Pooled(pool),
            dialect: Dialect::default(),
        }
    }

    /// Open and destroy a dedicated connection per call
    pub fn standalone(connector: C) -> Self {
        Self {
            source: Source::Standalone(Arc::new(connector)),
            dialect: Dialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.source, Source::Pooled(_))
    }

    /// Get a connection for one unit of backend work.
    ///
    /// A pooled source whose pool was never initialized falls back to a
    /// standalone connection.
    pub async fn open(&self) -> Result<PooledHandle<C>, PoolError> {
        match &self.source {
            Source::Pooled(pool) => match pool.acquire().await {
                Ok(entry) => Ok(PooledHandle::pooled(entry, self.dialect)),
                Err(PoolError::NotInitialized) => {
                    warn!(
                        pool = %pool.name(),
                        "Pool not initialized, opening standalone connection"
                    );
                    let conn = pool.connector().connect().await?;
                    Ok(PooledHandle::standalone(conn, self.dialect))
                }
                Err(e) => Err(e),
            },
            Source::Standalone(connector) => {
                let conn = connector.connect().await?;
                Ok(PooledHandle::standalone(conn, self.dialect))
            }
        }
    }
}

enum HandleState<C: Connector> {
    Pooled(PoolEntry<C>),
    Standalone(C::Connection),
    Closed,
}

/// A connection handed to handler code by [`ConnectionSource::open`].
///
/// `close()` may be called any number of times; only the first has an
/// effect. Dropping an open handle closes it.
pub struct PooledHandle<C: Connector> {
    state: HandleState<C>,
    from_pool: bool,
    dialect: Dialect,
}

impl<C: Connector> PooledHandle<C> {
    fn pooled(entry: PoolEntry<C>, dialect: Dialect) -> Self {
        Self {
            state: HandleState::Pooled(entry),
            from_pool: true,
            dialect,
        }
    }

    fn standalone(conn: C::Connection, dialect: Dialect) -> Self {
        Self {
            state: HandleState::Standalone(conn),
            from_pool: false,
            dialect,
        }
    }

    /// Whether `close()` returns the connection to a pool
    pub fn from_pool(&self) -> bool {
        self.from_pool
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, HandleState::Closed)
    }

    pub fn connection(&mut self) -> Result<&mut C::Connection, PoolError> {
        match &mut self.state {
            HandleState::Pooled(entry) => Ok(&mut **entry),
            HandleState::Standalone(conn) => Ok(conn),
            HandleState::Closed => Err(PoolError::HandleClosed),
        }
    }

    /// Translate handler SQL for the backend; `None` means skip it
    pub fn prepare<'q>(&self, query: &'q str) -> Option<Cow<'q, str>> {
        self.dialect.translate(query)
    }

    /// Flag the connection as unusable so the pool discards it on close
    pub fn mark_broken(&mut self) {
        if let HandleState::Pooled(entry) = &mut self.state {
            entry.mark_broken();
        }
    }

    /// Return a pooled connection or destroy a standalone one
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, HandleState::Closed) {
            HandleState::Pooled(entry) => entry.release(),
            HandleState::Standalone(conn) => drop(conn),
            HandleState::Closed => trace!("Handle closed more than once"),
        }
    }
}

impl<C: Connector> Drop for PooledHandle<C> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}

impl<C: Connector> Debug for PooledHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHandle")
            .field("from_pool", &self.from_pool)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
