//! Bounded Connection Pool
//!
//! Keeps a set of live backend connections shared by many short request
//! handlers.
//!
//! ## Features
//!
//! - **Eager Warm-up**: `initialize()` opens `min_size` connections once
//! - **Hard Ceiling**: live connections (idle + checked out) never exceed `max_size`
//! - **Bounded Waits**: callers queue fairly for a slot and give up after `acquire_timeout`
//! - **Self-Healing**: broken connections are discarded on release and replaced up to `min_size`
//! - **RAII Entries**: a [`PoolEntry`] returns its connection to the pool when dropped

use crate::{Connection, Connector, PoolConfig, PoolError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stand-in for acquire timeouts too large for the clock (~30 years)
const FAR_FUTURE: std::time::Duration = std::time::Duration::from_secs(86_400 * 365 * 30);

/// Lifecycle of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPhase {
    Uninitialized,
    Running,
    ShutDown,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub phase: PoolPhase,
    /// Live connections, idle and checked out
    pub live: usize,
    /// Connections waiting in the idle set
    pub idle: usize,
    /// Live connections not in the idle set
    pub in_use: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub total_created: u64,
    pub total_destroyed: u64,
    pub acquire_timeouts: u64,
}

struct PoolState<T> {
    phase: PoolPhase,
    idle: VecDeque<T>,
    live: usize,
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    acquire_timeouts: AtomicU64,
}

struct Shared<C: Connector> {
    name: String,
    connector: C,
    config: PoolConfig,
    state: Mutex<PoolState<C::Connection>>,
    /// One permit per connection a caller may hold
    slots: Arc<Semaphore>,
    /// Signalled when a connection lands in the idle set or a live slot frees up
    idle_ready: Notify,
    init_lock: tokio::sync::Mutex<()>,
    counters: Counters,
}

enum Checkout<T> {
    Idle(T),
    Create,
    Wait,
}

/// Pool of live backend connections
pub struct ConnectionPool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ConnectionPool")
            .field("name", &self.shared.name)
            .field("phase", &state.phase)
            .field("live", &state.live)
            .field("idle", &state.idle.len())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an uninitialized pool; no connections are opened until
    /// [`initialize`](Self::initialize)
    pub fn new(connector: C, config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_name(connector, config, "backend-pool")
    }

    /// Create an uninitialized pool with a name used in logs
    pub fn with_name(
        connector: C,
        config: PoolConfig,
        name: impl Into<String>,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                slots: Arc::new(Semaphore::new(config.max_size)),
                state: Mutex::new(PoolState {
                    phase: PoolPhase::Uninitialized,
                    idle: VecDeque::with_capacity(config.max_size),
                    live: 0,
                }),
                connector,
                config,
                idle_ready: Notify::new(),
                init_lock: tokio::sync::Mutex::new(()),
                counters: Counters::default(),
            }),
        })
    }

    /// Open `min_size` connections. Idempotent: concurrent and repeated
    /// calls after the first successful one are no-ops.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let shared = &self.shared;
        let _init = shared.init_lock.lock().await;

        let phase = shared.state.lock().phase;
        match phase {
            PoolPhase::Running => {
                debug!(pool = %shared.name, "Pool already initialized");
                return Ok(());
            }
            PoolPhase::ShutDown => return Err(PoolError::Closed),
            PoolPhase::Uninitialized => {}
        }

        let mut created = Vec::with_capacity(shared.config.min_size);
        for _ in 0..shared.config.min_size {
            match shared.connector.connect().await {
                Ok(conn) => created.push(conn),
                Err(e) => {
                    warn!(
                        pool = %shared.name,
                        target = %shared.connector.describe(),
                        "Failed to open initial connection: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
        shared
            .counters
            .created
            .fetch_add(created.len() as u64, Ordering::Relaxed);

        let mut state = shared.state.lock();
        if state.phase == PoolPhase::ShutDown {
            drop(state);
            shared
                .counters
                .destroyed
                .fetch_add(created.len() as u64, Ordering::Relaxed);
            return Err(PoolError::Closed);
        }
        state.live += created.len();
        state.idle.extend(created);
        state.phase = PoolPhase::Running;

        info!(
            pool = %shared.name,
            target = %shared.connector.describe(),
            min = shared.config.min_size,
            max = shared.config.max_size,
            "Connection pool initialized"
        );
        Ok(())
    }

    /// Check out a connection.
    ///
    /// Returns an idle connection if one exists, otherwise opens a new one
    /// while below `max_size`, otherwise waits up to `acquire_timeout` for a
    /// release.
    pub async fn acquire(&self) -> Result<PoolEntry<C>, PoolError> {
        let shared = &self.shared;

        let phase = shared.state.lock().phase;
        match phase {
            PoolPhase::Uninitialized => return Err(PoolError::NotInitialized),
            PoolPhase::ShutDown => return Err(PoolError::Closed),
            PoolPhase::Running => {}
        }

        let started = Instant::now();
        let deadline = started
            .checked_add(shared.config.acquire_timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);

        // Semaphore waiters are served in FIFO order
        let permit =
            match tokio::time::timeout_at(deadline, Arc::clone(&shared.slots).acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => return Err(shared.exhausted(started)),
            };

        loop {
            let next = {
                let mut state = shared.state.lock();
                if state.phase == PoolPhase::ShutDown {
                    return Err(PoolError::Closed);
                }
                if let Some(conn) = state.idle.pop_front() {
                    Checkout::Idle(conn)
                } else if state.live < shared.config.max_size {
                    state.live += 1;
                    Checkout::Create
                } else {
                    Checkout::Wait
                }
            };

            match next {
                Checkout::Idle(conn) => {
                    let reservation = Reservation::new(shared);
                    if let Some(conn) = shared.vet(conn).await {
                        reservation.keep();
                        return Ok(PoolEntry::new(conn, Arc::clone(shared), permit));
                    }
                }
                Checkout::Create => {
                    let reservation = Reservation::new(shared);
                    let conn = shared.connector.connect().await.map_err(|e| {
                        warn!(pool = %shared.name, "Failed to open connection: {}", e);
                        e
                    })?;
                    reservation.keep();
                    shared.counters.created.fetch_add(1, Ordering::Relaxed);
                    debug!(pool = %shared.name, "Opened new pooled connection");
                    return Ok(PoolEntry::new(conn, Arc::clone(shared), permit));
                }
                Checkout::Wait => {
                    // A replacement connection is still being opened
                    if tokio::time::timeout_at(deadline, shared.idle_ready.notified())
                        .await
                        .is_err()
                    {
                        return Err(shared.exhausted(started));
                    }
                }
            }
        }
    }

    /// Close idle connections and refuse new checkouts. Connections still
    /// checked out are closed when they are released. Idempotent.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let (drained, in_use) = {
            let mut state = shared.state.lock();
            if state.phase == PoolPhase::ShutDown {
                debug!(pool = %shared.name, "Pool already shut down");
                return;
            }
            state.phase = PoolPhase::ShutDown;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.live -= drained.len();
            (drained, state.live)
        };

        shared.slots.close();
        shared.idle_ready.notify_waiters();

        let closed = drained.len();
        drop(drained);
        shared
            .counters
            .destroyed
            .fetch_add(closed as u64, Ordering::Relaxed);

        info!(pool = %shared.name, closed, in_use, "Connection pool shut down");
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let counters = &self.shared.counters;
        PoolStats {
            phase: state.phase,
            live: state.live,
            idle: state.idle.len(),
            in_use: state.live.saturating_sub(state.idle.len()),
            min_size: self.shared.config.min_size,
            max_size: self.shared.config.max_size,
            total_created: counters.created.load(Ordering::Relaxed),
            total_destroyed: counters.destroyed.load(Ordering::Relaxed),
            acquire_timeouts: counters.acquire_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Live connections, idle and checked out
    pub fn size(&self) -> usize {
        self.shared.state.lock().live
    }

    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    pub fn phase(&self) -> PoolPhase {
        self.shared.state.lock().phase
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<C: Connector> Shared<C> {
    fn exhausted(&self, started: Instant) -> PoolError {
        self.counters.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
        let waited = started.elapsed();
        warn!(pool = %self.name, ?waited, "Timed out waiting for a pooled connection");
        PoolError::Exhausted { waited }
    }

    /// Drop an idle connection that is no longer usable
    async fn vet(&self, mut conn: C::Connection) -> Option<C::Connection> {
        let verdict = if conn.is_broken() {
            Err(PoolError::health_check("connection marked broken"))
        } else if self.config.health_check_on_acquire {
            conn.ping().await
        } else {
            Ok(())
        };

        match verdict {
            Ok(()) => Some(conn),
            Err(e) => {
                warn!(pool = %self.name, "Discarding idle connection: {}", e);
                self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Give back a live slot that no longer has a connection behind it
    fn forget_one(&self) {
        self.state.lock().live -= 1;
        self.idle_ready.notify_one();
    }

    fn check_in(self: &Arc<Self>, conn: C::Connection, marked_broken: bool) {
        let broken = marked_broken || conn.is_broken();
        let mut state = self.state.lock();

        if state.phase == PoolPhase::ShutDown {
            state.live -= 1;
            drop(state);
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
            debug!(pool = %self.name, "Closing connection released after shutdown");
            return;
        }

        if !broken {
            state.idle.push_back(conn);
            drop(state);
            self.idle_ready.notify_one();
            return;
        }

        // The discarded connection's slot is reused for its replacement
        let replace = state.live <= self.config.min_size;
        if !replace {
            state.live -= 1;
        }
        drop(state);
        drop(conn);
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        warn!(pool = %self.name, replace, "Discarded broken connection");

        if replace {
            self.spawn_replacement();
        } else {
            self.idle_ready.notify_one();
        }
    }

    fn spawn_replacement(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(pool = %self.name, "No runtime available to replace broken connection");
            self.forget_one();
            return;
        };

        let shared = Arc::clone(self);
        runtime.spawn(async move {
            match shared.connector.connect().await {
                Ok(conn) => {
                    shared.counters.created.fetch_add(1, Ordering::Relaxed);
                    let mut state = shared.state.lock();
                    if state.phase == PoolPhase::ShutDown {
                        state.live -= 1;
                        drop(state);
                        drop(conn);
                        shared.counters.destroyed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    state.idle.push_back(conn);
                    drop(state);
                    shared.idle_ready.notify_one();
                    debug!(pool = %shared.name, "Replaced broken connection");
                }
                Err(e) => {
                    warn!(pool = %shared.name, "Failed to replace broken connection: {}", e);
                    shared.forget_one();
                }
            }
        });
    }
}

/// Live slot claimed by an in-progress checkout; released unless kept
struct Reservation<'a, C: Connector> {
    shared: &'a Shared<C>,
    kept: bool,
}

impl<'a, C: Connector> Reservation<'a, C> {
    fn new(shared: &'a Shared<C>) -> Self {
        Self {
            shared,
            kept: false,
        }
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl<C: Connector> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if !self.kept {
            self.shared.forget_one();
        }
    }
}

/// A checked-out connection, owned by exactly one caller.
///
/// Dropping the entry returns the connection to the pool, or discards it
/// if it was marked broken.
pub struct PoolEntry<C: Connector> {
    conn: Option<C::Connection>,
    broken: bool,
    shared: Arc<Shared<C>>,
    // Released after the connection is back in the idle set
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> PoolEntry<C> {
    fn new(conn: C::Connection, shared: Arc<Shared<C>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn: Some(conn),
            broken: false,
            shared,
            _permit: permit,
        }
    }

    /// Flag the connection as unusable so release discards it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_marked_broken(&self) -> bool {
        self.broken
    }

    /// Return the connection to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl<C: Connector> Drop for PoolEntry<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.check_in(conn, self.broken);
        }
    }
}

impl<C: Connector> Deref for PoolEntry<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("Entry used after release")
    }
}

impl<C: Connector> DerefMut for PoolEntry<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("Entry used after release")
    }
}

impl<C: Connector> Debug for PoolEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolEntry")
            .field("pool", &self.shared.name)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}
