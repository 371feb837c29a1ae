use crate::{Connection, Connector, PoolError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    next_id: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    fail_connects: AtomicBool,
    fail_pings: AtomicBool,
}

/// A connector that counts connects and closes for testing
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
    connect_delay: Duration,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate handshake latency on every connect
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Make subsequent connects fail
    pub fn fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make pings on every connection fail
    pub fn fail_pings(&self, fail: bool) {
        self.state.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Successful connects so far
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Connections destroyed so far
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn open(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections
    pub fn peak_open(&self) -> usize {
        self.state.peak_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, PoolError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.state.fail_connects.load(Ordering::SeqCst) {
            return Err(PoolError::connect("mock backend refused connection"));
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open.fetch_max(open, Ordering::SeqCst);

        Ok(MockConnection {
            id,
            broken: false,
            state: Arc::clone(&self.state),
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Connection produced by [`MockConnector`]
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    broken: bool,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Connect order, starting at 0
    pub fn id(&self) -> usize {
        self.id
    }

    /// Simulate a transport failure
    pub fn break_transport(&mut self) {
        self.broken = true;
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn ping(&mut self) -> Result<(), PoolError> {
        if self.state.fail_pings.load(Ordering::SeqCst) {
            return Err(PoolError::health_check("mock ping failed"));
        }
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}
