//! Fire-and-forget lookups
//!
//! Request handlers that must not wait on a provider submit the coordinate
//! here together with a continuation. A single worker drains the channel
//! and runs each job on its own task: the shared rate limiter still paces
//! provider calls, a slow job never holds up the queue, and a panicking
//! continuation only takes down its own task.

use crate::error::QueueError;
use crate::service::{GeocodingService, LookupOutcome};
use crate::Coordinate;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

type Continuation = Box<dyn FnOnce(LookupOutcome) -> BoxFuture<'static, ()> + Send>;

struct Job {
    coord: Coordinate,
    continuation: Continuation,
}

/// Bounded queue of background lookups
pub struct LookupQueue {
    sender: mpsc::Sender<Job>,
    worker: JoinHandle<()>,
}

impl LookupQueue {
    /// Start the worker. Each job gets `budget` for its lookup.
    pub fn spawn(service: Arc<GeocodingService>, capacity: usize, budget: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(service, receiver, budget));
        Self { sender, worker }
    }

    /// Queue a lookup for `coord`; `continuation` runs with the outcome.
    ///
    /// Never waits: a full queue rejects the job.
    pub fn submit<F, Fut>(&self, coord: Coordinate, continuation: F) -> Result<(), QueueError>
    where
        F: FnOnce(LookupOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job = Job {
            coord,
            continuation: Box::new(move |outcome| Box::pin(continuation(outcome))),
        };

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Jobs waiting for the worker
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Stop accepting jobs and wait for queued and running ones to finish
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            error!("Lookup queue worker failed: {}", e);
        }
    }
}

async fn run_worker(
    service: Arc<GeocodingService>,
    mut receiver: mpsc::Receiver<Job>,
    budget: Duration,
) {
    let mut running = FuturesUnordered::new();

    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    running.push(tokio::spawn(run_job(Arc::clone(&service), job, budget)));
                }
                None => break,
            },
            Some(finished) = running.next(), if !running.is_empty() => {
                report(finished);
            }
        }
    }

    debug!(in_flight = running.len(), "Lookup queue closed, draining");
    while let Some(finished) = running.next().await {
        report(finished);
    }
    info!("Lookup queue stopped");
}

async fn run_job(service: Arc<GeocodingService>, job: Job, budget: Duration) {
    let outcome = service.lookup(job.coord, budget).await;
    (job.continuation)(outcome).await;
}

fn report(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            error!("Background lookup panicked: {}", e);
        } else {
            debug!("Background lookup cancelled: {}", e);
        }
    }
}
