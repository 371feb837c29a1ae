//! Periodic removal of expired cache entries

use crate::cache::TtlCache;
use crate::clock::deadline_after;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Sweep `cache` every `every` until `shutdown` flips to `true` or its
/// sender is dropped
pub fn spawn_sweeper<K, V>(
    cache: Arc<TtlCache<K, V>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(deadline_after(Instant::now(), every), every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Cache sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache: Arc<TtlCache<u32, u32>> = Arc::new(TtlCache::new(Duration::from_secs(30)));
        cache.insert(1, 1);
        cache.put(2, 2, Duration::from_secs(300));

        let (stop, stopped) = watch::channel(false);
        let sweeper = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(60), stopped);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);

        stop.send(true).unwrap();
        sweeper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_sender_dropped() {
        let cache: Arc<TtlCache<u32, u32>> = Arc::new(TtlCache::new(Duration::from_secs(1)));
        let (stop, stopped) = watch::channel(false);
        let sweeper = spawn_sweeper(cache, Duration::from_secs(10), stopped);

        drop(stop);
        sweeper.await.unwrap();
    }
}
