use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::graph::{DependencyGraph, GraphSource};

/// An immutable, published dependency graph.
#[derive(Debug, Serialize)]
pub struct CacheSnapshot {
    pub graph: DependencyGraph,
    pub built_at: DateTime<Utc>,
    #[serde(skip)]
    built: Instant,
}

impl CacheSnapshot {
    pub fn age(&self) -> Duration {
        self.built.elapsed()
    }
}

/// Lifecycle state of the cache as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Warm,
    Stale,
    Rebuilding,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CacheState::Empty => "empty",
            CacheState::Warm => "warm",
            CacheState::Stale => "stale",
            CacheState::Rebuilding => "rebuilding",
        };
        f.write_str(label)
    }
}

/// Holds the single published dependency graph and keeps it fresh.
///
/// Readers get an `Arc` to the current snapshot and never observe a partial
/// build. Every rebuild (background, forced, overdue) runs under one lock.
pub struct GraphCache {
    source: Arc<dyn GraphSource>,
    ttl: Duration,
    current: RwLock<Option<Arc<CacheSnapshot>>>,
    rebuild: Mutex<()>,
}

impl GraphCache {
    pub fn new(source: Arc<dyn GraphSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Age past which a reader rebuilds synchronously: one and a half TTLs.
    pub fn overdue_after(&self) -> Duration {
        self.ttl + self.ttl / 2
    }

    /// Current snapshot, without side effects.
    pub fn snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.current.read().unwrap().clone()
    }

    pub fn state(&self) -> CacheState {
        if self.rebuild.try_lock().is_err() {
            return CacheState::Rebuilding;
        }
        match self.snapshot() {
            None => CacheState::Empty,
            Some(snap) if snap.age() > self.ttl => CacheState::Stale,
            Some(_) => CacheState::Warm,
        }
    }

    /// Initial synchronous build, run before serving begins.
    pub async fn warm(&self) -> Result<Arc<CacheSnapshot>> {
        self.refresh().await
    }

    /// Rebuild under the lock and publish the result.
    pub async fn refresh(&self) -> Result<Arc<CacheSnapshot>> {
        let guard = self.rebuild.lock().await;
        self.rebuild_locked(&guard).await
    }

    /// Reader entry point.
    ///
    /// `force` always rebuilds before answering. Without it, a missing or
    /// overdue snapshot is rebuilt unless another caller refreshed it while
    /// this one waited for the lock. A failed rebuild falls back to the last
    /// good snapshot; `None` means nothing has ever been built.
    pub async fn get(&self, force: bool) -> Option<Arc<CacheSnapshot>> {
        if force {
            let guard = self.rebuild.lock().await;
            if let Err(e) = self.rebuild_locked(&guard).await {
                log::error!("Forced rebuild failed, serving previous snapshot: {}", e);
            }
            return self.snapshot();
        }

        if let Some(snap) = self.snapshot().filter(|s| !self.is_overdue(s)) {
            return Some(snap);
        }

        let guard = self.rebuild.lock().await;
        if let Some(snap) = self.snapshot().filter(|s| !self.is_overdue(s)) {
            return Some(snap);
        }

        log::warn!("Dependency map missing or overdue, rebuilding on read");
        if let Err(e) = self.rebuild_locked(&guard).await {
            log::error!("Rebuild on read failed, serving previous snapshot: {}", e);
        }
        self.snapshot()
    }

    /// Start the background task that rebuilds every TTL.
    ///
    /// The first rebuild happens one TTL after the call; `warm` covers startup.
    pub fn spawn_refresher(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            log::info!("Starting background refresher (every {:?})", cache.ttl);

            let mut timer = tokio::time::interval(cache.ttl);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await;

            loop {
                timer.tick().await;
                if let Err(e) = cache.refresh().await {
                    log::error!("Background refresh failed, keeping previous snapshot: {}", e);
                }
            }
        })
    }

    fn is_overdue(&self, snap: &CacheSnapshot) -> bool {
        snap.age() > self.overdue_after()
    }

    async fn rebuild_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<Arc<CacheSnapshot>> {
        let graph = self.source.build().await?;

        let mut current = self.current.write().unwrap();
        let mut built_at = Utc::now();
        // build timestamps are strictly increasing
        if let Some(prev) = current.as_ref() {
            if built_at <= prev.built_at {
                built_at = prev.built_at + chrono::Duration::nanoseconds(1);
            }
        }

        let snap = Arc::new(CacheSnapshot {
            graph,
            built_at,
            built: Instant::now(),
        });
        *current = Some(Arc::clone(&snap));
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InspectorError;
    use crate::graph::GraphSummary;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts builds; each graph's `summary.total` is its build number.
    struct CountingSource {
        builds: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay,
            })
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GraphSource for CountingSource {
        async fn build(&self) -> Result<DependencyGraph> {
            tokio::time::sleep(self.delay).await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(InspectorError::Platform("GET /api/states returned 502".to_string()));
            }
            let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(DependencyGraph {
                summary: GraphSummary {
                    total: n,
                    ..GraphSummary::default()
                },
                ..DependencyGraph::default()
            })
        }
    }

    fn cache(source: Arc<CountingSource>, ttl: Duration) -> Arc<GraphCache> {
        Arc::new(GraphCache::new(source, ttl))
    }

    #[tokio::test]
    async fn test_empty_until_warm() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), Duration::from_secs(60));

        assert_eq!(cache.state(), CacheState::Empty);
        assert!(cache.snapshot().is_none());

        cache.warm().await.unwrap();
        assert_eq!(cache.state(), CacheState::Warm);
        assert_eq!(source.builds(), 1);
    }

    #[tokio::test]
    async fn test_fresh_read_does_not_rebuild() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), Duration::from_secs(60));
        cache.warm().await.unwrap();

        for _ in 0..5 {
            assert!(cache.get(false).await.is_some());
        }
        assert_eq!(source.builds(), 1);
    }

    #[tokio::test]
    async fn test_forced_refresh_timestamps_strictly_increase() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), Duration::from_secs(60));
        let before = cache.warm().await.unwrap();

        let first = cache.get(true).await.unwrap();
        let second = cache.get(true).await.unwrap();

        assert!(first.built_at > before.built_at);
        assert!(second.built_at > first.built_at);
        assert_eq!(second.graph.summary.total, 3);
        assert_eq!(source.builds(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_forced_requests_serialize() {
        let source = CountingSource::new(Duration::from_millis(20));
        let cache = cache(source.clone(), Duration::from_secs(60));
        cache.warm().await.unwrap();

        let (a, b) = tokio::join!(cache.get(true), cache.get(true));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(source.builds(), 3);
        assert_ne!(a.built_at, b.built_at);
        let totals = [a.graph.summary.total, b.graph.summary.total];
        assert!(totals.contains(&2) && totals.contains(&3));
    }

    #[tokio::test]
    async fn test_overdue_snapshot_rebuilt_once_under_lock() {
        let source = CountingSource::new(Duration::from_millis(20));
        let cache = cache(source.clone(), Duration::from_millis(40));
        cache.warm().await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.state(), CacheState::Stale);

        let (a, b) = tokio::join!(cache.get(false), cache.get(false));
        assert_eq!(source.builds(), 2);
        assert_eq!(a.unwrap().graph.summary.total, 2);
        assert_eq!(b.unwrap().graph.summary.total, 2);
    }

    #[tokio::test]
    async fn test_stale_within_grace_is_served() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), Duration::from_millis(200));
        cache.warm().await.unwrap();

        tokio::time::sleep(Duration::from_millis(220)).await;
        assert_eq!(cache.state(), CacheState::Stale);
        assert_eq!(cache.get(false).await.unwrap().graph.summary.total, 1);
        assert_eq!(source.builds(), 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_last_good_snapshot() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), Duration::from_secs(60));
        let good = cache.warm().await.unwrap();

        source.failing.store(true, Ordering::SeqCst);
        let served = cache.get(true).await.unwrap();
        assert_eq!(served.built_at, good.built_at);
        assert!(cache.refresh().await.is_err());
    }

    #[tokio::test]
    async fn test_cold_start_failure_reports_not_ready() {
        let source = CountingSource::new(Duration::ZERO);
        source.failing.store(true, Ordering::SeqCst);
        let cache = cache(source.clone(), Duration::from_secs(60));

        assert!(cache.warm().await.is_err());
        assert!(cache.get(false).await.is_none());

        source.failing.store(false, Ordering::SeqCst);
        assert!(cache.get(false).await.is_some());
    }

    #[tokio::test]
    async fn test_background_refresher_rebuilds_every_ttl() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), Duration::from_millis(30));
        cache.warm().await.unwrap();

        let handle = cache.spawn_refresher();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(source.builds() >= 3, "expected periodic rebuilds, got {}", source.builds());
    }

    #[tokio::test]
    async fn test_state_reports_rebuilding() {
        let source = CountingSource::new(Duration::from_millis(100));
        let cache = cache(source.clone(), Duration::from_secs(60));

        let background = Arc::clone(&cache);
        let handle = tokio::spawn(async move { background.warm().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.state(), CacheState::Rebuilding);

        handle.await.unwrap().unwrap();
        assert_eq!(cache.state(), CacheState::Warm);
    }
}
