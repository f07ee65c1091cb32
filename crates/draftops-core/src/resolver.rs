// Synchronous player-id -> roster position lookup.
//
// `resolve` runs inside the event processor's write section, so it must never
// block or await. A miss returns `Position::Bench` and queues the id for the
// background reconciler, which fills the cache for later lookups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::draft::pick::Position;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Resolves a player id to the roster position recorded on the pick.
///
/// The method is synchronous: an implementation cannot await, so injecting
/// one into the processor can never suspend the event stream. Implementations
/// must also not block on I/O; unknown ids resolve to `Position::Bench`.
pub trait PositionResolver: Send + Sync {
    fn resolve(&self, player_id: &str) -> Position;
}

/// Plain functions and closures work as resolvers.
impl<F> PositionResolver for F
where
    F: Fn(&str) -> Position + Send + Sync,
{
    fn resolve(&self, player_id: &str) -> Position {
        self(player_id)
    }
}

/// Resolver used before one is injected: everything is `Bench`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BenchResolver;

impl PositionResolver for BenchResolver {
    fn resolve(&self, _player_id: &str) -> Position {
        Position::Bench
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Concurrent position cache shared by the resolver and the reconciler.
///
/// Entries are never removed. `pending` tracks ids already queued for
/// reconciliation so a burst of misses queues each id once.
#[derive(Debug, Clone, Default)]
pub struct ResolverCache {
    positions: Arc<DashMap<String, Position>>,
    pending: Arc<DashSet<String>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player_id: &str) -> Option<Position> {
        self.positions.get(player_id).map(|entry| *entry.value())
    }

    /// Record a resolved position and clear any pending request for it.
    pub fn insert(&self, player_id: impl Into<String>, position: Position) {
        let player_id = player_id.into();
        self.pending.remove(&player_id);
        self.positions.insert(player_id, position);
    }

    /// Seed the cache in bulk, e.g. from a player file at startup.
    pub fn extend<I, S>(&self, entries: I)
    where
        I: IntoIterator<Item = (S, Position)>,
        S: Into<String>,
    {
        for (id, pos) in entries {
            self.insert(id, pos);
        }
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.positions.contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Mark an id as queued. Returns false if it already was.
    pub(crate) fn mark_pending(&self, player_id: &str) -> bool {
        self.pending.insert(player_id.to_string())
    }

    /// Allow an id to be queued again after a failed or empty lookup.
    pub(crate) fn clear_pending(&self, player_id: &str) {
        self.pending.remove(player_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Cached resolver
// ---------------------------------------------------------------------------

/// Counters describing resolver traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub hits: u64,
    pub misses: u64,
    pub queued: u64,
    pub dropped: u64,
}

/// Read-through cache resolver with a non-blocking miss queue.
pub struct CachedPositionResolver {
    cache: ResolverCache,
    queue: Option<mpsc::Sender<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
}

impl CachedPositionResolver {
    /// A resolver that answers from the cache only; misses are not queued.
    pub fn new(cache: ResolverCache) -> Self {
        Self {
            cache,
            queue: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// A resolver whose misses are queued for background reconciliation.
    /// Hand the returned receiver to [`crate::reconcile::spawn_reconciler`].
    pub fn with_queue(cache: ResolverCache, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut resolver = Self::new(cache);
        resolver.queue = Some(tx);
        (resolver, rx)
    }

    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, player_id: &str) {
        let Some(queue) = &self.queue else {
            return;
        };
        if !self.cache.mark_pending(player_id) {
            return;
        }
        match queue.try_send(player_id.to_string()) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::Relaxed);
                debug!("Queued player {} for position lookup", player_id);
            }
            Err(TrySendError::Full(_)) => {
                self.cache.clear_pending(player_id);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Resolution queue full, dropped lookup for {}", player_id);
            }
            Err(TrySendError::Closed(_)) => {
                self.cache.clear_pending(player_id);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Resolution queue closed, not queuing {}", player_id);
            }
        }
    }
}

impl PositionResolver for CachedPositionResolver {
    fn resolve(&self, player_id: &str) -> Position {
        if let Some(pos) = self.cache.get(player_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return pos;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.enqueue(player_id);
        Position::Bench
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_player_resolves_to_cached_position() {
        let cache = ResolverCache::new();
        cache.insert("cached_player", Position::Quarterback);
        let resolver = CachedPositionResolver::new(cache);
        assert_eq!(resolver.resolve("cached_player"), Position::Quarterback);
        assert_eq!(resolver.stats().hits, 1);
    }

    #[test]
    fn unknown_player_resolves_to_bench() {
        let resolver = CachedPositionResolver::new(ResolverCache::new());
        assert_eq!(resolver.resolve("test_player_123"), Position::Bench);
        assert_eq!(resolver.stats().misses, 1);
        // No queue configured, nothing is queued
        assert_eq!(resolver.stats().queued, 0);
    }

    #[test]
    fn misses_are_queued_once() {
        let (resolver, mut rx) = CachedPositionResolver::with_queue(ResolverCache::new(), 16);
        assert_eq!(resolver.resolve("player1"), Position::Bench);
        assert_eq!(resolver.resolve("player1"), Position::Bench);
        assert_eq!(resolver.resolve("player2"), Position::Bench);

        assert_eq!(rx.try_recv().unwrap(), "player1");
        assert_eq!(rx.try_recv().unwrap(), "player2");
        assert!(rx.try_recv().is_err());
        assert_eq!(resolver.stats().queued, 2);
        assert_eq!(resolver.cache().pending_count(), 2);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (resolver, _rx) = CachedPositionResolver::with_queue(ResolverCache::new(), 1);
        resolver.resolve("a");
        resolver.resolve("b");
        let stats = resolver.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.dropped, 1);
        // "b" can be queued again later
        assert_eq!(resolver.cache().pending_count(), 1);
    }

    #[test]
    fn closed_queue_degrades_to_bench() {
        let (resolver, rx) = CachedPositionResolver::with_queue(ResolverCache::new(), 4);
        drop(rx);
        assert_eq!(resolver.resolve("gone"), Position::Bench);
        assert_eq!(resolver.stats().dropped, 1);
    }

    #[test]
    fn rapid_sequential_calls_all_return_immediately() {
        let cache = ResolverCache::new();
        cache.insert("known", Position::TightEnd);
        let (resolver, _rx) = CachedPositionResolver::with_queue(cache, 256);
        for i in 0..200 {
            assert_eq!(resolver.resolve(&format!("rapid_player_{i}")), Position::Bench);
            assert_eq!(resolver.resolve("known"), Position::TightEnd);
        }
        assert_eq!(resolver.stats().hits, 200);
        assert_eq!(resolver.stats().misses, 200);
    }

    #[test]
    fn repeated_resolution_is_stable() {
        let cache = ResolverCache::new();
        cache.insert("3918298", Position::RunningBack);
        let resolver = CachedPositionResolver::new(cache);
        assert_eq!(resolver.resolve("3918298"), resolver.resolve("3918298"));
    }

    #[test]
    fn insert_clears_pending() {
        let cache = ResolverCache::new();
        assert!(cache.mark_pending("x"));
        assert!(!cache.mark_pending("x"));
        cache.insert("x", Position::Kicker);
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.get("x"), Some(Position::Kicker));
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = |id: &str| {
            if id.starts_with('9') {
                Position::Defense
            } else {
                Position::Bench
            }
        };
        assert_eq!(resolver.resolve("9001"), Position::Defense);
        assert_eq!(BenchResolver.resolve("9001"), Position::Bench);
    }
}
