// Background position reconciliation.
//
// Drains player ids the resolver could not answer, looks them up in batches
// through a `PlayerDirectory`, and writes answers into the resolver cache.
// This task never touches DraftState; picks already recorded as BENCH keep
// that position.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::draft::pick::Position;
use crate::players::PlayerRecord;
use crate::resolver::ResolverCache;

/// A source of authoritative player positions. Lookups may be slow.
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    /// Positions for as many of `player_ids` as the directory knows.
    /// Ids missing from the returned map are unknown.
    async fn lookup_positions(&self, player_ids: &[String]) -> anyhow::Result<HashMap<String, Position>>;
}

/// In-memory directory, typically built from the player CSV.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    positions: HashMap<String, Position>,
}

impl StaticDirectory {
    pub fn new(positions: HashMap<String, Position>) -> Self {
        Self { positions }
    }

    pub fn from_records(records: &[PlayerRecord]) -> Self {
        Self::new(
            records
                .iter()
                .map(|r| (r.player_id.clone(), r.position))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl PlayerDirectory for StaticDirectory {
    async fn lookup_positions(&self, player_ids: &[String]) -> anyhow::Result<HashMap<String, Position>> {
        Ok(player_ids
            .iter()
            .filter_map(|id| self.positions.get(id).map(|pos| (id.clone(), *pos)))
            .collect())
    }
}

/// Batching parameters for the reconciler.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    /// Maximum ids per directory lookup.
    pub batch_size: usize,
    /// How long to keep collecting after the first queued id.
    pub flush_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_millis(250),
        }
    }
}

/// What the reconciler did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub batches: u64,
    pub resolved: u64,
    pub unresolved: u64,
    pub failed_lookups: u64,
}

/// Spawn the reconciliation task. It runs until every sender of `rx` is
/// dropped and returns a report of its work.
pub fn spawn_reconciler(
    rx: mpsc::Receiver<String>,
    cache: ResolverCache,
    directory: Arc<dyn PlayerDirectory>,
    config: ReconcilerConfig,
) -> JoinHandle<ReconcileReport> {
    tokio::spawn(run_reconciler(rx, cache, directory, config))
}

async fn run_reconciler(
    mut rx: mpsc::Receiver<String>,
    cache: ResolverCache,
    directory: Arc<dyn PlayerDirectory>,
    config: ReconcilerConfig,
) -> ReconcileReport {
    let batch_size = config.batch_size.max(1);
    let mut report = ReconcileReport::default();
    let mut batch: Vec<String> = Vec::with_capacity(batch_size);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        let deadline = Instant::now() + config.flush_interval;
        while batch.len() < batch_size {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(id)) => batch.push(id),
                Ok(None) | Err(_) => break,
            }
        }
        resolve_batch(&cache, directory.as_ref(), &mut batch, &mut report).await;
    }

    info!(
        "Position reconciler stopped: {} batches, {} resolved, {} unresolved, {} failed",
        report.batches, report.resolved, report.unresolved, report.failed_lookups
    );
    report
}

async fn resolve_batch(
    cache: &ResolverCache,
    directory: &dyn PlayerDirectory,
    batch: &mut Vec<String>,
    report: &mut ReconcileReport,
) {
    batch.sort();
    batch.dedup();
    // Something else may have seeded these since they were queued.
    batch.retain(|id| !cache.contains(id));
    if batch.is_empty() {
        return;
    }

    report.batches += 1;
    debug!("Looking up positions for {} players", batch.len());

    match directory.lookup_positions(&batch[..]).await {
        Ok(found) => {
            for id in batch.drain(..) {
                match found.get(&id) {
                    Some(&pos) => {
                        cache.insert(id, pos);
                        report.resolved += 1;
                    }
                    None => {
                        cache.clear_pending(&id);
                        report.unresolved += 1;
                        debug!("Directory has no position for player {}", id);
                    }
                }
            }
        }
        Err(e) => {
            warn!("Position lookup failed for {} players: {:#}", batch.len(), e);
            report.failed_lookups += batch.len() as u64;
            for id in batch.drain(..) {
                cache.clear_pending(&id);
            }
        }
    }
}
