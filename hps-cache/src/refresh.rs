//! Background cache refresh.
//!
//! When a batch is mostly served by the fastest tier, its few promotions are
//! queued here instead of being inserted on the lookup path. The queue is
//! bounded; a full queue drops the promotion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use hps_core::config::PromotionMode;
use hps_core::errors::{HpsError, HpsResult};
use hps_core::Key;

use crate::tiered::{promote, TierStack};

/// Vectors to insert into a table's tiers.
pub struct PromotionBatch {
    pub tiers: Arc<TierStack>,
    pub mode: PromotionMode,
    pub dim: usize,
    /// `(key, tier that answered)`; the key goes into faster tiers only.
    pub entries: Vec<(Key, usize)>,
    /// `entries.len() * dim` floats, row-aligned with `entries`.
    pub values: Vec<f32>,
}

impl PromotionBatch {
    fn apply(&self) -> usize {
        promote(&self.tiers, self.mode, self.dim, &self.entries, &self.values)
    }
}

/// Result of handing a batch to the refresher.
pub enum SubmitOutcome {
    Queued,
    /// Queue full; the promotions were discarded.
    Dropped,
    /// Refresher stopped; the caller gets the batch back.
    Closed(PromotionBatch),
}

#[derive(Debug, Default)]
struct RefreshCounters {
    queued: AtomicU64,
    applied: AtomicU64,
    dropped: AtomicU64,
}

/// Cloneable submit side of the refresher.
#[derive(Clone)]
pub struct RefreshHandle {
    jobs: Sender<PromotionBatch>,
    counters: Arc<RefreshCounters>,
}

impl RefreshHandle {
    pub fn submit(&self, batch: PromotionBatch) -> SubmitOutcome {
        match self.jobs.try_send(batch) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Disconnected(batch)) => SubmitOutcome::Closed(batch),
        }
    }
}

/// Owns the refresh worker thread.
pub struct Refresher {
    handle: RefreshHandle,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Start a worker draining a queue of `depth` batches.
    pub fn spawn(depth: usize) -> HpsResult<Self> {
        let (jobs_tx, jobs_rx) = bounded::<PromotionBatch>(depth);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let counters = Arc::new(RefreshCounters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = std::thread::Builder::new()
            .name("hps-refresh".to_string())
            .spawn(move || run(jobs_rx, stop_rx, worker_counters))
            .map_err(|e| HpsError::RuntimeError {
                reason: format!("cannot spawn refresh worker: {e}"),
            })?;

        debug!(depth, "cache refresher started");
        Ok(Self {
            handle: RefreshHandle {
                jobs: jobs_tx,
                counters,
            },
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> RefreshHandle {
        self.handle.clone()
    }

    /// `(queued, applied, dropped)` batch counts.
    pub fn counts(&self) -> (u64, u64, u64) {
        let c = &self.handle.counters;
        (
            c.queued.load(Ordering::Relaxed),
            c.applied.load(Ordering::Relaxed),
            c.dropped.load(Ordering::Relaxed),
        )
    }

    /// Stop the worker. Queued batches not yet applied are discarded.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("cache refresh worker panicked");
            }
            let (queued, applied, dropped) = self.counts();
            info!(queued, applied, dropped, "cache refresher stopped");
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(jobs: Receiver<PromotionBatch>, stop: Receiver<()>, counters: Arc<RefreshCounters>) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(jobs) -> job => match job {
                Ok(batch) => {
                    batch.apply();
                    counters.applied.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => break,
            },
        }
    }
}
