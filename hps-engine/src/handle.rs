//! ServingHandle: lifecycle and entry points of one engine instance.
//!
//! State machine: `Uninitialized → Initializing → Ready → ShuttingDown →
//! Closed`. A failed initialization returns to `Uninitialized` with nothing
//! exposed. Lookups are accepted only in `Ready`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use hps_core::config::HpsConfig;
use hps_core::constants::VERSION;
use hps_core::errors::{HpsError, HpsResult};
use hps_core::{EngineState, Key, KeyBatch, VectorBatch, VectorDtype};

use crate::engine::Engine;
use crate::status::EngineStatus;

struct Inner {
    id: Uuid,
    config: HpsConfig,
    state: AtomicU8,
    engine: RwLock<Option<Arc<Engine>>>,
    initialized_at: RwLock<Option<DateTime<Utc>>>,
    admission: Arc<Semaphore>,
}

/// Cheaply cloneable handle to one parameter server instance.
///
/// Independent handles share nothing and may coexist in one process.
#[derive(Clone)]
pub struct ServingHandle {
    inner: Arc<Inner>,
}

impl ServingHandle {
    /// Create an uninitialized handle. Nothing is loaded until
    /// [`initialize`](Self::initialize).
    pub fn new(config: HpsConfig) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_inflight_lookups.max(1)));
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                state: AtomicU8::new(EngineState::Uninitialized.as_u8()),
                engine: RwLock::new(None),
                initialized_at: RwLock::new(None),
                admission,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &HpsConfig {
        &self.inner.config
    }

    fn transition(&self, from: EngineState, to: EngineState) -> Result<(), EngineState> {
        self.inner
            .state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(EngineState::from_u8)
    }

    fn set_state(&self, state: EngineState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    /// Load configuration and tables and allocate tiers.
    ///
    /// Only valid from `Uninitialized`; a concurrent or repeated call fails
    /// with `InvalidState`. On failure the handle returns to `Uninitialized`.
    pub fn initialize(&self) -> HpsResult<()> {
        self.transition(EngineState::Uninitialized, EngineState::Initializing)
            .map_err(|state| HpsError::InvalidState {
                operation: "initialize",
                state,
            })?;
        let _span = crate::init_span!(self.inner.id).entered();
        info!(version = VERSION, "initializing parameter server");

        match Engine::build(&self.inner.config) {
            Ok(engine) => {
                *write(&self.inner.engine) = Some(Arc::new(engine));
                *write(&self.inner.initialized_at) = Some(Utc::now());
                self.set_state(EngineState::Ready);
                info!("parameter server ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(EngineState::Uninitialized);
                warn!(error = %e, "initialization failed");
                Err(e)
            }
        }
    }

    /// Release tiers and stop background work. Idempotent; a no-op once
    /// `Closed`. Fails only while initialization is in progress.
    pub fn shutdown(&self) -> HpsResult<()> {
        let mut observed = EngineState::Ready;
        loop {
            let next = match observed {
                EngineState::Ready => EngineState::ShuttingDown,
                // Nothing was loaded; close directly.
                EngineState::Uninitialized => EngineState::Closed,
                EngineState::Initializing => {
                    return Err(HpsError::InvalidState {
                        operation: "shutdown",
                        state: EngineState::Initializing,
                    })
                }
                EngineState::ShuttingDown | EngineState::Closed => return Ok(()),
            };
            match self.transition(observed, next) {
                Ok(()) if next == EngineState::Closed => return Ok(()),
                Ok(()) => break,
                Err(current) => observed = current,
            }
        }

        info!(id = %self.inner.id, "shutting down parameter server");
        let engine = write(&self.inner.engine).take();
        if let Some(engine) = engine {
            engine.release();
        }
        self.set_state(EngineState::Closed);
        info!("parameter server closed");
        Ok(())
    }

    fn ready_engine(&self) -> HpsResult<Arc<Engine>> {
        let state = self.state();
        if state != EngineState::Ready {
            return Err(HpsError::NotReady { state });
        }
        read(&self.inner.engine)
            .clone()
            .ok_or_else(|| HpsError::NotReady { state: self.state() })
    }

    /// Vectors for a `[batch_size, slot_num]` key batch, in input order.
    ///
    /// Keys absent from the table get its default vector. Shape, dtype and
    /// table errors fail this call only.
    pub fn lookup(
        &self,
        model_name: &str,
        table_id: u32,
        embed_vec_size: usize,
        dtype: VectorDtype,
        keys: KeyBatch<'_>,
    ) -> HpsResult<VectorBatch> {
        self.ready_engine()?
            .lookup(model_name, table_id, embed_vec_size, dtype, keys)
    }

    /// [`lookup`](Self::lookup) for async callers.
    ///
    /// Admission is bounded by `max_inflight_lookups`; resolution runs on
    /// tokio's blocking pool. Dropping the future abandons the result only.
    pub async fn lookup_async(
        &self,
        model_name: String,
        table_id: u32,
        embed_vec_size: usize,
        dtype: VectorDtype,
        keys: Vec<Key>,
        width: usize,
    ) -> HpsResult<VectorBatch> {
        let permit = Arc::clone(&self.inner.admission)
            .acquire_owned()
            .await
            .map_err(|e| HpsError::RuntimeError {
                reason: format!("lookup admission closed: {e}"),
            })?;
        let engine = self.ready_engine()?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.lookup(
                &model_name,
                table_id,
                embed_vec_size,
                dtype,
                KeyBatch::new(&keys, width),
            )
        })
        .await
        .map_err(|e| HpsError::RuntimeError {
            reason: format!("lookup task failed: {e}"),
        })?
    }

    /// Eagerly load `keys` of one table into its tiers. Returns how many
    /// were present in the table.
    pub fn warm_up(&self, model_name: &str, table_id: u32, keys: &[Key]) -> HpsResult<usize> {
        self.ready_engine()?.warm_up(model_name, table_id, keys)
    }

    pub fn status(&self) -> EngineStatus {
        let initialized_at = *read(&self.inner.initialized_at);
        let engine = read(&self.inner.engine).clone();
        EngineStatus {
            id: self.inner.id,
            version: VERSION,
            state: self.state(),
            initialized_at,
            uptime_secs: initialized_at
                .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
                .unwrap_or(0),
            worker_threads: engine
                .as_ref()
                .map_or_else(|| self.inner.config.resolved_worker_threads(), |e| e.workers()),
            tables: engine.map(|e| e.table_status()).unwrap_or_default(),
        }
    }

    /// Status plus lookup and refresh counters as JSON.
    pub fn metrics_snapshot(&self) -> HpsResult<serde_json::Value> {
        let status = serde_json::to_value(self.status())?;
        let engine = read(&self.inner.engine).clone();
        let counters = engine.as_ref().map(|e| e.counters()).unwrap_or_default();
        let (queued, applied, dropped) =
            engine.map(|e| e.refresh_counts()).unwrap_or((0, 0, 0));

        Ok(serde_json::json!({
            "status": status,
            "lookups": serde_json::to_value(counters)?,
            "refresh": {
                "queued": queued,
                "applied": applied,
                "dropped": dropped,
            },
        }))
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl std::fmt::Debug for ServingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}
