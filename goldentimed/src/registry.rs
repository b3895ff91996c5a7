//! Trade registry: run identifier → live run.
//!
//! The registry never touches run state. It holds the receiving end of each
//! run's snapshot channel and its cancellation token; the map itself is
//! guarded by one lock taken only for insert, lookup and removal.
//!
//! At most one live run trades a given symbol on a given venue account.
//! Finished runs stay queryable until the history limit pushes them out,
//! oldest first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use goldentime_domain::{ApiCredentials, RunSnapshot, Symbol, TradeRequest};
use goldentime_exec::{ExchangeGateway, SupervisorClock};

use crate::config::LifecycleConfig;
use crate::controller::TradeLifecycleController;
use crate::error::{DaemonError, DaemonResult};
use crate::session::GatewayFactory;

/// Identifier used by the single-tenant routes.
pub const DEFAULT_RUN: &str = "default";

/// Finished runs kept for status queries.
pub const FINISHED_RUN_HISTORY: usize = 256;

struct RunSlot {
    /// Start order within this registry
    seq: u64,
    account: String,
    symbol: Symbol,
    snapshot: watch::Receiver<RunSnapshot>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<RunSnapshot>>,
}

impl RunSlot {
    fn current(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    fn is_running(&self) -> bool {
        self.snapshot.borrow().running
    }
}

/// Registry of trade runs.
pub struct TradeRegistry {
    runs: RwLock<HashMap<String, RunSlot>>,
    sessions: Arc<dyn GatewayFactory>,
    clock: Arc<dyn SupervisorClock>,
    config: LifecycleConfig,
    history: usize,
    started: AtomicU64,
}

impl TradeRegistry {
    pub fn new(
        sessions: Arc<dyn GatewayFactory>,
        clock: Arc<dyn SupervisorClock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            sessions,
            clock,
            config,
            history: FINISHED_RUN_HISTORY,
            started: AtomicU64::new(0),
        }
    }

    /// Keep at most `limit` finished runs.
    pub fn with_history(mut self, limit: usize) -> Self {
        self.history = limit;
        self
    }

    /// Process-wide gateway for passthrough queries.
    pub fn gateway(&self) -> Arc<dyn ExchangeGateway> {
        self.sessions.shared()
    }

    /// Validate `request` and spawn a run under `id`.
    ///
    /// # Errors
    /// - `InvalidRequest` when the request fails validation
    /// - `RunAlreadyActive` when a non-terminal run holds `id`
    /// - `SymbolBusy` when another live run trades the same symbol on the same account
    pub async fn start(
        &self,
        id: &str,
        request: TradeRequest,
        credentials: Option<ApiCredentials>,
    ) -> DaemonResult<RunSnapshot> {
        request
            .validate(self.clock.now())
            .map_err(|e| DaemonError::InvalidRequest(e.to_string()))?;

        let mut runs = self.runs.write().await;
        if runs.get(id).is_some_and(RunSlot::is_running) {
            warn!(id, "Start rejected, run already active");
            return Err(DaemonError::RunAlreadyActive(id.to_string()));
        }

        let account = self.sessions.account(credentials.as_ref());
        let holder = runs.iter().find(|(_, slot)| {
            slot.is_running() && slot.account == account && slot.symbol == request.symbol
        });
        if let Some((holder, _)) = holder {
            warn!(id, holder = %holder, symbol = %request.symbol, "Start rejected, symbol in use");
            return Err(DaemonError::SymbolBusy {
                symbol: request.symbol.to_string(),
                holder: holder.clone(),
            });
        }

        let symbol = request.symbol.clone();
        let gateway = self.sessions.for_run(credentials.as_ref())?;
        let cancel = CancellationToken::new();
        let run_id = Uuid::now_v7();
        let (controller, snapshot) = TradeLifecycleController::new(
            run_id,
            request,
            gateway,
            self.clock.clone(),
            self.config.clone(),
            cancel.clone(),
        );

        let handle = tokio::spawn(controller.run());
        let slot = RunSlot {
            seq: self.started.fetch_add(1, Ordering::Relaxed),
            account,
            symbol,
            snapshot,
            cancel,
            handle: Some(handle),
        };
        let current = slot.current();
        runs.insert(id.to_string(), slot);
        self.evict_finished(&mut runs);

        info!(id, %run_id, "Trade run accepted");
        Ok(current)
    }

    /// Drop the oldest finished runs beyond the history limit.
    fn evict_finished(&self, runs: &mut HashMap<String, RunSlot>) {
        let mut finished: Vec<(u64, String)> = runs
            .iter()
            .filter(|(_, slot)| !slot.is_running())
            .map(|(id, slot)| (slot.seq, id.clone()))
            .collect();
        if finished.len() <= self.history {
            return;
        }

        finished.sort_unstable();
        let excess = finished.len() - self.history;
        for (_, id) in finished.into_iter().take(excess) {
            if let Some(slot) = runs.remove(&id) {
                debug!(id = %id, run_id = %slot.current().run_id, "Evicted finished run");
            }
        }
    }

    /// Request a cooperative stop of the run under `id`.
    ///
    /// # Errors
    /// `RunNotFound` when `id` has no non-terminal run.
    pub async fn stop(&self, id: &str) -> DaemonResult<RunSnapshot> {
        let runs = self.runs.read().await;
        match runs.get(id) {
            Some(slot) if slot.is_running() => {
                slot.cancel.cancel();
                info!(id, run_id = %slot.current().run_id, "Stop requested");
                Ok(slot.current())
            }
            _ => Err(DaemonError::RunNotFound(id.to_string())),
        }
    }

    /// Last published snapshot, `None` if `id` was never started.
    pub async fn status(&self, id: &str) -> Option<RunSnapshot> {
        self.runs.read().await.get(id).map(RunSlot::current)
    }

    /// All known runs, ordered by identifier.
    pub async fn list(&self) -> Vec<(String, RunSnapshot)> {
        let runs = self.runs.read().await;
        let mut all: Vec<(String, RunSnapshot)> = runs
            .iter()
            .map(|(id, slot)| (id.clone(), slot.current()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of non-terminal runs.
    pub async fn active_count(&self) -> usize {
        self.runs.read().await.values().filter(|slot| slot.is_running()).count()
    }

    /// Wait until the run under `id` reaches a terminal phase.
    pub async fn wait(&self, id: &str) -> Option<RunSnapshot> {
        let mut receiver = self.runs.read().await.get(id)?.snapshot.clone();
        if receiver.wait_for(|snapshot| !snapshot.running).await.is_err() {
            warn!(id, "Run dropped its snapshot channel");
        }
        let finished = receiver.borrow().clone();
        Some(finished)
    }

    /// Stop every active run and wait up to `timeout` for their cleanup.
    ///
    /// Returns the number of runs still unfinished when the wait ended.
    pub async fn stop_all_and_wait(&self, timeout: Duration) -> usize {
        let handles: Vec<(String, JoinHandle<RunSnapshot>)> = {
            let mut runs = self.runs.write().await;
            runs.iter_mut()
                .filter(|(_, slot)| slot.is_running())
                .filter_map(|(id, slot)| {
                    slot.cancel.cancel();
                    slot.handle.take().map(|handle| (id.clone(), handle))
                })
                .collect()
        };

        if handles.is_empty() {
            return 0;
        }
        info!(count = handles.len(), "Stopping active runs");

        let total = handles.len();
        let (ids, handles): (Vec<String>, Vec<JoinHandle<RunSnapshot>>) =
            handles.into_iter().unzip();

        match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(results) => {
                for (id, result) in ids.iter().zip(results) {
                    match result {
                        Ok(snapshot) => info!(id = %id, phase = %snapshot.phase, "Run finished"),
                        Err(e) => error!(id = %id, error = %e, "Run task aborted"),
                    }
                }
                0
            }
            Err(_) => {
                let unfinished = self.active_count().await;
                warn!(total, unfinished, "Timed out waiting for runs to finish");
                unfinished
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
