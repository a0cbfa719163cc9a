use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ContainerStats, Entity, FetchResult, HostInfo, MetricsApi, NetworkCounters};
use crate::history::{EntityHistory, HistoryStore, Retention, RetentionWindow};
use crate::logs::{self, LogRecord};
use crate::selection::{SelectionStore, SelectionTracker};

/// Poll cycle state. At most one cycle runs at a time; a tick landing while
/// a cycle is in flight is dropped, never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    InFlight,
}

/// Per-entity portion of a snapshot, present only when an active entity was
/// resolved this cycle. Each fetched field fails independently.
#[derive(Debug, Clone)]
pub struct ActiveSnapshot {
    pub id: String,
    pub stats: FetchResult<ContainerStats>,
    pub network: FetchResult<NetworkCounters>,
    pub logs: FetchResult<Vec<LogRecord>>,
    /// Rolling history of the active entity as of this cycle.
    pub history: EntityHistory,
}

/// Read-only bundle handed to the rendering boundary after a cycle.
///
/// A failed fetch is carried as its error so the renderer can show an
/// explicit "unavailable" marker instead of a stale-looking value.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: SystemTime,
    pub entities: FetchResult<Vec<Entity>>,
    pub host_info: FetchResult<HostInfo>,
    pub active: Option<ActiveSnapshot>,
}

/// Consumer of snapshots. Rendering itself is outside the core.
pub trait RenderSink: Send + Sync {
    fn publish(&self, snapshot: &Snapshot);
}

/// One dashboard session: the history store, the selection tracker, the API
/// client, and the poll-state flag, owned together so no state hides in
/// globals.
///
/// The store is single-writer (the cycle), multi-reader (render views); all
/// store mutation is synchronous and never spans an await point.
pub struct DashboardSession<A, S> {
    api: A,
    store: RwLock<HistoryStore>,
    tracker: Mutex<SelectionTracker<S>>,
    in_flight: AtomicBool,
}

impl<A: MetricsApi, S: SelectionStore> DashboardSession<A, S> {
    pub fn new(api: A, retention: Retention, selection: S) -> Self {
        Self {
            api,
            store: RwLock::new(HistoryStore::new(retention)),
            tracker: Mutex::new(SelectionTracker::new(selection)),
            in_flight: AtomicBool::new(false),
        }
    }

    /// The API client driving this session.
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn poll_state(&self) -> PollState {
        if self.in_flight.load(Ordering::SeqCst) {
            PollState::InFlight
        } else {
            PollState::Idle
        }
    }

    /// Read-only view of one entity's history.
    pub fn history(&self, id: &str) -> Option<EntityHistory> {
        self.store.read().snapshot(id)
    }

    /// Switch the retention window, re-filtering existing history.
    pub fn set_window(&self, window: RetentionWindow) {
        self.store.write().set_window(window);
    }

    /// Empty one entity's series without forgetting the entity.
    pub fn clear_history(&self, id: &str) {
        self.store.write().clear(id);
    }

    /// Run one poll cycle, unless one is already in flight.
    ///
    /// Returns `None` when the re-entrancy guard dropped this invocation.
    /// The guard settles back to Idle whatever happens inside the cycle, so
    /// a failed cycle can never lock out future polling.
    pub async fn run_cycle(&self) -> Option<Snapshot> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("cycle already in flight, tick dropped");
            return None;
        }

        let snapshot = self.cycle(SystemTime::now()).await;

        self.in_flight.store(false, Ordering::SeqCst);

        Some(snapshot)
    }

    /// The cycle body. Infallible by construction: every request failure is
    /// downgraded to an unavailable field in the snapshot.
    async fn cycle(&self, now: SystemTime) -> Snapshot {
        // 1. Entity listing and host info are independent requests; neither
        //    failure blocks the other's result.
        let (entities, host_info) =
            tokio::join!(self.api.fetch_entities(), self.api.fetch_host_info());

        if let Err(e) = &entities {
            warn!(error = %e, "entity listing unavailable");
        }
        if let Err(e) = &host_info {
            warn!(error = %e, "host info unavailable");
        }

        // 2. Resolve the active entity. A failed listing carries no ids, so
        //    it short-circuits like an empty one.
        let ids: Vec<String> = entities
            .as_ref()
            .map(|list| list.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default();

        let active_id = if ids.is_empty() {
            if entities.is_ok() {
                debug!("no entities available this cycle");
            }
            None
        } else {
            self.tracker.lock().resolve(&ids)
        };

        let active = match active_id {
            None => None,
            Some(id) => Some(self.fetch_active(id, now).await),
        };

        Snapshot {
            taken_at: now,
            entities,
            host_info,
            active,
        }
    }

    /// Steps 3–4: per-entity fetches and the history append.
    async fn fetch_active(&self, id: String, now: SystemTime) -> ActiveSnapshot {
        // 3. The three id-scoped requests run concurrently and fail
        //    independently.
        let (stats, network, log_tail) = tokio::join!(
            self.api.fetch_stats(&id),
            self.api.fetch_network(&id),
            self.api.fetch_logs(&id),
        );

        if let Err(e) = &stats {
            warn!(entity = %id, error = %e, "stats unavailable");
        }
        if let Err(e) = &network {
            warn!(entity = %id, error = %e, "network counters unavailable");
        }
        if let Err(e) = &log_tail {
            warn!(entity = %id, error = %e, "log tail unavailable");
        }

        // 4. Append only when stats arrived; failed network counters are
        //    coerced to zero so the four series stay in lockstep. The
        //    append plus retention runs to completion under the write lock
        //    with no suspension point inside.
        if let Ok(stats) = &stats {
            let counters = network.as_ref().map(|c| *c).unwrap_or_default();
            self.store.write().append(
                &id,
                now,
                stats.cpu_percent,
                stats.memory_percent,
                counters.rx_bytes as f64,
                counters.tx_bytes as f64,
            );
        }

        let history = self.store.read().snapshot(&id).unwrap_or_default();

        ActiveSnapshot {
            id,
            stats,
            network,
            logs: log_tail.map(|tail| logs::structure_tail(&tail)),
            history,
        }
    }
}

/// Spawn the timer-driven poller. Ticks that land while a cycle is in
/// flight are skipped, bounding concurrent requests under slow networks;
/// request failures never stop the ticker.
pub fn spawn_poller<A, S, R>(
    session: Arc<DashboardSession<A, S>>,
    sink: Arc<R>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    A: MetricsApi + 'static,
    S: SelectionStore + 'static,
    R: RenderSink + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Some(snapshot) = session.run_cycle().await {
                        sink.publish(&snapshot);
                    }
                }
            }
        }
    })
}
