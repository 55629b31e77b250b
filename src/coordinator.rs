//! ==============================================================================
//! coordinator.rs - the device shadow and command-delivery coordinator
//! ==============================================================================
//!
//! purpose:
//!     owns everything the hub knows about the device and is the only thing
//!     that mutates it:
//!
//! ```text
//!     ┌──────────────────────── Coordinator ─────────────────────────┐
//!     │  Mutex<Shadow>                                               │
//!     │    ├─ SnapshotStore    last reading     (snapshot.rs)        │
//!     │    ├─ LivenessTracker  last heartbeat   (liveness.rs)        │
//!     │    ├─ CommandInbox     pending commands (inbox.rs)           │
//!     │    ├─ ActuatorDisplay  led state shown to operators          │
//!     │    └─ ActivityLog      operator-facing events (activity.rs)  │
//!     │                                                              │
//!     │  Arc<dyn ReadingGateway>  hosted store   (gateway/)          │
//!     │  Arc<dyn Clock>           wall clock     (clock.rs)          │
//!     └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! locking rules:
//!     - one lock for the whole shadow; every critical section is short and
//!       never awaits anything but the lock itself
//!     - the gateway is NEVER called while the lock is held
//!     - store calls are bounded by `store_timeout`; failures are logged and
//!       never undo the in-memory state
//!
//! check-in ordering (one device poll):
//!     heartbeat ──► ingest (if reading) ──► drain inbox ──► reply
//!     all under a single lock acquisition; the durable write is spawned
//!     after the lock is released.
//!
//! relationships:
//!     - used by: http.rs (one Arc<Coordinator> shared by every handler)
//!     - used by: main.rs (cold start reconcile, liveness sweep)
//!
//! ==============================================================================

use crate::activity::{ActivityEntry, ActivityLog, Level};
use crate::clock::{Clock, SystemClock};
use crate::config::HubConfig;
use crate::domain::{ReadingPayload, Snapshot, StoredReading};
use crate::error::{StoreError, ValidationError};
use crate::gateway::ReadingGateway;
use crate::inbox::{ActuatorDisplay, Command, CommandClass, CommandInbox, DrainedCommands};
use crate::liveness::{LivenessState, LivenessTracker};
use crate::snapshot::SnapshotStore;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

// ==============================================================================
// settings
// ==============================================================================

#[derive(Clone, Debug)]
pub struct CoordinatorSettings {
    pub heartbeat_timeout: Duration,
    pub store_timeout: Duration,
    pub activity_capacity: usize,
    /// written into every stored row when set
    pub device_id: Option<String>,
    /// log every accepted reading at info level
    pub show_sensor_data: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(crate::liveness::DEFAULT_TIMEOUT_SECONDS),
            store_timeout: Duration::from_secs(3),
            activity_capacity: crate::activity::DEFAULT_CAPACITY,
            device_id: None,
            show_sensor_data: false,
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            heartbeat_timeout: config.liveness.timeout(),
            store_timeout: config.store.timeout(),
            activity_capacity: config.activity.capacity,
            device_id: config.store.device_id.clone(),
            show_sensor_data: config.logging.show_sensor_data,
        }
    }
}

// ==============================================================================
// results handed back to callers
// ==============================================================================

/// What the device gets back from a check-in.
#[derive(Clone, Debug, Serialize)]
pub struct CheckInReply {
    pub status: &'static str,
    pub reading_accepted: bool,
    pub server_time: DateTime<Utc>,
    #[serde(flatten)]
    pub commands: DrainedCommands,
    pub data: Option<Snapshot>,
}

/// A check-in result plus the handle of the background durable write, if a
/// reading was accepted. Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct CheckIn {
    pub reply: CheckInReply,
    pub persist: Option<JoinHandle<PersistOutcome>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PersistOutcome {
    Saved,
    Failed { kind: &'static str, message: String },
}

impl PersistOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, PersistOutcome::Saved)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct IngestOutcome {
    pub snapshot: Snapshot,
    pub persisted: PersistOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// cold start: the empty shadow was filled from the store
    Restored,
    /// the store held a newer reading than the shadow
    Refreshed,
    /// the shadow is already at least as new as the store
    Unchanged,
    StoreEmpty,
    StoreFailed { kind: &'static str, message: String },
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Restored => "restored",
            ReconcileOutcome::Refreshed => "refreshed",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::StoreEmpty => "store_empty",
            ReconcileOutcome::StoreFailed { kind, .. } => *kind,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EnqueueReceipt {
    pub class: CommandClass,
    /// true when an undelivered command of the same class was overwritten
    pub replaced: bool,
    #[serde(flatten)]
    pub display: ActuatorDisplay,
}

#[derive(Clone, Debug, Serialize)]
pub struct LivenessReport {
    pub status: LivenessState,
    pub connected: bool,
    pub seconds_since_contact: Option<f64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub last_communication_test: Option<DateTime<Utc>>,
    pub timeout_seconds: i64,
}

/// Everything the dashboard shows in one read.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardView {
    pub snapshot: Option<Snapshot>,
    /// capture time as text, "N/A" before the first reading
    pub last_update: String,
    pub liveness: LivenessReport,
    pub pending_commands: Vec<CommandClass>,
    #[serde(flatten)]
    pub display: ActuatorDisplay,
    pub activity: Vec<ActivityEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileOutcome>,
}

// ==============================================================================
// shadow state
// ==============================================================================

struct Shadow {
    snapshot: SnapshotStore,
    liveness: LivenessTracker,
    inbox: CommandInbox,
    display: ActuatorDisplay,
    activity: ActivityLog,
    last_reading_at: Option<DateTime<Utc>>,
    last_communication_test: Option<DateTime<Utc>>,
    /// last state the sweep saw; only used to log transitions
    swept_state: LivenessState,
    /// label of the previous reconcile outcome
    last_reconcile: Option<&'static str>,
}

impl Shadow {
    fn liveness_report(&self, now: DateTime<Utc>) -> LivenessReport {
        let status = self.liveness.status(now);
        LivenessReport {
            status,
            connected: status.is_connected(),
            seconds_since_contact: self.liveness.seconds_since_contact(now),
            last_heartbeat: self.liveness.last_heartbeat(),
            last_reading_at: self.last_reading_at,
            last_communication_test: self.last_communication_test,
            timeout_seconds: self.liveness.timeout().num_seconds(),
        }
    }
}

// ==============================================================================
// coordinator
// ==============================================================================

pub struct Coordinator {
    shadow: Mutex<Shadow>,
    gateway: Arc<dyn ReadingGateway>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    device_id: Option<String>,
    show_sensor_data: bool,
}

impl Coordinator {
    pub fn new(gateway: Arc<dyn ReadingGateway>, settings: CoordinatorSettings) -> Self {
        Self::with_clock(gateway, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: Arc<dyn ReadingGateway>,
        settings: CoordinatorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shadow = Shadow {
            snapshot: SnapshotStore::new(),
            liveness: LivenessTracker::new(settings.heartbeat_timeout),
            inbox: CommandInbox::new(),
            display: ActuatorDisplay::default(),
            activity: ActivityLog::new(settings.activity_capacity),
            last_reading_at: None,
            last_communication_test: None,
            swept_state: LivenessState::NeverSeen,
            last_reconcile: None,
        };
        Self {
            shadow: Mutex::new(shadow),
            gateway,
            clock,
            store_timeout: settings.store_timeout,
            device_id: settings.device_id,
            show_sensor_data: settings.show_sensor_data,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn ReadingGateway> {
        &self.gateway
    }

    // --------------------------------------------------------------------------
    // device side
    // --------------------------------------------------------------------------

    /// One device poll.
    ///
    /// The heartbeat is recorded even when the reading is rejected. On a
    /// validation error nothing is drained, so pending commands wait for the
    /// next good check-in instead of being lost with an error response.
    pub async fn check_in(
        self: &Arc<Self>,
        payload: Option<&ReadingPayload>,
    ) -> Result<CheckIn, ValidationError> {
        let now = self.clock.now();
        let (reply, row) = {
            let mut shadow = self.shadow.lock().await;
            shadow.liveness.record_heartbeat(now);

            let row = match payload {
                Some(payload) => Some(self.accept(&mut shadow, payload, now)?),
                None => None,
            };

            let commands = shadow.inbox.drain_all();
            if !commands.is_empty() {
                let classes: Vec<_> = commands.classes().iter().map(|c| c.as_str()).collect();
                shadow
                    .activity
                    .push(now, Level::Info, format!("delivered to device: {}", classes.join(", ")));
            }

            let reply = CheckInReply {
                status: "success",
                reading_accepted: row.is_some(),
                server_time: now,
                commands,
                data: shadow.snapshot.current().cloned(),
            };
            (reply, row)
        };

        let persist = row.map(|row| {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.persist(row).await })
        });
        Ok(CheckIn { reply, persist })
    }

    /// Accept a reading and wait for the durable write.
    ///
    /// A store failure is reported in the outcome, never as an error: the
    /// reading is already the current snapshot by the time the store is
    /// called.
    pub async fn ingest(&self, payload: &ReadingPayload) -> Result<IngestOutcome, ValidationError> {
        let now = self.clock.now();
        let (row, snapshot) = {
            let mut shadow = self.shadow.lock().await;
            let row = self.accept(&mut shadow, payload, now)?;
            shadow.liveness.record_heartbeat(now);
            (row, shadow.snapshot.current().cloned())
        };
        let persisted = self.persist(row.clone()).await;
        Ok(IngestOutcome { snapshot: snapshot.unwrap_or_else(|| row.to_snapshot()), persisted })
    }

    /// A check-in we could not even parse. Still proof of life.
    pub async fn heartbeat(&self) {
        let now = self.clock.now();
        self.shadow.lock().await.liveness.record_heartbeat(now);
    }

    /// The device answering a communication test.
    pub async fn acknowledge_communication_test(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut shadow = self.shadow.lock().await;
        shadow.liveness.record_heartbeat(now);
        shadow.last_communication_test = Some(now);
        shadow.activity.push(now, Level::Info, "communication test acknowledged by device");
        now
    }

    /// validate + replace the snapshot. caller holds the lock.
    fn accept(
        &self,
        shadow: &mut Shadow,
        payload: &ReadingPayload,
        now: DateTime<Utc>,
    ) -> Result<StoredReading, ValidationError> {
        let reading = match payload.validate() {
            Ok(reading) => reading,
            Err(e) => {
                shadow.activity.push(now, Level::Warning, format!("rejected reading: {e}"));
                return Err(e);
            }
        };
        let snapshot = shadow.snapshot.ingest(reading, now);
        shadow.last_reading_at = Some(now);
        if self.show_sensor_data {
            tracing::info!(
                t1 = reading.temperature1,
                h1 = reading.humidity1,
                t2 = reading.temperature2,
                h2 = reading.humidity2,
                soil1 = reading.soil_moisture1,
                soil2 = reading.soil_moisture2,
                uv = reading.uv_index,
                "reading accepted"
            );
        }
        Ok(StoredReading::from_snapshot(snapshot, self.device_id.clone()))
    }

    /// Durable write. Must be called without the shadow lock held.
    async fn persist(&self, row: StoredReading) -> PersistOutcome {
        let result = self.bounded(self.gateway.save(&row)).await;
        let now = self.clock.now();
        let mut shadow = self.shadow.lock().await;
        match result {
            Ok(()) => {
                shadow.activity.push(
                    now,
                    Level::Info,
                    format!("reading saved to store: T1={}, H1={}", row.temperature1, row.humidity1),
                );
                PersistOutcome::Saved
            }
            Err(e) => {
                tracing::warn!(backend = self.gateway.backend_tag(), kind = e.kind(), error = %e, "store write failed");
                shadow
                    .activity
                    .push(now, Level::Error, format!("reading kept in memory but not saved to store: {e}"));
                PersistOutcome::Failed { kind: e.kind(), message: e.to_string() }
            }
        }
    }

    // --------------------------------------------------------------------------
    // operator side
    // --------------------------------------------------------------------------

    /// Queue a command for the device's next check-in.
    pub async fn enqueue(&self, command: Command) -> EnqueueReceipt {
        let now = self.clock.now();
        let mut shadow = self.shadow.lock().await;
        if let Command::Actuator(action) = command {
            shadow.display.apply(action);
        }
        let replaced = shadow.inbox.enqueue(command).is_some();

        let label = match command {
            Command::Actuator(action) => format!("actuator command queued: {action}"),
            Command::CommunicationTest => "communication test queued".to_string(),
            Command::DataRequest => "data request queued".to_string(),
        };
        let message = if replaced { format!("{label} (replaced undelivered command)") } else { label };
        shadow.activity.push(now, Level::Info, message);

        EnqueueReceipt { class: command.class(), replaced, display: shadow.display }
    }

    pub async fn peek(&self, class: CommandClass) -> Option<Command> {
        self.shadow.lock().await.inbox.peek(class).copied()
    }

    pub async fn actuator_display(&self) -> ActuatorDisplay {
        self.shadow.lock().await.display
    }

    // --------------------------------------------------------------------------
    // dashboard side
    // --------------------------------------------------------------------------

    pub async fn current(&self) -> Option<Snapshot> {
        self.shadow.lock().await.snapshot.current().cloned()
    }

    pub async fn liveness(&self) -> LivenessReport {
        let now = self.clock.now();
        self.shadow.lock().await.liveness_report(now)
    }

    /// The dashboard read. An empty shadow (fresh process) is filled from the
    /// store first; a populated one is served straight from memory.
    pub async fn dashboard(&self, activity_limit: usize) -> DashboardView {
        let cold = self.shadow.lock().await.snapshot.is_empty();
        let reconcile = if cold { Some(self.reconcile().await) } else { None };

        let now = self.clock.now();
        let shadow = self.shadow.lock().await;
        let snapshot = shadow.snapshot.current().cloned();
        DashboardView {
            last_update: snapshot
                .as_ref()
                .map(|s| s.captured_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            snapshot,
            liveness: shadow.liveness_report(now),
            pending_commands: shadow.inbox.pending(),
            display: shadow.display,
            activity: shadow.activity.recent(activity_limit),
            reconcile,
        }
    }

    /// Pull the latest row from the store into the shadow.
    ///
    /// Fills an empty shadow unconditionally; otherwise only a strictly newer
    /// row is adopted. Never records a heartbeat: a row in the store says
    /// nothing about whether the device is reachable now.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let fetched = self.bounded(self.gateway.fetch_latest()).await;
        let now = self.clock.now();
        let mut shadow = self.shadow.lock().await;

        let outcome = match fetched {
            Ok(None) => ReconcileOutcome::StoreEmpty,
            Ok(Some(row)) => {
                let snapshot = row.to_snapshot();
                if shadow.snapshot.is_empty() {
                    shadow.snapshot.replace_if_empty(snapshot);
                    ReconcileOutcome::Restored
                } else if shadow.snapshot.replace_if_newer(snapshot) {
                    ReconcileOutcome::Refreshed
                } else {
                    ReconcileOutcome::Unchanged
                }
            }
            Err(e) => {
                tracing::warn!(backend = self.gateway.backend_tag(), kind = e.kind(), error = %e, "store read failed");
                ReconcileOutcome::StoreFailed { kind: e.kind(), message: e.to_string() }
            }
        };

        // a store that stays empty or down is logged once, not on every read
        let previous = shadow.last_reconcile.replace(outcome.label());
        let quiet = matches!(outcome, ReconcileOutcome::StoreEmpty | ReconcileOutcome::StoreFailed { .. });
        if quiet && previous == Some(outcome.label()) {
            return outcome;
        }
        match &outcome {
            ReconcileOutcome::Restored => {
                shadow.activity.push(now, Level::Info, "latest reading restored from store")
            }
            ReconcileOutcome::Refreshed => {
                shadow.activity.push(now, Level::Info, "newer reading loaded from store")
            }
            ReconcileOutcome::StoreEmpty => {
                shadow.activity.push(now, Level::Warning, "store has no readings yet")
            }
            ReconcileOutcome::StoreFailed { message, .. } => shadow
                .activity
                .push(now, Level::Warning, format!("failed to load latest reading from store: {message}")),
            ReconcileOutcome::Unchanged => {}
        }
        outcome
    }

    /// Recent rows from the store, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError> {
        self.bounded(self.gateway.fetch_recent(limit)).await.inspect_err(|e| {
            tracing::warn!(backend = self.gateway.backend_tag(), kind = e.kind(), error = %e, "store history read failed");
        })
    }

    /// Most recent activity entries plus the number currently held.
    pub async fn activity(&self, limit: usize) -> (Vec<ActivityEntry>, usize) {
        let shadow = self.shadow.lock().await;
        (shadow.activity.recent(limit), shadow.activity.len())
    }

    // --------------------------------------------------------------------------
    // liveness sweep
    // --------------------------------------------------------------------------

    /// Log a liveness transition if one happened since the last sweep.
    /// Purely cosmetic: status is always computed on read.
    pub async fn sweep(&self) -> Option<(LivenessState, LivenessState)> {
        let now = self.clock.now();
        let mut shadow = self.shadow.lock().await;
        let current = shadow.liveness.status(now);
        let previous = shadow.swept_state;
        if current == previous {
            return None;
        }
        shadow.swept_state = current;
        let level = if current == LivenessState::Disconnected { Level::Warning } else { Level::Info };
        shadow
            .activity
            .push(now, level, format!("device {} -> {}", previous.as_str(), current.as_str()));
        Some((previous, current))
    }

    pub fn spawn_liveness_sweep(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        }
    }
}
