//! ==============================================================================
//! shadow-hub - device shadow and command delivery for a polling-only sensor node
//! ==============================================================================
//!
//! the device (an esp32 with temperature / humidity / soil / uv sensors) can
//! only call us; we can never call it. so the hub:
//!
//! ```text
//!     - keeps the device's last reading in memory (the shadow)
//!     - infers connected / disconnected from how recently it checked in
//!     - parks operator commands until the next check-in picks them up
//!     - mirrors every reading to a hosted table and restores from it on boot
//! ```
//!
//! module map:
//!
//! ```text
//!     domain.rs       readings, snapshots, store rows
//!     snapshot.rs     current snapshot (replace, never merge)
//!     liveness.rs     heartbeat -> NeverSeen / Connected / Disconnected
//!     inbox.rs        single-slot, consume-once command mailboxes
//!     activity.rs     bounded operator-facing event log
//!     gateway/        hosted store (rest) + in-memory stand-in
//!     coordinator.rs  the shadow: one lock, store calls outside it
//!     http.rs         axum routes for device, operator and dashboard
//!     config.rs       hub.toml + environment overrides
//!     clock.rs        injectable wall clock
//! ```
//!
//! ==============================================================================

pub mod activity;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod http;
pub mod inbox;
pub mod liveness;
pub mod snapshot;

pub use coordinator::{Coordinator, CoordinatorSettings};
pub use domain::{Reading, ReadingPayload, Snapshot, StoredReading};
pub use error::{StoreError, ValidationError};
pub use gateway::{MemoryGateway, ReadingGateway, RestGateway};
pub use inbox::{ActuatorAction, Command, CommandClass};
pub use liveness::LivenessState;
