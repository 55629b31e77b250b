//! ==============================================================================
//! gateway/mod.rs - reconciliation gateway to the persistent store
//! ==============================================================================
//!
//! purpose:
//!     the hosted table is the long-lived owner of every reading. the hub
//!     writes each accepted reading to it and reads it back after a restart
//!     or when the dashboard asks for history.
//!
//! ```text
//!     the store is treated as unreliable: every call is bounded by a timeout
//!     in coordinator.rs and no failure here ever fails the device path.
//! ```
//!
//! backends:
//!     - rest.rs:   PostgREST-style hosted table over https (production)
//!     - memory.rs: in-process table with failure switches (dev + tests)
//!
//! ==============================================================================

mod memory;
mod rest;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

use crate::config::{StoreBackend, StoreConfig};
use crate::domain::StoredReading;
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ReadingGateway: Send + Sync {
    /// short name for logs ("rest", "memory")
    fn backend_tag(&self) -> &'static str;

    /// Insert one row.
    async fn save(&self, row: &StoredReading) -> Result<(), StoreError>;

    /// The most recent row by timestamp, `None` on an empty table.
    async fn fetch_latest(&self) -> Result<Option<StoredReading>, StoreError>;

    /// Up to `limit` rows, newest first.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError>;
}

/// Build the configured backend once at startup.
///
/// Misconfiguration is reported here, explicitly, instead of leaving the hub
/// running with a half-built client.
pub fn connect(config: &StoreConfig) -> Result<Arc<dyn ReadingGateway>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryGateway::new())),
        StoreBackend::Rest => Ok(Arc::new(RestGateway::new(config)?)),
    }
}
