//! In-process stand-in for the hosted table. Used when no store is
//! configured and by the tests, which flip its failure switches to play out
//! outages and slow responses.

use super::ReadingGateway;
use crate::domain::StoredReading;
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryGateway {
    rows: Mutex<Vec<StoredReading>>,
    unavailable: AtomicBool,
    fail_next: AtomicUsize,
    delay_ms: AtomicU64,
    save_calls: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<StoredReading>) -> Self {
        Self { rows: Mutex::new(rows), ..Self::default() }
    }

    /// Every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `n` calls fail, then the store recovers.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Sleep this long before answering each call.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> u64 {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub async fn rows(&self) -> Vec<StoredReading> {
        self.rows.lock().await.clone()
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        let tripped = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    async fn newest_first(&self, limit: usize) -> Vec<StoredReading> {
        let mut rows = self.rows.lock().await.clone();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        rows
    }
}

#[async_trait]
impl ReadingGateway for MemoryGateway {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, row: &StoredReading) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.rows.lock().await.push(row.clone());
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<Option<StoredReading>, StoreError> {
        self.gate().await?;
        Ok(self.newest_first(1).await.into_iter().next())
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError> {
        self.gate().await?;
        Ok(self.newest_first(limit).await)
    }
}
