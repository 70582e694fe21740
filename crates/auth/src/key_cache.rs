//! Time-bucketed signing-key cache.
//!
//! Wall-clock time is divided into fixed windows of `ttl` seconds. The key set
//! is fetched at most once per window: the slot lock is held across the
//! fetch, so concurrent callers in the same window wait for the first fetch
//! and then read the memoized result.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use vaultgate_core::auth::{KeySet, KeySource};
use vaultgate_core::error::KeySetError;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};

/// Seconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct KeySetCache {
    source: Arc<dyn KeySource>,
    ttl_secs: u64,
    clock: Clock,
    slot: Mutex<Option<(u64, Arc<KeySet>)>>,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl KeySetCache {
    /// Create a cache over `source` with the given window length.
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl_secs: ttl.as_secs().max(1),
            clock: Arc::new(system_clock),
            slot: Mutex::new(None),
            audit: None,
        }
    }

    /// Replace the wall clock (tests drive window boundaries with this).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Window id for a point in time.
    pub fn bucket_for(&self, now_secs: u64) -> u64 {
        now_secs / self.ttl_secs
    }

    /// Key set for the current window.
    pub async fn current(&self) -> Result<Arc<KeySet>, KeySetError> {
        let bucket = self.bucket_for((self.clock)());
        self.get(bucket).await
    }

    /// Key set for `bucket`, fetching it if the slot holds another window.
    ///
    /// A failed fetch leaves the slot untouched, so the next caller retries.
    pub async fn get(&self, bucket: u64) -> Result<Arc<KeySet>, KeySetError> {
        let mut slot = self.slot.lock().await;

        if let Some((cached_bucket, keys)) = slot.as_ref() {
            if *cached_bucket == bucket {
                return Ok(Arc::clone(keys));
            }
        }

        match self.source.fetch_key_set().await {
            Ok(keys) => {
                debug!(bucket, key_count = keys.len(), "Signing-key set refreshed");
                self.record(
                    AuditEvent::KeySetFetched {
                        bucket,
                        key_count: keys.len(),
                    },
                    AuditOutcome::Success,
                    None,
                );
                let keys = Arc::new(keys);
                *slot = Some((bucket, Arc::clone(&keys)));
                Ok(keys)
            }
            Err(e) => {
                warn!(bucket, error = %e, "Signing-key set fetch failed");
                self.record(
                    AuditEvent::KeySetUnavailable { bucket },
                    AuditOutcome::Failure,
                    Some(e.to_string()),
                );
                Err(e)
            }
        }
    }

    fn record(&self, event: AuditEvent, outcome: AuditOutcome, details: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.log(event, "anonymous", outcome, details);
        }
    }
}
