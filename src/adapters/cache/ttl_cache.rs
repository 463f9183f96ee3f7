//! In-memory TTL cache for latest snapshots.
//!
//! # Design
//!
//! A plain mutex-guarded map. Expiry is checked lazily on read; `set`
//! also sweeps expired entries so the map cannot grow without bound on
//! a write-heavy workload. One process-wide instance is exposed through
//! `process_shared` so every store in the process shares a second cache
//! tier, mirroring the per-instance tier each store owns.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::domain::foundation::SessionId;
use crate::domain::session::StateSnapshot;
use crate::ports::SnapshotCache;

struct Entry {
    expires_at: Instant,
    snapshot: StateSnapshot,
}

/// Mutex-guarded map with per-entry expiry.
#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<SessionId, Entry>>,
}

static PROCESS_CACHE: Lazy<Arc<TtlCache>> = Lazy::new(|| Arc::new(TtlCache::new()));

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide shared cache tier.
    pub fn process_shared() -> Arc<TtlCache> {
        Arc::clone(&PROCESS_CACHE)
    }

    /// Number of live (unexpired) entries. Test and diagnostics helper.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("ttl cache lock poisoned")
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotCache for TtlCache {
    fn get(&self, session_id: &SessionId) -> Option<StateSnapshot> {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        match entries.get(session_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.snapshot.clone()),
            Some(_) => {
                entries.remove(session_id);
                None
            }
            None => None,
        }
    }

    fn set(&self, session_id: &SessionId, snapshot: StateSnapshot, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            *session_id,
            Entry {
                expires_at: now + ttl,
                snapshot,
            },
        );
    }

    fn invalidate(&self, session_id: &SessionId) {
        self.entries
            .lock()
            .expect("ttl cache lock poisoned")
            .remove(session_id);
    }

    fn clear(&self) {
        self.entries
            .lock()
            .expect("ttl cache lock poisoned")
            .clear();
    }
}
