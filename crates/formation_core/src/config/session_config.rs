//! History / Collaboration Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries kept before the oldest is evicted (기본: 50)
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    /// Slot lock time-to-live in seconds (기본: 30)
    pub lock_ttl_secs: i64,
    /// Waiters queued per slot; 0 disables queueing (기본: 4)
    pub max_queued: usize,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self { lock_ttl_secs: 30, max_queued: 4 }
    }
}
