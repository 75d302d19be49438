//! Per-node timestamps
//!
//! Every group and entry carries the same block of timestamps. Two of them
//! drive synchronization: `last_modification` decides which side's
//! properties win, and `location_changed` decides which side's structural
//! position (parent and sibling order) wins.

use vaultsync_core::{epoch, Timestamp};

/// Timestamp and usage block shared by groups and entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeInfo {
    /// When the node was created.
    pub creation: Timestamp,
    /// Last content modification; the merge engine's property conflict signal.
    pub last_modification: Timestamp,
    /// Last read access. Ignored by merge comparisons.
    pub last_access: Timestamp,
    /// When the node expires, if `expires` is set.
    pub expiry: Timestamp,
    /// Whether `expiry` is meaningful.
    pub expires: bool,
    /// How many times the node has been used.
    pub usage_count: u64,
    /// Last time the node's position among its siblings changed; the merge
    /// engine's structural conflict signal.
    pub location_changed: Timestamp,
}

impl Default for TimeInfo {
    fn default() -> Self {
        let e = epoch();
        Self {
            creation: e,
            last_modification: e,
            last_access: e,
            expiry: e,
            expires: false,
            usage_count: 0,
            location_changed: e,
        }
    }
}

impl TimeInfo {
    /// A fresh block with every stamp set to `now`.
    pub fn now_at(now: Timestamp) -> Self {
        Self {
            creation: now,
            last_modification: now,
            last_access: now,
            expiry: epoch(),
            expires: false,
            usage_count: 0,
            location_changed: now,
        }
    }

    /// Record an access at `now`, optionally also a modification.
    pub fn touch(&mut self, now: Timestamp, modified: bool) {
        self.last_access = now;
        self.usage_count += 1;
        if modified {
            self.last_modification = now;
        }
    }

    /// Record a structural move at `now`.
    pub fn touch_location(&mut self, now: Timestamp) {
        self.location_changed = now;
    }

    /// Whether the node is expired as of `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires && self.expiry <= now
    }
}
