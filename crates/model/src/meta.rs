//! Database-level settings and leaf records
//!
//! Everything the container stores outside the group/entry tree: global
//! metadata with per-property change stamps (the merge engine's signal for
//! settings conflicts), memory-protection defaults, custom icons, and the
//! deleted-objects list.

use std::collections::BTreeMap;

use vaultsync_core::{epoch, ObjectId, Timestamp};

/// Outer compression applied to the structural body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    None,
    /// Gzip (deflate) compression.
    #[default]
    Gzip,
}

impl Compression {
    /// Decode the header's compression flag. Unknown values are rejected.
    pub fn from_flag(flag: u32) -> Option<Self> {
        match flag {
            0 => Some(Compression::None),
            1 => Some(Compression::Gzip),
            _ => None,
        }
    }

    /// The header flag value for this mode.
    pub fn to_flag(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
        }
    }
}

/// Which standard fields are protected in memory by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryProtection {
    /// Protect entry titles.
    pub protect_title: bool,
    /// Protect user names.
    pub protect_username: bool,
    /// Protect passwords.
    pub protect_password: bool,
    /// Protect URLs.
    pub protect_url: bool,
    /// Protect notes.
    pub protect_notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        Self {
            protect_title: false,
            protect_username: false,
            protect_password: true,
            protect_url: false,
            protect_notes: false,
        }
    }
}

/// History retention limits applied after edits and merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySettings {
    /// Maximum number of history snapshots per entry; negative = unlimited.
    pub max_items: i32,
    /// Maximum cumulative size of an entry's history in bytes;
    /// negative = unlimited.
    pub max_size: i64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_items: 10,
            max_size: 6 * 1024 * 1024,
        }
    }
}

/// An immutable custom icon blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomIcon {
    /// Identity of the icon; referenced by groups and entries.
    pub uuid: ObjectId,
    /// Image bytes, uninterpreted.
    pub data: Vec<u8>,
}

/// A record that an object was deleted at a given time.
///
/// Only consulted during synchronization, to decide whether a counterpart's
/// absence is authoritative or the object should be re-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedObject {
    /// Identity of the deleted object.
    pub uuid: ObjectId,
    /// When the deletion happened.
    pub deletion_time: Timestamp,
}

/// Global database properties.
///
/// Properties the merge engine reconciles carry a companion `*_changed`
/// stamp; latest stamp wins under the synchronizing policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseMeta {
    /// Application that produced the container.
    pub generator: String,
    /// Database display name.
    pub name: String,
    /// When `name` last changed.
    pub name_changed: Timestamp,
    /// Free-text description.
    pub description: String,
    /// When `description` last changed.
    pub description_changed: Timestamp,
    /// Default user name for new entries.
    pub default_username: String,
    /// When `default_username` last changed.
    pub default_username_changed: Timestamp,
    /// How many days of maintenance history to keep.
    pub maintenance_history_days: u32,
    /// Display color (empty = none).
    pub color: String,
    /// When `color` last changed. Not stored by the 3.1 container; tracked
    /// in memory so API edits still merge deterministically.
    pub color_changed: Timestamp,
    /// When the master key last changed.
    pub master_key_changed: Timestamp,
    /// Recommended master-key change interval in days; negative = none.
    pub master_key_change_rec: i64,
    /// Forced master-key change interval in days; negative = none.
    pub master_key_change_force: i64,
    /// Memory-protection defaults for standard fields.
    pub memory_protection: MemoryProtection,
    /// Whether the recycle bin is enabled.
    pub recycle_bin_enabled: bool,
    /// Identity of the recycle-bin group (nil = none).
    pub recycle_bin: ObjectId,
    /// When the recycle-bin reference last changed.
    pub recycle_bin_changed: Timestamp,
    /// Identity of the entry-templates group (nil = none).
    pub entry_templates_group: ObjectId,
    /// When the templates reference last changed.
    pub entry_templates_group_changed: Timestamp,
    /// History retention limits.
    pub history: HistorySettings,
    /// Identity of the last selected group (nil = none).
    pub last_selected_group: ObjectId,
    /// Identity of the last top visible group (nil = none).
    pub last_top_visible_group: ObjectId,
    /// Arbitrary string key/value data carried by the container.
    pub custom_data: BTreeMap<String, String>,
    /// Outer cipher identifier from the header.
    pub cipher_id: ObjectId,
    /// Outer compression mode from the header.
    pub compression: Compression,
    /// Key-transform rounds from the header.
    pub transform_rounds: u64,
}

impl Default for DatabaseMeta {
    fn default() -> Self {
        let e = epoch();
        Self {
            generator: String::new(),
            name: String::new(),
            name_changed: e,
            description: String::new(),
            description_changed: e,
            default_username: String::new(),
            default_username_changed: e,
            maintenance_history_days: 365,
            color: String::new(),
            color_changed: e,
            master_key_changed: e,
            master_key_change_rec: -1,
            master_key_change_force: -1,
            memory_protection: MemoryProtection::default(),
            recycle_bin_enabled: true,
            recycle_bin: ObjectId::NIL,
            recycle_bin_changed: e,
            entry_templates_group: ObjectId::NIL,
            entry_templates_group_changed: e,
            history: HistorySettings::default(),
            last_selected_group: ObjectId::NIL,
            last_top_visible_group: ObjectId::NIL,
            custom_data: BTreeMap::new(),
            cipher_id: ObjectId::NIL,
            compression: Compression::default(),
            transform_rounds: 6000,
        }
    }
}
