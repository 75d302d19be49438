//! Entry nodes
//!
//! An entry is a leaf record: a map of named string fields (some
//! protected), named binary attachments, auto-type settings, and an ordered
//! list of historical snapshots of itself. History is one level deep by
//! construction — a snapshot never carries its own history.

use std::collections::BTreeMap;

use vaultsync_core::{ObjectId, Timestamp};

use crate::autotype::AutoTypeConfig;
use crate::meta::HistorySettings;
use crate::protected::{ProtectedBinary, ProtectedString};
use crate::times::TimeInfo;

/// Standard field key: entry title.
pub const FIELD_TITLE: &str = "Title";
/// Standard field key: user name.
pub const FIELD_USERNAME: &str = "UserName";
/// Standard field key: password.
pub const FIELD_PASSWORD: &str = "Password";
/// Standard field key: URL.
pub const FIELD_URL: &str = "URL";
/// Standard field key: notes.
pub const FIELD_NOTES: &str = "Notes";

/// The five standard field keys every client shows.
pub const STANDARD_FIELDS: [&str; 5] = [
    FIELD_TITLE,
    FIELD_USERNAME,
    FIELD_PASSWORD,
    FIELD_URL,
    FIELD_NOTES,
];

/// Which aspects to ignore when comparing two entries.
///
/// The merge engine compares a matched pair ignoring parentage, access
/// stamps and history before deciding whether an edit conflict exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreFlags {
    /// Ignore the parent group link.
    pub parent: bool,
    /// Ignore `last_access` and `usage_count`.
    pub access: bool,
    /// Ignore the history list.
    pub history: bool,
}

impl IgnoreFlags {
    /// The mask the merge engine uses for conflict detection.
    pub fn for_merge() -> Self {
        Self {
            parent: true,
            access: true,
            history: true,
        }
    }
}

/// One entry of the record tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Identity; shared with every snapshot in `history`.
    pub uuid: ObjectId,
    /// Owning group.
    pub parent: Option<ObjectId>,
    /// Named string fields; keys unique, standard keys in [`STANDARD_FIELDS`].
    pub fields: BTreeMap<String, ProtectedString>,
    /// Named binary attachments.
    pub binaries: BTreeMap<String, ProtectedBinary>,
    /// Auto-type configuration.
    pub auto_type: AutoTypeConfig,
    /// Tags in document order.
    pub tags: Vec<String>,
    /// Foreground color (empty = default).
    pub foreground_color: String,
    /// Background color (empty = default).
    pub background_color: String,
    /// URL override for opening the entry.
    pub override_url: String,
    /// Standard icon index.
    pub icon_id: u32,
    /// Custom icon reference (nil = none).
    pub custom_icon: ObjectId,
    /// Timestamp block.
    pub times: TimeInfo,
    /// Historical snapshots, oldest first. Snapshots share this entry's
    /// identity and never carry their own history.
    pub history: Vec<Entry>,
}

impl Entry {
    /// Create an empty entry with a fresh identity.
    pub fn new() -> Self {
        Self::with_uuid(ObjectId::new_random())
    }

    /// Create an empty entry with the given identity.
    pub fn with_uuid(uuid: ObjectId) -> Self {
        Self {
            uuid,
            parent: None,
            fields: BTreeMap::new(),
            binaries: BTreeMap::new(),
            auto_type: AutoTypeConfig::default(),
            tags: Vec::new(),
            foreground_color: String::new(),
            background_color: String::new(),
            override_url: String::new(),
            icon_id: 0,
            custom_icon: ObjectId::NIL,
            times: TimeInfo::default(),
            history: Vec::new(),
        }
    }

    /// Read a field's text, empty if absent.
    pub fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(|v| v.value()).unwrap_or("")
    }

    /// Set a field.
    pub fn set_field(&mut self, key: impl Into<String>, value: ProtectedString) {
        self.fields.insert(key.into(), value);
    }

    /// Copy every property from `other` except identity, parent link and
    /// history. Optionally only when `other` is the newer side.
    pub fn assign_properties(&mut self, other: &Entry, only_if_newer: bool) {
        if only_if_newer && other.times.last_modification <= self.times.last_modification {
            return;
        }
        self.fields = other.fields.clone();
        self.binaries = other.binaries.clone();
        self.auto_type = other.auto_type.clone();
        self.tags = other.tags.clone();
        self.foreground_color = other.foreground_color.clone();
        self.background_color = other.background_color.clone();
        self.override_url = other.override_url.clone();
        self.icon_id = other.icon_id;
        self.custom_icon = other.custom_icon;
        self.times = other.times.clone();
    }

    /// Compare with `other`, masking the aspects in `ignore`.
    pub fn equals_ignoring(&self, other: &Entry, ignore: IgnoreFlags) -> bool {
        if self.uuid != other.uuid {
            return false;
        }
        if !ignore.parent && self.parent != other.parent {
            return false;
        }
        if !ignore.history && self.history != other.history {
            return false;
        }
        let times_equal = self.times.creation == other.times.creation
            && self.times.last_modification == other.times.last_modification
            && self.times.expiry == other.times.expiry
            && self.times.expires == other.times.expires
            && self.times.location_changed == other.times.location_changed
            && (ignore.access
                || (self.times.last_access == other.times.last_access
                    && self.times.usage_count == other.times.usage_count));
        times_equal
            && self.fields == other.fields
            && self.binaries == other.binaries
            && self.auto_type == other.auto_type
            && self.tags == other.tags
            && self.foreground_color == other.foreground_color
            && self.background_color == other.background_color
            && self.override_url == other.override_url
            && self.icon_id == other.icon_id
            && self.custom_icon == other.custom_icon
    }

    /// Approximate in-memory size of the entry's content in bytes.
    ///
    /// Counts field and binary payloads; used for history size limits.
    pub fn approx_size(&self) -> u64 {
        let fields: usize = self
            .fields
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        let binaries: usize = self.binaries.iter().map(|(k, v)| k.len() + v.len()).sum();
        (fields + binaries) as u64
    }

    /// Snapshot the current state into history, then apply retention.
    ///
    /// The snapshot shares this entry's identity and carries no history of
    /// its own.
    pub fn backup_to_history(&mut self, settings: &HistorySettings) {
        let mut snapshot = self.clone();
        snapshot.history.clear();
        self.history.push(snapshot);
        self.maintain_history(settings);
    }

    /// Trim history to the configured limits, discarding oldest first.
    pub fn maintain_history(&mut self, settings: &HistorySettings) {
        self.history
            .sort_by(|a, b| a.times.last_modification.cmp(&b.times.last_modification));

        if settings.max_items >= 0 {
            let max = settings.max_items as usize;
            while self.history.len() > max {
                self.history.remove(0);
            }
        }

        if settings.max_size >= 0 {
            let max = settings.max_size as u64;
            loop {
                let total: u64 = self.history.iter().map(|h| h.approx_size()).sum();
                if total <= max || self.history.is_empty() {
                    break;
                }
                self.history.remove(0);
            }
        }
    }

    /// The newest history snapshot, if any.
    pub fn last_backup(&self) -> Option<&Entry> {
        self.history.last()
    }

    /// Whether the entry is expired as of `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.times.is_expired(now)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}
