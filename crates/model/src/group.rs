//! Group nodes
//!
//! A group is an interior node of the record tree: it owns an ordered
//! sequence of child groups and an ordered sequence of entries. In the
//! arena model those sequences are id lists; the [`crate::Database`] owns
//! the nodes themselves.

use vaultsync_core::ObjectId;

use crate::times::TimeInfo;
use crate::tristate::Inheritable;

/// One group of the record tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Identity; unique within the whole tree.
    pub uuid: ObjectId,
    /// Owning group; `None` only for the root.
    pub parent: Option<ObjectId>,
    /// Display name.
    pub name: String,
    /// Free-text notes.
    pub notes: String,
    /// Standard icon index.
    pub icon_id: u32,
    /// Custom icon reference (nil = none).
    pub custom_icon: ObjectId,
    /// Timestamp block.
    pub times: TimeInfo,
    /// Whether the group is expanded in tree views.
    pub is_expanded: bool,
    /// Default auto-type sequence for contained entries; empty inherits.
    pub default_autotype_sequence: String,
    /// Auto-type enablement override.
    pub enable_autotype: Inheritable,
    /// Search enablement override.
    pub enable_searching: Inheritable,
    /// Last top visible entry in this group (nil = none).
    pub last_top_visible_entry: ObjectId,
    /// Ordered child group ids.
    pub groups: Vec<ObjectId>,
    /// Ordered child entry ids.
    pub entries: Vec<ObjectId>,
}

impl Group {
    /// Create an empty group with a fresh identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_uuid(ObjectId::new_random(), name)
    }

    /// Create an empty group with the given identity.
    pub fn with_uuid(uuid: ObjectId, name: impl Into<String>) -> Self {
        Self {
            uuid,
            parent: None,
            name: name.into(),
            notes: String::new(),
            icon_id: 48,
            custom_icon: ObjectId::NIL,
            times: TimeInfo::default(),
            is_expanded: true,
            default_autotype_sequence: String::new(),
            enable_autotype: Inheritable::Inherit,
            enable_searching: Inheritable::Inherit,
            last_top_visible_entry: ObjectId::NIL,
            groups: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Copy every property from `other` except identity, parent link and
    /// child lists. Optionally only when `other` is the newer side.
    pub fn assign_properties(&mut self, other: &Group, only_if_newer: bool) {
        if only_if_newer && other.times.last_modification <= self.times.last_modification {
            return;
        }
        self.name = other.name.clone();
        self.notes = other.notes.clone();
        self.icon_id = other.icon_id;
        self.custom_icon = other.custom_icon;
        self.times = other.times.clone();
        self.is_expanded = other.is_expanded;
        self.default_autotype_sequence = other.default_autotype_sequence.clone();
        self.enable_autotype = other.enable_autotype;
        self.enable_searching = other.enable_searching;
        self.last_top_visible_entry = other.last_top_visible_entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultsync_core::parse_kdbx;

    #[test]
    fn test_new_group_has_identity_and_no_children() {
        let g = Group::new("General");
        assert!(!g.uuid.is_nil());
        assert!(g.groups.is_empty() && g.entries.is_empty());
        assert_eq!(g.enable_autotype, Inheritable::Inherit);
    }

    #[test]
    fn test_assign_properties_keeps_identity_and_children() {
        let mut target = Group::new("old");
        let child = ObjectId::new_random();
        target.groups.push(child);
        let target_uuid = target.uuid;

        let mut source = Group::new("new");
        source.notes = "notes".into();
        source.times.last_modification = parse_kdbx("2024-01-01T00:00:00Z");

        target.assign_properties(&source, false);
        assert_eq!(target.name, "new");
        assert_eq!(target.notes, "notes");
        assert_eq!(target.uuid, target_uuid);
        assert_eq!(target.groups, vec![child]);
    }

    #[test]
    fn test_assign_properties_only_if_newer() {
        let mut target = Group::new("local");
        target.times.last_modification = parse_kdbx("2024-06-01T00:00:00Z");

        let mut source = Group::new("stale");
        source.times.last_modification = parse_kdbx("2024-01-01T00:00:00Z");

        target.assign_properties(&source, true);
        assert_eq!(target.name, "local", "older source must not win");

        source.times.last_modification = parse_kdbx("2024-12-01T00:00:00Z");
        target.assign_properties(&source, true);
        assert_eq!(target.name, "stale", "newer source wins");
    }
}
