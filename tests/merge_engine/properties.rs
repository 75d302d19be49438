//! The engine's documented invariants, exercised over generated inputs.

use crate::common::*;
use proptest::prelude::*;
use vaultsync::{
    Database, HistorySettings, MergePolicy, ProtectedString, FIELD_PASSWORD, FIELD_TITLE,
};

#[test]
fn synchronize_is_idempotent() {
    let mut base = Database::new();
    let work = base.add_group(base.root_id(), group(0x10, "Work")).unwrap();
    base.add_entry(work, entry(0x01, "A", "2024-01-01T00:00:00Z"))
        .unwrap();
    let mut local = base.clone();
    let mut remote = base;

    // Divergent edits, a move and a deletion on the remote side.
    let e = remote.entry_mut(id(0x01)).unwrap();
    e.set_field(FIELD_PASSWORD, ProtectedString::protected("new"));
    e.times.last_modification = ts("2024-02-01T00:00:00Z");
    let archive = remote
        .add_group(remote.root_id(), group(0x12, "Archive"))
        .unwrap();
    remote.relocate_entry(id(0x01), archive).unwrap();
    remote.entry_mut(id(0x01)).unwrap().times.location_changed = ts("2024-02-02T00:00:00Z");
    remote
        .add_entry(archive, entry(0x02, "B", "2024-02-03T00:00:00Z"))
        .unwrap();

    merge(&mut local, &remote, MergePolicy::Synchronize);
    let once = local.clone();
    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert!(
        trees_equal_ignoring_access(&once, &local),
        "second merge of the same source changed the tree"
    );
}

#[test]
fn example_scenario_overwrite_if_newer() {
    // Spec example: local E1(p1, t0), source E1(p2, t1 > t0).
    let mut local = Database::new();
    let mut e = entry(0x01, "A", "2024-01-01T00:00:00Z");
    e.set_field(FIELD_PASSWORD, ProtectedString::protected("p1"));
    local.add_entry(local.root_id(), e).unwrap();

    let mut source = Database::new();
    let mut e = entry(0x01, "A", "2024-02-01T00:00:00Z");
    e.set_field(FIELD_PASSWORD, ProtectedString::protected("p2"));
    source.add_entry(source.root_id(), e).unwrap();

    merge(&mut local, &source, MergePolicy::OverwriteIfNewer);

    let merged = local.entry(id(0x01)).unwrap();
    assert_eq!(merged.field(FIELD_PASSWORD), "p2");
    assert_eq!(merged.history.len(), 1);
    assert_eq!(merged.history[0].field(FIELD_PASSWORD), "p1");
}

#[test]
fn history_stays_monotonic_and_bounded() {
    let settings = HistorySettings {
        max_items: 4,
        max_size: -1,
    };
    let mut e = entry(0x01, "A", "2024-01-01T00:00:00Z");
    for day in 2..=20 {
        e.backup_to_history(&settings);
        e.times.last_modification = ts(&format!("2024-01-{:02}T00:00:00Z", day));
        e.set_field(FIELD_TITLE, ProtectedString::plain(format!("v{}", day)));
    }
    assert!(e.history.len() <= 4);
    let mods: Vec<_> = e.history.iter().map(|h| h.times.last_modification).collect();
    let mut sorted = mods.clone();
    sorted.sort();
    assert_eq!(mods, sorted);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Merging two random forests never duplicates an identity and never
    /// loses a node that neither side deleted.
    #[test]
    fn identities_unique_after_synchronize(
        local_entries in proptest::collection::btree_set(1u8..120, 0..12),
        source_entries in proptest::collection::btree_set(1u8..120, 0..12),
    ) {
        let mut local = Database::new();
        for byte in &local_entries {
            local
                .add_entry(local.root_id(), entry(*byte, "L", "2024-01-01T00:00:00Z"))
                .unwrap();
        }
        let mut source = Database::new();
        for byte in &source_entries {
            source
                .add_entry(source.root_id(), entry(*byte, "S", "2024-01-02T00:00:00Z"))
                .unwrap();
        }

        merge(&mut local, &source, MergePolicy::Synchronize);

        prop_assert!(local.check_consistency().is_ok());
        let union: std::collections::BTreeSet<u8> =
            local_entries.union(&source_entries).copied().collect();
        prop_assert_eq!(local.entry_count(), union.len());
    }

    /// Reordering never adds, removes or duplicates a child, whatever the
    /// two sides did to the sibling order.
    #[test]
    fn reorder_preserves_membership(
        order in Just((1u8..=8).collect::<Vec<u8>>()).prop_shuffle(),
        moved in proptest::collection::vec((1u8..=8, 1u32..1000), 0..4),
    ) {
        let mut local = Database::new();
        for byte in 1u8..=8 {
            local
                .add_entry(local.root_id(), entry(byte, "e", "2024-01-01T00:00:00Z"))
                .unwrap();
        }
        let mut remote = local.clone();
        {
            let root_id = remote.root_id();
            let root = remote.group_mut(root_id).unwrap();
            root.entries = order.iter().map(|b| id(*b)).collect();
        }
        for (byte, minutes) in &moved {
            remote.entry_mut(id(*byte)).unwrap().times.location_changed =
                ts(&format!("2024-03-01T00:{:02}:{:02}Z", minutes / 60 % 60, minutes % 60));
        }

        merge(&mut local, &remote, MergePolicy::Synchronize);

        let merged = local.root().entries.clone();
        prop_assert_eq!(merged.len(), 8);
        let set: std::collections::BTreeSet<_> = merged.iter().copied().collect();
        prop_assert_eq!(set.len(), 8);
    }
}
