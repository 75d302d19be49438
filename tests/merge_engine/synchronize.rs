//! Bidirectional synchronization scenarios.

use crate::common::*;
use vaultsync::{
    DeletedObject, MergePolicy, ProtectedString, FIELD_PASSWORD, FIELD_TITLE,
};

/// Two copies of one database, as decode would produce them: same root
/// identity, same initial content.
fn cloned_pair() -> (vaultsync::Database, vaultsync::Database) {
    let mut base = vaultsync::Database::new();
    let work = base.add_group(base.root_id(), group(0x10, "Work")).unwrap();
    let home = base.add_group(base.root_id(), group(0x11, "Home")).unwrap();
    base.add_entry(work, entry(0x01, "VPN", "2024-01-01T00:00:00Z"))
        .unwrap();
    base.add_entry(work, entry(0x02, "Mail", "2024-01-01T00:00:00Z"))
        .unwrap();
    base.add_entry(home, entry(0x03, "Router", "2024-01-01T00:00:00Z"))
        .unwrap();
    (base.clone(), base)
}

#[test]
fn divergent_edits_reconcile_with_history() {
    let (mut local, mut remote) = cloned_pair();

    // Local edits entry 1 at t1; remote edits entry 2 at t2.
    let e1 = local.entry_mut(id(0x01)).unwrap();
    e1.set_field(FIELD_PASSWORD, ProtectedString::protected("local-new"));
    e1.times.last_modification = ts("2024-02-01T00:00:00Z");

    let e2 = remote.entry_mut(id(0x02)).unwrap();
    e2.set_field(FIELD_TITLE, ProtectedString::plain("Mail v2"));
    e2.times.last_modification = ts("2024-02-02T00:00:00Z");

    merge(&mut local, &remote, MergePolicy::Synchronize);

    // Local's own edit survives.
    assert_eq!(
        local.entry(id(0x01)).unwrap().field(FIELD_PASSWORD),
        "local-new"
    );
    // Remote's edit arrives, the replaced state lands in history.
    let merged2 = local.entry(id(0x02)).unwrap();
    assert_eq!(merged2.field(FIELD_TITLE), "Mail v2");
    assert_eq!(merged2.history.len(), 1);
    assert_eq!(merged2.history[0].field(FIELD_TITLE), "Mail");
    assert!(local.check_consistency().is_ok());
}

#[test]
fn deletion_propagates_without_resurrecting() {
    let (mut local, mut remote) = cloned_pair();

    // Remote deleted entry 3 after its last local modification.
    remote.delete_entry(id(0x03), ts("2024-03-01T00:00:00Z"));

    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert!(local.entry(id(0x03)).is_none(), "deletion propagated");
    assert!(
        local.deletion_of(id(0x03)).is_some(),
        "record kept so the deletion reaches third copies"
    );
}

#[test]
fn newer_local_edit_wins_over_remote_deletion() {
    let (mut local, mut remote) = cloned_pair();

    remote.delete_entry(id(0x03), ts("2024-03-01T00:00:00Z"));
    let e3 = local.entry_mut(id(0x03)).unwrap();
    e3.set_field(FIELD_TITLE, ProtectedString::plain("Router v2"));
    e3.times.last_modification = ts("2024-04-01T00:00:00Z");

    merge(&mut local, &remote, MergePolicy::Synchronize);

    let survivor = local.entry(id(0x03)).unwrap();
    assert_eq!(survivor.field(FIELD_TITLE), "Router v2");
    assert!(
        local.deletion_of(id(0x03)).is_none(),
        "stale deletion record dropped"
    );
}

#[test]
fn remote_move_is_applied_locally() {
    let (mut local, mut remote) = cloned_pair();

    // Remote moves entry 1 from Work to Home, later than any local move.
    remote.relocate_entry(id(0x01), id(0x11)).unwrap();
    remote
        .entry_mut(id(0x01))
        .unwrap()
        .times
        .location_changed = ts("2024-02-15T00:00:00Z");

    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert_eq!(local.entry(id(0x01)).unwrap().parent, Some(id(0x11)));
    assert!(local.group(id(0x10)).unwrap().entries.iter().all(|e| *e != id(0x01)));
}

#[test]
fn remote_reorder_is_applied_locally() {
    let (mut local, mut remote) = cloned_pair();

    // Remote moves Mail (entry 2) to the front of Work.
    {
        let work = remote.group_mut(id(0x10)).unwrap();
        work.entries.retain(|e| *e != id(0x02));
        work.entries.insert(0, id(0x02));
    }
    remote
        .entry_mut(id(0x02))
        .unwrap()
        .times
        .location_changed = ts("2024-02-20T00:00:00Z");

    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert_eq!(
        local.group(id(0x10)).unwrap().entries,
        vec![id(0x02), id(0x01)]
    );
}

#[test]
fn conflicting_moves_resolve_by_later_location_changed() {
    let (mut local, mut remote) = cloned_pair();

    local.relocate_entry(id(0x01), id(0x11)).unwrap();
    local.entry_mut(id(0x01)).unwrap().times.location_changed = ts("2024-02-01T00:00:00Z");

    let fresh = remote
        .add_group(remote.root_id(), group(0x12, "Archive"))
        .unwrap();
    remote.relocate_entry(id(0x01), fresh).unwrap();
    remote.entry_mut(id(0x01)).unwrap().times.location_changed = ts("2024-02-10T00:00:00Z");

    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert_eq!(
        local.entry(id(0x01)).unwrap().parent,
        Some(id(0x12)),
        "later move wins, into the group created by the merge"
    );
}

#[test]
fn deleted_group_with_fresh_local_entry_survives() {
    let (mut local, mut remote) = cloned_pair();

    // Remote deletes the Home group (and its entry).
    remote.delete_entry(id(0x03), ts("2024-03-01T00:00:00Z"));
    remote.delete_group(id(0x11), ts("2024-03-01T00:00:00Z"));

    // Local added a new entry to Home after that.
    local
        .add_entry(id(0x11), entry(0x04, "NAS", "2024-04-01T00:00:00Z"))
        .unwrap();

    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert!(local.entry(id(0x03)).is_none(), "stale entry deleted");
    assert!(local.group(id(0x11)).is_some(), "group kept: it is not empty");
    assert!(local.entry(id(0x04)).is_some(), "new entry survives");
}

#[test]
fn deletion_records_merge_from_both_sides() {
    let (mut local, mut remote) = cloned_pair();
    local.deleted_objects.push(DeletedObject {
        uuid: id(0xA0),
        deletion_time: ts("2024-01-05T00:00:00Z"),
    });
    remote.deleted_objects.push(DeletedObject {
        uuid: id(0xA1),
        deletion_time: ts("2024-01-06T00:00:00Z"),
    });

    merge(&mut local, &remote, MergePolicy::Synchronize);

    assert!(local.deletion_of(id(0xA0)).is_some());
    assert!(local.deletion_of(id(0xA1)).is_some());
}
