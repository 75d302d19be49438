//! Deletion propagation
//!
//! During synchronization, both sides' deleted-object lists decide whether
//! a counterpart's absence is authoritative. A record deletes its node only
//! when the node was not modified after the recorded deletion time; a node
//! newer than its record survives and the record is dropped (the node was
//! resurrected). Applied and still-pending records stay on the merged list
//! so the deletion keeps propagating to third copies.
//!
//! Entries are processed before groups, and groups deepest-first: a group
//! is only removed once it is empty, so a deletion can never take children
//! that were themselves resurrected or newly added.

use std::collections::BTreeMap;

use vaultsync_core::{ObjectId, Timestamp};
use vaultsync_model::{Database, DeletedObject};

/// Apply both sides' deletion records to `local` and rewrite its
/// deleted-object list with the surviving records.
pub fn apply_deletions(local: &mut Database, source_deletions: &[DeletedObject]) {
    // One record per identity; concurrent deletions keep the latest time.
    let mut merged: BTreeMap<ObjectId, Timestamp> = BTreeMap::new();
    for record in local.deleted_objects.iter().chain(source_deletions) {
        merged
            .entry(record.uuid)
            .and_modify(|t| {
                if record.deletion_time > *t {
                    *t = record.deletion_time;
                }
            })
            .or_insert(record.deletion_time);
    }

    let mut keep: Vec<DeletedObject> = Vec::new();
    let mut group_records: Vec<DeletedObject> = Vec::new();

    for (uuid, deletion_time) in merged {
        let record = DeletedObject {
            uuid,
            deletion_time,
        };
        if let Some(entry) = local.entry(uuid) {
            if entry.times.last_modification < deletion_time {
                local.remove_entry(uuid);
                keep.push(record);
            }
            // else: modified after deletion, resurrected; drop the record
        } else if local.group(uuid).is_some() {
            group_records.push(record);
        } else {
            // Absent on this side too; the record keeps propagating.
            keep.push(record);
        }
    }

    // Deepest-first so children are settled before their parents.
    group_records.sort_by_key(|record| std::cmp::Reverse(depth_of(local, record.uuid)));
    for record in group_records {
        let Some(group) = local.group(record.uuid) else {
            continue;
        };
        let deletable = group.times.last_modification < record.deletion_time
            && group.groups.is_empty()
            && group.entries.is_empty();
        if deletable {
            local.remove_group(record.uuid);
            keep.push(record);
        }
        // else: resurrected, or it still holds live children; drop the
        // record so the survivors cannot be deleted by a later sync
    }

    local.deleted_objects = keep;
}

fn depth_of(db: &Database, group_id: ObjectId) -> usize {
    let mut depth = 0;
    let mut cursor = db.group(group_id).and_then(|g| g.parent);
    while let Some(pid) = cursor {
        depth += 1;
        cursor = db.group(pid).and_then(|g| g.parent);
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultsync_core::parse_kdbx;
    use vaultsync_model::{Entry, Group};

    fn ts(text: &str) -> Timestamp {
        parse_kdbx(text)
    }

    fn record(uuid: ObjectId, time: &str) -> DeletedObject {
        DeletedObject {
            uuid,
            deletion_time: ts(time),
        }
    }

    #[test]
    fn test_stale_entry_is_deleted_and_record_kept() {
        let mut db = Database::new();
        let uuid = ObjectId::from_bytes([1; 16]);
        let mut entry = Entry::with_uuid(uuid);
        entry.times.last_modification = ts("2024-01-01T00:00:00Z");
        db.add_entry(db.root_id(), entry).unwrap();

        apply_deletions(&mut db, &[record(uuid, "2024-02-01T00:00:00Z")]);

        assert!(db.entry(uuid).is_none());
        assert_eq!(db.deleted_objects.len(), 1);
        assert_eq!(db.deleted_objects[0].uuid, uuid);
    }

    #[test]
    fn test_newer_entry_survives_and_record_is_dropped() {
        let mut db = Database::new();
        let uuid = ObjectId::from_bytes([1; 16]);
        let mut entry = Entry::with_uuid(uuid);
        entry.times.last_modification = ts("2024-03-01T00:00:00Z");
        db.add_entry(db.root_id(), entry).unwrap();

        apply_deletions(&mut db, &[record(uuid, "2024-02-01T00:00:00Z")]);

        assert!(db.entry(uuid).is_some(), "resurrected entry stays");
        assert!(db.deleted_objects.is_empty(), "stale record dropped");
    }

    #[test]
    fn test_group_deleted_only_when_emptied() {
        let mut db = Database::new();
        let gid = ObjectId::from_bytes([1; 16]);
        let eid = ObjectId::from_bytes([2; 16]);
        let mut group = Group::with_uuid(gid, "G");
        group.times.last_modification = ts("2024-01-01T00:00:00Z");
        db.add_group(db.root_id(), group).unwrap();
        let mut entry = Entry::with_uuid(eid);
        entry.times.last_modification = ts("2024-01-01T00:00:00Z");
        db.add_entry(gid, entry).unwrap();

        // Entry resurrected (newer than its record), so the group stays.
        apply_deletions(
            &mut db,
            &[
                record(eid, "2023-12-01T00:00:00Z"),
                record(gid, "2024-02-01T00:00:00Z"),
            ],
        );
        assert!(db.entry(eid).is_some());
        assert!(db.group(gid).is_some());
        assert!(db.deleted_objects.is_empty());

        // Now both records are newer: the entry goes first, then the group.
        apply_deletions(
            &mut db,
            &[
                record(eid, "2024-02-01T00:00:00Z"),
                record(gid, "2024-02-01T00:00:00Z"),
            ],
        );
        assert!(db.entry(eid).is_none());
        assert!(db.group(gid).is_none());
        assert_eq!(db.deleted_objects.len(), 2);
    }

    #[test]
    fn test_nested_groups_settle_deepest_first() {
        let mut db = Database::new();
        let outer = ObjectId::from_bytes([1; 16]);
        let inner = ObjectId::from_bytes([2; 16]);
        db.add_group(db.root_id(), Group::with_uuid(outer, "outer"))
            .unwrap();
        db.add_group(outer, Group::with_uuid(inner, "inner")).unwrap();

        apply_deletions(
            &mut db,
            &[
                record(outer, "2024-02-01T00:00:00Z"),
                record(inner, "2024-02-01T00:00:00Z"),
            ],
        );
        assert!(db.group(outer).is_none());
        assert!(db.group(inner).is_none());
        assert_eq!(db.deleted_objects.len(), 2);
    }

    #[test]
    fn test_unknown_record_keeps_propagating() {
        let mut db = Database::new();
        let ghost = ObjectId::from_bytes([9; 16]);
        apply_deletions(&mut db, &[record(ghost, "2024-01-01T00:00:00Z")]);
        assert_eq!(db.deleted_objects.len(), 1);
        assert_eq!(db.deleted_objects[0].uuid, ghost);
    }

    #[test]
    fn test_duplicate_records_keep_latest_time() {
        let mut db = Database::new();
        let ghost = ObjectId::from_bytes([9; 16]);
        db.deleted_objects.push(record(ghost, "2024-01-01T00:00:00Z"));
        apply_deletions(&mut db, &[record(ghost, "2024-05-01T00:00:00Z")]);
        assert_eq!(db.deleted_objects.len(), 1);
        assert_eq!(
            db.deleted_objects[0].deletion_time,
            ts("2024-05-01T00:00:00Z")
        );
    }
}
