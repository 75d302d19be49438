//! Shared helpers for building trees and comparing merge results.

use vaultsync::{
    merge_into, parse_kdbx, Database, Entry, Group, IgnoreFlags, MergeOutcome, MergePolicy,
    NullStatusLogger, ObjectId, ProtectedString, Timestamp, FIELD_TITLE,
};

pub fn ts(text: &str) -> Timestamp {
    parse_kdbx(text)
}

pub fn id(byte: u8) -> ObjectId {
    ObjectId::from_bytes([byte; 16])
}

pub fn group(byte: u8, name: &str) -> Group {
    Group::with_uuid(id(byte), name)
}

pub fn entry(byte: u8, title: &str, modified: &str) -> Entry {
    let mut e = Entry::with_uuid(id(byte));
    e.set_field(FIELD_TITLE, ProtectedString::plain(title));
    e.times.last_modification = ts(modified);
    e
}

pub fn merge(local: &mut Database, source: &Database, policy: MergePolicy) {
    let mut logger = NullStatusLogger;
    let outcome = merge_into(local, source, policy, &mut logger).unwrap();
    assert_eq!(outcome, MergeOutcome::Complete);
}

/// Tree equality ignoring access stamps and usage counters, the
/// comparison the idempotence property is stated over.
pub fn trees_equal_ignoring_access(a: &Database, b: &Database) -> bool {
    if a.group_count() != b.group_count() || a.entry_count() != b.entry_count() {
        return false;
    }
    let a_groups = a.group_ids_preorder();
    if a_groups != b.group_ids_preorder() {
        return false;
    }
    for gid in &a_groups {
        let (ga, gb) = (a.group(*gid).unwrap(), b.group(*gid).unwrap());
        if ga.name != gb.name
            || ga.parent != gb.parent
            || ga.groups != gb.groups
            || ga.entries != gb.entries
        {
            return false;
        }
    }
    let ignore = IgnoreFlags {
        parent: false,
        access: true,
        history: false,
    };
    for eid in a.entry_ids_preorder() {
        let (ea, eb) = (a.entry(eid).unwrap(), b.entry(eid).unwrap());
        if !ea.equals_ignoring(eb, ignore) {
            return false;
        }
    }
    a.deleted_objects.len() == b.deleted_objects.len()
}
