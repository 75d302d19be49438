//! Structural reconciliation
//!
//! After both trees' nodes are unified, the pre-merge snapshots decide
//! *where* every node belongs:
//!
//! - **Relocation**: a node present in both original snapshots whose parent
//!   differs between them moves to the parent recorded by whichever
//!   snapshot saw the later `LocationChanged`; ties keep the local side.
//! - **Reordering**: within one parent's child list, a recursive pivot
//!   algorithm rebuilds sibling order. The pivot of a range is the sibling
//!   with the latest snapshot-recorded `LocationChanged`; the snapshot
//!   that produced that timestamp contributes the pivot's neighbor
//!   ordering, which partitions the remaining range into before/after.
//!   Siblings unknown to that ordering keep their current side relative to
//!   the pivot. Both partitions recurse.
//!
//! Reordering never adds, removes or duplicates a child; a cheap pre-check
//! skips parents whose sequence and per-child `LocationChanged` already
//! match both snapshots (the common nothing-moved case).

use vaultsync_core::{ObjectId, Timestamp};
use vaultsync_model::{Database, ObjectPool};

/// Relocate groups and entries according to the pre-merge snapshots.
///
/// `source_root` is the source tree's root identity; it maps to the local
/// root when the two trees disagree about it.
pub fn relocate(
    local: &mut Database,
    source_root: ObjectId,
    org_groups: &ObjectPool,
    src_groups: &ObjectPool,
    org_entries: &ObjectPool,
    src_entries: &ObjectPool,
) {
    let root = local.root_id();
    for gid in local.group_ids_preorder() {
        if gid == root {
            continue;
        }
        if let Some((parent, stamp)) =
            relocation_target(gid, org_groups, src_groups, source_root, root)
        {
            if local.group(parent).is_none() {
                tracing::warn!(group = %gid, %parent, "relocation target missing, skipping");
                continue;
            }
            match local.relocate_group(gid, parent) {
                Ok(()) => {
                    if let Some(group) = local.group_mut(gid) {
                        group.times.location_changed = stamp;
                    }
                }
                Err(err) => {
                    // Conflicting edits can request a cycle; refuse the
                    // move and keep the current position.
                    tracing::warn!(group = %gid, %err, "skipping relocation");
                }
            }
        }
    }

    for eid in local.entry_ids_preorder() {
        if let Some((parent, stamp)) =
            relocation_target(eid, org_entries, src_entries, source_root, root)
        {
            if local.group(parent).is_none() {
                tracing::warn!(entry = %eid, %parent, "relocation target missing, skipping");
                continue;
            }
            match local.relocate_entry(eid, parent) {
                Ok(()) => {
                    if let Some(entry) = local.entry_mut(eid) {
                        entry.times.location_changed = stamp;
                    }
                }
                Err(err) => {
                    tracing::warn!(entry = %eid, %err, "skipping relocation");
                }
            }
        }
    }
}

/// The winning parent and resulting `LocationChanged` for a node both
/// snapshots know, when the snapshots disagree about its parent.
fn relocation_target(
    id: ObjectId,
    org: &ObjectPool,
    src: &ObjectPool,
    source_root: ObjectId,
    local_root: ObjectId,
) -> Option<(ObjectId, Timestamp)> {
    let org_node = org.get(id)?;
    let src_node = src.get(id)?;
    let map_src = |parent: ObjectId| {
        if parent == source_root {
            local_root
        } else {
            parent
        }
    };
    let src_parent = src_node.parent.map(map_src);
    if org_node.parent == src_parent {
        return None;
    }
    // Strictly-later source wins; a tie keeps the local side.
    let winner_parent = if src_node.location_changed > org_node.location_changed {
        src_parent
    } else {
        org_node.parent
    };
    let stamp = org_node.location_changed.max(src_node.location_changed);
    winner_parent.map(|parent| (parent, stamp))
}

/// Reorder every group's child lists according to the snapshots.
pub fn reorder_children(
    local: &mut Database,
    org_groups: &ObjectPool,
    src_groups: &ObjectPool,
    org_entries: &ObjectPool,
    src_entries: &ObjectPool,
) {
    for gid in local.group_ids_preorder() {
        let group = local.group(gid).expect("id from preorder walk");

        let subgroups = group.groups.clone();
        if requires_reorder(
            gid,
            &subgroups,
            |id| local.group(id).map(|g| g.times.location_changed),
            org_groups,
            src_groups,
        ) {
            let reordered = reorder_list(subgroups, org_groups, src_groups);
            local.group_mut(gid).expect("exists").groups = reordered;
        }

        let entries = local.group(gid).expect("exists").entries.clone();
        if requires_reorder(
            gid,
            &entries,
            |id| local.entry(id).map(|e| e.times.location_changed),
            org_entries,
            src_entries,
        ) {
            let reordered = reorder_list(entries, org_entries, src_entries);
            local.group_mut(gid).expect("exists").entries = reordered;
        }
    }
}

/// Whether a child list may need reordering: it does not when sequence,
/// order and per-child `LocationChanged` match both original snapshots.
fn requires_reorder<F>(
    parent: ObjectId,
    current: &[ObjectId],
    current_loc: F,
    org: &ObjectPool,
    src: &ObjectPool,
) -> bool
where
    F: Fn(ObjectId) -> Option<Timestamp>,
{
    let matches = |pool: &ObjectPool| {
        if pool.children_of(parent) != current {
            return false;
        }
        current.iter().all(|id| {
            pool.get(*id)
                .map(|node| Some(node.location_changed) == current_loc(*id))
                .unwrap_or(false)
        })
    };
    !(matches(org) && matches(src))
}

/// Rebuild one child list through the recursive pivot algorithm.
fn reorder_list(mut items: Vec<ObjectId>, org: &ObjectPool, src: &ObjectPool) -> Vec<ObjectId> {
    let len = items.len();
    #[cfg(debug_assertions)]
    let before: std::collections::BTreeSet<ObjectId> = items.iter().copied().collect();

    reorder_range(&mut items, 0, len, org, src);

    #[cfg(debug_assertions)]
    {
        let after: std::collections::BTreeSet<ObjectId> = items.iter().copied().collect();
        debug_assert_eq!(before, after, "reorder changed membership");
        debug_assert_eq!(items.len(), len, "reorder changed length");
    }
    items
}

fn reorder_range(
    items: &mut [ObjectId],
    lo: usize,
    hi: usize,
    org: &ObjectPool,
    src: &ObjectPool,
) {
    if hi.saturating_sub(lo) <= 1 {
        return;
    }

    // The pivot is the sibling with the latest snapshot-recorded
    // LocationChanged. Strictly-greater comparison keeps the first maximal
    // sibling and prefers the local snapshot on equal stamps.
    let mut pivot_idx = lo;
    let mut pivot_time: Option<Timestamp> = None;
    let mut pivot_pool = org;
    for i in lo..hi {
        for pool in [org, src] {
            if let Some(node) = pool.get(items[i]) {
                if pivot_time.map_or(true, |t| node.location_changed > t) {
                    pivot_time = Some(node.location_changed);
                    pivot_idx = i;
                    pivot_pool = pool;
                }
            }
        }
    }

    let pivot = items[pivot_idx];
    let order: &[ObjectId] = pivot_pool
        .get(pivot)
        .and_then(|node| node.parent)
        .map(|parent| pivot_pool.children_of(parent))
        .unwrap_or(&[]);
    let pivot_pos = order.iter().position(|id| *id == pivot);

    let mut before: Vec<ObjectId> = Vec::new();
    let mut after: Vec<ObjectId> = Vec::new();
    for i in lo..hi {
        if i == pivot_idx {
            continue;
        }
        let id = items[i];
        let side = pivot_pos.and_then(|pp| order.iter().position(|o| *o == id).map(|ip| ip < pp));
        match side {
            Some(true) => before.push(id),
            Some(false) => after.push(id),
            // Unknown to the pivot's neighbor ordering: keep the side the
            // current range gives it relative to the pivot.
            None => {
                if i < pivot_idx {
                    before.push(id)
                } else {
                    after.push(id)
                }
            }
        }
    }

    let mid = lo + before.len();
    for (offset, id) in before
        .iter()
        .chain(std::iter::once(&pivot))
        .chain(after.iter())
        .enumerate()
    {
        items[lo + offset] = *id;
    }

    reorder_range(items, lo, mid, org, src);
    reorder_range(items, mid + 1, hi, org, src);
}
