//! Merge/synchronize engine for vaultsync
//!
//! Combines a "source" database into a "local" database in place under a
//! [`MergePolicy`]. The synchronizing policies perform a three-way-like
//! reconciliation: structural state of both trees is snapshotted *before*
//! any mutation (four [`ObjectPool`]s — local/source × groups/entries),
//! nodes are matched by identity, property conflicts resolve by
//! last-modification time, deletions propagate both ways without
//! resurrecting stale copies, and structural moves and sibling order
//! reconcile through the snapshots' `LocationChanged` records.
//!
//! Anomalies that would indicate internal inconsistency (a node whose
//! parent cannot be found, an impossible relocation) are recovered locally
//! in release builds — attach under the root, skip the relocation — so one
//! bad node cannot abort an otherwise good merge. Debug builds assert.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deletions;
pub mod meta;
pub mod reorder;

use vaultsync_core::{MergeResult, ObjectId, StatusLogger};
use vaultsync_model::{Database, Entry, Group, IgnoreFlags, ObjectPool};

/// How two databases are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Source properties always win for matched nodes.
    OverwriteExisting,
    /// Matched local nodes are left untouched; only new nodes are added.
    KeepExisting,
    /// Source properties win only when the source node is newer.
    OverwriteIfNewer,
    /// The source gets fresh identities first: a pure import with no
    /// reconciliation against existing nodes.
    CreateNewUuids,
    /// Full bidirectional reconciliation including deletions and
    /// structural moves.
    Synchronize,
    /// Do nothing.
    None,
}

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merge ran to completion; the local tree is authoritative.
    Complete,
    /// The status logger requested a soft stop. The local tree holds
    /// partial work and must be discarded by the caller.
    Stopped,
}

/// Nodes processed between status-logger polls.
const POLL_INTERVAL: u32 = 256;

/// Merge `source` into `local` under `policy`.
///
/// The merge runs to completion once started; there is no cancellation
/// path, only the status logger's soft stop.
pub fn merge_into(
    local: &mut Database,
    source: &Database,
    policy: MergePolicy,
    logger: &mut dyn StatusLogger,
) -> MergeResult<MergeOutcome> {
    if policy == MergePolicy::None {
        return Ok(MergeOutcome::Complete);
    }

    logger.start_logging("synchronizing databases");
    let outcome = Merger::new(policy, logger).run(local, source);
    logger.end_logging();

    debug_assert!(
        local.check_consistency().is_ok(),
        "merge left the tree inconsistent"
    );
    outcome
}

struct Merger<'a> {
    policy: MergePolicy,
    logger: &'a mut dyn StatusLogger,
    processed: u32,
}

impl<'a> Merger<'a> {
    fn new(policy: MergePolicy, logger: &'a mut dyn StatusLogger) -> Self {
        Self {
            policy,
            logger,
            processed: 0,
        }
    }

    /// Poll the status logger; `false` means soft stop.
    fn keep_going(&mut self) -> bool {
        self.processed = self.processed.wrapping_add(1);
        if self.processed % POLL_INTERVAL != 0 {
            return true;
        }
        self.logger.set_progress(0)
    }

    fn run(&mut self, local: &mut Database, source: &Database) -> MergeResult<MergeOutcome> {
        // CreateNewUuids re-identifies a private copy of the source, then
        // merges it add-only: no identity can match an existing node.
        let relabelled;
        let source = if self.policy == MergePolicy::CreateNewUuids {
            let mut copy = source.clone();
            copy.regenerate_uuids();
            relabelled = copy;
            &relabelled
        } else {
            source
        };

        // Structural snapshots must be taken before any mutation below;
        // the merge changes "current parent" as it goes.
        let snapshots = if self.policy == MergePolicy::Synchronize {
            Some((
                ObjectPool::from_groups(local),
                ObjectPool::from_groups(source),
                ObjectPool::from_entries(local),
                ObjectPool::from_entries(source),
            ))
        } else {
            None
        };

        if !self.merge_groups(local, source) || !self.merge_entries(local, source) {
            return Ok(MergeOutcome::Stopped);
        }

        if let Some((org_groups, src_groups, org_entries, src_entries)) = &snapshots {
            deletions::apply_deletions(local, &source.deleted_objects);
            reorder::relocate(
                local,
                source.root_id(),
                org_groups,
                src_groups,
                org_entries,
                src_entries,
            );
            reorder::reorder_children(local, org_groups, src_groups, org_entries, src_entries);
        }

        meta::merge_meta(local, source, self.policy);
        meta::merge_custom_icons(local, source);

        // Retention maintenance is the final pass so merged-in history
        // obeys the (possibly just merged) limits.
        let limits = local.meta.history;
        for eid in local.entry_ids_preorder() {
            if let Some(entry) = local.entry_mut(eid) {
                entry.maintain_history(&limits);
            }
        }

        Ok(MergeOutcome::Complete)
    }

    /// The local group a source node's parent maps to: same identity,
    /// falling back to the local root when the counterpart is missing.
    fn counterpart_parent(
        &self,
        local: &Database,
        source: &Database,
        source_parent: Option<ObjectId>,
    ) -> ObjectId {
        match source_parent {
            None => local.root_id(),
            Some(pid) if pid == source.root_id() => local.root_id(),
            Some(pid) => {
                if local.group(pid).is_some() {
                    pid
                } else {
                    debug_assert!(false, "dangling parent {} during merge", pid);
                    tracing::warn!(parent = %pid, "parent not found, attaching under root");
                    local.root_id()
                }
            }
        }
    }

    /// Returns `false` on soft stop.
    fn merge_groups(&mut self, local: &mut Database, source: &Database) -> bool {
        for sid in source.group_ids_preorder() {
            if !self.keep_going() {
                return false;
            }
            if sid == source.root_id() {
                continue; // the source root maps to the local root
            }
            let sgroup = source.group(sid).expect("id from preorder walk");

            if local.group(sid).is_some() {
                let target = local.group_mut(sid).expect("checked above");
                match self.policy {
                    MergePolicy::OverwriteExisting => target.assign_properties(sgroup, false),
                    MergePolicy::OverwriteIfNewer | MergePolicy::Synchronize => {
                        target.assign_properties(sgroup, true)
                    }
                    MergePolicy::KeepExisting | MergePolicy::CreateNewUuids => {}
                    MergePolicy::None => unreachable!("handled by merge_into"),
                }
            } else {
                let parent = self.counterpart_parent(local, source, sgroup.parent);
                let mut created = Group::with_uuid(sid, "");
                created.assign_properties(sgroup, false);
                if let Err(err) = local.add_group(parent, created) {
                    debug_assert!(false, "group add failed during merge: {}", err);
                    tracing::warn!(group = %sid, %err, "skipping group");
                }
            }
        }
        true
    }

    /// Returns `false` on soft stop.
    fn merge_entries(&mut self, local: &mut Database, source: &Database) -> bool {
        for sid in source.entry_ids_preorder() {
            if !self.keep_going() {
                return false;
            }
            let sentry = source.entry(sid).expect("id from preorder walk");

            if local.entry(sid).is_none() {
                let parent = self.counterpart_parent(local, source, sentry.parent);
                let mut created = Entry::with_uuid(sid);
                created.assign_properties(sentry, false);
                created.history = normalized_history(sentry, sid);
                if let Err(err) = local.add_entry(parent, created) {
                    debug_assert!(false, "entry add failed during merge: {}", err);
                    tracing::warn!(entry = %sid, %err, "skipping entry");
                }
                continue;
            }

            // Matched pair: back up whichever side is older before its
            // edits could be overwritten, then merge per policy.
            let mut sentry = sentry.clone();
            sentry.history = normalized_history(&sentry, sid);
            let target = local.entry_mut(sid).expect("checked above");
            let equals = target.equals_ignoring(&sentry, IgnoreFlags::for_merge());

            let source_newer =
                sentry.times.last_modification > target.times.last_modification;
            let local_newer =
                target.times.last_modification > sentry.times.last_modification;

            // Back up the older side unless the other side's history
            // already carries that exact state (the history merge below
            // would preserve it anyway).
            let backup_local = !equals
                && (self.policy == MergePolicy::OverwriteExisting || source_newer)
                && !has_backup_of(&sentry, target);
            if backup_local {
                let snapshot = own_snapshot(target);
                target.history.push(snapshot);
            }
            let backup_source = !equals
                && self.policy != MergePolicy::OverwriteExisting
                && local_newer
                && !has_backup_of(target, &sentry);
            if backup_source {
                let snapshot = own_snapshot(&sentry);
                sentry.history.push(snapshot);
            }

            match self.policy {
                MergePolicy::OverwriteExisting => target.assign_properties(&sentry, false),
                MergePolicy::OverwriteIfNewer | MergePolicy::Synchronize => {
                    target.assign_properties(&sentry, true)
                }
                MergePolicy::KeepExisting | MergePolicy::CreateNewUuids => {}
                MergePolicy::None => unreachable!("handled by merge_into"),
            }

            merge_entry_history(target, &sentry);
        }
        true
    }
}

/// A clone of the entry's current state suitable for its own history:
/// same identity, no nested history.
fn own_snapshot(entry: &Entry) -> Entry {
    let mut snapshot = entry.clone();
    snapshot.history.clear();
    snapshot
}

/// Whether `entry` already has a history snapshot equal to `data`.
fn has_backup_of(entry: &Entry, data: &Entry) -> bool {
    entry
        .history
        .iter()
        .any(|h| h.equals_ignoring(data, IgnoreFlags::for_merge()))
}

/// History snapshots of `entry` with identity pinned to `uuid` and any
/// nested history stripped.
fn normalized_history(entry: &Entry, uuid: ObjectId) -> Vec<Entry> {
    entry
        .history
        .iter()
        .map(|h| {
            let mut snapshot = h.clone();
            snapshot.uuid = uuid;
            snapshot.history.clear();
            snapshot
        })
        .collect()
}

/// Merge `source`'s history into `target`'s, keyed by last-modification
/// time. Exact-time collisions keep the local snapshot. The result is
/// ordered by time and carries no nested history.
fn merge_entry_history(target: &mut Entry, source: &Entry) {
    if target.uuid != source.uuid {
        debug_assert!(false, "history merge across identities");
        return;
    }
    let mut by_time: std::collections::BTreeMap<_, Entry> = std::collections::BTreeMap::new();
    for snapshot in target.history.drain(..) {
        by_time.insert(snapshot.times.last_modification, snapshot);
    }
    for snapshot in &source.history {
        by_time
            .entry(snapshot.times.last_modification)
            .or_insert_with(|| {
                let mut clone = snapshot.clone();
                clone.uuid = source.uuid;
                clone.history.clear();
                clone
            });
    }
    target.history = by_time.into_values().collect();
}
