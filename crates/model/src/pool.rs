//! Flat structural snapshots
//!
//! An [`ObjectPool`] is a disposable point-in-time index of one tree: for
//! every node of one kind (groups or entries) it records the structural
//! facts the merge engine needs later — parent, `location_changed`,
//! `last_modification` — plus each parent's ordered child-id sequence.
//!
//! Pools are built by one pre-order traversal immediately before a
//! synchronize merge (four of them: local/source × groups/entries) and
//! discarded right after. They are read-only: the tree they index is about
//! to be mutated, which is exactly why the pre-merge facts must be copied
//! out instead of referenced.

use std::collections::BTreeMap;

use vaultsync_core::{ObjectId, Timestamp};

use crate::database::Database;

/// Which node kind a pool covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Group nodes (root included).
    Groups,
    /// Entry nodes.
    Entries,
}

/// Structural facts about one node at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolNode {
    /// Parent group at snapshot time; `None` for the root.
    pub parent: Option<ObjectId>,
    /// `location_changed` at snapshot time.
    pub location_changed: Timestamp,
    /// `last_modification` at snapshot time.
    pub last_modification: Timestamp,
}

/// Identity-keyed snapshot of one tree's structure for one node kind.
#[derive(Debug, Clone)]
pub struct ObjectPool {
    kind: PoolKind,
    nodes: BTreeMap<ObjectId, PoolNode>,
    /// Ordered child ids of this kind, keyed by parent group id.
    order: BTreeMap<ObjectId, Vec<ObjectId>>,
}

impl ObjectPool {
    /// Snapshot every group of `db`, root included.
    pub fn from_groups(db: &Database) -> Self {
        let mut nodes = BTreeMap::new();
        let mut order = BTreeMap::new();
        for gid in db.group_ids_preorder() {
            let group = db.group(gid).expect("id from preorder walk");
            nodes.insert(
                gid,
                PoolNode {
                    parent: group.parent,
                    location_changed: group.times.location_changed,
                    last_modification: group.times.last_modification,
                },
            );
            order.insert(gid, group.groups.clone());
        }
        Self {
            kind: PoolKind::Groups,
            nodes,
            order,
        }
    }

    /// Snapshot every entry of `db`.
    pub fn from_entries(db: &Database) -> Self {
        let mut nodes = BTreeMap::new();
        let mut order = BTreeMap::new();
        for gid in db.group_ids_preorder() {
            let group = db.group(gid).expect("id from preorder walk");
            for eid in &group.entries {
                let entry = db.entry(*eid).expect("child id resolves");
                nodes.insert(
                    *eid,
                    PoolNode {
                        parent: entry.parent,
                        location_changed: entry.times.location_changed,
                        last_modification: entry.times.last_modification,
                    },
                );
            }
            order.insert(gid, group.entries.clone());
        }
        Self {
            kind: PoolKind::Entries,
            nodes,
            order,
        }
    }

    /// Which node kind this pool covers.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Look up a node's snapshot facts.
    pub fn get(&self, id: ObjectId) -> Option<&PoolNode> {
        self.nodes.get(&id)
    }

    /// Whether the pool covers `id`.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The ordered child ids (of this pool's kind) a parent had at
    /// snapshot time. Empty for unknown parents.
    pub fn children_of(&self, parent: ObjectId) -> &[ObjectId] {
        self.order.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of nodes covered.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
