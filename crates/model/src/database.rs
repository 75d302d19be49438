//! Database container and node arena
//!
//! The [`Database`] owns every group and entry in two id-keyed arenas and
//! knows the root group's id. Child order lives in each group's own id
//! lists; the arenas themselves are unordered. All structural operations
//! (attach, detach, relocate, delete) go through the container so the
//! parent links, child lists and deleted-objects list stay consistent.

use rustc_hash::FxHashMap;

use vaultsync_core::{MergeError, MergeResult, ObjectId, Timestamp};

use crate::entry::Entry;
use crate::group::Group;
use crate::meta::{CustomIcon, DatabaseMeta, DeletedObject};

/// Tri-state traversal verdict returned by visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traverse {
    /// Keep walking.
    Continue,
    /// Stop the whole traversal now.
    Stop,
}

/// A node handed to a traversal visitor.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// A group node.
    Group(&'a Group),
    /// An entry node.
    Entry(&'a Entry),
}

/// The decoded password database: record tree, settings, deletions, icons.
#[derive(Debug, Clone)]
pub struct Database {
    root: ObjectId,
    groups: FxHashMap<ObjectId, Group>,
    entries: FxHashMap<ObjectId, Entry>,
    /// Global settings and metadata.
    pub meta: DatabaseMeta,
    /// Deletion records consulted during synchronization.
    pub deleted_objects: Vec<DeletedObject>,
    /// Custom icon blobs, immutable once added.
    pub custom_icons: Vec<CustomIcon>,
}

impl Database {
    /// Create a database with a fresh, empty root group.
    pub fn new() -> Self {
        let root = Group::new("");
        let root_id = root.uuid;
        let mut groups = FxHashMap::default();
        groups.insert(root_id, root);
        Self {
            root: root_id,
            groups,
            entries: FxHashMap::default(),
            meta: DatabaseMeta::default(),
            deleted_objects: Vec::new(),
            custom_icons: Vec::new(),
        }
    }

    /// Id of the root group.
    pub fn root_id(&self) -> ObjectId {
        self.root
    }

    /// The root group.
    pub fn root(&self) -> &Group {
        &self.groups[&self.root]
    }

    /// The root group, mutably.
    pub fn root_mut(&mut self) -> &mut Group {
        self.groups.get_mut(&self.root).expect("root exists")
    }

    /// Replace the root group wholesale, discarding the current tree.
    ///
    /// Used by the parser when the document's own root arrives. The new
    /// root must be childless; its subtree is built through [`add_group`]
    /// and [`add_entry`].
    ///
    /// [`add_group`]: Database::add_group
    /// [`add_entry`]: Database::add_entry
    pub fn replace_root(&mut self, mut root: Group) -> ObjectId {
        root.parent = None;
        let id = root.uuid;
        self.groups.clear();
        self.entries.clear();
        self.groups.insert(id, root);
        self.root = id;
        id
    }

    /// Look up a group.
    pub fn group(&self, id: ObjectId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Look up a group mutably.
    pub fn group_mut(&mut self, id: ObjectId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    /// Look up an entry.
    pub fn entry(&self, id: ObjectId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// Look up an entry mutably.
    pub fn entry_mut(&mut self, id: ObjectId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// Number of groups, root included.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of entries, history not counted.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Attach `group` under `parent`. Fails on identity collision or a
    /// missing parent.
    pub fn add_group(&mut self, parent: ObjectId, mut group: Group) -> MergeResult<ObjectId> {
        let id = group.uuid;
        if self.groups.contains_key(&id) || self.entries.contains_key(&id) {
            return Err(MergeError::UuidCollision(id));
        }
        let parent_group = self
            .groups
            .get_mut(&parent)
            .ok_or(MergeError::DanglingParent(parent))?;
        parent_group.groups.push(id);
        group.parent = Some(parent);
        self.groups.insert(id, group);
        Ok(id)
    }

    /// Attach `entry` under `parent`. Fails on identity collision or a
    /// missing parent.
    pub fn add_entry(&mut self, parent: ObjectId, mut entry: Entry) -> MergeResult<ObjectId> {
        let id = entry.uuid;
        if self.entries.contains_key(&id) || self.groups.contains_key(&id) {
            return Err(MergeError::UuidCollision(id));
        }
        let parent_group = self
            .groups
            .get_mut(&parent)
            .ok_or(MergeError::DanglingParent(parent))?;
        parent_group.entries.push(id);
        entry.parent = Some(parent);
        self.entries.insert(id, entry);
        Ok(id)
    }

    /// Whether `ancestor` is an ancestor of `id` (or `id` itself).
    pub fn is_ancestor_of(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.groups.get(&current).and_then(|g| g.parent);
        }
        false
    }

    /// Move a group under a new parent, appending to the child list.
    ///
    /// Refuses to create a cycle (a group may never become its own
    /// ancestor) and to move the root.
    pub fn relocate_group(&mut self, id: ObjectId, new_parent: ObjectId) -> MergeResult<()> {
        if id == self.root {
            return Err(MergeError::DanglingParent(id));
        }
        if self.is_ancestor_of(id, new_parent) {
            return Err(MergeError::DanglingParent(new_parent));
        }
        if !self.groups.contains_key(&new_parent) {
            return Err(MergeError::DanglingParent(new_parent));
        }
        let old_parent = self
            .groups
            .get(&id)
            .and_then(|g| g.parent)
            .ok_or(MergeError::DanglingParent(id))?;
        if old_parent == new_parent {
            return Ok(());
        }
        if let Some(op) = self.groups.get_mut(&old_parent) {
            op.groups.retain(|g| *g != id);
        }
        self.groups
            .get_mut(&new_parent)
            .expect("checked above")
            .groups
            .push(id);
        self.groups.get_mut(&id).expect("caller verified").parent = Some(new_parent);
        Ok(())
    }

    /// Move an entry under a new parent, appending to the child list.
    pub fn relocate_entry(&mut self, id: ObjectId, new_parent: ObjectId) -> MergeResult<()> {
        if !self.groups.contains_key(&new_parent) {
            return Err(MergeError::DanglingParent(new_parent));
        }
        let old_parent = self
            .entries
            .get(&id)
            .and_then(|e| e.parent)
            .ok_or(MergeError::DanglingParent(id))?;
        if old_parent == new_parent {
            return Ok(());
        }
        if let Some(op) = self.groups.get_mut(&old_parent) {
            op.entries.retain(|e| *e != id);
        }
        self.groups
            .get_mut(&new_parent)
            .expect("checked above")
            .entries
            .push(id);
        self.entries.get_mut(&id).expect("caller verified").parent = Some(new_parent);
        Ok(())
    }

    /// Detach and drop an entry. Returns whether it existed.
    pub fn remove_entry(&mut self, id: ObjectId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(parent) = entry.parent.and_then(|p| self.groups.get_mut(&p)) {
            parent.entries.retain(|e| *e != id);
        }
        true
    }

    /// Detach and drop a group and its whole subtree.
    ///
    /// Returns the ids of every removed node (groups and entries), empty if
    /// the group did not exist. The root cannot be removed.
    pub fn remove_group(&mut self, id: ObjectId) -> Vec<ObjectId> {
        if id == self.root || !self.groups.contains_key(&id) {
            return Vec::new();
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(gid) = stack.pop() {
            let Some(group) = self.groups.remove(&gid) else {
                continue;
            };
            removed.push(gid);
            for eid in &group.entries {
                if self.entries.remove(eid).is_some() {
                    removed.push(*eid);
                }
            }
            stack.extend(group.groups.iter().copied());
            if gid == id {
                if let Some(parent) = group.parent.and_then(|p| self.groups.get_mut(&p)) {
                    parent.groups.retain(|g| *g != id);
                }
            }
        }
        removed
    }

    /// Delete an entry, recording a deletion for synchronization.
    pub fn delete_entry(&mut self, id: ObjectId, now: Timestamp) -> bool {
        if self.remove_entry(id) {
            self.deleted_objects.push(DeletedObject {
                uuid: id,
                deletion_time: now,
            });
            true
        } else {
            false
        }
    }

    /// Delete a group subtree, recording deletions for every removed node.
    pub fn delete_group(&mut self, id: ObjectId, now: Timestamp) -> bool {
        let removed = self.remove_group(id);
        for uuid in &removed {
            self.deleted_objects.push(DeletedObject {
                uuid: *uuid,
                deletion_time: now,
            });
        }
        !removed.is_empty()
    }

    /// Pre-order walk over groups and entries with an early-exit visitor.
    ///
    /// Entries of a group are visited after the group itself, before its
    /// subgroups. Returns `false` when the visitor stopped the walk.
    pub fn traverse<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(Node<'_>) -> Traverse,
    {
        self.traverse_from(self.root, &mut visit)
    }

    fn traverse_from<F>(&self, group_id: ObjectId, visit: &mut F) -> bool
    where
        F: FnMut(Node<'_>) -> Traverse,
    {
        let Some(group) = self.groups.get(&group_id) else {
            return true;
        };
        if visit(Node::Group(group)) == Traverse::Stop {
            return false;
        }
        for eid in &group.entries {
            if let Some(entry) = self.entries.get(eid) {
                if visit(Node::Entry(entry)) == Traverse::Stop {
                    return false;
                }
            }
        }
        for gid in group.groups.clone() {
            if !self.traverse_from(gid, visit) {
                return false;
            }
        }
        true
    }

    /// Group ids in pre-order, root first.
    pub fn group_ids_preorder(&self) -> Vec<ObjectId> {
        let mut ids = Vec::with_capacity(self.groups.len());
        let mut stack = vec![self.root];
        while let Some(gid) = stack.pop() {
            let Some(group) = self.groups.get(&gid) else {
                continue;
            };
            ids.push(gid);
            // Reverse so the first child is processed first.
            for child in group.groups.iter().rev() {
                stack.push(*child);
            }
        }
        ids
    }

    /// Entry ids in pre-order of their owning groups, sibling order kept.
    pub fn entry_ids_preorder(&self) -> Vec<ObjectId> {
        let mut ids = Vec::with_capacity(self.entries.len());
        for gid in self.group_ids_preorder() {
            if let Some(group) = self.groups.get(&gid) {
                ids.extend(group.entries.iter().copied());
            }
        }
        ids
    }

    /// Look up the deletion record for an id, if any.
    pub fn deletion_of(&self, id: ObjectId) -> Option<&DeletedObject> {
        self.deleted_objects.iter().find(|d| d.uuid == id)
    }

    /// Look up a custom icon by id.
    pub fn custom_icon(&self, id: ObjectId) -> Option<&CustomIcon> {
        self.custom_icons.iter().find(|i| i.uuid == id)
    }

    /// Give every group and entry a fresh identity, preserving structure.
    ///
    /// Used by import-style merging so an imported tree cannot collide with
    /// existing records. Group references in the metadata are remapped when
    /// they resolve; history snapshots follow their entry's new identity.
    pub fn regenerate_uuids(&mut self) {
        let mut mapping: FxHashMap<ObjectId, ObjectId> = FxHashMap::default();
        for old in self.groups.keys() {
            mapping.insert(*old, ObjectId::new_random());
        }
        for old in self.entries.keys() {
            mapping.insert(*old, ObjectId::new_random());
        }

        let remap = |mapping: &FxHashMap<ObjectId, ObjectId>, id: ObjectId| {
            mapping.get(&id).copied().unwrap_or(id)
        };

        let mut groups = FxHashMap::default();
        for (old, mut group) in self.groups.drain() {
            let new = remap(&mapping, old);
            group.uuid = new;
            group.parent = group.parent.map(|p| remap(&mapping, p));
            for g in &mut group.groups {
                *g = remap(&mapping, *g);
            }
            for e in &mut group.entries {
                *e = remap(&mapping, *e);
            }
            groups.insert(new, group);
        }
        self.groups = groups;

        let mut entries = FxHashMap::default();
        for (old, mut entry) in self.entries.drain() {
            let new = remap(&mapping, old);
            entry.uuid = new;
            entry.parent = entry.parent.map(|p| remap(&mapping, p));
            for h in &mut entry.history {
                h.uuid = new;
            }
            entries.insert(new, entry);
        }
        self.entries = entries;

        self.root = remap(&mapping, self.root);
        self.meta.recycle_bin = remap(&mapping, self.meta.recycle_bin);
        self.meta.entry_templates_group = remap(&mapping, self.meta.entry_templates_group);
        self.meta.last_selected_group = remap(&mapping, self.meta.last_selected_group);
        self.meta.last_top_visible_group = remap(&mapping, self.meta.last_top_visible_group);
    }

    /// Verify that no two nodes share an identity and every parent link
    /// resolves. Debug aid; release merges recover instead of asserting.
    pub fn check_consistency(&self) -> MergeResult<()> {
        for (id, group) in &self.groups {
            if self.entries.contains_key(id) {
                return Err(MergeError::UuidCollision(*id));
            }
            if let Some(parent) = group.parent {
                if !self.groups.contains_key(&parent) {
                    return Err(MergeError::DanglingParent(*id));
                }
            } else if *id != self.root {
                return Err(MergeError::DanglingParent(*id));
            }
        }
        for (id, entry) in &self.entries {
            match entry.parent {
                Some(parent) if self.groups.contains_key(&parent) => {}
                _ => return Err(MergeError::DanglingParent(*id)),
            }
        }
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
