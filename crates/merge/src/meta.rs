//! Database-settings and icon merging
//!
//! Global properties carry per-property change stamps; the later stamp
//! wins under every policy except `OverwriteExisting`, which takes the
//! source unconditionally. Group references (recycle bin, entry
//! templates) are re-validated against the merged tree: a winning
//! reference that no longer resolves falls back to the other side's
//! candidate, then to "no reference".

use vaultsync_core::{ObjectId, Timestamp};
use vaultsync_model::Database;

use crate::MergePolicy;

/// Merge global database properties from `source` into `local`.
pub fn merge_meta(local: &mut Database, source: &Database, policy: MergePolicy) {
    let overwrite = policy == MergePolicy::OverwriteExisting;
    let s = source.meta.clone();

    {
        let m = &mut local.meta;
        if overwrite || s.name_changed > m.name_changed {
            m.name = s.name;
            m.name_changed = s.name_changed;
        }
        if overwrite || s.description_changed > m.description_changed {
            m.description = s.description;
            m.description_changed = s.description_changed;
        }
        if overwrite || s.default_username_changed > m.default_username_changed {
            m.default_username = s.default_username;
            m.default_username_changed = s.default_username_changed;
        }
        if overwrite || s.color_changed > m.color_changed {
            m.color = s.color;
            m.color_changed = s.color_changed;
        }
        if overwrite || s.master_key_changed > m.master_key_changed {
            m.master_key_changed = s.master_key_changed;
            m.master_key_change_rec = s.master_key_change_rec;
            m.master_key_change_force = s.master_key_change_force;
        }
        if overwrite {
            m.memory_protection = s.memory_protection;
            m.history = s.history;
            m.maintenance_history_days = s.maintenance_history_days;
            m.custom_data = s.custom_data;
        } else {
            for (key, value) in s.custom_data {
                m.custom_data.entry(key).or_insert(value);
            }
        }
    }

    // Group references: stamp-based winner, then re-validate against the
    // merged tree.
    let (rb_uuid, rb_enabled, rb_changed) =
        if overwrite || source.meta.recycle_bin_changed > local.meta.recycle_bin_changed {
            (
                source.meta.recycle_bin,
                source.meta.recycle_bin_enabled,
                source.meta.recycle_bin_changed,
            )
        } else {
            (
                local.meta.recycle_bin,
                local.meta.recycle_bin_enabled,
                local.meta.recycle_bin_changed,
            )
        };
    let (rb_uuid, rb_changed) = resolve_group_ref(
        local,
        (rb_uuid, rb_changed),
        (local.meta.recycle_bin, local.meta.recycle_bin_changed),
    );
    local.meta.recycle_bin = rb_uuid;
    local.meta.recycle_bin_enabled = rb_enabled;
    local.meta.recycle_bin_changed = rb_changed;

    let (tpl_uuid, tpl_changed) = if overwrite
        || source.meta.entry_templates_group_changed > local.meta.entry_templates_group_changed
    {
        (
            source.meta.entry_templates_group,
            source.meta.entry_templates_group_changed,
        )
    } else {
        (
            local.meta.entry_templates_group,
            local.meta.entry_templates_group_changed,
        )
    };
    let (tpl_uuid, tpl_changed) = resolve_group_ref(
        local,
        (tpl_uuid, tpl_changed),
        (
            local.meta.entry_templates_group,
            local.meta.entry_templates_group_changed,
        ),
    );
    local.meta.entry_templates_group = tpl_uuid;
    local.meta.entry_templates_group_changed = tpl_changed;
}

/// Validate a winning group reference against the merged tree, falling
/// back to the losing candidate, then to "no reference".
fn resolve_group_ref(
    tree: &Database,
    winner: (ObjectId, Timestamp),
    fallback: (ObjectId, Timestamp),
) -> (ObjectId, Timestamp) {
    if winner.0.is_nil() || tree.group(winner.0).is_some() {
        return winner;
    }
    tracing::warn!(reference = %winner.0, "group reference does not resolve after merge");
    if !fallback.0.is_nil() && tree.group(fallback.0).is_some() {
        return fallback;
    }
    (ObjectId::NIL, winner.1)
}

/// Append source icons whose identity the local side does not have.
/// Icons are immutable, so matching identities need no property merge.
pub fn merge_custom_icons(local: &mut Database, source: &Database) {
    for icon in &source.custom_icons {
        if local.custom_icon(icon.uuid).is_none() {
            local.custom_icons.push(icon.clone());
        }
    }
}
