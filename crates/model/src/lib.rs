//! Record tree model for vaultsync
//!
//! This crate defines the in-memory hierarchical record store a decoded
//! container populates and the merge engine reconciles:
//!
//! - [`Group`] / [`Entry`]: the tree nodes, owned by an id-addressed arena
//! - [`Database`]: the container — arena, settings, deleted objects, icons
//! - [`ProtectedString`] / [`ProtectedBinary`]: values flagged for minimal
//!   plaintext retention
//! - [`ObjectPool`]: a disposable point-in-time structural snapshot used to
//!   detect what moved during a merge
//!
//! # Ownership model
//!
//! Groups and entries never hold references to each other. The arena inside
//! [`Database`] owns every node; "parent" and "child" are [`ObjectId`]
//! lookups. This keeps ownership strictly tree-shaped while still allowing
//! the parent back-references and flat snapshots the merge engine needs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod autotype;
pub mod database;
pub mod entry;
pub mod group;
pub mod meta;
pub mod pool;
pub mod protected;
pub mod times;
pub mod tristate;

pub use autotype::{AutoTypeAssociation, AutoTypeConfig};
pub use database::{Database, Node, Traverse};
pub use entry::{Entry, IgnoreFlags, FIELD_NOTES, FIELD_PASSWORD, FIELD_TITLE, FIELD_URL, FIELD_USERNAME, STANDARD_FIELDS};
pub use group::Group;
pub use meta::{
    Compression, CustomIcon, DatabaseMeta, DeletedObject, HistorySettings, MemoryProtection,
};
pub use pool::{ObjectPool, PoolKind, PoolNode};
pub use protected::{ProtectedBinary, ProtectedString};
pub use times::TimeInfo;
pub use tristate::Inheritable;
