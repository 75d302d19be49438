//! Object identity
//!
//! Every group, entry, deleted-object record and custom icon is identified
//! by a 16-byte [`ObjectId`]. Identity is the *only* cross-reference
//! mechanism in the tree: parent links, pool lookups and merge matching all
//! go through it, never through memory references.

use std::fmt;
use uuid::Uuid;

/// 16-byte immutable identity for a record in a database tree.
///
/// Ordering is byte-lexicographic, which makes `ObjectId` usable as a
/// `BTreeMap` key with a stable, implementation-independent order. The
/// all-zero value is reserved as the "no identity" sentinel; a finished
/// tree never contains it (parsers substitute a fresh random id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// The reserved all-zero sentinel meaning "no identity".
    pub const NIL: ObjectId = ObjectId(Uuid::nil());

    /// Create a fresh random identity (UUID v4).
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an identity from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Create an identity from a byte slice.
    ///
    /// Returns `None` unless the slice is exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(Uuid::from_bytes(raw)))
    }

    /// Get the raw bytes of this identity.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Whether this is the reserved "no identity" sentinel.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
