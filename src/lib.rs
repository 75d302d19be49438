//! vaultsync — password-database decode and synchronization engine
//!
//! vaultsync reads encrypted, compressed, integrity-checked KDBX 3.1
//! containers into an in-memory record tree and reconciles independently
//! edited copies of that tree.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vaultsync::{
//!     merge_into, CancelToken, CipherRegistry, CompositeKey, DecodeOptions,
//!     DecodeOutcome, KdbxReader, MergePolicy, NullStatusLogger,
//! };
//!
//! let mut registry = CipherRegistry::new();
//! registry.register(Arc::new(MyAesEngine::default()));
//!
//! let key = CompositeKey::from_password("master password");
//! let reader = KdbxReader::new(&registry);
//! let outcome = reader.load(
//!     std::fs::File::open("passwords.kdbx")?,
//!     &key,
//!     CancelToken::new(),
//!     &mut NullStatusLogger,
//!     DecodeOptions::default(),
//! )?;
//!
//! if let DecodeOutcome::Complete { database: mut local, .. } = outcome {
//!     // ... later, reconcile another copy:
//!     merge_into(&mut local, &other, MergePolicy::Synchronize, &mut NullStatusLogger)?;
//! }
//! ```
//!
//! # Architecture
//!
//! The engine is split into four layers, re-exported here:
//!
//! - `vaultsync-core`: identity, timestamps, errors, collaborator seams
//!   (cipher engine, key transform, status logger, cancellation)
//! - `vaultsync-model`: the record tree (groups, entries, history,
//!   protected values), database settings and structural snapshots
//! - `vaultsync-codec`: the decode pipeline (running hash, header,
//!   hashed-block layer, inner random stream, structural parser)
//! - `vaultsync-merge`: policy-driven reconciliation with deletion
//!   propagation and pivot-based structural reordering

pub use vaultsync_core::{
    epoch, format_kdbx, parse_kdbx, sha256, sha256_pair, CancelToken, CipherEngine, CompositeKey, DecodeError,
    DecodeResult, FailureKind, KeyTransform, LogLevel, MergeError, MergeResult, NullStatusLogger,
    ObjectId, StatusLogger, Timestamp,
};

pub use vaultsync_model::{
    AutoTypeAssociation, AutoTypeConfig, Compression, CustomIcon, Database, DatabaseMeta,
    DeletedObject, Entry, Group, HistorySettings, IgnoreFlags, Inheritable, MemoryProtection, Node,
    ObjectPool, PoolKind, ProtectedBinary, ProtectedString, TimeInfo, Traverse, FIELD_NOTES,
    FIELD_PASSWORD, FIELD_TITLE, FIELD_URL, FIELD_USERNAME, STANDARD_FIELDS,
};

pub use vaultsync_codec::{
    BlockRead, BlockWrite, CipherRegistry, DecodeOptions, DecodeOutcome, HashingRead, Header,
    InnerStreamId, KdbxReader, RandomStream,
};

pub use vaultsync_merge::{merge_into, MergeOutcome, MergePolicy};
