//! Core types and collaborator seams for vaultsync
//!
//! This crate defines the foundational types used throughout the engine:
//! - ObjectId: 16-byte identity shared by every record in a database tree
//! - Timestamp helpers: RFC 3339 parsing/formatting with an epoch default
//! - Error: decode and merge error hierarchies
//! - Collaborator traits: cipher engine, key transform, status logger
//! - CancelToken: cooperative cancellation for long-running decode work
//!
//! Cryptographic primitives are deliberately *not* implemented here. The
//! decode pipeline consumes them through the [`CipherEngine`] and
//! [`KeyTransform`] seams so the host application decides which cipher
//! and key-derivation implementations to plug in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod status;
pub mod time;

pub use cancel::CancelToken;
pub use crypto::{sha256, sha256_pair, CipherEngine, CompositeKey, KeyTransform};
pub use error::{DecodeError, DecodeResult, FailureKind, MergeError, MergeResult};
pub use identity::ObjectId;
pub use status::{LogLevel, NullStatusLogger, StatusLogger};
pub use time::{epoch, format_kdbx, parse_kdbx, Timestamp};
