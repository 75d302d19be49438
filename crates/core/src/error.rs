//! Error types for decode and merge
//!
//! Two separate hierarchies: [`DecodeError`] for everything the stream
//! pipeline and structural parser can raise, [`MergeError`] for hard
//! internal-consistency failures during reconciliation. We use `thiserror`
//! for `Display`/`Error` derivation.
//!
//! Decode errors are never recovered locally: every stage aborts on its own
//! failure kind and the partially populated tree is discarded by the caller.
//! Cancellation is an expected outcome, not a fault, and callers need to
//! tell "wrong password" from "corrupt file" from "cancelled" — see
//! [`FailureKind`].

use crate::identity::ObjectId;
use std::io;
use thiserror::Error;

/// Result alias for decode operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result alias for merge operations.
pub type MergeResult<T> = std::result::Result<T, MergeError>;

/// Errors raised by the decode pipeline and structural parser.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container carries the 1.x legacy signature pair.
    #[error("unsupported legacy container format (1.x)")]
    LegacyFormat,

    /// The first eight bytes match no known signature pair.
    #[error("unrecognized file signature")]
    UnrecognizedSignature,

    /// The container's major format version is newer than we support.
    #[error("unsupported container version: 0x{version:08X}")]
    UnsupportedVersion {
        /// The full 32-bit version read from the header.
        version: u32,
    },

    /// A required header field was absent when the header terminator arrived.
    #[error("missing header field: {field}")]
    MissingHeaderField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A header field was present but its payload is invalid.
    #[error("malformed header field {field}: {reason}")]
    MalformedHeaderField {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// The decrypted stream's start bytes do not match the header.
    ///
    /// This is the wrong-password/wrong-key signal, distinct from
    /// corruption of the ciphertext.
    #[error("invalid composite key or corrupt stream start")]
    WrongKey,

    /// The hashed-block layer detected tampering or truncation.
    #[error("block integrity violation: {0}")]
    BlockIntegrity(String),

    /// The header names a cipher no registered engine implements.
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(ObjectId),

    /// The header's compression flag is outside the known enum.
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(u32),

    /// Malformed structural body: illegal nesting, mismatched close tag,
    /// or an embedded header hash that contradicts the header bytes.
    #[error("structural format error: {0}")]
    Structural(String),

    /// The operation was cancelled through the cooperative token.
    #[error("operation cancelled")]
    Cancelled,

    /// A collaborator (cipher engine or key transform) failed.
    #[error("cryptographic collaborator error: {0}")]
    Crypto(String),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Create a block-integrity error.
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::BlockIntegrity(msg.into())
    }

    /// Create a structural-format error.
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    /// Create a malformed-header-field error.
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedHeaderField {
            field,
            reason: reason.into(),
        }
    }

    /// Coarse classification deciding the caller-facing remedy.
    pub fn kind(&self) -> FailureKind {
        match self {
            DecodeError::WrongKey => FailureKind::WrongKey,
            DecodeError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::BadFile,
        }
    }
}

/// Caller-facing classification of a decode failure.
///
/// The remedy differs per kind: re-prompt for credentials, reject the file,
/// or stop quietly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The composite key is wrong; re-prompt the user.
    WrongKey,
    /// The file is unsupported or corrupt; reject it.
    BadFile,
    /// The user cancelled; no fault occurred.
    Cancelled,
}

/// Hard internal-consistency failures during merge.
///
/// Outside debug builds these are recovered locally (attach-under-root,
/// skip-the-relocation) so one anomalous node cannot abort an otherwise
/// good merge; the variants exist so debug builds and tests can surface
/// them loudly.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Two distinct nodes share one identity.
    #[error("identity collision: {0}")]
    UuidCollision(ObjectId),

    /// A node references a parent that is not in the tree.
    #[error("dangling parent reference: {0}")]
    DanglingParent(ObjectId),
}
