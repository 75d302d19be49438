//! Container layout constants
//!
//! All multi-byte integers in the outer container are little-endian.

/// First signature word, shared by every 2.x container.
pub const SIG1: u32 = 0x9AA2_D903;

/// Second signature word of a released 2.x container.
pub const SIG2: u32 = 0xB54B_FB67;

/// Second signature word of pre-release 2.x containers. Accepted.
pub const SIG2_PRE_RELEASE: u32 = 0xB54B_FB66;

/// Second signature word of the 1.x legacy format. Rejected with a
/// dedicated error so callers can suggest a converter.
pub const SIG2_LEGACY: u32 = 0xB54B_FB65;

/// Highest container version this engine reads (3.1).
pub const FILE_VERSION: u32 = 0x0003_0001;

/// Mask selecting the major part of the version word.
pub const FILE_VERSION_CRITICAL_MASK: u32 = 0xFFFF_0000;

/// Header field identifiers.
///
/// `(field-id: u8, length: u16 LE, data)` records repeat until
/// `END_OF_HEADER`.
pub mod field {
    /// Terminates the header.
    pub const END_OF_HEADER: u8 = 0;
    /// Free-form comment; ignored.
    pub const COMMENT: u8 = 1;
    /// 16-byte outer cipher identifier.
    pub const CIPHER_ID: u8 = 2;
    /// u32 compression flag.
    pub const COMPRESSION_FLAGS: u8 = 3;
    /// 32-byte master seed.
    pub const MASTER_SEED: u8 = 4;
    /// 32-byte key-transform seed.
    pub const TRANSFORM_SEED: u8 = 5;
    /// u64 key-transform rounds.
    pub const TRANSFORM_ROUNDS: u8 = 6;
    /// Outer cipher IV.
    pub const ENCRYPTION_IV: u8 = 7;
    /// Key of the inner random stream masking protected values.
    pub const PROTECTED_STREAM_KEY: u8 = 8;
    /// First 32 plaintext bytes, echoed for wrong-key detection.
    pub const STREAM_START_BYTES: u8 = 9;
    /// u32 inner random stream algorithm id.
    pub const INNER_RANDOM_STREAM_ID: u8 = 10;
}

/// Length of the stream start-bytes block.
pub const STREAM_START_LEN: usize = 32;

/// Structural tokens processed between cancellation/progress polls.
pub const POLL_INTERVAL: u32 = 256;
