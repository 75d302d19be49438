//! Container codec for vaultsync
//!
//! Turns raw container bytes into a validated [`vaultsync_model::Database`]
//! through a pipeline of stream transforms and a streaming structural
//! parser:
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ HashingRead (running SHA-256 of transport) │
//! ├────────────────────────────────────────────┤
//! │ Header (signatures, version, TLV fields)   │
//! ├────────────────────────────────────────────┤
//! │ CipherEngine (outer decryption)            │
//! ├────────────────────────────────────────────┤
//! │ Start-bytes check (wrong-key detection)    │
//! ├────────────────────────────────────────────┤
//! │ BlockRead (hashed-block integrity layer)   │
//! ├────────────────────────────────────────────┤
//! │ GzDecoder (optional decompression)         │
//! ├────────────────────────────────────────────┤
//! │ XmlReader → KdbxParser (structural parse)  │
//! └────────────────────────────────────────────┘
//! ```
//!
//! Every stage raises its own [`vaultsync_core::DecodeError`] kind; no
//! stage substitutes default data on integrity failure, and a failed
//! decode never leaks a partially populated tree.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod consts;
pub mod decode;
pub mod hashed_block;
pub mod hashing;
pub mod header;
pub mod parse;
pub mod random_stream;
pub mod xml;

pub use cipher::CipherRegistry;
pub use decode::{DecodeOptions, DecodeOutcome, KdbxReader};
pub use hashed_block::{BlockRead, BlockWrite};
pub use hashing::{HashHandle, HashingRead};
pub use header::Header;
pub use random_stream::{InnerStreamId, RandomStream};
