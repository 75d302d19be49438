//! Top-level decode entry point
//!
//! Wires the pipeline stages together in order: running hash → header →
//! key transform → outer cipher → start-bytes check → hashed blocks →
//! decompression → structural parse. Every stage's error propagates
//! unchanged; on any failure the partially built tree is dropped here and
//! never reaches the caller.

use std::io::Read;

use flate2::read::GzDecoder;

use vaultsync_core::{
    sha256_pair, CancelToken, DecodeError, DecodeResult, KeyTransform, StatusLogger,
};
use vaultsync_model::{Compression, Database};

use crate::cipher::CipherRegistry;
use crate::consts::STREAM_START_LEN;
use crate::hashed_block::BlockRead;
use crate::hashing::HashingRead;
use crate::header::Header;
use crate::parse::{KdbxParser, ParseOutcome, ProgressSource};
use crate::random_stream::RandomStream;
use crate::xml::XmlReader;

/// Result of a decode.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Decode ran to completion and the tree is authoritative.
    Complete {
        /// The decoded database.
        database: Box<Database>,
        /// SHA-256 of every transport byte consumed.
        transport_hash: [u8; 32],
    },
    /// The status logger requested a soft stop. Nothing is returned; any
    /// partial work was discarded.
    Stopped,
}

/// Decode tuning knobs.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Verify per-block hashes in the hashed-block layer. On by default.
    pub verify_blocks: bool,
    /// Total transport length, when known, for progress percentages.
    pub transport_len: Option<u64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_blocks: true,
            transport_len: None,
        }
    }
}

/// Container reader bound to a cipher registry.
pub struct KdbxReader<'a> {
    registry: &'a CipherRegistry,
}

impl<'a> KdbxReader<'a> {
    /// Create a reader using the given cipher registry.
    pub fn new(registry: &'a CipherRegistry) -> Self {
        Self { registry }
    }

    /// Decode a container from `source` using `key` for key derivation.
    pub fn load<R: Read + 'static>(
        &self,
        source: R,
        key: &dyn KeyTransform,
        cancel: CancelToken,
        logger: &mut dyn StatusLogger,
        options: DecodeOptions,
    ) -> DecodeResult<DecodeOutcome> {
        logger.start_logging("decoding database");
        let result = self.load_inner(source, key, cancel, logger, options);
        logger.end_logging();
        result
    }

    fn load_inner<R: Read + 'static>(
        &self,
        source: R,
        key: &dyn KeyTransform,
        cancel: CancelToken,
        logger: &mut dyn StatusLogger,
        options: DecodeOptions,
    ) -> DecodeResult<DecodeOutcome> {
        let mut hashing = HashingRead::new(source);
        let handle = hashing.handle();

        let header = Header::read(&mut hashing)?;
        tracing::debug!(
            version = header.version,
            rounds = header.transform_rounds,
            "header accepted"
        );

        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        let transformed = key.transform(&header.transform_seed, header.transform_rounds, &cancel)?;
        let final_key = sha256_pair(&header.master_seed, &transformed);

        let engine = self.registry.get(header.cipher_id)?;
        let mut decrypted =
            engine.decrypt_stream(Box::new(hashing), &final_key, &header.encryption_iv)?;

        let mut start = [0u8; STREAM_START_LEN];
        decrypted.read_exact(&mut start)?;
        if start != header.stream_start_bytes {
            return Err(DecodeError::WrongKey);
        }

        let blocks = BlockRead::with_verification(decrypted, options.verify_blocks);
        let body: Box<dyn Read> = match header.compression {
            Compression::Gzip => Box::new(GzDecoder::new(blocks)),
            Compression::None => Box::new(blocks),
        };

        let random = RandomStream::new(header.inner_stream_id, &header.protected_stream_key);
        let progress = match options.transport_len {
            Some(total) => ProgressSource::from_transport(handle.clone(), total),
            None => ProgressSource::none(),
        };
        let parser = KdbxParser::new(
            XmlReader::new(body),
            random,
            header.hash,
            cancel,
            logger,
            progress,
        );

        let mut database = match parser.parse().map_err(restore_io)? {
            ParseOutcome::Complete(db) => db,
            ParseOutcome::Stopped => return Ok(DecodeOutcome::Stopped),
        };
        database.meta.cipher_id = header.cipher_id;
        database.meta.compression = header.compression;
        database.meta.transform_rounds = header.transform_rounds;

        Ok(DecodeOutcome::Complete {
            database: Box::new(database),
            transport_hash: handle.digest(),
        })
    }
}

/// Errors from inner pipeline stages travel through `io::Error` while
/// crossing `Read` adapters; restore them to their typed form.
fn restore_io(err: DecodeError) -> DecodeError {
    match err {
        DecodeError::Io(io_err) => {
            let is_ours = io_err
                .get_ref()
                .map(|inner| inner.is::<DecodeError>())
                .unwrap_or(false);
            if is_ours {
                let boxed = io_err.into_inner().expect("checked above");
                *boxed.downcast::<DecodeError>().expect("checked above")
            } else {
                DecodeError::Io(io_err)
            }
        }
        other => other,
    }
}
