//! Container header
//!
//! The header is the only plaintext part of the container: signature pair,
//! version word, then `(id: u8, length: u16 LE, data)` fields up to the
//! terminator. Every byte read here is mirrored into a buffer whose
//! SHA-256 becomes the header hash; the structural body embeds the same
//! hash so a header rewrite without a body rewrite is detectable.

use byteorder::{ByteOrder, LittleEndian};
use std::io::Read;

use vaultsync_core::{sha256, DecodeError, DecodeResult, ObjectId};
use vaultsync_model::Compression;

use crate::consts::{
    field, FILE_VERSION, FILE_VERSION_CRITICAL_MASK, SIG1, SIG2, SIG2_LEGACY, SIG2_PRE_RELEASE,
    STREAM_START_LEN,
};
use crate::random_stream::InnerStreamId;

/// Parsed and validated container header.
#[derive(Debug, Clone)]
pub struct Header {
    /// Full version word from the file.
    pub version: u32,
    /// Outer cipher identifier.
    pub cipher_id: ObjectId,
    /// Outer compression mode.
    pub compression: Compression,
    /// Master seed mixed into the final key.
    pub master_seed: [u8; 32],
    /// Seed for the key transform.
    pub transform_seed: [u8; 32],
    /// Key-transform rounds.
    pub transform_rounds: u64,
    /// IV for the outer cipher.
    pub encryption_iv: Vec<u8>,
    /// Key of the inner random stream masking protected values.
    pub protected_stream_key: Vec<u8>,
    /// Expected first plaintext bytes; the wrong-key detector.
    pub stream_start_bytes: [u8; 32],
    /// Inner random stream algorithm.
    pub inner_stream_id: InnerStreamId,
    /// SHA-256 over every header byte as stored.
    pub hash: [u8; 32],
}

/// Reader that mirrors everything it reads into a buffer.
struct MirrorRead<'a, R: Read> {
    inner: &'a mut R,
    mirror: Vec<u8>,
}

impl<'a, R: Read> MirrorRead<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            mirror: Vec::with_capacity(256),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> DecodeResult<()> {
        self.inner.read_exact(buf)?;
        self.mirror.extend_from_slice(buf);
        Ok(())
    }

    fn read_u32(&mut self) -> DecodeResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn read_u16(&mut self) -> DecodeResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    fn read_u8(&mut self) -> DecodeResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_vec(&mut self, len: usize) -> DecodeResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn exactly<const N: usize>(
    data: &[u8],
    field_name: &'static str,
) -> DecodeResult<[u8; N]> {
    data.try_into().map_err(|_| {
        DecodeError::malformed(
            field_name,
            format!("{} bytes, expected {}", data.len(), N),
        )
    })
}

impl Header {
    /// Read and validate the header from the start of a container stream.
    pub fn read<R: Read>(reader: &mut R) -> DecodeResult<Self> {
        let mut mirror = MirrorRead::new(reader);

        let sig1 = mirror.read_u32()?;
        let sig2 = mirror.read_u32()?;
        match (sig1, sig2) {
            (SIG1, SIG2) | (SIG1, SIG2_PRE_RELEASE) => {}
            (SIG1, SIG2_LEGACY) => return Err(DecodeError::LegacyFormat),
            _ => return Err(DecodeError::UnrecognizedSignature),
        }

        let version = mirror.read_u32()?;
        if (version & FILE_VERSION_CRITICAL_MASK) > (FILE_VERSION & FILE_VERSION_CRITICAL_MASK) {
            return Err(DecodeError::UnsupportedVersion { version });
        }

        let mut cipher_id = None;
        let mut compression = None;
        let mut master_seed = None;
        let mut transform_seed = None;
        let mut transform_rounds = None;
        let mut encryption_iv = None;
        let mut protected_stream_key = None;
        let mut stream_start_bytes = None;
        let mut inner_stream_id = None;

        loop {
            let id = mirror.read_u8()?;
            let len = mirror.read_u16()? as usize;
            let data = mirror.read_vec(len)?;

            match id {
                field::END_OF_HEADER => break,
                field::COMMENT => {}
                field::CIPHER_ID => {
                    let raw: [u8; 16] = exactly(&data, "CipherID")?;
                    cipher_id = Some(ObjectId::from_bytes(raw));
                }
                field::COMPRESSION_FLAGS => {
                    let raw: [u8; 4] = exactly(&data, "CompressionFlags")?;
                    let flag = LittleEndian::read_u32(&raw);
                    compression = Some(
                        Compression::from_flag(flag)
                            .ok_or(DecodeError::UnsupportedCompression(flag))?,
                    );
                }
                field::MASTER_SEED => {
                    master_seed = Some(exactly::<32>(&data, "MasterSeed")?);
                }
                field::TRANSFORM_SEED => {
                    transform_seed = Some(exactly::<32>(&data, "TransformSeed")?);
                }
                field::TRANSFORM_ROUNDS => {
                    let raw: [u8; 8] = exactly(&data, "TransformRounds")?;
                    transform_rounds = Some(LittleEndian::read_u64(&raw));
                }
                field::ENCRYPTION_IV => {
                    encryption_iv = Some(data);
                }
                field::PROTECTED_STREAM_KEY => {
                    if data.is_empty() {
                        return Err(DecodeError::malformed("ProtectedStreamKey", "empty"));
                    }
                    protected_stream_key = Some(data);
                }
                field::STREAM_START_BYTES => {
                    stream_start_bytes =
                        Some(exactly::<STREAM_START_LEN>(&data, "StreamStartBytes")?);
                }
                field::INNER_RANDOM_STREAM_ID => {
                    let raw: [u8; 4] = exactly(&data, "InnerRandomStreamID")?;
                    let id = LittleEndian::read_u32(&raw);
                    inner_stream_id = Some(InnerStreamId::from_id(id).ok_or_else(|| {
                        DecodeError::malformed(
                            "InnerRandomStreamID",
                            format!("unknown algorithm {}", id),
                        )
                    })?);
                }
                unknown => {
                    tracing::warn!(field = unknown, len, "unknown header field, skipping");
                }
            }
        }

        let hash = sha256(&mirror.mirror);

        Ok(Header {
            version,
            cipher_id: cipher_id.ok_or(DecodeError::MissingHeaderField { field: "CipherID" })?,
            compression: compression
                .ok_or(DecodeError::MissingHeaderField { field: "CompressionFlags" })?,
            master_seed: master_seed
                .ok_or(DecodeError::MissingHeaderField { field: "MasterSeed" })?,
            transform_seed: transform_seed
                .ok_or(DecodeError::MissingHeaderField { field: "TransformSeed" })?,
            transform_rounds: transform_rounds
                .ok_or(DecodeError::MissingHeaderField { field: "TransformRounds" })?,
            encryption_iv: encryption_iv
                .ok_or(DecodeError::MissingHeaderField { field: "EncryptionIV" })?,
            protected_stream_key: protected_stream_key
                .ok_or(DecodeError::MissingHeaderField { field: "ProtectedStreamKey" })?,
            stream_start_bytes: stream_start_bytes
                .ok_or(DecodeError::MissingHeaderField { field: "StreamStartBytes" })?,
            inner_stream_id: inner_stream_id
                .ok_or(DecodeError::MissingHeaderField { field: "InnerRandomStreamID" })?,
            hash,
        })
    }
}
