//! Hashed-block integrity layer
//!
//! Between the outer cipher and the (possibly compressed) structural body,
//! the plaintext is framed into integrity-checked blocks:
//!
//! ```text
//! ┌──────────────┬───────────────┬────────────────┬──────────────────┐
//! │ index: u32LE │ hash: 32 bytes│ length: i32 LE │ data[length]     │
//! └──────────────┴───────────────┴────────────────┴──────────────────┘
//! ```
//!
//! - indices are strictly sequential from 0
//! - `hash` is the SHA-256 of `data`
//! - the terminal sentinel is `length == 0` with an all-zero hash; any
//!   other zero-length combination, hash mismatch, index gap or truncation
//!   is a fatal integrity error, never a soft EOF
//!
//! This layer is what gives the container tamper-evidence independent of
//! the outer transport.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use vaultsync_core::{sha256, DecodeError};

/// Default payload size produced by [`BlockWrite`]: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Ceiling on a single block's declared length (64 MiB). A declared length
/// beyond this is treated as corruption instead of an allocation request.
const MAX_BLOCK_SIZE: i32 = 64 * 1024 * 1024;

fn integrity_io(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, DecodeError::BlockIntegrity(msg))
}

/// Reading half of the hashed-block layer.
///
/// Implements `Read` over the verified concatenation of block payloads.
/// Errors carry a [`DecodeError::BlockIntegrity`] payload that the decode
/// entry point restores to a typed error.
pub struct BlockRead<R: Read> {
    inner: R,
    buffer: Vec<u8>,
    pos: usize,
    next_index: u32,
    finished: bool,
    verify: bool,
}

impl<R: Read> BlockRead<R> {
    /// Wrap a block-framed stream with hash verification enabled.
    pub fn new(inner: R) -> Self {
        Self::with_verification(inner, true)
    }

    /// Wrap a block-framed stream, optionally skipping hash verification.
    ///
    /// Index and sentinel checks always run; only the per-block SHA-256
    /// recomputation is optional.
    pub fn with_verification(inner: R, verify: bool) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pos: 0,
            next_index: 0,
            finished: false,
            verify,
        }
    }

    fn read_next_block(&mut self) -> io::Result<()> {
        let index = self.inner.read_u32::<LittleEndian>()?;
        if index != self.next_index {
            return Err(integrity_io(format!(
                "block index {} out of sequence, expected {}",
                index, self.next_index
            )));
        }
        let mut hash = [0u8; 32];
        self.inner.read_exact(&mut hash)?;
        let length = self.inner.read_i32::<LittleEndian>()?;

        if length == 0 {
            if hash != [0u8; 32] {
                return Err(integrity_io(
                    "zero-length block with non-zero hash".to_string(),
                ));
            }
            self.finished = true;
            return Ok(());
        }
        if length < 0 || length > MAX_BLOCK_SIZE {
            return Err(integrity_io(format!("invalid block length {}", length)));
        }

        let mut data = vec![0u8; length as usize];
        self.inner.read_exact(&mut data)?;
        if self.verify && sha256(&data) != hash {
            return Err(integrity_io(format!(
                "hash mismatch in block {}",
                index
            )));
        }

        self.buffer = data;
        self.pos = 0;
        self.next_index += 1;
        Ok(())
    }
}

impl<R: Read> Read for BlockRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buffer.len() {
            if self.finished {
                return Ok(0);
            }
            self.read_next_block()?;
        }
        let n = buf.len().min(self.buffer.len() - self.pos);
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Writing half of the hashed-block layer.
///
/// Buffers payload up to the block size, emits framed blocks, and writes
/// the terminal sentinel on [`finish`].
///
/// [`finish`]: BlockWrite::finish
pub struct BlockWrite<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    block_size: usize,
    next_index: u32,
}

impl<W: Write> BlockWrite<W> {
    /// Wrap a sink with the default block size.
    pub fn new(inner: W) -> Self {
        Self::with_block_size(inner, DEFAULT_BLOCK_SIZE)
    }

    /// Wrap a sink with an explicit block size.
    pub fn with_block_size(inner: W, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            inner,
            buffer: Vec::with_capacity(block_size.min(DEFAULT_BLOCK_SIZE)),
            block_size,
            next_index: 0,
        }
    }

    fn emit_block(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.inner.write_u32::<LittleEndian>(self.next_index)?;
        self.inner.write_all(&sha256(&self.buffer))?;
        self.inner.write_i32::<LittleEndian>(self.buffer.len() as i32)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        self.next_index += 1;
        Ok(())
    }

    /// Flush remaining payload, write the terminal sentinel and return the
    /// underlying sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.emit_block()?;
        self.inner.write_u32::<LittleEndian>(self.next_index)?;
        self.inner.write_all(&[0u8; 32])?;
        self.inner.write_i32::<LittleEndian>(0)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for BlockWrite<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let room = self.block_size - self.buffer.len();
            let take = room.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if self.buffer.len() == self.block_size {
                self.emit_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Payload stays buffered until a full block or finish(); only the
        // sink is flushed here.
        self.inner.flush()
    }
}
