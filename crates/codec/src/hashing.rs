//! Running-hash stream wrapper
//!
//! The outermost pipeline stage: passes bytes through unchanged while
//! accumulating a SHA-256 of everything read from the transport. The final
//! hash is compared by callers against the hash of what was last written,
//! giving cheap external-tamper evidence independent of the container's own
//! integrity layers.
//!
//! The wrapper is swallowed by the stream stack built on top of it, so the
//! accumulated state is also reachable through a [`HashHandle`] that stays
//! with the caller: it reports the digest-so-far and the transport position
//! (the latter feeds progress percentages). Decode is single-threaded by
//! design, so the shared state is `Rc`-based.

use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::io::{self, Read};
use std::rc::Rc;

struct HashState {
    hasher: Sha256,
    bytes_read: u64,
}

/// Caller-side view of a [`HashingRead`]'s accumulated state.
#[derive(Clone)]
pub struct HashHandle {
    state: Rc<RefCell<HashState>>,
}

impl HashHandle {
    /// SHA-256 of every byte served so far.
    pub fn digest(&self) -> [u8; 32] {
        self.state.borrow().hasher.clone().finalize().into()
    }

    /// Total bytes served so far.
    pub fn position(&self) -> u64 {
        self.state.borrow().bytes_read
    }
}

/// `Read` adapter accumulating a SHA-256 of all bytes served.
pub struct HashingRead<R: Read> {
    inner: R,
    state: Rc<RefCell<HashState>>,
}

impl<R: Read> HashingRead<R> {
    /// Wrap a transport stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: Rc::new(RefCell::new(HashState {
                hasher: Sha256::new(),
                bytes_read: 0,
            })),
        }
    }

    /// A handle observing this wrapper's accumulated state.
    pub fn handle(&self) -> HashHandle {
        HashHandle {
            state: Rc::clone(&self.state),
        }
    }

    /// Total bytes served so far.
    pub fn bytes_read(&self) -> u64 {
        self.state.borrow().bytes_read
    }

    /// Consume the wrapper, returning the accumulated hash.
    pub fn finalize(self) -> [u8; 32] {
        self.handle().digest()
    }
}

impl<R: Read> Read for HashingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let mut state = self.state.borrow_mut();
        state.hasher.update(&buf[..n]);
        state.bytes_read += n as u64;
        Ok(n)
    }
}
