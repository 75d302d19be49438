//! Inner random stream
//!
//! Protected values in the structural body are stored XOR-masked against a
//! keyed pseudorandom byte stream seeded from the header's protected-stream
//! key. The stream's position advances monotonically and is never rewound:
//! values must be unmasked in the exact order they appear in the document,
//! and one stream instance belongs to exactly one decode operation.
//!
//! The two keyed generators the format mandates are small enough to live
//! here: the Salsa20 core (keyed with the SHA-256 of the stream key and a
//! fixed nonce) and the ArcFour variant retained for containers written by
//! older generators (its pad discards the first 512 bytes).

use vaultsync_core::sha256;

/// Inner random stream algorithm selector from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerStreamId {
    /// No masking; protected values are stored as plaintext.
    Null,
    /// ArcFour variant (legacy generators).
    ArcFourVariant,
    /// Salsa20 (standard).
    Salsa20,
}

impl InnerStreamId {
    /// Decode the header's algorithm id. Unknown values are rejected.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(InnerStreamId::Null),
            1 => Some(InnerStreamId::ArcFourVariant),
            2 => Some(InnerStreamId::Salsa20),
            _ => None,
        }
    }

    /// The header id for this algorithm.
    pub fn to_id(self) -> u32 {
        match self {
            InnerStreamId::Null => 0,
            InnerStreamId::ArcFourVariant => 1,
            InnerStreamId::Salsa20 => 2,
        }
    }
}

/// Nonce fixed by the container format for the inner Salsa20 stream.
const SALSA20_NONCE: [u8; 8] = [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];

/// The keyed XOR-pad generator for protected values.
pub struct RandomStream {
    imp: StreamImpl,
}

enum StreamImpl {
    Null,
    ArcFour(ArcFourVariant),
    Salsa20(Salsa20),
}

impl RandomStream {
    /// Create the stream for the given algorithm and protected-stream key.
    pub fn new(id: InnerStreamId, key: &[u8]) -> Self {
        let imp = match id {
            InnerStreamId::Null => StreamImpl::Null,
            InnerStreamId::ArcFourVariant => StreamImpl::ArcFour(ArcFourVariant::new(key)),
            InnerStreamId::Salsa20 => {
                StreamImpl::Salsa20(Salsa20::new(&sha256(key), &SALSA20_NONCE))
            }
        };
        Self { imp }
    }

    /// XOR the next `data.len()` pad bytes into `data`, advancing the
    /// stream position.
    pub fn apply(&mut self, data: &mut [u8]) {
        match &mut self.imp {
            StreamImpl::Null => {}
            StreamImpl::ArcFour(s) => s.apply(data),
            StreamImpl::Salsa20(s) => s.apply(data),
        }
    }
}

/// RC4-style generator with the format's key schedule and a 512-byte
/// discard before the first pad byte.
struct ArcFourVariant {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl ArcFourVariant {
    fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (w, slot) in state.iter_mut().enumerate() {
            *slot = w as u8;
        }
        if !key.is_empty() {
            let mut i = 0usize;
            let mut j = 0u8;
            for w in 0..256 {
                j = j.wrapping_add(state[w]).wrapping_add(key[i]);
                state.swap(w, j as usize);
                i += 1;
                if i >= key.len() {
                    i = 0;
                }
            }
        }
        let mut this = Self { state, i: 0, j: 0 };
        let mut discard = [0u8; 512];
        this.apply(&mut discard);
        this
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let t = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte ^= self.state[t as usize];
        }
    }
}

/// Salsa20 keystream generator (20 rounds, 256-bit key).
struct Salsa20 {
    state: [u32; 16],
    block: [u8; 64],
    pos: usize,
}

const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646E, 0x7962_2D32, 0x6B20_6574];

impl Salsa20 {
    fn new(key: &[u8; 32], nonce: &[u8; 8]) -> Self {
        let word = |b: &[u8]| u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let mut state = [0u32; 16];
        state[0] = SIGMA[0];
        for i in 0..4 {
            state[1 + i] = word(&key[4 * i..]);
        }
        state[5] = SIGMA[1];
        state[6] = word(&nonce[0..]);
        state[7] = word(&nonce[4..]);
        state[8] = 0; // block counter, low word
        state[9] = 0; // block counter, high word
        state[10] = SIGMA[2];
        for i in 0..4 {
            state[11 + i] = word(&key[16 + 4 * i..]);
        }
        state[15] = SIGMA[3];
        Self {
            state,
            block: [0u8; 64],
            pos: 64,
        }
    }

    fn quarter(words: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
        words[b] ^= words[a].wrapping_add(words[d]).rotate_left(7);
        words[c] ^= words[b].wrapping_add(words[a]).rotate_left(9);
        words[d] ^= words[c].wrapping_add(words[b]).rotate_left(13);
        words[a] ^= words[d].wrapping_add(words[c]).rotate_left(18);
    }

    fn next_block(&mut self) {
        let mut w = self.state;
        for _ in 0..10 {
            // column round
            Self::quarter(&mut w, 0, 4, 8, 12);
            Self::quarter(&mut w, 5, 9, 13, 1);
            Self::quarter(&mut w, 10, 14, 2, 6);
            Self::quarter(&mut w, 15, 3, 7, 11);
            // row round
            Self::quarter(&mut w, 0, 1, 2, 3);
            Self::quarter(&mut w, 5, 6, 7, 4);
            Self::quarter(&mut w, 10, 11, 8, 9);
            Self::quarter(&mut w, 15, 12, 13, 14);
        }
        for i in 0..16 {
            let out = w[i].wrapping_add(self.state[i]);
            self.block[4 * i..4 * i + 4].copy_from_slice(&out.to_le_bytes());
        }
        let (low, carry) = self.state[8].overflowing_add(1);
        self.state[8] = low;
        if carry {
            self.state[9] = self.state[9].wrapping_add(1);
        }
        self.pos = 0;
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.pos == 64 {
                self.next_block();
            }
            *byte ^= self.block[self.pos];
            self.pos += 1;
        }
    }
}
