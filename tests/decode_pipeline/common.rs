//! Shared fixture builder: assembles valid container bytes from scratch,
//! independent of the encoder the engine does not have.

use std::io::{Read, Write};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use vaultsync::{
    sha256, sha256_pair, BlockWrite, CancelToken, CipherEngine, CipherRegistry, CompositeKey,
    DecodeOptions, DecodeOutcome, DecodeResult, InnerStreamId, KdbxReader, KeyTransform,
    NullStatusLogger, ObjectId, RandomStream,
};

// Container layout constants, spelled out independently of the engine.
pub const SIG1: u32 = 0x9AA2_D903;
pub const SIG2: u32 = 0xB54B_FB67;
pub const FILE_VERSION: u32 = 0x0003_0001;

pub const XOR_CIPHER_ID: [u8; 16] = [0xC4; 16];
pub const MASTER_SEED: [u8; 32] = [0x01; 32];
pub const TRANSFORM_SEED: [u8; 32] = [0x02; 32];
pub const IV: [u8; 16] = [0x03; 16];
pub const STREAM_KEY: [u8; 32] = [0x04; 32];
pub const START_BYTES: [u8; 32] = [0x05; 32];
pub const ROUNDS: u64 = 16;

/// Deterministic XOR stream cipher standing in for the real engine. The
/// pad is a SHA-256 chain over key, IV and a counter; encrypt and decrypt
/// are the same transform.
pub struct XorStreamEngine;

struct XorApply<R: Read> {
    inner: R,
    key: [u8; 32],
    iv: Vec<u8>,
    counter: u64,
    pad: [u8; 32],
    pos: usize,
}

impl<R: Read> XorApply<R> {
    fn new(inner: R, key: [u8; 32], iv: &[u8]) -> Self {
        Self {
            inner,
            key,
            iv: iv.to_vec(),
            counter: 0,
            pad: [0; 32],
            pos: 32,
        }
    }
}

impl<R: Read> Read for XorApply<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        for byte in &mut buf[..n] {
            if self.pos == 32 {
                let mut material = Vec::with_capacity(32 + self.iv.len() + 8);
                material.extend_from_slice(&self.key);
                material.extend_from_slice(&self.iv);
                material.extend_from_slice(&self.counter.to_le_bytes());
                self.pad = sha256(&material);
                self.counter += 1;
                self.pos = 0;
            }
            *byte ^= self.pad[self.pos];
            self.pos += 1;
        }
        Ok(n)
    }
}

impl CipherEngine for XorStreamEngine {
    fn id(&self) -> ObjectId {
        ObjectId::from_bytes(XOR_CIPHER_ID)
    }

    fn decrypt_stream(
        &self,
        inner: Box<dyn Read>,
        key: &[u8; 32],
        iv: &[u8],
    ) -> DecodeResult<Box<dyn Read>> {
        Ok(Box::new(XorApply::new(inner, *key, iv)))
    }
}

pub fn registry() -> CipherRegistry {
    let mut registry = CipherRegistry::new();
    registry.register(Arc::new(XorStreamEngine));
    registry
}

fn header_field(out: &mut Vec<u8>, id: u8, data: &[u8]) {
    out.push(id);
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

pub fn build_header(compression_flag: u32) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&SIG1.to_le_bytes());
    h.extend_from_slice(&SIG2.to_le_bytes());
    h.extend_from_slice(&FILE_VERSION.to_le_bytes());
    header_field(&mut h, 2, &XOR_CIPHER_ID);
    header_field(&mut h, 3, &compression_flag.to_le_bytes());
    header_field(&mut h, 4, &MASTER_SEED);
    header_field(&mut h, 5, &TRANSFORM_SEED);
    header_field(&mut h, 6, &ROUNDS.to_le_bytes());
    header_field(&mut h, 7, &IV);
    header_field(&mut h, 8, &STREAM_KEY);
    header_field(&mut h, 9, &START_BYTES);
    header_field(&mut h, 10, &2u32.to_le_bytes()); // Salsa20
    header_field(&mut h, 0, b"\r\n\r\n");
    h
}

pub fn uuid_b64(byte: u8) -> String {
    BASE64.encode([byte; 16])
}

/// Mask a sequence of protected plaintexts in document order, returning
/// their base64 forms.
pub fn mask_protected(values: &[&str]) -> Vec<String> {
    let mut stream = RandomStream::new(InnerStreamId::Salsa20, &STREAM_KEY);
    values
        .iter()
        .map(|plain| {
            let mut bytes = plain.as_bytes().to_vec();
            stream.apply(&mut bytes);
            BASE64.encode(&bytes)
        })
        .collect()
}

/// A reasonably rich structural body: metadata, nested groups, an entry
/// with a protected password and history, custom icon, deleted object.
pub fn rich_xml(header_hash: &[u8; 32]) -> String {
    let masked = mask_protected(&["s3cret", "old-s3cret"]);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<KeePassFile>
  <Meta>
    <Generator>integration fixture</Generator>
    <HeaderHash>{hh}</HeaderHash>
    <DatabaseName>Team Vault</DatabaseName>
    <DatabaseNameChanged>2024-04-01T00:00:00Z</DatabaseNameChanged>
    <MemoryProtection><ProtectPassword>True</ProtectPassword></MemoryProtection>
    <CustomIcons>
      <Icon><UUID>{icon}</UUID><Data>{icon_data}</Data></Icon>
    </CustomIcons>
    <RecycleBinUUID>{bin}</RecycleBinUUID>
  </Meta>
  <Root>
    <Group>
      <UUID>{root}</UUID>
      <Name>Team Vault</Name>
      <Group><UUID>{bin}</UUID><Name>Recycle Bin</Name></Group>
      <Group>
        <UUID>{work}</UUID>
        <Name>Work</Name>
        <Entry>
          <UUID>{entry}</UUID>
          <CustomIconUUID>{icon}</CustomIconUUID>
          <Times>
            <CreationTime>2024-01-01T00:00:00Z</CreationTime>
            <LastModificationTime>2024-03-10T09:30:00Z</LastModificationTime>
          </Times>
          <String><Key>Title</Key><Value>VPN</Value></String>
          <String><Key>Password</Key><Value Protected="True">{pw}</Value></String>
          <History>
            <Entry>
              <UUID>{entry}</UUID>
              <String><Key>Title</Key><Value>VPN</Value></String>
              <String><Key>Password</Key><Value Protected="True">{old_pw}</Value></String>
              <Times><LastModificationTime>2024-02-01T00:00:00Z</LastModificationTime></Times>
            </Entry>
          </History>
        </Entry>
      </Group>
    </Group>
    <DeletedObjects>
      <DeletedObject>
        <UUID>{gone}</UUID>
        <DeletionTime>2024-03-01T00:00:00Z</DeletionTime>
      </DeletedObject>
    </DeletedObjects>
  </Root>
</KeePassFile>"#,
        hh = BASE64.encode(header_hash),
        icon = uuid_b64(0x11),
        icon_data = BASE64.encode(b"fake png"),
        bin = uuid_b64(0x22),
        root = uuid_b64(0x01),
        work = uuid_b64(0x33),
        entry = uuid_b64(0x44),
        pw = masked[0],
        old_pw = masked[1],
        gone = uuid_b64(0x99),
    )
}

/// Assemble a complete container around the given structural body.
pub fn build_container(password: &str, compressed: bool, xml: Option<String>) -> Vec<u8> {
    let header = build_header(if compressed { 1 } else { 0 });
    let header_hash = sha256(&header);
    let xml = xml.unwrap_or_else(|| rich_xml(&header_hash));

    let structural = if compressed {
        let mut gz = GzEncoder::new(Vec::new(), GzLevel::default());
        gz.write_all(xml.as_bytes()).unwrap();
        gz.finish().unwrap()
    } else {
        xml.into_bytes()
    };

    let mut blocks = BlockWrite::with_block_size(Vec::new(), 256);
    blocks.write_all(&structural).unwrap();
    let framed = blocks.finish().unwrap();

    let mut plaintext = Vec::with_capacity(32 + framed.len());
    plaintext.extend_from_slice(&START_BYTES);
    plaintext.extend_from_slice(&framed);

    let key = CompositeKey::from_password(password);
    let transformed = key
        .transform(&TRANSFORM_SEED, ROUNDS, &CancelToken::new())
        .unwrap();
    let final_key = sha256_pair(&MASTER_SEED, &transformed);

    let mut ciphertext = Vec::new();
    XorApply::new(&plaintext[..], final_key, &IV)
        .read_to_end(&mut ciphertext)
        .unwrap();

    let mut container = header;
    container.extend_from_slice(&ciphertext);
    container
}

pub fn decode(
    bytes: &[u8],
    password: &str,
    registry: &CipherRegistry,
) -> DecodeResult<DecodeOutcome> {
    let key = CompositeKey::from_password(password);
    let mut logger = NullStatusLogger;
    KdbxReader::new(registry).load(
        std::io::Cursor::new(bytes.to_vec()),
        &key,
        CancelToken::new(),
        &mut logger,
        DecodeOptions::default(),
    )
}
