//! Tamper-evidence: with the header hash embedded in the body and every
//! block hashed, no single-byte modification anywhere in the container
//! may decode successfully.

use crate::common::*;

#[test]
fn every_single_byte_flip_fails_to_decode() {
    let registry = registry();
    let bytes = build_container("pw", true, None);

    for at in 0..bytes.len() {
        let mut tampered = bytes.clone();
        tampered[at] ^= 0x01;
        assert!(
            decode(&tampered, "pw", &registry).is_err(),
            "flip at byte {} of {} decoded successfully",
            at,
            bytes.len()
        );
    }
}

#[test]
fn single_byte_flip_in_uncompressed_body_fails_too() {
    let registry = registry();
    let bytes = build_container("pw", false, None);
    let header_len = build_header(0).len();

    // Sample the encrypted region densely; headers are covered above.
    for at in (header_len..bytes.len()).step_by(7) {
        let mut tampered = bytes.clone();
        tampered[at] ^= 0x80;
        assert!(
            decode(&tampered, "pw", &registry).is_err(),
            "flip at byte {} decoded successfully",
            at
        );
    }
}
