//! Happy-path and error-classification tests for the full pipeline.

use crate::common::*;
use vaultsync::{
    sha256, CancelToken, CompositeKey, DecodeError, DecodeOptions, DecodeOutcome, FailureKind,
    KdbxReader, NullStatusLogger, ObjectId,
};

fn id(byte: u8) -> ObjectId {
    ObjectId::from_bytes([byte; 16])
}

#[test]
fn decodes_rich_container_compressed_and_uncompressed() {
    let registry = registry();
    for compressed in [true, false] {
        let bytes = build_container("hunter2", compressed, None);
        let outcome = decode(&bytes, "hunter2", &registry).unwrap();
        let DecodeOutcome::Complete {
            database: db,
            transport_hash,
        } = outcome
        else {
            panic!("unexpected soft stop");
        };

        assert_eq!(db.meta.name, "Team Vault");
        assert_eq!(db.meta.recycle_bin, id(0x22));
        assert_eq!(db.group_count(), 3);
        assert_eq!(db.entry_count(), 1);
        assert_eq!(db.custom_icons.len(), 1);
        assert_eq!(db.custom_icons[0].uuid, id(0x11));
        assert_eq!(db.deleted_objects.len(), 1);
        assert_eq!(db.deleted_objects[0].uuid, id(0x99));

        let entry = db.entry(id(0x44)).unwrap();
        assert_eq!(entry.field("Title"), "VPN");
        assert_eq!(entry.field("Password"), "s3cret");
        assert!(entry.fields["Password"].is_protected());
        assert_eq!(entry.custom_icon, id(0x11));
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].field("Password"), "old-s3cret");

        assert_eq!(transport_hash, sha256(&bytes));
        assert!(db.check_consistency().is_ok());
    }
}

#[test]
fn wrong_password_classifies_as_wrong_key() {
    let registry = registry();
    let bytes = build_container("correct", true, None);
    let err = match decode(&bytes, "incorrect", &registry) {
        Err(err) => err,
        Ok(_) => panic!("wrong password must fail"),
    };
    assert!(matches!(err, DecodeError::WrongKey));
    assert_eq!(err.kind(), FailureKind::WrongKey);
}

#[test]
fn unknown_signature_rejected_before_anything_else() {
    let registry = registry();
    let mut bytes = build_container("pw", true, None);
    bytes[0] = 0x00; // break the first signature word
    let err = decode(&bytes, "pw", &registry).unwrap_err();
    assert!(matches!(err, DecodeError::UnrecognizedSignature));
    assert_eq!(err.kind(), FailureKind::BadFile);
}

#[test]
fn legacy_signature_gets_its_own_error() {
    let registry = registry();
    let mut bytes = build_container("pw", true, None);
    // Second signature word: the 1.x value.
    bytes[4..8].copy_from_slice(&0xB54B_FB65u32.to_le_bytes());
    let err = decode(&bytes, "pw", &registry).unwrap_err();
    assert!(matches!(err, DecodeError::LegacyFormat));
}

#[test]
fn future_major_version_rejected() {
    let registry = registry();
    let mut bytes = build_container("pw", true, None);
    bytes[8..12].copy_from_slice(&0x0009_0000u32.to_le_bytes());
    let err = decode(&bytes, "pw", &registry).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedVersion { .. }));
}

#[test]
fn cancellation_classifies_as_cancelled() {
    let registry = registry();
    let bytes = build_container("pw", true, None);
    let key = CompositeKey::from_password("pw");
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut logger = NullStatusLogger;
    let err = KdbxReader::new(&registry)
        .load(
            std::io::Cursor::new(bytes),
            &key,
            cancel,
            &mut logger,
            DecodeOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Cancelled);
}

#[test]
fn truncation_never_yields_a_tree() {
    let registry = registry();
    let bytes = build_container("pw", true, None);
    for keep in [10, 100, bytes.len() / 2, bytes.len() - 1] {
        let result = decode(&bytes[..keep], "pw", &registry);
        assert!(result.is_err(), "truncation at {} must fail", keep);
    }
}

#[test]
fn transport_hash_matches_file_digest() {
    let registry = registry();
    let bytes = build_container("pw", false, None);
    let DecodeOutcome::Complete { transport_hash, .. } =
        decode(&bytes, "pw", &registry).unwrap()
    else {
        panic!("unexpected soft stop");
    };
    assert_eq!(transport_hash, sha256(&bytes));
}
