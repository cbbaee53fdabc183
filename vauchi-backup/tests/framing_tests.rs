// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for backup framing and seeds
//!
//! Encrypt-then-MAC framing, seed validation, the textual seed codec and
//! backward compatibility with older framings.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::OsRng;

use common::strategies::{document_strategy, seed_strategy};
use vauchi_backup::crypto::{SEED_BYTES, SEED_SYMBOLS};
use vauchi_backup::{
    BackupDocument, BackupFramer, BackupSeed, CryptoProvider, DefaultCryptoProvider,
    DocumentError, FramingError, SeedError, SeedStatus, CURRENT_FORMAT_VERSION,
};

fn framer() -> BackupFramer {
    BackupFramer::new(Arc::new(DefaultCryptoProvider::new()))
}

fn sample_document() -> BackupDocument {
    BackupDocument::new(1_700_000_000_000)
        .with_part("identity", br#"{"owned_identities":[]}"#.to_vec())
        .with_part("settings", vec![0, 1, 2, 3, 255])
}

/// Seals raw plaintext the way the framer does, bypassing the document codec.
fn seal_raw(seed: &BackupSeed, plaintext: &[u8]) -> Vec<u8> {
    let crypto = DefaultCryptoProvider::new();
    let keys = crypto.derive_keys_from_seed(seed).unwrap();
    let mut blob = crypto
        .encrypt(&keys.public_key, plaintext, &mut OsRng)
        .unwrap();
    let mac = crypto.mac(&keys.mac_key, &blob);
    blob.extend_from_slice(&mac);
    blob
}

// ============================================================
// Framing
// ============================================================

#[test]
fn test_frame_unframe_roundtrip() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let document = sample_document();

    let blob = framer.frame(&seed, &document).unwrap();
    let recovered = framer.unframe(&seed, &blob).unwrap();

    assert_eq!(recovered, document);
}

#[test]
fn test_frames_differ_for_same_document() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let document = sample_document();

    let first = framer.frame(&seed, &document).unwrap();
    let second = framer.frame(&seed, &document).unwrap();

    assert_ne!(first, second);
}

#[test]
fn test_wrong_seed_fails_mac() {
    let framer = framer();
    let seed = BackupSeed::from_bytes([1u8; SEED_BYTES]);
    let other = BackupSeed::from_bytes([2u8; SEED_BYTES]);
    let blob = framer.frame(&seed, &sample_document()).unwrap();

    let result = framer.unframe(&other, &blob);

    assert_eq!(result, Err(FramingError::MacMismatch));
    assert_eq!(
        result.unwrap_err().seed_status(),
        Some(SeedStatus::BadKey)
    );
}

#[test]
fn test_frame_with_keys_matches_seed_framing() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let keys = framer.derive_keys(&seed).unwrap();
    let document = sample_document();

    let blob = framer
        .frame_with_keys(&keys.public_key, &keys.mac_key, &document, &mut OsRng)
        .unwrap();

    assert_eq!(framer.unframe(&seed, &blob).unwrap(), document);
}

#[test]
fn test_key_derivation_is_deterministic() {
    let framer = framer();
    let seed = BackupSeed::from_bytes([9u8; SEED_BYTES]);

    let first = framer.derive_keys(&seed).unwrap();
    let second = framer.derive_keys(&seed).unwrap();
    let other = framer
        .derive_keys(&BackupSeed::from_bytes([8u8; SEED_BYTES]))
        .unwrap();

    assert_eq!(first.key_id, second.key_id);
    assert_eq!(first.public_key.as_bytes(), second.public_key.as_bytes());
    assert_ne!(first.key_id, other.key_id);
}

#[test]
fn test_legacy_compressed_frame_still_unframes() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let document = sample_document();

    let blob = framer.frame_compressed(&seed, &document).unwrap();

    assert_eq!(framer.unframe(&seed, &blob).unwrap(), document);
}

#[test]
fn test_version_zero_document_is_upgraded() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let blob = seal_raw(&seed, br#"{"created_at":12,"parts":{"identity":"{}"}}"#);

    let document = framer.unframe(&seed, &blob).unwrap();

    assert_eq!(document.format_version(), CURRENT_FORMAT_VERSION);
    assert_eq!(document.created_at(), 12);
    assert_eq!(document.part("identity"), Some(&b"{}"[..]));
}

#[test]
fn test_unsupported_format_version_is_rejected() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let blob = seal_raw(&seed, br#"{"format_version":7,"created_at":1,"parts":{}}"#);

    assert_eq!(
        framer.unframe(&seed, &blob),
        Err(FramingError::Document(
            DocumentError::UnsupportedFormatVersion {
                found: 7,
                supported: CURRENT_FORMAT_VERSION,
            }
        ))
    );
    // The seed itself is fine.
    assert_eq!(
        framer.validate(&seed.to_string(), &blob),
        SeedStatus::Success
    );
}

#[test]
fn test_garbage_plaintext_is_unreadable() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let blob = seal_raw(&seed, b"definitely not a backup");

    assert_eq!(framer.unframe(&seed, &blob), Err(FramingError::Unreadable));
}

#[test]
fn test_short_blob_is_rejected() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);

    assert_eq!(framer.unframe(&seed, &[]), Err(FramingError::TooShort));
    assert_eq!(framer.unframe(&seed, &[0u8; 16]), Err(FramingError::TooShort));
}

// ============================================================
// Seed validation against a blob
// ============================================================

#[test]
fn test_validate_reports_each_status() {
    let framer = framer();
    let seed = BackupSeed::from_bytes([5u8; SEED_BYTES]);
    let blob = framer.frame(&seed, &sample_document()).unwrap();
    let text = seed.to_string();

    assert_eq!(framer.validate(&text, &blob), SeedStatus::Success);
    assert_eq!(framer.validate(&text[..20], &blob), SeedStatus::SeedTooShort);
    assert_eq!(
        framer.validate(&format!("{text} 0000"), &blob),
        SeedStatus::SeedTooLong
    );
    assert_eq!(
        framer.validate(&BackupSeed::from_bytes([6u8; SEED_BYTES]).to_string(), &blob),
        SeedStatus::BadKey
    );
    assert_eq!(
        framer.validate(&format!("!{}", &text[1..]), &blob),
        SeedStatus::BadKey
    );
    // A typo in an over-long seed still reports the length.
    assert_eq!(
        framer.validate(&format!("!{text}"), &blob),
        SeedStatus::SeedTooLong
    );
}

#[test]
fn test_unframe_text_surfaces_seed_errors() {
    let framer = framer();
    let seed = BackupSeed::generate(&mut OsRng);
    let blob = framer.frame(&seed, &sample_document()).unwrap();

    let error = framer.unframe_text("ABCD EFGH", &blob).unwrap_err();

    assert_eq!(error, FramingError::Seed(SeedError::TooShort { found: 8 }));
    assert_eq!(error.seed_status(), Some(SeedStatus::SeedTooShort));
}

// ============================================================
// Seed codec
// ============================================================

#[test]
fn test_seed_text_is_grouped() {
    let seed = BackupSeed::generate(&mut OsRng);
    let text = seed.to_string();

    assert_eq!(text.split(' ').count(), SEED_SYMBOLS / 4);
    assert!(text.split(' ').all(|group| group.len() == 4));
    assert_eq!(seed.to_compact_string().len(), SEED_SYMBOLS);
}

#[test]
fn test_seed_parse_is_lenient_about_layout() {
    let seed = BackupSeed::generate(&mut OsRng);
    let compact = seed.to_compact_string();
    let dashed: String = compact
        .as_bytes()
        .chunks(8)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("-");

    assert_eq!(BackupSeed::parse(&compact).unwrap(), seed);
    assert_eq!(BackupSeed::parse(&compact.to_lowercase()).unwrap(), seed);
    assert_eq!(BackupSeed::parse(&dashed).unwrap(), seed);
    assert_eq!(BackupSeed::parse(&format!("  {compact}\n")).unwrap(), seed);
}

#[test]
fn test_seed_parse_maps_look_alikes() {
    let seed = BackupSeed::from_bytes([0u8; SEED_BYTES]);
    assert_eq!(BackupSeed::parse(&"O".repeat(32)).unwrap(), seed);

    let ones = BackupSeed::parse(&"1".repeat(32)).unwrap();
    assert_eq!(BackupSeed::parse(&"I".repeat(32)).unwrap(), ones);
    assert_eq!(BackupSeed::parse(&"l".repeat(32)).unwrap(), ones);

    let vees = BackupSeed::parse(&"V".repeat(32)).unwrap();
    assert_eq!(BackupSeed::parse(&"u".repeat(32)).unwrap(), vees);
}

#[test]
fn test_seed_parse_rejects_bad_input() {
    assert_eq!(
        BackupSeed::parse(&"0".repeat(31)),
        Err(SeedError::TooShort { found: 31 })
    );
    assert_eq!(
        BackupSeed::parse(&"0".repeat(33)),
        Err(SeedError::TooLong { found: 33 })
    );
    assert_eq!(
        BackupSeed::parse(&format!("{}#", "0".repeat(31))),
        Err(SeedError::InvalidCharacter('#'))
    );
    assert_eq!(SeedStatus::from(&SeedError::InvalidCharacter('#')), SeedStatus::BadKey);
}

#[test]
fn test_seed_debug_is_redacted() {
    let seed = BackupSeed::from_bytes([0xAB; SEED_BYTES]);
    let debug = format!("{seed:?}");

    assert!(debug.contains("REDACTED"));
    assert!(!debug.contains(&seed.to_compact_string()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: unframe(frame(d)) == d for every seed and document
    #[test]
    fn prop_frame_roundtrip(seed in seed_strategy(), document in document_strategy()) {
        let framer = framer();
        let blob = framer.frame(&seed, &document).unwrap();
        prop_assert_eq!(framer.unframe(&seed, &blob).unwrap(), document);
    }

    /// Property: flipping any bit of a frame is detected
    #[test]
    fn prop_tampering_is_detected(
        seed in seed_strategy(),
        document in document_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let framer = framer();
        let mut blob = framer.frame(&seed, &document).unwrap();
        let index = position.index(blob.len());
        blob[index] ^= 1 << bit;

        prop_assert_eq!(framer.unframe(&seed, &blob), Err(FramingError::MacMismatch));
        prop_assert_eq!(framer.validate(&seed.to_string(), &blob), SeedStatus::BadKey);
    }

    /// Property: the textual form parses back to the same seed
    #[test]
    fn prop_seed_text_roundtrip(seed in seed_strategy()) {
        prop_assert_eq!(BackupSeed::parse(&seed.to_string()).unwrap(), seed.clone());
        prop_assert_eq!(seed.to_compact_string().parse::<BackupSeed>().unwrap(), seed);
    }
}
