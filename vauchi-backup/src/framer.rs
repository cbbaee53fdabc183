// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Crypto Framer
//!
//! Turns a [`BackupDocument`] into an authenticated blob and back.
//!
//! Blob format: `ciphertext || mac`, where `ciphertext` is the provider's
//! public-key encryption of the document JSON and `mac` is a
//! [`MAC_LENGTH`]-byte tag over `ciphertext` (encrypt-then-MAC).
//!
//! Older engines wrote the document raw-DEFLATE compressed; unframing
//! falls back to inflating when the plaintext is not JSON.

use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::crypto::{
    BackupSeed, CryptoError, CryptoProvider, DerivedBackupKeys, EncryptionPublicKey, MacKey,
    SecureRng, SeedError, SeedStatus, MAC_LENGTH,
};
use crate::document::{BackupDocument, DocumentError};

/// Framing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Invalid backup seed: {0}")]
    Seed(#[from] SeedError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Backup MAC verification failed")]
    MacMismatch,

    #[error("Backup blob too short")]
    TooShort,

    /// Decrypted but neither JSON nor compressed JSON. Retrying with the
    /// same seed cannot help.
    #[error("Backup content is unreadable")]
    Unreadable,

    #[error("Backup document error: {0}")]
    Document(#[from] DocumentError),
}

impl FramingError {
    /// Status to present when the failure is about the seed itself.
    pub fn seed_status(&self) -> Option<SeedStatus> {
        match self {
            FramingError::Seed(e) => Some(SeedStatus::from(e)),
            FramingError::MacMismatch => Some(SeedStatus::BadKey),
            _ => None,
        }
    }
}

/// Frames and unframes backup documents with keys derived from a seed.
#[derive(Clone)]
pub struct BackupFramer {
    crypto: Arc<dyn CryptoProvider>,
}

impl BackupFramer {
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        BackupFramer { crypto }
    }

    pub fn crypto(&self) -> &Arc<dyn CryptoProvider> {
        &self.crypto
    }

    pub fn derive_keys(&self, seed: &BackupSeed) -> Result<DerivedBackupKeys, FramingError> {
        Ok(self.crypto.derive_keys_from_seed(seed)?)
    }

    /// Frames `document` for `seed`.
    pub fn frame(
        &self,
        seed: &BackupSeed,
        document: &BackupDocument,
    ) -> Result<Vec<u8>, FramingError> {
        let keys = self.derive_keys(seed)?;
        self.frame_with_keys(&keys.public_key, &keys.mac_key, document, &mut OsRng)
    }

    /// Frames with already-derived public material. Legacy backup keys only
    /// keep the public key and MAC key, never the seed.
    pub fn frame_with_keys(
        &self,
        public_key: &EncryptionPublicKey,
        mac_key: &MacKey,
        document: &BackupDocument,
        rng: &mut dyn SecureRng,
    ) -> Result<Vec<u8>, FramingError> {
        let plaintext = document.to_json()?;
        self.seal(public_key, mac_key, &plaintext, rng)
    }

    /// Frames in the legacy compressed encoding.
    pub fn frame_compressed(
        &self,
        seed: &BackupSeed,
        document: &BackupDocument,
    ) -> Result<Vec<u8>, FramingError> {
        let keys = self.derive_keys(seed)?;
        let json = document.to_json()?;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let compressed = encoder.finish().map_err(|_| CryptoError::EncryptionFailed)?;
        self.seal(&keys.public_key, &keys.mac_key, &compressed, &mut OsRng)
    }

    fn seal(
        &self,
        public_key: &EncryptionPublicKey,
        mac_key: &MacKey,
        plaintext: &[u8],
        rng: &mut dyn SecureRng,
    ) -> Result<Vec<u8>, FramingError> {
        let mut blob = self.crypto.encrypt(public_key, plaintext, rng)?;
        let mac = self.crypto.mac(mac_key, &blob);
        blob.extend_from_slice(&mac);
        Ok(blob)
    }

    /// Recovers the document framed for `seed`.
    pub fn unframe(
        &self,
        seed: &BackupSeed,
        blob: &[u8],
    ) -> Result<BackupDocument, FramingError> {
        let keys = self.derive_keys(seed)?;
        self.unframe_with_keys(&keys, blob)
    }

    /// Parses `seed_text` first so length problems surface as seed errors.
    pub fn unframe_text(
        &self,
        seed_text: &str,
        blob: &[u8],
    ) -> Result<BackupDocument, FramingError> {
        let seed = BackupSeed::parse(seed_text)?;
        self.unframe(&seed, blob)
    }

    pub fn unframe_with_keys(
        &self,
        keys: &DerivedBackupKeys,
        blob: &[u8],
    ) -> Result<BackupDocument, FramingError> {
        let plaintext = self.open(keys, blob)?;

        match BackupDocument::from_json(&plaintext) {
            Ok(document) => return Ok(document),
            Err(e @ DocumentError::UnsupportedFormatVersion { .. }) => return Err(e.into()),
            Err(_) => {}
        }

        let inflated = inflate(&plaintext).ok_or(FramingError::Unreadable)?;
        match BackupDocument::from_json(&inflated) {
            Ok(document) => Ok(document),
            Err(e @ DocumentError::UnsupportedFormatVersion { .. }) => Err(e.into()),
            Err(_) => Err(FramingError::Unreadable),
        }
    }

    /// Checks `seed_text` against `blob` without parsing the document.
    pub fn validate(&self, seed_text: &str, blob: &[u8]) -> SeedStatus {
        let seed = match BackupSeed::parse(seed_text) {
            Ok(seed) => seed,
            Err(e) => return SeedStatus::from(&e),
        };
        let Ok(keys) = self.crypto.derive_keys_from_seed(&seed) else {
            return SeedStatus::BadKey;
        };
        match self.open(&keys, blob) {
            Ok(_) => SeedStatus::Success,
            Err(_) => SeedStatus::BadKey,
        }
    }

    /// MAC check, then decryption.
    fn open(&self, keys: &DerivedBackupKeys, blob: &[u8]) -> Result<Vec<u8>, FramingError> {
        if blob.len() <= MAC_LENGTH {
            return Err(FramingError::TooShort);
        }
        let (ciphertext, mac) = blob.split_at(blob.len() - MAC_LENGTH);
        if !self.crypto.mac_verify(&keys.mac_key, ciphertext, mac) {
            return Err(FramingError::MacMismatch);
        }
        Ok(self.crypto.decrypt(&keys.private_key, ciphertext)?)
    }
}

fn inflate(compressed: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}
