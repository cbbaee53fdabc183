// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod encryption;
pub mod provider;
pub mod seed;

use thiserror::Error;

pub use encryption::{decrypt, encrypt, SymmetricKey};
pub use provider::{
    CryptoProvider, DefaultCryptoProvider, DerivedBackupKeys, EncryptionPrivateKey,
    EncryptionPublicKey, KeyId, MacKey, SecureRng, KEY_ID_LENGTH, MAC_LENGTH,
};
pub use seed::{BackupSeed, SeedError, SeedStatus, SEED_BYTES, SEED_SYMBOLS};

/// Cryptographic operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key derivation failed")]
    KeyDerivation,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Unknown cipher algorithm tag: {0:#04x}")]
    UnknownAlgorithm(u8),
    #[error("Random number generator failure")]
    Rng,
}
