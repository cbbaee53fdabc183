// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Crypto Provider
//!
//! The primitives backups are built on, behind a trait so the framer and the
//! key lifecycle never name a concrete algorithm.
//!
//! The default provider derives everything from the seed with HKDF-SHA256,
//! encrypts with an ephemeral-static X25519 exchange feeding
//! XChaCha20-Poly1305, and authenticates with HMAC-SHA256.
//!
//! Public-key ciphertext format:
//! `ephemeral_public (32 bytes) || 0x02 || nonce (24 bytes) || ciphertext || tag (16 bytes)`

use std::fmt;

use rand::{CryptoRng, RngCore};
use ring::{digest, hkdf, hmac};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::encryption::{self, SymmetricKey};
use super::seed::BackupSeed;
use super::CryptoError;

/// Length of a MAC tag appended to framed backups.
pub const MAC_LENGTH: usize = 32;
/// Length of a backup key identifier.
pub const KEY_ID_LENGTH: usize = 32;
/// Length of an X25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

const KDF_SALT: &[u8] = b"Vauchi_Backup_Seed_v1";
const INFO_ENCRYPTION: &[u8] = b"Vauchi_Backup_Encryption_Key";
const INFO_MAC: &[u8] = b"Vauchi_Backup_MAC_Key";
const INFO_KEY_ID: &[u8] = b"Vauchi_Backup_Key_Id";
const INFO_ENVELOPE: &[u8] = b"Vauchi_Backup_Envelope";

/// Object-safe bound for the random source handed to encryption.
pub trait SecureRng: RngCore + CryptoRng {}

impl<T: RngCore + CryptoRng + ?Sized> SecureRng for T {}

/// Identifier of a backup key, stable for a given seed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId([u8; KEY_ID_LENGTH]);

impl KeyId {
    pub fn from_bytes(bytes: [u8; KEY_ID_LENGTH]) -> Self {
        KeyId(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(KeyId)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Public half of a backup encryption keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionPublicKey([u8; PUBLIC_KEY_LENGTH]);

impl EncryptionPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        EncryptionPublicKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(EncryptionPublicKey)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }
}

/// Private half of a backup encryption keypair. Never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionPrivateKey([u8; 32]);

impl fmt::Debug for EncryptionPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionPrivateKey([REDACTED])")
    }
}

/// Key authenticating framed backups.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; 32]);

impl MacKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        MacKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(MacKey)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacKey([REDACTED])")
    }
}

/// Everything a seed expands into.
#[derive(Debug, Clone)]
pub struct DerivedBackupKeys {
    pub key_id: KeyId,
    pub public_key: EncryptionPublicKey,
    pub private_key: EncryptionPrivateKey,
    pub mac_key: MacKey,
}

/// Abstract crypto primitives consumed by the backup subsystem.
pub trait CryptoProvider: Send + Sync {
    /// Deterministically expands a seed into keys and an identifier.
    fn derive_keys_from_seed(&self, seed: &BackupSeed) -> Result<DerivedBackupKeys, CryptoError>;

    /// Encrypts `plaintext` to `public_key`.
    fn encrypt(
        &self,
        public_key: &EncryptionPublicKey,
        plaintext: &[u8],
        rng: &mut dyn SecureRng,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypts a ciphertext produced by [`CryptoProvider::encrypt`].
    fn decrypt(
        &self,
        private_key: &EncryptionPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Computes a [`MAC_LENGTH`]-byte tag over `data`.
    fn mac(&self, key: &MacKey, data: &[u8]) -> Vec<u8>;

    /// Verifies a tag in constant time.
    fn mac_verify(&self, key: &MacKey, data: &[u8], tag: &[u8]) -> bool;

    /// SHA-256 digest.
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// HKDF / X25519 / XChaCha20-Poly1305 / HMAC-SHA256 provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCryptoProvider;

impl DefaultCryptoProvider {
    pub fn new() -> Self {
        DefaultCryptoProvider
    }
}

/// HKDF-SHA256 extract-and-expand to 32 bytes.
fn hkdf_expand(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let info = [info];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| CryptoError::KeyDerivation)?;
    let mut out = [0u8; 32];
    okm.fill(&mut out).map_err(|_| CryptoError::KeyDerivation)?;
    Ok(out)
}

impl CryptoProvider for DefaultCryptoProvider {
    fn derive_keys_from_seed(&self, seed: &BackupSeed) -> Result<DerivedBackupKeys, CryptoError> {
        let mut secret = hkdf_expand(KDF_SALT, seed.as_bytes(), INFO_ENCRYPTION)?;
        let static_secret = StaticSecret::from(secret);
        secret.zeroize();
        let public = X25519Public::from(&static_secret);

        let mac_key = MacKey(hkdf_expand(KDF_SALT, seed.as_bytes(), INFO_MAC)?);
        let key_id = KeyId(hkdf_expand(KDF_SALT, seed.as_bytes(), INFO_KEY_ID)?);

        Ok(DerivedBackupKeys {
            key_id,
            public_key: EncryptionPublicKey(public.to_bytes()),
            private_key: EncryptionPrivateKey(static_secret.to_bytes()),
            mac_key,
        })
    }

    fn encrypt(
        &self,
        public_key: &EncryptionPublicKey,
        plaintext: &[u8],
        rng: &mut dyn SecureRng,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut ephemeral_bytes = [0u8; 32];
        rng.try_fill_bytes(&mut ephemeral_bytes)
            .map_err(|_| CryptoError::Rng)?;
        let ephemeral = StaticSecret::from(ephemeral_bytes);
        ephemeral_bytes.zeroize();
        let ephemeral_public = X25519Public::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&X25519Public::from(*public_key.as_bytes()));
        if !shared.was_contributory() {
            return Err(CryptoError::EncryptionFailed);
        }

        let payload_key = envelope_key(
            ephemeral_public.as_bytes(),
            public_key.as_bytes(),
            shared.as_bytes(),
        )?;
        let sealed = encryption::encrypt_with_rng(&payload_key, plaintext, rng)?;

        let mut output = Vec::with_capacity(PUBLIC_KEY_LENGTH + sealed.len());
        output.extend_from_slice(ephemeral_public.as_bytes());
        output.extend_from_slice(&sealed);
        Ok(output)
    }

    fn decrypt(
        &self,
        private_key: &EncryptionPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let minimum = PUBLIC_KEY_LENGTH + 1 + encryption::NONCE_SIZE + encryption::TAG_SIZE;
        if ciphertext.len() < minimum {
            return Err(CryptoError::CiphertextTooShort);
        }

        let (ephemeral, sealed) = ciphertext.split_at(PUBLIC_KEY_LENGTH);
        let ephemeral: [u8; PUBLIC_KEY_LENGTH] = ephemeral
            .try_into()
            .map_err(|_| CryptoError::CiphertextTooShort)?;

        let secret = StaticSecret::from(private_key.0);
        let own_public = X25519Public::from(&secret);
        let shared = secret.diffie_hellman(&X25519Public::from(ephemeral));
        if !shared.was_contributory() {
            return Err(CryptoError::DecryptionFailed);
        }

        let payload_key = envelope_key(&ephemeral, own_public.as_bytes(), shared.as_bytes())?;
        encryption::decrypt(&payload_key, sealed)
    }

    fn mac(&self, key: &MacKey, data: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
        hmac::sign(&key, data).as_ref().to_vec()
    }

    fn mac_verify(&self, key: &MacKey, data: &[u8], tag: &[u8]) -> bool {
        let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
        hmac::verify(&key, data, tag).is_ok()
    }

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
        out
    }
}

/// Payload key bound to both public keys of the exchange.
fn envelope_key(
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
    shared: &[u8; 32],
) -> Result<SymmetricKey, CryptoError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);
    Ok(SymmetricKey::from_bytes(hkdf_expand(&salt, shared, INFO_ENVELOPE)?))
}
