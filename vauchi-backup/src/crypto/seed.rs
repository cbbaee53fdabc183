// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Seed
//!
//! A backup seed is the user-memorizable secret every backup key is derived
//! from. It holds 160 bits, written as 32 symbols of a 32-character alphabet
//! in eight groups of four, e.g. `XR3K 9D2M ...`.
//!
//! Parsing is forgiving about presentation (case, whitespace, dashes, and the
//! look-alike letters `O`, `I`, `L`, `U`) but strict about length.

use std::fmt;
use std::str::FromStr;

use rand::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of symbols in a textual seed.
pub const SEED_SYMBOLS: usize = 32;
/// Number of raw bytes behind a seed (32 symbols * 5 bits).
pub const SEED_BYTES: usize = 20;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const GROUP_SIZE: usize = 4;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == '-'
}

/// Why a seed string could not be turned into a [`BackupSeed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    #[error("backup seed too short: {found} of {SEED_SYMBOLS} symbols")]
    TooShort { found: usize },

    #[error("backup seed too long: {found} of {SEED_SYMBOLS} symbols")]
    TooLong { found: usize },

    #[error("invalid character in backup seed: {0:?}")]
    InvalidCharacter(char),
}

/// Outcome of checking a seed against a key or a backup.
///
/// Callers present a distinct message for each case, so this is a closed
/// status rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedStatus {
    Success,
    SeedTooShort,
    SeedTooLong,
    BadKey,
}

impl From<&SeedError> for SeedStatus {
    fn from(error: &SeedError) -> Self {
        match error {
            SeedError::TooShort { .. } => SeedStatus::SeedTooShort,
            SeedError::TooLong { .. } => SeedStatus::SeedTooLong,
            SeedError::InvalidCharacter(_) => SeedStatus::BadKey,
        }
    }
}

/// A validated 160-bit backup seed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BackupSeed {
    bytes: [u8; SEED_BYTES],
}

impl fmt::Debug for BackupSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupSeed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl BackupSeed {
    /// Draws a fresh seed from `rng`.
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SEED_BYTES];
        rng.fill_bytes(&mut bytes);
        BackupSeed { bytes }
    }

    /// Wraps raw seed bytes.
    pub fn from_bytes(bytes: [u8; SEED_BYTES]) -> Self {
        BackupSeed { bytes }
    }

    /// Returns the raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; SEED_BYTES] {
        &self.bytes
    }

    /// Parses the textual form of a seed.
    ///
    /// Length is checked before the alphabet, so a mistyped seed of the wrong
    /// length reports the length problem.
    pub fn parse(text: &str) -> Result<Self, SeedError> {
        let found = text.chars().filter(|&c| !is_separator(c)).count();
        if found < SEED_SYMBOLS {
            return Err(SeedError::TooShort { found });
        }
        if found > SEED_SYMBOLS {
            return Err(SeedError::TooLong { found });
        }

        let mut symbols = Vec::with_capacity(SEED_SYMBOLS);
        for c in text.chars() {
            if is_separator(c) {
                continue;
            }
            let normalized = match c.to_ascii_uppercase() {
                'O' => '0',
                'I' | 'L' => '1',
                'U' => 'V',
                other => other,
            };
            let index = ALPHABET
                .iter()
                .position(|&a| char::from(a) == normalized)
                .ok_or(SeedError::InvalidCharacter(c))?;
            symbols.push(index as u8);
        }

        let mut bytes = [0u8; SEED_BYTES];
        let mut acc: u16 = 0;
        let mut bits = 0;
        let mut out = 0;
        for symbol in &symbols {
            acc = (acc << 5) | u16::from(*symbol);
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                bytes[out] = (acc >> bits) as u8;
                out += 1;
                acc &= (1 << bits) - 1;
            }
        }
        symbols.zeroize();

        Ok(BackupSeed { bytes })
    }

    /// Returns the compact textual form (32 symbols, no separators).
    pub fn to_compact_string(&self) -> String {
        let mut out = String::with_capacity(SEED_SYMBOLS);
        let mut acc: u16 = 0;
        let mut bits = 0;
        for byte in &self.bytes {
            acc = (acc << 8) | u16::from(*byte);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                out.push(char::from(ALPHABET[((acc >> bits) & 0x1f) as usize]));
            }
            acc &= (1 << bits) - 1;
        }
        out
    }
}

impl fmt::Display for BackupSeed {
    /// Formats the seed in space-separated groups of four symbols.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compact = self.to_compact_string();
        let groups: Vec<&str> = compact
            .as_bytes()
            .chunks(GROUP_SIZE)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        f.write_str(&groups.join(" "))
    }
}

impl FromStr for BackupSeed {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackupSeed::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_symbols() {
        let seed = BackupSeed::from_bytes([0u8; SEED_BYTES]);
        assert_eq!(
            seed.to_string(),
            "0000 0000 0000 0000 0000 0000 0000 0000"
        );
    }

    #[test]
    fn test_parse_normalizes_look_alikes() {
        let seed = BackupSeed::from_bytes([0u8; SEED_BYTES]);
        let parsed = BackupSeed::parse("oooo-OOOO 0000 0000 0000 0000 0000 0000").unwrap();
        assert_eq!(parsed, seed);
    }

    #[test]
    fn test_parse_rejects_symbol_outside_alphabet() {
        let err = BackupSeed::parse("!000 0000 0000 0000 0000 0000 0000 0000").unwrap_err();
        assert_eq!(err, SeedError::InvalidCharacter('!'));
        assert_eq!(SeedStatus::from(&err), SeedStatus::BadKey);
    }

    #[test]
    fn test_parse_reports_length_before_bad_symbol() {
        let err = BackupSeed::parse("!000 0000 0000 0000 0000 0000 0000 0000 0").unwrap_err();
        assert_eq!(err, SeedError::TooLong { found: 33 });
        assert_eq!(SeedStatus::from(&err), SeedStatus::SeedTooLong);

        let err = BackupSeed::parse("!000 0000").unwrap_err();
        assert_eq!(err, SeedError::TooShort { found: 8 });
        assert_eq!(SeedStatus::from(&err), SeedStatus::SeedTooShort);
    }
}
