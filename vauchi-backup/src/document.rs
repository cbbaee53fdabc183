// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Document
//!
//! The plaintext inside a framed backup: one opaque part per delegate tag,
//! stamped with an explicit format version.
//!
//! Format history:
//! - version 0: no `format_version` field, parts stored as UTF-8 strings.
//! - version 1: parts stored as base64 so delegates may emit binary data.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format version written by this build.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Document parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("JSON error: {0}")]
    Json(String),

    #[error("Unsupported backup format version {found} (newest supported: {supported})")]
    UnsupportedFormatVersion { found: u32, supported: u32 },

    #[error("Invalid encoding for part '{tag}'")]
    InvalidPart { tag: String },
}

/// An assembled backup: delegate parts keyed by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDocument {
    format_version: u32,
    created_at: u64,
    parts: BTreeMap<String, Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct WireDocument {
    #[serde(default)]
    format_version: u32,
    #[serde(default)]
    created_at: u64,
    parts: BTreeMap<String, String>,
}

impl BackupDocument {
    /// Creates an empty document in the current format.
    pub fn new(created_at: u64) -> Self {
        BackupDocument {
            format_version: CURRENT_FORMAT_VERSION,
            created_at,
            parts: BTreeMap::new(),
        }
    }

    pub fn with_part(mut self, tag: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.parts.insert(tag.into(), bytes);
        self
    }

    /// Inserts a part, returning the bytes it replaced.
    pub fn insert_part(&mut self, tag: impl Into<String>, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.parts.insert(tag.into(), bytes)
    }

    pub fn part(&self, tag: &str) -> Option<&[u8]> {
        self.parts.get(tag).map(Vec::as_slice)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn parts(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.parts
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Serializes in the current format.
    pub fn to_json(&self) -> Result<Vec<u8>, DocumentError> {
        let wire = WireDocument {
            format_version: CURRENT_FORMAT_VERSION,
            created_at: self.created_at,
            parts: self
                .parts
                .iter()
                .map(|(tag, bytes)| (tag.clone(), STANDARD.encode(bytes)))
                .collect(),
        };
        serde_json::to_vec(&wire).map_err(|e| DocumentError::Json(e.to_string()))
    }

    /// Parses any supported format version, upgrading older ones.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DocumentError> {
        let wire: WireDocument =
            serde_json::from_slice(bytes).map_err(|e| DocumentError::Json(e.to_string()))?;

        let parts = match wire.format_version {
            0 => wire
                .parts
                .into_iter()
                .map(|(tag, text)| (tag, text.into_bytes()))
                .collect(),
            CURRENT_FORMAT_VERSION => wire
                .parts
                .into_iter()
                .map(|(tag, encoded)| match STANDARD.decode(&encoded) {
                    Ok(bytes) => Ok((tag, bytes)),
                    Err(_) => Err(DocumentError::InvalidPart { tag }),
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?,
            found => {
                return Err(DocumentError::UnsupportedFormatVersion {
                    found,
                    supported: CURRENT_FORMAT_VERSION,
                })
            }
        };

        Ok(BackupDocument {
            format_version: CURRENT_FORMAT_VERSION,
            created_at: wire.created_at,
            parts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_zero_parts_are_upgraded() {
        let legacy = br#"{"created_at":5,"parts":{"identity":"{\"a\":1}"}}"#;
        let document = BackupDocument::from_json(legacy).unwrap();

        assert_eq!(document.format_version(), CURRENT_FORMAT_VERSION);
        assert_eq!(document.part("identity"), Some(&br#"{"a":1}"#[..]));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let future = br#"{"format_version":9,"created_at":5,"parts":{}}"#;
        assert_eq!(
            BackupDocument::from_json(future),
            Err(DocumentError::UnsupportedFormatVersion {
                found: 9,
                supported: CURRENT_FORMAT_VERSION
            })
        );
    }

    #[test]
    fn test_binary_parts_survive_json() {
        let document = BackupDocument::new(1).with_part("blob", vec![0, 255, 7]);
        let parsed = BackupDocument::from_json(&document.to_json().unwrap()).unwrap();
        assert_eq!(parsed, document);
    }
}
