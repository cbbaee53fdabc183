// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Partial Legacy Backups
//!
//! Collects the parts reported by each legacy delegate for one
//! `(key_id, version)` until every required tag is present.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::crypto::KeyId;
use crate::document::BackupDocument;

/// Invariant violations while aggregating parts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Part '{tag}' reported twice for backup version {version}")]
    DuplicateTag { tag: String, version: u32 },

    #[error("Part '{tag}' is not expected for backup version {version}")]
    UnknownTag { tag: String, version: u32 },
}

/// Parts received so far for one backup version.
#[derive(Debug, Clone)]
pub struct PartialBackup {
    key_id: KeyId,
    version: u32,
    required: BTreeSet<String>,
    parts: BTreeMap<String, Vec<u8>>,
}

impl PartialBackup {
    pub fn new<I, S>(key_id: KeyId, version: u32, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PartialBackup {
            key_id,
            version,
            required: required.into_iter().map(Into::into).collect(),
            parts: BTreeMap::new(),
        }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Records `tag`'s part. Returns whether every required tag is now
    /// present.
    pub fn add_part(&mut self, tag: &str, bytes: Vec<u8>) -> Result<bool, AggregationError> {
        if !self.required.contains(tag) {
            return Err(AggregationError::UnknownTag {
                tag: tag.to_string(),
                version: self.version,
            });
        }
        if self.parts.contains_key(tag) {
            return Err(AggregationError::DuplicateTag {
                tag: tag.to_string(),
                version: self.version,
            });
        }
        self.parts.insert(tag.to_string(), bytes);
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.required.iter().all(|tag| self.parts.contains_key(tag))
    }

    /// Tags still awaited.
    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|tag| !self.parts.contains_key(*tag))
            .map(String::as_str)
            .collect()
    }

    /// Merges the parts into one document.
    pub fn into_document(self, created_at: u64) -> BackupDocument {
        self.parts
            .into_iter()
            .fold(BackupDocument::new(created_at), |doc, (tag, bytes)| {
                doc.with_part(tag, bytes)
            })
    }
}
