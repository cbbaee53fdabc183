// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Free-form snapshot for subsystems that do not model their state as a
//! node tree (settings, preferences). Compared as a single value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::{same_by_diff, SnapshotNode};

pub const CONTENT: &str = "content";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpaqueSnapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default)]
    pub content: Value,
}

impl OpaqueSnapshot {
    pub fn new(content: Value) -> Self {
        OpaqueSnapshot {
            domain: Domain::of(&[CONTENT]),
            content,
        }
    }
}

impl SnapshotNode for OpaqueSnapshot {
    const NODE: &'static str = "opaque";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        same_by_diff(self, other)
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::Detached);
        diff.field(CONTENT, DiffKind::OpaqueContent, &self.content, &other.content);
        diff.finish()
    }
}
