// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot domains: the set of fields a node instance actually captured.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::SnapshotError;

/// Fields captured by one snapshot node.
///
/// A field outside the domain is unknown. A field inside it whose value is
/// absent is a known null. Names written by newer versions are kept as-is
/// and simply never compared or restored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(BTreeSet<String>);

impl Domain {
    pub fn new() -> Self {
        Domain(BTreeSet::new())
    }

    pub fn of(fields: &[&str]) -> Self {
        Domain(fields.iter().map(|f| f.to_string()).collect())
    }

    pub fn insert(&mut self, field: &str) {
        self.0.insert(field.to_string());
    }

    pub fn remove(&mut self, field: &str) -> bool {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn intersection(&self, other: &Domain) -> Domain {
        Domain(self.0.intersection(&other.0).cloned().collect())
    }

    /// Fails on the first mandatory field this domain did not capture.
    pub fn require(
        &self,
        node: &'static str,
        mandatory: &[&'static str],
    ) -> Result<(), SnapshotError> {
        match mandatory.iter().find(|field| !self.contains(field)) {
            Some(field) => Err(SnapshotError::MissingMandatoryField {
                node,
                field: *field,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = Domain::of(&["a", "b", "c"]);
        let b = Domain::of(&["b", "c", "d"]);
        assert_eq!(a.intersection(&b), Domain::of(&["b", "c"]));
    }

    #[test]
    fn test_require_names_missing_field() {
        let d = Domain::of(&["a"]);
        let err = d.require("node", &["a", "b"]).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::MissingMandatoryField { node: "node", field: "b" }
        ));
    }
}
