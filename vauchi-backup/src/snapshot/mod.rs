// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot Node Tree
//!
//! Serializable trees describing an owned identity and its social graph,
//! one subtree per contributing subsystem. Every node carries a [`Domain`]
//! so snapshots written by older or newer versions can be compared and
//! restored field by field:
//!
//! - comparison and diff only look at fields both sides captured;
//! - restore fails if a mandatory field was not captured, and never invents
//!   a default for it.

pub mod contact;
pub mod device;
pub mod diff;
pub mod domain;
pub mod group_v1;
pub mod group_v2;
pub mod identity;
pub mod keycloak;
pub mod opaque;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use contact::{ContactRestoreContext, ContactSnapshot};
pub use device::DeviceSnapshot;
pub use diff::{DiffKind, DiffTarget, SyncAtom, SyncAtomKind, SyncDiff};
pub use domain::Domain;
pub use group_v1::{GroupV1RestoreContext, GroupV1Snapshot};
pub use group_v2::{GroupV2RestoreContext, GroupV2Snapshot};
pub use identity::{IdentityRestoreContext, IdentitySnapshot};
pub use keycloak::KeycloakSnapshot;
pub use opaque::OpaqueSnapshot;

/// Snapshot composition, parsing and restore errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("{node} snapshot is missing mandatory field '{field}'")]
    MissingMandatoryField {
        node: &'static str,
        field: &'static str,
    },

    #[error("Invalid snapshot key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unexpected snapshot node: expected {expected}, got {actual}")]
    WrongNode {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Owned identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Owned identity already exists: {0}")]
    IdentityExists(String),

    #[error("No snapshot part for delegate '{0}'")]
    MissingDelegatePart(String),

    #[error("Delegate '{0}' is registered twice")]
    DuplicateDelegate(String),

    #[error("Delegate '{tag}' failed: {reason}")]
    Delegate { tag: String, reason: String },
}

/// Contract shared by every node of the snapshot tree.
pub trait SnapshotNode: Serialize + DeserializeOwned {
    /// Node name used in error messages.
    const NODE: &'static str;

    /// Fields this instance captured.
    fn domain(&self) -> &Domain;

    /// True when both nodes captured the same fields with the same values.
    ///
    /// A field known on one side only makes the nodes incomparable, hence
    /// never "the same".
    fn are_contents_the_same(&self, other: &Self) -> bool;

    /// Differences over the fields both nodes captured.
    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff>;

    fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }
}

/// Turns a node back into the entity it was composed from.
pub trait Restore {
    type Context;
    type Entity;

    fn restore(&self, context: &Self::Context) -> Result<Self::Entity, SnapshotError>;
}

/// The root node a delegate contributes, as a closed set of variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "snapshot", rename_all = "snake_case")]
pub enum DelegateSnapshot {
    Identity(IdentitySnapshot),
    Device(DeviceSnapshot),
    Opaque(OpaqueSnapshot),
}

impl DelegateSnapshot {
    pub fn name(&self) -> &'static str {
        match self {
            DelegateSnapshot::Identity(_) => IdentitySnapshot::NODE,
            DelegateSnapshot::Device(_) => DeviceSnapshot::NODE,
            DelegateSnapshot::Opaque(_) => OpaqueSnapshot::NODE,
        }
    }

    pub fn domain(&self) -> &Domain {
        match self {
            DelegateSnapshot::Identity(node) => node.domain(),
            DelegateSnapshot::Device(node) => node.domain(),
            DelegateSnapshot::Opaque(node) => node.domain(),
        }
    }

    /// Variants of different kinds are never the same.
    pub fn are_contents_the_same(&self, other: &DelegateSnapshot) -> bool {
        match (self, other) {
            (DelegateSnapshot::Identity(a), DelegateSnapshot::Identity(b)) => {
                a.are_contents_the_same(b)
            }
            (DelegateSnapshot::Device(a), DelegateSnapshot::Device(b)) => {
                a.are_contents_the_same(b)
            }
            (DelegateSnapshot::Opaque(a), DelegateSnapshot::Opaque(b)) => {
                a.are_contents_the_same(b)
            }
            _ => false,
        }
    }

    /// Diff of two roots; roots of different kinds are not comparable.
    pub fn compute_diff(&self, other: &DelegateSnapshot) -> Vec<SyncDiff> {
        match (self, other) {
            (DelegateSnapshot::Identity(a), DelegateSnapshot::Identity(b)) => a.compute_diff(b),
            (DelegateSnapshot::Device(a), DelegateSnapshot::Device(b)) => a.compute_diff(b),
            (DelegateSnapshot::Opaque(a), DelegateSnapshot::Opaque(b)) => a.compute_diff(b),
            _ => Vec::new(),
        }
    }

    pub fn as_identity(&self) -> Result<&IdentitySnapshot, SnapshotError> {
        match self {
            DelegateSnapshot::Identity(node) => Ok(node),
            other => Err(SnapshotError::WrongNode {
                expected: IdentitySnapshot::NODE,
                actual: other.name(),
            }),
        }
    }

    pub fn as_device(&self) -> Result<&DeviceSnapshot, SnapshotError> {
        match self {
            DelegateSnapshot::Device(node) => Ok(node),
            other => Err(SnapshotError::WrongNode {
                expected: DeviceSnapshot::NODE,
                actual: other.name(),
            }),
        }
    }

    pub fn as_opaque(&self) -> Result<&OpaqueSnapshot, SnapshotError> {
        match self {
            DelegateSnapshot::Opaque(node) => Ok(node),
            other => Err(SnapshotError::WrongNode {
                expected: OpaqueSnapshot::NODE,
                actual: other.name(),
            }),
        }
    }
}

/// Shared `are_contents_the_same` for nodes whose diff covers every field.
pub(crate) fn same_by_diff<N: SnapshotNode>(a: &N, b: &N) -> bool {
    a.domain() == b.domain() && a.compute_diff(b).is_empty()
}
