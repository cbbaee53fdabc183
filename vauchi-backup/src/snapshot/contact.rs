// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Contact snapshot (leaf node).

use serde::{Deserialize, Serialize};

use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::{same_by_diff, Restore, SnapshotError, SnapshotNode};
use crate::model::{Contact, IdentityDetails, IdentityId, TrustOrigin};

pub const TRUSTED_DETAILS: &str = "trusted_details";
pub const PUBLISHED_DETAILS: &str = "published_details";
pub const ONE_TO_ONE: &str = "one_to_one";
pub const TRUST_ORIGINS: &str = "trust_origins";

const MANDATORY: &[&str] = &[TRUSTED_DETAILS, ONE_TO_ONE];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_details: Option<IdentityDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_details: Option<IdentityDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_to_one: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_origins: Option<Vec<TrustOrigin>>,
}

impl ContactSnapshot {
    /// Captures a contact. Published details carrying the trusted version
    /// are the same generation and are left out.
    pub fn of(contact: &Contact) -> Self {
        let published_details = contact
            .published_details
            .as_ref()
            .filter(|published| published.version != contact.trusted_details.version)
            .cloned();

        let mut trust_origins = contact.trust_origins.clone();
        trust_origins.sort();

        ContactSnapshot {
            domain: Domain::of(&[TRUSTED_DETAILS, PUBLISHED_DETAILS, ONE_TO_ONE, TRUST_ORIGINS]),
            trusted_details: Some(contact.trusted_details.clone()),
            published_details,
            one_to_one: Some(contact.one_to_one),
            trust_origins: Some(trust_origins),
        }
    }
}

impl SnapshotNode for ContactSnapshot {
    const NODE: &'static str = "contact";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        same_by_diff(self, other)
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::Detached);
        diff.field(
            TRUSTED_DETAILS,
            DiffKind::ContactTrustedDetails,
            &self.trusted_details,
            &other.trusted_details,
        );
        diff.field(
            PUBLISHED_DETAILS,
            DiffKind::ContactPublishedDetails,
            &self.published_details,
            &other.published_details,
        );
        diff.field(ONE_TO_ONE, DiffKind::ContactOneToOne, &self.one_to_one, &other.one_to_one);
        diff.field(
            TRUST_ORIGINS,
            DiffKind::ContactTrustOrigins,
            &self.trust_origins,
            &other.trust_origins,
        );
        diff.finish()
    }
}

/// Where a contact snapshot is being restored.
#[derive(Debug, Clone)]
pub struct ContactRestoreContext {
    pub owned_identity: IdentityId,
    pub contact: IdentityId,
}

impl Restore for ContactSnapshot {
    type Context = ContactRestoreContext;
    type Entity = Contact;

    fn restore(&self, context: &ContactRestoreContext) -> Result<Contact, SnapshotError> {
        self.domain.require(Self::NODE, MANDATORY)?;
        let missing = |field: &'static str| SnapshotError::MissingMandatoryField {
            node: Self::NODE,
            field,
        };

        Ok(Contact {
            owned_identity: context.owned_identity.clone(),
            id: context.contact.clone(),
            trusted_details: self
                .trusted_details
                .clone()
                .ok_or_else(|| missing(TRUSTED_DETAILS))?,
            published_details: self.published_details.clone(),
            one_to_one: self.one_to_one.ok_or_else(|| missing(ONE_TO_ONE))?,
            trust_origins: self.trust_origins.clone().unwrap_or_default(),
        })
    }
}
