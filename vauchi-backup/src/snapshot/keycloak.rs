// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Keycloak binding snapshot (leaf node).

use serde::{Deserialize, Serialize};

use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::{same_by_diff, Restore, SnapshotError, SnapshotNode};
use crate::model::KeycloakBinding;

pub const SERVER_URL: &str = "server_url";
pub const CLIENT_ID: &str = "client_id";
pub const CLIENT_SECRET: &str = "client_secret";
pub const JWKS: &str = "jwks";
pub const SIGNATURE_KEY: &str = "signature_key";
pub const KEYCLOAK_USER_ID: &str = "keycloak_user_id";
pub const TRANSFER_RESTRICTED: &str = "transfer_restricted";

const MANDATORY: &[&str] = &[SERVER_URL, CLIENT_ID, JWKS];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakSnapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_restricted: Option<bool>,
}

impl KeycloakSnapshot {
    pub fn of(binding: &KeycloakBinding) -> Self {
        KeycloakSnapshot {
            domain: Domain::of(&[
                SERVER_URL,
                CLIENT_ID,
                CLIENT_SECRET,
                JWKS,
                SIGNATURE_KEY,
                KEYCLOAK_USER_ID,
                TRANSFER_RESTRICTED,
            ]),
            server_url: Some(binding.server_url.clone()),
            client_id: Some(binding.client_id.clone()),
            client_secret: binding.client_secret.clone(),
            jwks: Some(binding.jwks.clone()),
            signature_key: binding.signature_key.clone(),
            keycloak_user_id: binding.keycloak_user_id.clone(),
            transfer_restricted: Some(binding.transfer_restricted),
        }
    }
}

impl SnapshotNode for KeycloakSnapshot {
    const NODE: &'static str = "keycloak";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        same_by_diff(self, other)
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::Detached);
        diff.field(SERVER_URL, DiffKind::KeycloakServerUrl, &self.server_url, &other.server_url);
        diff.field(CLIENT_ID, DiffKind::KeycloakClientId, &self.client_id, &other.client_id);
        diff.field(
            CLIENT_SECRET,
            DiffKind::KeycloakClientSecret,
            &self.client_secret,
            &other.client_secret,
        );
        diff.field(JWKS, DiffKind::KeycloakJwks, &self.jwks, &other.jwks);
        diff.field(
            SIGNATURE_KEY,
            DiffKind::KeycloakSignatureKey,
            &self.signature_key,
            &other.signature_key,
        );
        diff.field(
            KEYCLOAK_USER_ID,
            DiffKind::KeycloakUserId,
            &self.keycloak_user_id,
            &other.keycloak_user_id,
        );
        diff.field(
            TRANSFER_RESTRICTED,
            DiffKind::KeycloakTransferRestricted,
            &self.transfer_restricted,
            &other.transfer_restricted,
        );
        diff.finish()
    }
}

impl Restore for KeycloakSnapshot {
    type Context = ();
    type Entity = KeycloakBinding;

    fn restore(&self, _context: &()) -> Result<KeycloakBinding, SnapshotError> {
        self.domain.require(Self::NODE, MANDATORY)?;
        let missing = |field: &'static str| SnapshotError::MissingMandatoryField {
            node: Self::NODE,
            field,
        };

        Ok(KeycloakBinding {
            server_url: self.server_url.clone().ok_or_else(|| missing(SERVER_URL))?,
            client_id: self.client_id.clone().ok_or_else(|| missing(CLIENT_ID))?,
            client_secret: self.client_secret.clone(),
            jwks: self.jwks.clone().ok_or_else(|| missing(JWKS))?,
            signature_key: self.signature_key.clone(),
            keycloak_user_id: self.keycloak_user_id.clone(),
            transfer_restricted: self.transfer_restricted.unwrap_or(false),
        })
    }
}
