// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Identity Model
//!
//! The entities snapshot nodes are composed from and restored into: an owned
//! identity with its private keys and published details, and the social
//! graph around it (contacts, v1 groups, v2 groups).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identity bytes, rendered as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(Vec<u8>);

impl IdentityId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        IdentityId(bytes.into())
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(IdentityId)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityId({})", self.to_hex())
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for IdentityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IdentityId::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid identity hex"))
    }
}

/// Base64 serde for byte vectors.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Versioned profile details of an identity (own or contact).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDetails {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl IdentityDetails {
    /// Details with only a first and last name.
    pub fn named(version: u32, first_name: &str, last_name: &str) -> Self {
        IdentityDetails {
            version,
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            ..Default::default()
        }
    }
}

/// Versioned details of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetails {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Private key material of an owned identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateIdentity {
    pub server: String,
    #[serde(with = "base64_bytes")]
    pub authentication_secret: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encryption_secret: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub mac_secret: Vec<u8>,
}

impl fmt::Debug for PrivateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateIdentity")
            .field("server", &self.server)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

impl Drop for PrivateIdentity {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.authentication_secret.zeroize();
        self.encryption_secret.zeroize();
        self.mac_secret.zeroize();
    }
}

/// Binding of an owned identity to an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakBinding {
    pub server_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub jwks: String,
    pub signature_key: Option<String>,
    pub keycloak_user_id: Option<String>,
    pub transfer_restricted: bool,
}

/// An identity owned by this engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedIdentity {
    pub id: IdentityId,
    pub private_identity: PrivateIdentity,
    pub published_details: IdentityDetails,
    pub keycloak: Option<KeycloakBinding>,
    pub active: bool,
}

/// Why a contact is trusted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustOrigin {
    Direct { timestamp: u64 },
    Introduction { mediator: IdentityId, timestamp: u64 },
    Group { group_owner: IdentityId, timestamp: u64 },
    Keycloak { server_url: String, timestamp: u64 },
}

/// A contact of an owned identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub owned_identity: IdentityId,
    pub id: IdentityId,
    pub trusted_details: IdentityDetails,
    /// Newer details published by the contact, not yet trusted.
    pub published_details: Option<IdentityDetails>,
    pub one_to_one: bool,
    pub trust_origins: Vec<TrustOrigin>,
}

/// A group of the first generation, identified by owner and uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupV1 {
    pub owned_identity: IdentityId,
    pub owner: IdentityId,
    pub uid: Vec<u8>,
    pub published_details: GroupDetails,
    pub trusted_details: Option<GroupDetails>,
    pub members: BTreeSet<IdentityId>,
    pub pending_members: BTreeSet<IdentityId>,
}

impl GroupV1 {
    /// Map key used in snapshots: `<owner hex>:<uid hex>`.
    pub fn key(&self) -> String {
        group_v1_key(&self.owner, &self.uid)
    }
}

/// Builds the snapshot map key of a v1 group.
pub fn group_v1_key(owner: &IdentityId, uid: &[u8]) -> String {
    format!("{}:{}", owner.to_hex(), hex::encode(uid))
}

/// Splits a v1 group snapshot key back into owner and uid.
pub fn parse_group_v1_key(key: &str) -> Option<(IdentityId, Vec<u8>)> {
    let (owner, uid) = key.split_once(':')?;
    Some((IdentityId::from_hex(owner)?, hex::decode(uid).ok()?))
}

/// Member permission in a v2 group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPermission {
    Admin,
    RemoteDeleteAnything,
    EditOrRemoteDeleteOwnMessages,
    ChangeSettings,
    SendMessage,
}

/// A group of the second generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupV2 {
    pub owned_identity: IdentityId,
    pub id: Vec<u8>,
    pub version: u32,
    pub trusted_details: GroupDetails,
    pub published_details: Option<GroupDetails>,
    pub own_permissions: BTreeSet<GroupPermission>,
    pub members: BTreeMap<IdentityId, BTreeSet<GroupPermission>>,
    pub pending_members: BTreeSet<IdentityId>,
    pub keycloak_managed: bool,
}

impl GroupV2 {
    /// Map key used in snapshots.
    pub fn key(&self) -> String {
        hex::encode(&self.id)
    }
}

/// Everything restored for one owned identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredProfile {
    pub identity: OwnedIdentity,
    pub contacts: Vec<Contact>,
    pub groups_v1: Vec<GroupV1>,
    pub groups_v2: Vec<GroupV2>,
}
