// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test Fixtures
//!
//! Owned identities, contacts and groups with predictable contents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use vauchi_backup::{
    Contact, GroupDetails, GroupPermission, GroupV1, GroupV2, IdentityDetails, IdentityId,
    KeycloakBinding, MemoryIdentityStore, OwnedIdentity, PrivateIdentity, TrustOrigin,
};

pub const SERVER: &str = "https://server.vauchi.app";

pub fn identity_id(n: u8) -> IdentityId {
    IdentityId::new(vec![n; 8])
}

pub fn owned_identity(n: u8, first_name: &str, last_name: &str) -> OwnedIdentity {
    OwnedIdentity {
        id: identity_id(n),
        private_identity: PrivateIdentity {
            server: SERVER.to_string(),
            authentication_secret: vec![n; 32],
            encryption_secret: vec![n.wrapping_add(1); 32],
            mac_secret: vec![n.wrapping_add(2); 32],
        },
        published_details: IdentityDetails::named(1, first_name, last_name),
        keycloak: None,
        active: true,
    }
}

pub fn keycloak_binding() -> KeycloakBinding {
    KeycloakBinding {
        server_url: "https://sso.example.org/realms/staff".to_string(),
        client_id: "vauchi".to_string(),
        client_secret: None,
        jwks: r#"{"keys":[]}"#.to_string(),
        signature_key: None,
        keycloak_user_id: Some("user-42".to_string()),
        transfer_restricted: false,
    }
}

pub fn contact(owned: &IdentityId, n: u8, name: &str) -> Contact {
    Contact {
        owned_identity: owned.clone(),
        id: identity_id(n),
        trusted_details: IdentityDetails::named(1, name, "Contact"),
        published_details: Some(IdentityDetails::named(2, name, "Contact (new)")),
        one_to_one: true,
        trust_origins: vec![TrustOrigin::Direct { timestamp: 1_700_000_000 }],
    }
}

pub fn group_v1(owned: &IdentityId, owner: &IdentityId, uid: u8) -> GroupV1 {
    GroupV1 {
        owned_identity: owned.clone(),
        owner: owner.clone(),
        uid: vec![uid; 4],
        published_details: GroupDetails {
            version: 1,
            name: "Climbing".to_string(),
            description: None,
            photo_url: None,
        },
        trusted_details: None,
        members: BTreeSet::from([identity_id(20), identity_id(21)]),
        pending_members: BTreeSet::new(),
    }
}

pub fn group_v2(owned: &IdentityId, id: u8) -> GroupV2 {
    GroupV2 {
        owned_identity: owned.clone(),
        id: vec![id; 16],
        version: 4,
        trusted_details: GroupDetails {
            version: 2,
            name: "Board".to_string(),
            description: Some("Quarterly planning".to_string()),
            photo_url: None,
        },
        published_details: None,
        own_permissions: BTreeSet::from([GroupPermission::Admin, GroupPermission::SendMessage]),
        members: BTreeMap::from([(
            identity_id(30),
            BTreeSet::from([GroupPermission::SendMessage]),
        )]),
        pending_members: BTreeSet::from([identity_id(31)]),
        keycloak_managed: false,
    }
}

/// A store holding Alice with two contacts and one group of each kind, and
/// Bob with nothing else.
pub fn populated_store() -> Arc<MemoryIdentityStore> {
    let store = Arc::new(MemoryIdentityStore::new());
    let alice = owned_identity(1, "Alice", "Liddell");
    let alice_id = alice.id.clone();
    store.upsert_identity(alice);
    store.upsert_identity(owned_identity(2, "Bob", "Builder"));

    store.upsert_contact(contact(&alice_id, 10, "Carol")).unwrap();
    store.upsert_contact(contact(&alice_id, 11, "Dave")).unwrap();
    store
        .upsert_group_v1(group_v1(&alice_id, &identity_id(10), 7))
        .unwrap();
    store.upsert_group_v2(group_v2(&alice_id, 9)).unwrap();
    store
}
