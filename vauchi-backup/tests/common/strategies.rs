// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for property-based testing.

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

use vauchi_backup::{BackupDocument, BackupSeed, IdentityDetails};

/// Strategy for generating backup seeds from 20 random bytes.
pub fn seed_strategy() -> impl Strategy<Value = BackupSeed> {
    prop::array::uniform20(any::<u8>()).prop_map(BackupSeed::from_bytes)
}

/// Strategy for generating delegate tags.
pub fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for generating documents with up to four parts.
pub fn document_strategy() -> impl Strategy<Value = BackupDocument> {
    (
        0u64..4_000_000_000_000,
        btree_map(tag_strategy(), vec(any::<u8>(), 0..256), 0..4),
    )
        .prop_map(|(created_at, parts)| {
            parts
                .into_iter()
                .fold(BackupDocument::new(created_at), |doc, (tag, bytes)| {
                    doc.with_part(tag, bytes)
                })
        })
}

/// Strategy for generating profile details.
pub fn details_strategy() -> impl Strategy<Value = IdentityDetails> {
    (
        0u32..10,
        "[A-Z][a-z]{1,10}",
        "[A-Z][a-z]{1,10}",
        proptest::option::of("[A-Za-z ]{1,20}"),
    )
        .prop_map(|(version, first, last, company)| IdentityDetails {
            company,
            ..IdentityDetails::named(version, &first, &last)
        })
}

/// Strategy for generating retry base delays in milliseconds.
pub fn base_delay_strategy() -> impl Strategy<Value = u64> {
    1u64..120_000
}
