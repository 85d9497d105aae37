// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

/// # Client options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct ClientOptions {
    /// Address of the coordination service the client bootstraps from.
    pub address: String,
    /// Cap on in-flight unacknowledged appends per ledger handle. `0` disables
    /// throttling.
    pub throttle: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            address: "localhost:1282".to_owned(),
            throttle: 0,
        }
    }
}

/// Checksum algorithm the service applies to appended entries.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum DigestType {
    Crc32,
    Mac,
}

/// # Ledger creation options
///
/// Replication parameters for one ledger. The harness passes these through to the
/// service untouched.
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct CreateLedgerOptions {
    /// Number of storage nodes the ledger is striped across.
    pub ensemble: u32,
    /// Number of replicas written per entry.
    pub write_quorum: u32,
    /// Number of acknowledgements required before an append completes.
    pub ack_quorum: u32,
    pub digest: DigestType,
    #[serde(skip)]
    pub password: Vec<u8>,
}

impl Default for CreateLedgerOptions {
    fn default() -> Self {
        Self {
            ensemble: 1,
            write_quorum: 1,
            ack_quorum: 1,
            digest: DigestType::Crc32,
            password: Vec::new(),
        }
    }
}
