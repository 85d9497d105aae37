// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Client-side seam to a replicated, append-only ledger service.
//!
//! The benchmark harness consumes the service exclusively through [`LedgerClient`]
//! and [`LedgerHandle`]; what sits behind them (storage, replication, durability,
//! digesting) is opaque. Completion of an append is signalled through a callback
//! invoked exactly once per call, from an arbitrary service-internal thread.

mod error;
mod options;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
#[cfg(any(test, feature = "test-util"))]
mod test_env;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{ClientError, Result};
pub use options::{
    ClientOptions, ClientOptionsBuilder, CreateLedgerOptions, CreateLedgerOptionsBuilder,
    DigestType,
};
#[cfg(any(test, feature = "test-util"))]
pub use test_env::TestEnvironment;

/// Identifies one ledger within the service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
)]
pub struct LedgerId(u64);

/// Position of an accepted entry within its ledger. Assigned by the service at
/// submission, monotonic per ledger.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
)]
pub struct EntryId(u64);

/// Completion callback for one append.
///
/// The service invokes it exactly once, from any of its internal threads, with the
/// assigned entry id on success or the failing result code. Callbacks of different
/// appends race with each other; no ordering is guaranteed, not even within one
/// ledger.
pub type AppendCallback = Box<dyn FnOnce(LedgerId, Result<EntryId>) + Send + 'static>;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Creates a new ledger for writing.
    ///
    /// Replication parameters are interpreted by the service; creation fails with
    /// [`ClientError::EnsembleUnavailable`] when the requested ensemble cannot be
    /// met.
    async fn create_ledger(
        &self,
        options: &CreateLedgerOptions,
    ) -> Result<Arc<dyn LedgerHandle>>;
}

/// An open, writable ledger.
///
/// Handles support concurrent submission from multiple threads; the in-flight cap
/// configured via [`ClientOptions::throttle`] is enforced per handle.
#[async_trait]
pub trait LedgerHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> LedgerId;

    /// Submits one entry for append. Returns as soon as the entry is accepted for
    /// transmission; the outcome is delivered through `callback`.
    fn async_append(&self, payload: Bytes, callback: AppendCallback);

    /// Closes the ledger, releasing it for reading or writing elsewhere.
    async fn close(&self) -> Result<()>;
}
