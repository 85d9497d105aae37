// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Result type for ledger client operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Result codes reported by the ledger service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("not enough storage nodes to satisfy the requested ensemble")]
    EnsembleUnavailable,
    #[error("ledger is closed for writing")]
    LedgerClosed,
    #[error("entry was not durably stored")]
    WriteFailed,
    #[error("service did not respond in time")]
    Timeout,
    #[error("service is shutting down")]
    Shutdown,
}
