// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use ledgerbench_client::ClientError;

use crate::writer::WorkerId;

/// Result type for harness operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The service reported a non-success result code. Propagated as-is; the
    /// harness never retries.
    #[error(transparent)]
    Service(#[from] ClientError),
    /// The client broke the completion-callback contract. A defect signal, never
    /// averaged away.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    #[error("writer {worker} completed {actual} entries, expected {expected}")]
    WorkerCountMismatch {
        worker: WorkerId,
        expected: u64,
        actual: u64,
    },
    #[error("trial completed {actual} entries in total, expected {expected}")]
    TotalCountMismatch { expected: u64, actual: u64 },
    #[error("aggregator recorded {actual} completions, expected {expected}")]
    AggregateCountMismatch { expected: u64, actual: u64 },
    #[error("writer task failed: {0}")]
    WorkerTaskFailed(#[from] tokio::task::JoinError),
    #[error("invalid benchmark options: {0}")]
    InvalidOptions(&'static str),
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("{count} completion callbacks fired for already-resolved appends")]
    DuplicateCompletion { count: u64 },
    #[error("append was dropped by the service without a completion callback")]
    AbandonedAppend,
    #[error("append did not resolve within {}", humantime::format_duration(*timeout))]
    Timeout { timeout: Duration },
}
