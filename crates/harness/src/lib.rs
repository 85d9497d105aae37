// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Append throughput/latency benchmark harness for a replicated ledger service.
//!
//! The harness drives controlled write load through the asynchronous client seam
//! of [`ledgerbench_client`], converts the service's completion callbacks into
//! awaitable per-append commits, and aggregates per-writer and trial-wide
//! statistics across repeated trials.

mod commit;
mod driver;
mod error;
mod metric_definitions;
mod options;
mod stats;
mod writer;

pub use commit::{AppendAck, AppendCommit, CommitResolver, DuplicateResolution};
pub use driver::BenchmarkDriver;
pub use error::{Error, ProtocolViolation, Result};
pub use options::{
    AppendMode, BenchmarkOptions, BenchmarkOptionsBuilder, FailurePolicy, HandlePlacement,
};
pub use stats::{AggregateSnapshot, TrialAggregator, TrialResult};
pub use writer::WorkerId;
