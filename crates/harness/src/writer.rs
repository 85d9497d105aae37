// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A writer owns one ledger handle and drives a bounded append loop against it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, histogram, Counter, Histogram};
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

use ledgerbench_client::LedgerHandle;

use crate::commit::{AppendAck, AppendCommit};
use crate::error::{Error, ProtocolViolation, Result};
use crate::metric_definitions::{
    APPENDS_COMPLETED_TOTAL, APPENDS_FAILED_TOTAL, APPEND_LATENCY,
};
use crate::options::{AppendMode, FailurePolicy};
use crate::stats::TrialAggregator;

/// Identifies one writer within a trial.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
)]
pub struct WorkerId(u32);

struct WriterStats {
    completed: Counter,
    failed: Counter,
    latency: Histogram,
}

impl Default for WriterStats {
    fn default() -> Self {
        Self {
            completed: counter!(APPENDS_COMPLETED_TOTAL),
            failed: counter!(APPENDS_FAILED_TOTAL),
            latency: histogram!(APPEND_LATENCY),
        }
    }
}

pub(crate) struct LedgerWriter {
    id: WorkerId,
    ledger: Arc<dyn LedgerHandle>,
    budget: u64,
    payload: Bytes,
    mode: AppendMode,
    failure_policy: FailurePolicy,
    append_timeout: Duration,
    aggregator: Arc<TrialAggregator>,
    /// Exclusively incremented by this writer's completion callbacks; the driver
    /// reads it only after the join barrier.
    completed: Arc<AtomicU64>,
    stats: Arc<WriterStats>,
}

impl LedgerWriter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: WorkerId,
        ledger: Arc<dyn LedgerHandle>,
        budget: u64,
        payload: Bytes,
        mode: AppendMode,
        failure_policy: FailurePolicy,
        append_timeout: Duration,
        aggregator: Arc<TrialAggregator>,
        completed: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            ledger,
            budget,
            payload,
            mode,
            failure_policy,
            append_timeout,
            aggregator,
            completed,
            stats: Arc::new(WriterStats::default()),
        }
    }

    /// Issues the full entry budget and waits for every acknowledgement.
    ///
    /// Every issued append is awaited before this returns, whatever the failure
    /// policy; a failed append surfaces as the returned error once the loop is
    /// done with it.
    #[instrument(level = "debug", skip(self), fields(worker = %self.id, ledger = %self.ledger.id(), budget = self.budget))]
    pub(crate) async fn run(self) -> Result<()> {
        match self.mode {
            AppendMode::Inline => self.run_inline().await,
            AppendMode::Batch => self.run_batch().await,
        }
    }

    async fn run_inline(&self) -> Result<()> {
        let mut first_failure = None;
        for _ in 0..self.budget {
            let commit = self.issue();
            if let Err(err) = self.acknowledge(commit).await {
                match self.failure_policy {
                    FailurePolicy::Abort => {
                        debug!(worker = %self.id, %err, "aborting remaining appends");
                        return Err(err);
                    }
                    FailurePolicy::Continue => {
                        if first_failure.is_none() {
                            warn!(worker = %self.id, %err, "append failed, continuing");
                        }
                        first_failure.get_or_insert(err);
                    }
                }
            }
        }
        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn run_batch(&self) -> Result<()> {
        let mut batch = Vec::with_capacity(self.budget as usize);
        for _ in 0..self.budget {
            batch.push(self.issue());
        }
        // Await in issue order; the service completes in whatever order it likes.
        // The whole batch is drained even after a failure so that no commit is
        // left unobserved.
        let mut first_failure = None;
        for commit in batch {
            if let Err(err) = self.acknowledge(commit).await {
                if first_failure.is_none() {
                    warn!(worker = %self.id, %err, "append failed");
                }
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Issues one append, wiring the completion callback to a fresh commit.
    ///
    /// The callback runs on a service thread: it resolves the commit and, on
    /// success, bumps this writer's counter and the shared aggregator. Failed
    /// appends record no latency.
    fn issue(&self) -> AppendCommit {
        let (commit, resolver) = AppendCommit::deferred();
        let aggregator = Arc::clone(&self.aggregator);
        let completed = Arc::clone(&self.completed);
        let stats = Arc::clone(&self.stats);
        let worker = self.id;
        self.ledger.async_append(
            self.payload.clone(),
            Box::new(move |ledger_id, result| match result {
                Ok(entry_id) => match resolver.complete(entry_id) {
                    Ok(latency) => {
                        completed.fetch_add(1, Ordering::Relaxed);
                        aggregator.record_completion(latency);
                        stats.completed.increment(1);
                        stats.latency.record(latency.as_secs_f64());
                    }
                    Err(violation) => {
                        aggregator.record_duplicate_callback();
                        error!(
                            %worker, ledger = %ledger_id, entry = %entry_id, %violation,
                            "completion callback for an already-resolved append"
                        );
                    }
                },
                Err(err) => {
                    stats.failed.increment(1);
                    if let Err(violation) = resolver.fail(err) {
                        aggregator.record_duplicate_callback();
                        error!(
                            %worker, ledger = %ledger_id, %violation,
                            "failure callback for an already-resolved append"
                        );
                    }
                }
            }),
        );
        commit
    }

    async fn acknowledge(&self, commit: AppendCommit) -> Result<AppendAck> {
        match timeout(self.append_timeout, commit).await {
            Ok(resolution) => resolution,
            Err(_) => Err(Error::Protocol(ProtocolViolation::Timeout {
                timeout: self.append_timeout,
            })),
        }
    }
}
