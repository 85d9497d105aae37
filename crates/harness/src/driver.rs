// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Orchestrates benchmark trials: ledger creation, writer fan-out, validation,
//! statistics, and resource release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use ledgerbench_client::{LedgerClient, LedgerHandle};

use crate::error::{Error, ProtocolViolation, Result};
use crate::metric_definitions;
use crate::options::{BenchmarkOptions, HandlePlacement};
use crate::stats::{TrialAggregator, TrialResult};
use crate::writer::{LedgerWriter, WorkerId};

pub struct BenchmarkDriver {
    client: Arc<dyn LedgerClient>,
    options: BenchmarkOptions,
}

impl BenchmarkDriver {
    pub fn new(client: Arc<dyn LedgerClient>, options: BenchmarkOptions) -> Result<Self> {
        options.validate()?;
        metric_definitions::describe_metrics();
        Ok(Self { client, options })
    }

    /// Runs all configured trials. Each trial is independent: fresh ledgers,
    /// fresh counters. A failed trial is reported as a failure, never as a
    /// latency number.
    pub async fn run(&self) -> Vec<Result<TrialResult>> {
        let mut results = Vec::with_capacity(self.options.trials as usize);
        for trial in 0..self.options.trials {
            match self.run_trial(trial).await {
                Ok(result) => {
                    info!("{result}");
                    results.push(Ok(result));
                }
                Err(err) => {
                    error!(trial, %err, "trial failed");
                    results.push(Err(err));
                    if self.options.stop_on_failure {
                        break;
                    }
                }
            }
        }
        results
    }

    #[instrument(
        level = "info",
        skip(self),
        fields(
            entries = self.options.entries_per_trial,
            writers = self.options.writers,
            mode = %self.options.append_mode,
        )
    )]
    pub async fn run_trial(&self, trial: u32) -> Result<TrialResult> {
        let handles = self.create_handles().await?;
        let outcome = self.run_writers(trial, &handles).await;
        // Ledgers are released on both paths; a close failure never masks the
        // trial outcome.
        for handle in &handles {
            if let Err(err) = handle.close().await {
                warn!(ledger = %handle.id(), %err, "failed to close ledger");
            }
        }
        outcome
    }

    async fn create_handles(&self) -> Result<Vec<Arc<dyn LedgerHandle>>> {
        let count = match self.options.handle_placement {
            HandlePlacement::Shared => 1,
            HandlePlacement::PerWriter => self.options.writers as usize,
        };
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            handles.push(self.client.create_ledger(&self.options.ledger).await?);
        }
        Ok(handles)
    }

    async fn run_writers(
        &self,
        trial: u32,
        handles: &[Arc<dyn LedgerHandle>],
    ) -> Result<TrialResult> {
        let shares = partition(self.options.entries_per_trial, self.options.writers);
        let aggregator = Arc::new(TrialAggregator::default());
        let payload = Bytes::from(vec![0u8; self.options.payload_size]);
        let counters: Vec<Arc<AtomicU64>> = shares
            .iter()
            .map(|_| Arc::new(AtomicU64::new(0)))
            .collect();

        let started = Instant::now();
        let mut writers = JoinSet::new();
        for (index, share) in shares.iter().enumerate() {
            let handle = match self.options.handle_placement {
                HandlePlacement::Shared => Arc::clone(&handles[0]),
                HandlePlacement::PerWriter => Arc::clone(&handles[index]),
            };
            let writer = LedgerWriter::new(
                WorkerId::from(index as u32),
                handle,
                *share,
                payload.clone(),
                self.options.append_mode,
                self.options.failure_policy,
                *self.options.append_timeout,
                Arc::clone(&aggregator),
                Arc::clone(&counters[index]),
            );
            writers.spawn(writer.run());
        }

        // Join every writer even after a failure; the join doubles as the memory
        // barrier for the counter reads below.
        let mut failure = None;
        while let Some(joined) = writers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(join_err) => {
                    failure.get_or_insert(Error::WorkerTaskFailed(join_err));
                }
            }
        }
        let elapsed = started.elapsed();

        let snapshot = aggregator.snapshot();
        if let Some(err) = failure {
            return Err(err);
        }
        if snapshot.duplicate_callbacks > 0 {
            return Err(Error::Protocol(ProtocolViolation::DuplicateCompletion {
                count: snapshot.duplicate_callbacks,
            }));
        }

        let total = self.options.entries_per_trial;
        let mut sum = 0;
        for (index, counter) in counters.iter().enumerate() {
            let actual = counter.load(Ordering::Acquire);
            if actual != shares[index] {
                return Err(Error::WorkerCountMismatch {
                    worker: WorkerId::from(index as u32),
                    expected: shares[index],
                    actual,
                });
            }
            sum += actual;
        }
        if sum != total {
            return Err(Error::TotalCountMismatch {
                expected: total,
                actual: sum,
            });
        }
        if snapshot.completed != total {
            return Err(Error::AggregateCountMismatch {
                expected: total,
                actual: snapshot.completed,
            });
        }

        Ok(TrialResult {
            trial,
            elapsed,
            entries: total,
            payload_size: self.options.payload_size,
            total_latency: snapshot.total_latency,
        })
    }
}

/// Partitions `total` evenly across `writers`; the last writer absorbs the
/// remainder.
fn partition(total: u64, writers: u32) -> Vec<u64> {
    let writers = writers as u64;
    let base = total / writers;
    let mut shares = vec![base; writers as usize];
    if let Some(last) = shares.last_mut() {
        *last += total % writers;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_even_when_divisible() {
        assert_eq!(vec![100; 10], partition(1000, 10));
    }

    #[test]
    fn last_writer_absorbs_the_remainder() {
        let shares = partition(1003, 10);
        assert_eq!(100, shares[0]);
        assert_eq!(103, shares[9]);
        assert_eq!(1003u64, shares.iter().sum());
    }

    #[test]
    fn single_writer_takes_everything() {
        assert_eq!(vec![1000], partition(1000, 1));
    }

    #[test]
    fn fewer_entries_than_writers() {
        assert_eq!(vec![0, 0, 0, 3], partition(3, 4));
    }
}
