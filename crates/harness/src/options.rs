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
use serde_with::serde_as;

use ledgerbench_client::CreateLedgerOptions;

use crate::error::{Error, Result};

/// # Benchmark options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct BenchmarkOptions {
    /// Size in bytes of each appended entry.
    pub payload_size: usize,
    /// Total number of entries appended per trial, across all writers.
    pub entries_per_trial: u64,
    /// Number of trials. Each trial runs against fresh ledgers and counters.
    pub trials: u32,
    /// Number of concurrent writers.
    pub writers: u32,
    pub append_mode: AppendMode,
    pub handle_placement: HandlePlacement,
    pub failure_policy: FailurePolicy,
    /// Stop the trial loop at the first failed trial.
    pub stop_on_failure: bool,
    /// Upper bound on waiting for a single append acknowledgement.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub append_timeout: humantime::Duration,
    /// Replication parameters, passed through to the service untouched.
    pub ledger: CreateLedgerOptions,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            payload_size: 35 * 1024,
            entries_per_trial: 1000,
            trials: 10,
            writers: 1,
            append_mode: AppendMode::Batch,
            handle_placement: HandlePlacement::PerWriter,
            failure_policy: FailurePolicy::Continue,
            stop_on_failure: false,
            append_timeout: std::time::Duration::from_secs(40).into(),
            ledger: CreateLedgerOptions::default(),
        }
    }
}

impl BenchmarkOptions {
    /// Applies `LEDGERBENCH_*` environment overrides on top of the defaults.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(payload_size) = env_setting("LEDGERBENCH_PAYLOAD_SIZE") {
            options.payload_size = payload_size;
        }
        if let Some(entries) = env_setting("LEDGERBENCH_ENTRIES") {
            options.entries_per_trial = entries;
        }
        if let Some(trials) = env_setting("LEDGERBENCH_TRIALS") {
            options.trials = trials;
        }
        if let Some(writers) = env_setting("LEDGERBENCH_WRITERS") {
            options.writers = writers;
        }
        options
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.writers == 0 {
            return Err(Error::InvalidOptions("writers must be at least 1"));
        }
        if self.entries_per_trial == 0 {
            return Err(Error::InvalidOptions(
                "entries-per-trial must be at least 1",
            ));
        }
        if self.payload_size == 0 {
            return Err(Error::InvalidOptions("payload-size must be at least 1"));
        }
        Ok(())
    }
}

fn env_setting<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

/// How a writer overlaps appends with waiting for their acknowledgements.
///
/// The two modes have materially different latency/throughput characteristics:
/// `inline` measures unpipelined round trips, `batch` measures the service's
/// pipelined throughput.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AppendMode {
    /// Await every append before issuing the next.
    Inline,
    /// Issue the full budget, then await all acknowledgements in issue order.
    Batch,
}

/// How ledger handles are distributed across writers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HandlePlacement {
    /// One ledger per writer.
    PerWriter,
    /// A single ledger; all writers submit concurrently through one handle.
    /// Assumes (without verifying) that the client supports concurrent
    /// submission on one handle.
    Shared,
}

/// What a writer does with its remaining budget after a failed append.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep issuing so partial progress stays observable; the first failure is
    /// propagated after the loop.
    Continue,
    /// Stop issuing immediately. Already-issued appends are still awaited.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_reference_workload() {
        let options = BenchmarkOptions::default();
        assert_eq!(35 * 1024, options.payload_size);
        assert_eq!(1000, options.entries_per_trial);
        assert_eq!(1, options.writers);
        assert_eq!(AppendMode::Batch, options.append_mode);
        assert_eq!(std::time::Duration::from_secs(40), *options.append_timeout);
        assert_eq!(1, options.ledger.ensemble);
        options.validate().expect("defaults validate");
    }

    #[test]
    fn zero_writers_is_rejected() {
        let options = BenchmarkOptionsBuilder::default()
            .writers(0u32)
            .build()
            .unwrap();
        assert!(options.validate().is_err());
    }
}
