// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Trial-wide measurement accumulation and the derived per-trial statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

/// Accumulates completions from every writer's callbacks within one trial.
///
/// Updates are additive and lock-free; completion callbacks race on service
/// threads and must never lose an increment. Reading a consistent pair is only
/// possible once all writers have joined — see [`TrialAggregator::snapshot`].
#[derive(Debug, Default)]
pub struct TrialAggregator {
    completed: CachePadded<AtomicU64>,
    total_latency_us: CachePadded<AtomicU64>,
    duplicate_callbacks: CachePadded<AtomicU64>,
}

impl TrialAggregator {
    pub fn record_completion(&self, latency: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_duplicate_callback(&self) {
        self.duplicate_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the accumulated totals.
    ///
    /// Callable only after all contributing writers have joined; the join is the
    /// barrier that makes the pair consistent.
    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            total_latency: Duration::from_micros(self.total_latency_us.load(Ordering::Acquire)),
            duplicate_callbacks: self.duplicate_callbacks.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateSnapshot {
    pub completed: u64,
    pub total_latency: Duration,
    pub duplicate_callbacks: u64,
}

/// Read-only statistics for one completed trial.
///
/// Mean wait latency (time from issue to acknowledgement, summed across entries)
/// and wall-clock time per entry are distinct metrics: with many appends in
/// flight the former exceeds the latter.
#[derive(Debug, Clone)]
pub struct TrialResult {
    pub trial: u32,
    pub elapsed: Duration,
    pub entries: u64,
    pub payload_size: usize,
    pub total_latency: Duration,
}

impl TrialResult {
    pub fn mean_latency_ms(&self) -> f64 {
        self.total_latency.as_secs_f64() * 1_000.0 / self.entries as f64
    }

    pub fn wall_clock_per_entry_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.0 / self.entries as f64
    }

    pub fn throughput_mb_per_sec(&self) -> f64 {
        let written = (self.entries * self.payload_size as u64) as f64 / (1024.0 * 1024.0);
        written / self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for TrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} wall clock time: {:.1} ms, size {:.3} MB -> {:.2} ms per entry (latency), {:.1} ms per entry (throughput), {:.1} MB/s throughput",
            self.trial,
            self.elapsed.as_secs_f64() * 1_000.0,
            self.payload_size as f64 / (1024.0 * 1024.0),
            self.mean_latency_ms(),
            self.wall_clock_per_entry_ms(),
            self.throughput_mb_per_sec(),
        )
    }
}
