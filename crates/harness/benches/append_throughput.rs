// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Append throughput against the in-process mock service, for both operating
//! modes. The mock completes instantly, so this measures the harness's own
//! overhead rather than a real service.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tokio::runtime::Builder;

use ledgerbench_client::{ClientOptions, TestEnvironment};
use ledgerbench_harness::{AppendMode, BenchmarkDriver, BenchmarkOptionsBuilder};

const ENTRIES: u64 = 256;
const PAYLOAD_SIZE: usize = 35 * 1024;

fn append_throughput(criterion: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime builds");
    let mut env = TestEnvironment::start();

    let mut group = criterion.benchmark_group("append-throughput");
    group.throughput(Throughput::Bytes(ENTRIES * PAYLOAD_SIZE as u64));
    for mode in [AppendMode::Batch, AppendMode::Inline] {
        let options = BenchmarkOptionsBuilder::default()
            .payload_size(PAYLOAD_SIZE)
            .entries_per_trial(ENTRIES)
            .writers(4u32)
            .append_mode(mode)
            .build()
            .expect("options build");
        let client = Arc::new(env.connect(&ClientOptions::default()));
        let driver = BenchmarkDriver::new(client, options).expect("driver builds");
        group.bench_function(mode.to_string(), |bencher| {
            bencher
                .to_async(&rt)
                .iter(|| async { driver.run_trial(0).await.expect("trial succeeds") });
        });
    }
    group.finish();
    env.close();
}

criterion_group!(benches, append_throughput);
criterion_main!(benches);
