// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::mock::{MockCluster, MockFaults, MockLedgerClient};
use crate::ClientOptions;

/// An in-process stand-in for the coordination service and the single storage
/// node the benchmarks run against.
///
/// Teardown is best-effort: [`TestEnvironment::close`] suppresses secondary
/// failures so a broken environment never masks the test outcome.
pub struct TestEnvironment {
    cluster: Option<Arc<MockCluster>>,
    address: String,
}

impl TestEnvironment {
    /// Starts the coordination service and one storage node on a fixed local
    /// address.
    pub fn start() -> Self {
        Self::start_with(MockFaults::default(), None)
    }

    /// Starts the environment with scripted faults and/or an artificial delay
    /// applied to every append completion.
    pub fn start_with(faults: MockFaults, append_delay: Option<Duration>) -> Self {
        let address = "localhost:1282".to_owned();
        info!(%address, "starting mock ledger environment");
        Self {
            cluster: Some(MockCluster::start(faults, append_delay)),
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connects a client to the environment. The throttle configured in
    /// `options` is enforced per ledger handle.
    pub fn connect(&self, options: &ClientOptions) -> MockLedgerClient {
        let cluster = self
            .cluster
            .as_ref()
            .expect("environment is running")
            .clone();
        MockLedgerClient::new(cluster, options.throttle)
    }

    /// Tears the environment down. Idempotent; outstanding appends are still
    /// acknowledged before the service threads exit.
    pub fn close(&mut self) {
        if let Some(cluster) = self.cluster.take() {
            cluster.shutdown();
        }
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        self.close();
    }
}
