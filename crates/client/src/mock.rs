// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-process mock of the ledger service, primarily for testing.
//!
//! Completion callbacks are executed on a small dispatcher thread pool, so they
//! arrive on foreign threads and out of submission order, like a real client's
//! internal threads would deliver them.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    AppendCallback, ClientError, CreateLedgerOptions, EntryId, LedgerClient, LedgerHandle,
    LedgerId, Result,
};

const DISPATCHER_THREADS: usize = 4;

/// Scripted misbehavior for the mock service.
#[derive(Debug, Clone, Copy)]
pub struct MockFaults {
    /// Fail the append of this entry id (per ledger) with [`MockFaults::fail_code`].
    pub fail_entry: Option<u64>,
    pub fail_code: ClientError,
    /// Accept the append of this entry id but never deliver its completion
    /// callback. The entry stays unacknowledged until the cluster shuts down.
    pub swallow_entry: Option<u64>,
}

impl Default for MockFaults {
    fn default() -> Self {
        Self {
            fail_entry: None,
            fail_code: ClientError::WriteFailed,
            swallow_entry: None,
        }
    }
}

struct Job {
    ledger_id: LedgerId,
    result: Result<EntryId>,
    callback: AppendCallback,
    delay: Option<Duration>,
    gate: Option<Arc<InflightGate>>,
    swallow: bool,
}

impl Job {
    fn run(self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        (self.callback)(self.ledger_id, self.result);
        if let Some(gate) = self.gate {
            gate.release();
        }
    }
}

/// The storage-node half of the mock: a submission queue drained by dispatcher
/// threads that deliver completion callbacks.
pub struct MockCluster {
    faults: MockFaults,
    append_delay: Option<Duration>,
    next_ledger: AtomicU64,
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    dispatchers: Mutex<Vec<thread::JoinHandle<()>>>,
    parked: Arc<Mutex<Vec<Job>>>,
}

impl MockCluster {
    pub(crate) fn start(faults: MockFaults, append_delay: Option<Duration>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(StdMutex::new(rx));
        let parked = Arc::new(Mutex::new(Vec::new()));
        let dispatchers = (0..DISPATCHER_THREADS)
            .map(|i| {
                let rx = Arc::clone(&rx);
                let parked = Arc::clone(&parked);
                thread::Builder::new()
                    .name(format!("ledger-dispatcher-{i}"))
                    .spawn(move || loop {
                        let job = match rx.lock().expect("dispatcher queue poisoned").recv() {
                            Ok(job) => job,
                            Err(_) => break,
                        };
                        if job.swallow {
                            // Keep the callback alive without ever invoking it.
                            parked.lock().push(job);
                            continue;
                        }
                        job.run();
                    })
                    .expect("dispatcher thread spawns")
            })
            .collect();

        Arc::new(Self {
            faults,
            append_delay,
            next_ledger: AtomicU64::new(0),
            tx: Mutex::new(Some(tx)),
            dispatchers: Mutex::new(dispatchers),
            parked,
        })
    }

    fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|rejected| rejected.0),
            None => Err(job),
        }
    }

    /// Stops accepting appends and joins the dispatcher threads. Pending jobs are
    /// still delivered before the threads exit.
    pub(crate) fn shutdown(&self) {
        if self.tx.lock().take().is_none() {
            return;
        }
        debug!("shutting down mock ledger cluster");
        for dispatcher in self.dispatchers.lock().drain(..) {
            if dispatcher.join().is_err() {
                warn!("a ledger dispatcher thread panicked during shutdown");
            }
        }
        // Swallowed appends stay unacknowledged; their callbacks are dropped now.
        self.parked.lock().clear();
    }
}

/// Blocks submitters while `throttle` appends are unacknowledged on one handle.
struct InflightGate {
    permits: StdMutex<usize>,
    available: Condvar,
}

impl InflightGate {
    fn new(throttle: usize) -> Arc<Self> {
        Arc::new(Self {
            permits: StdMutex::new(throttle),
            available: Condvar::new(),
        })
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock().expect("gate poisoned");
        while *permits == 0 {
            permits = self.available.wait(permits).expect("gate poisoned");
        }
        *permits -= 1;
    }

    fn release(&self) {
        let mut permits = self.permits.lock().expect("gate poisoned");
        *permits += 1;
        self.available.notify_one();
    }
}

/// Instantly-completing ledger client backed by [`MockCluster`].
#[derive(Clone)]
pub struct MockLedgerClient {
    cluster: Arc<MockCluster>,
    throttle: usize,
}

impl MockLedgerClient {
    pub(crate) fn new(cluster: Arc<MockCluster>, throttle: usize) -> Self {
        Self { cluster, throttle }
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn create_ledger(
        &self,
        options: &CreateLedgerOptions,
    ) -> Result<Arc<dyn LedgerHandle>> {
        // The test environment runs a single storage node.
        if options.ensemble > 1
            || options.write_quorum > options.ensemble
            || options.ack_quorum > options.write_quorum
        {
            return Err(ClientError::EnsembleUnavailable);
        }
        let id = LedgerId::from(self.cluster.next_ledger.fetch_add(1, Ordering::Relaxed));
        debug!(ledger = %id, digest = %options.digest, "created mock ledger");
        Ok(Arc::new(MockLedger {
            id,
            cluster: Arc::clone(&self.cluster),
            gate: (self.throttle > 0).then(|| InflightGate::new(self.throttle)),
            next_entry: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MockLedger {
    id: LedgerId,
    cluster: Arc<MockCluster>,
    gate: Option<Arc<InflightGate>>,
    next_entry: AtomicU64,
    closed: AtomicBool,
}

impl fmt::Debug for MockLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLedger").field("id", &self.id).finish()
    }
}

#[async_trait]
impl LedgerHandle for MockLedger {
    fn id(&self) -> LedgerId {
        self.id
    }

    fn async_append(&self, _payload: Bytes, callback: AppendCallback) {
        if self.closed.load(Ordering::Acquire) {
            callback(self.id, Err(ClientError::LedgerClosed));
            return;
        }
        if let Some(gate) = &self.gate {
            gate.acquire();
        }
        let entry_id = self.next_entry.fetch_add(1, Ordering::Relaxed);
        let result = match self.cluster.faults.fail_entry {
            Some(fail_entry) if fail_entry == entry_id => Err(self.cluster.faults.fail_code),
            _ => Ok(EntryId::from(entry_id)),
        };
        let job = Job {
            ledger_id: self.id,
            result,
            callback,
            delay: self.cluster.append_delay,
            gate: self.gate.clone(),
            swallow: self.cluster.faults.swallow_entry == Some(entry_id),
        };
        if let Err(rejected) = self.cluster.submit(job) {
            if let Some(gate) = rejected.gate {
                gate.release();
            }
            (rejected.callback)(self.id, Err(ClientError::Shutdown));
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::{ClientOptions, ClientOptionsBuilder, CreateLedgerOptionsBuilder, TestEnvironment};

    fn collect_completions(
        ledger: &Arc<dyn LedgerHandle>,
        appends: usize,
    ) -> Vec<(LedgerId, Result<EntryId>)> {
        let (tx, rx) = mpsc::channel();
        for _ in 0..appends {
            let tx = tx.clone();
            ledger.async_append(
                Bytes::from_static(b"payload"),
                Box::new(move |ledger_id, result| {
                    tx.send((ledger_id, result)).expect("test receiver alive");
                }),
            );
        }
        (0..appends)
            .map(|_| {
                rx.recv_timeout(Duration::from_secs(5))
                    .expect("callback delivered")
            })
            .collect()
    }

    #[test_log::test(tokio::test)]
    async fn assigns_dense_entry_ids() {
        let mut env = TestEnvironment::start();
        let client = env.connect(&ClientOptions::default());
        let ledger = client
            .create_ledger(&CreateLedgerOptions::default())
            .await
            .expect("ledger creates");

        let completions = collect_completions(&ledger, 100);
        let mut ids: Vec<u64> = completions
            .into_iter()
            .map(|(ledger_id, result)| {
                assert_eq!(ledger.id(), ledger_id);
                result.expect("append succeeds").into()
            })
            .collect();
        ids.sort_unstable();
        assert_eq!((0..100).collect::<Vec<_>>(), ids);
        env.close();
    }

    #[test_log::test(tokio::test)]
    async fn rejects_oversized_ensembles() {
        let mut env = TestEnvironment::start();
        let client = env.connect(&ClientOptions::default());
        let options = CreateLedgerOptionsBuilder::default()
            .ensemble(3u32)
            .write_quorum(2u32)
            .ack_quorum(2u32)
            .build()
            .unwrap();
        assert_eq!(
            Err(ClientError::EnsembleUnavailable),
            client.create_ledger(&options).await.map(|_| ())
        );
        env.close();
    }

    #[test_log::test(tokio::test)]
    async fn closed_ledger_rejects_appends() {
        let mut env = TestEnvironment::start();
        let client = env.connect(&ClientOptions::default());
        let ledger = client
            .create_ledger(&CreateLedgerOptions::default())
            .await
            .expect("ledger creates");
        ledger.close().await.expect("ledger closes");

        let completions = collect_completions(&ledger, 1);
        assert_eq!(Err(ClientError::LedgerClosed), completions[0].1);
        env.close();
    }

    #[test_log::test(tokio::test)]
    async fn scripted_fault_fails_exactly_one_entry() {
        let mut env = TestEnvironment::start_with(
            MockFaults {
                fail_entry: Some(3),
                fail_code: ClientError::WriteFailed,
                ..Default::default()
            },
            None,
        );
        let client = env.connect(&ClientOptions::default());
        let ledger = client
            .create_ledger(&CreateLedgerOptions::default())
            .await
            .expect("ledger creates");

        let completions = collect_completions(&ledger, 10);
        let failures = completions
            .iter()
            .filter(|(_, result)| result == &Err(ClientError::WriteFailed))
            .count();
        assert_eq!(1, failures);
        env.close();
    }

    #[test_log::test(tokio::test)]
    async fn throttled_handle_still_completes() {
        let mut env = TestEnvironment::start_with(MockFaults::default(), None);
        let client = env.connect(
            &ClientOptionsBuilder::default()
                .throttle(2usize)
                .build()
                .unwrap(),
        );
        let ledger = client
            .create_ledger(&CreateLedgerOptions::default())
            .await
            .expect("ledger creates");

        let completions = collect_completions(&ledger, 50);
        assert!(completions.iter().all(|(_, result)| result.is_ok()));
        env.close();
    }

    #[test_log::test(tokio::test)]
    async fn appends_after_shutdown_report_shutdown() {
        let mut env = TestEnvironment::start();
        let client = env.connect(&ClientOptions::default());
        let ledger = client
            .create_ledger(&CreateLedgerOptions::default())
            .await
            .expect("ledger creates");
        env.close();

        let completions = collect_completions(&ledger, 1);
        assert_eq!(Err(ClientError::Shutdown), completions[0].1);
    }
}
