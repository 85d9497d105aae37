// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Bridges the service's callback-based completion signal to an awaitable,
//! single-assignment commit.
//!
//! The service invokes completion callbacks on its own threads; the writer that
//! issued the append waits on the [`AppendCommit`] half. Awaiting the commit is a
//! synchronization barrier: the resolution written by the callback thread is
//! visible to the awaiter.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use ledgerbench_client::{ClientError, EntryId};

use crate::error::{Error, ProtocolViolation};

/// Acknowledgement of one successfully appended entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendAck {
    pub entry_id: EntryId,
    /// Time from issuing the append to the service's completion callback.
    pub latency: Duration,
}

/// A completion callback fired for a commit that was already resolved.
///
/// This indicates a duplicate callback from the service, which is a contract
/// violation; callers must surface it, not swallow it.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("append completion reported more than once")]
pub struct DuplicateResolution;

type Resolution = std::result::Result<AppendAck, ClientError>;

/// The awaitable half of one in-flight append.
pub struct AppendCommit {
    rx: oneshot::Receiver<Resolution>,
}

/// The resolving half: fulfilled exactly once, from any thread.
pub struct CommitResolver {
    created_at: Instant,
    slot: Mutex<Option<oneshot::Sender<Resolution>>>,
}

impl AppendCommit {
    /// Creates an unresolved commit. The creation instant is the latency origin.
    pub fn deferred() -> (AppendCommit, CommitResolver) {
        let (tx, rx) = oneshot::channel();
        (
            AppendCommit { rx },
            CommitResolver {
                created_at: Instant::now(),
                slot: Mutex::new(Some(tx)),
            },
        )
    }
}

impl Future for AppendCommit {
    type Output = std::result::Result<AppendAck, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(ack))) => Poll::Ready(Ok(ack)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(Error::Service(err))),
            // Resolver dropped without resolving: the append never got a callback.
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(Error::Protocol(ProtocolViolation::AbandonedAppend)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl CommitResolver {
    /// Resolves the commit successfully, returning the measured latency.
    ///
    /// An awaiter that already gave up (dropped the commit) is not an error; only
    /// a second resolution attempt is.
    pub fn complete(&self, entry_id: EntryId) -> std::result::Result<Duration, DuplicateResolution> {
        let latency = self.created_at.elapsed();
        let tx = self.slot.lock().take().ok_or(DuplicateResolution)?;
        let _ = tx.send(Ok(AppendAck { entry_id, latency }));
        Ok(latency)
    }

    /// Resolves the commit with the service's failure code. No latency is
    /// recorded for failed appends.
    pub fn fail(&self, err: ClientError) -> std::result::Result<(), DuplicateResolution> {
        let tx = self.slot.lock().take().ok_or(DuplicateResolution)?;
        let _ = tx.send(Err(err));
        Ok(())
    }
}

static_assertions::assert_impl_all!(AppendCommit: Send);
static_assertions::assert_impl_all!(CommitResolver: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn resolves_with_latency_and_entry_id() {
        let (commit, resolver) = AppendCommit::deferred();
        let latency = resolver.complete(EntryId::from(7)).expect("first resolution");
        let ack = commit.await.expect("commit resolves");
        assert_eq!(EntryId::from(7), ack.entry_id);
        assert_eq!(latency, ack.latency);
    }

    #[test_log::test(tokio::test)]
    async fn second_resolution_is_detected() {
        let (commit, resolver) = AppendCommit::deferred();
        resolver.complete(EntryId::from(0)).expect("first resolution");
        assert!(resolver.complete(EntryId::from(1)).is_err());
        assert!(resolver.fail(ClientError::WriteFailed).is_err());
        // The first resolution is the one the awaiter observes.
        assert_eq!(EntryId::from(0), commit.await.unwrap().entry_id);
    }

    #[test_log::test(tokio::test)]
    async fn failure_propagates_without_latency() {
        let (commit, resolver) = AppendCommit::deferred();
        resolver.fail(ClientError::WriteFailed).expect("first resolution");
        match commit.await {
            Err(Error::Service(ClientError::WriteFailed)) => {}
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn dropped_resolver_surfaces_as_abandoned_append() {
        let (commit, resolver) = AppendCommit::deferred();
        drop(resolver);
        match commit.await {
            Err(Error::Protocol(ProtocolViolation::AbandonedAppend)) => {}
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn resolvable_from_a_foreign_thread() {
        let (commit, resolver) = AppendCommit::deferred();
        std::thread::spawn(move || {
            resolver.complete(EntryId::from(42)).expect("first resolution");
        });
        assert_eq!(EntryId::from(42), commit.await.unwrap().entry_id);
    }

    #[test_log::test(tokio::test)]
    async fn late_completion_after_abandoned_await_is_not_a_duplicate() {
        let (commit, resolver) = AppendCommit::deferred();
        drop(commit);
        assert!(resolver.complete(EntryId::from(0)).is_ok());
        assert!(resolver.complete(EntryId::from(0)).is_err());
    }
}
