// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{describe_counter, describe_histogram, Unit};

pub(crate) const APPENDS_COMPLETED_TOTAL: &str = "ledgerbench.appends.completed.total";
pub(crate) const APPENDS_FAILED_TOTAL: &str = "ledgerbench.appends.failed.total";
pub(crate) const APPEND_LATENCY: &str = "ledgerbench.append.latency.seconds";

pub(crate) fn describe_metrics() {
    describe_counter!(
        APPENDS_COMPLETED_TOTAL,
        Unit::Count,
        "Number of appends acknowledged by the ledger service"
    );
    describe_counter!(
        APPENDS_FAILED_TOTAL,
        Unit::Count,
        "Number of appends the ledger service failed"
    );
    describe_histogram!(
        APPEND_LATENCY,
        Unit::Seconds,
        "Time from issuing an append to its completion callback"
    );
}
