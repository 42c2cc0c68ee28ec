// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{Counter, Gauge, Unit, counter, describe_counter, describe_gauge, gauge};

use changefeed_types::change_record::MutationType;

pub const CHANGE_STREAM_HEARTBEATS: &str = "changefeed.partition.heartbeats.total";
pub const CHANGE_STREAM_CLOSE_STREAMS: &str = "changefeed.partition.close_streams.total";
pub const CHANGE_STREAM_MUTATIONS: &str = "changefeed.partition.mutations.total";
pub const PARTITION_STREAMS_ACTIVE: &str = "changefeed.partition.streams.active";
pub const PROCESSING_DELAY_MS: &str = "changefeed.partition.processing_delay.ms";

// label for CHANGE_STREAM_MUTATIONS
pub const MUTATION_TYPE_LABEL: &str = "type";

pub fn describe_metrics() {
    describe_counter!(
        CHANGE_STREAM_HEARTBEATS,
        Unit::Count,
        "Number of heartbeats claimed by partition streams"
    );
    describe_counter!(
        CHANGE_STREAM_CLOSE_STREAMS,
        Unit::Count,
        "Number of close stream records claimed by partition streams"
    );
    describe_counter!(
        CHANGE_STREAM_MUTATIONS,
        Unit::Count,
        "Number of row mutations emitted, by mutation type"
    );
    describe_gauge!(
        PARTITION_STREAMS_ACTIVE,
        Unit::Count,
        "Number of partition streams assigned and not yet terminated"
    );
    describe_gauge!(
        PROCESSING_DELAY_MS,
        Unit::Milliseconds,
        "Delay between the commit of the last emitted mutation and its processing"
    );
}

/// Metric handles of the partition streams of one worker.
#[derive(Clone)]
pub struct ChangeStreamMetrics {
    heartbeats: Counter,
    close_streams: Counter,
    user_mutations: Counter,
    gc_mutations: Counter,
    partition_streams: Gauge,
    processing_delay: Gauge,
}

impl ChangeStreamMetrics {
    pub fn new() -> Self {
        describe_metrics();

        Self {
            heartbeats: counter!(CHANGE_STREAM_HEARTBEATS),
            close_streams: counter!(CHANGE_STREAM_CLOSE_STREAMS),
            user_mutations: counter!(
                CHANGE_STREAM_MUTATIONS,
                MUTATION_TYPE_LABEL => <&'static str>::from(MutationType::User)
            ),
            gc_mutations: counter!(
                CHANGE_STREAM_MUTATIONS,
                MUTATION_TYPE_LABEL => <&'static str>::from(MutationType::GarbageCollection)
            ),
            partition_streams: gauge!(PARTITION_STREAMS_ACTIVE),
            processing_delay: gauge!(PROCESSING_DELAY_MS),
        }
    }

    pub fn inc_heartbeat_count(&self) {
        self.heartbeats.increment(1);
    }

    pub fn inc_close_stream_count(&self) {
        self.close_streams.increment(1);
    }

    pub fn inc_mutation_count(&self, mutation_type: MutationType) {
        match mutation_type {
            MutationType::User => self.user_mutations.increment(1),
            MutationType::GarbageCollection => self.gc_mutations.increment(1),
        }
    }

    /// Called by the host whenever it assigns a partition to a worker.
    pub fn inc_partition_stream_count(&self) {
        self.partition_streams.increment(1.0);
    }

    /// Called on every terminal verdict of a partition run.
    pub fn dec_partition_stream_count(&self) {
        self.partition_streams.decrement(1.0);
    }

    pub fn update_processing_delay(&self, delay: Duration) {
        self.processing_delay.set(delay.as_millis() as f64);
    }
}

impl Default for ChangeStreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}
