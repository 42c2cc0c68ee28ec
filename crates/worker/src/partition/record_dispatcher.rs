// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::{debug, info};

use changefeed_types::change_record::{ChangeRecord, ChangeStreamMutation, CloseStream, Heartbeat};
use changefeed_types::time::MillisSinceEpoch;
use changefeed_types::{ContinuationToken, PartitionRun, StreamProgress};

use crate::host::{OutputReceiver, ProcessContinuation, RestrictionTracker, WatermarkEstimator};
use crate::metric_definitions::ChangeStreamMetrics;

/// Applies single change records to a partition run.
///
/// Watermarks are pushed before claiming, and nothing is counted or emitted unless the claim
/// succeeded. A failed claim means the host asked for a checkpoint, which always ends the run
/// with [`ProcessContinuation::Stop`].
#[derive(Clone)]
pub struct RecordDispatcher {
    metrics: ChangeStreamMetrics,
}

impl RecordDispatcher {
    pub fn new(metrics: ChangeStreamMetrics) -> Self {
        Self { metrics }
    }

    /// Returns `None` if the caller should keep reading the change stream.
    pub fn run(
        &self,
        run: &PartitionRun,
        record: ChangeRecord,
        tracker: &mut impl RestrictionTracker,
        receiver: &mut impl OutputReceiver,
        watermark_estimator: &mut impl WatermarkEstimator,
        should_debug: bool,
    ) -> Option<ProcessContinuation> {
        match record {
            ChangeRecord::Heartbeat(heartbeat) => {
                self.on_heartbeat(run, heartbeat, tracker, watermark_estimator, should_debug)
            }
            ChangeRecord::CloseStream(close_stream) => {
                self.on_close_stream(run, close_stream, tracker, should_debug)
            }
            ChangeRecord::Mutation(mutation) => {
                self.on_mutation(run, mutation, tracker, receiver, watermark_estimator)
            }
            ChangeRecord::Unrecognized { kind } => {
                info!(partition = %run.partition, %kind, "Ignoring unrecognized change record");
                None
            }
        }
    }

    fn on_heartbeat(
        &self,
        run: &PartitionRun,
        heartbeat: Heartbeat,
        tracker: &mut impl RestrictionTracker,
        watermark_estimator: &mut impl WatermarkEstimator,
        should_debug: bool,
    ) -> Option<ProcessContinuation> {
        if should_debug {
            info!(
                partition = %run.partition,
                token = %heartbeat.continuation_token,
                low_watermark = %heartbeat.estimated_low_watermark,
                "Heartbeat"
            );
        }

        let progress = StreamProgress::streaming(
            heartbeat.continuation_token,
            heartbeat.estimated_low_watermark,
        );
        watermark_estimator.set_watermark(heartbeat.estimated_low_watermark);

        if !tracker.try_claim(progress) {
            debug!(partition = %run.partition, "Failed to claim heartbeat, stopping");
            return Some(ProcessContinuation::Stop);
        }
        self.metrics.inc_heartbeat_count();
        None
    }

    fn on_close_stream(
        &self,
        run: &PartitionRun,
        close_stream: CloseStream,
        tracker: &mut impl RestrictionTracker,
        should_debug: bool,
    ) -> Option<ProcessContinuation> {
        if should_debug {
            info!(
                partition = %run.partition,
                status = %close_stream.status,
                tokens = close_stream.continuation_tokens.len(),
                "Close stream"
            );
        }

        if !tracker.try_claim(StreamProgress::PendingClose(close_stream)) {
            debug!(partition = %run.partition, "Failed to claim close stream, stopping");
            return Some(ProcessContinuation::Stop);
        }
        self.metrics.inc_close_stream_count();
        // the close record is resolved by the next run, after buffered output got checkpointed
        Some(ProcessContinuation::Resume)
    }

    fn on_mutation(
        &self,
        run: &PartitionRun,
        mutation: ChangeStreamMutation,
        tracker: &mut impl RestrictionTracker,
        receiver: &mut impl OutputReceiver,
        watermark_estimator: &mut impl WatermarkEstimator,
    ) -> Option<ProcessContinuation> {
        watermark_estimator.set_watermark(mutation.estimated_low_watermark);

        let progress = StreamProgress::streaming(
            ContinuationToken::new(run.partition.clone(), mutation.token.clone()),
            mutation.estimated_low_watermark,
        );
        if !tracker.try_claim(progress) {
            debug!(partition = %run.partition, "Failed to claim mutation, stopping");
            return Some(ProcessContinuation::Stop);
        }

        self.metrics.inc_mutation_count(mutation.mutation_type);
        self.metrics.update_processing_delay(
            MillisSinceEpoch::now().duration_since(mutation.commit_timestamp),
        );

        // Output is never timestamped with the commit time. A stalled partition would otherwise
        // turn everything it emits into late data for event time windows.
        receiver.output_with_timestamp(
            mutation.row_key.clone(),
            mutation,
            MillisSinceEpoch::UNIX_EPOCH,
        );
        None
    }
}
