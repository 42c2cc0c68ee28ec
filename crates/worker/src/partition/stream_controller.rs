// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use futures::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use changefeed_metadata_table::MetadataTable;
use changefeed_types::change_record::{CloseStream, StatusCode};
use changefeed_types::range::{is_superset, partitions_to_string};
use changefeed_types::time::MillisSinceEpoch;
use changefeed_types::{ByteRange, PartitionRun, StreamProgress};

use crate::Error;
use crate::change_stream::ChangeStreamSource;
use crate::host::{OutputReceiver, ProcessContinuation, RestrictionTracker, WatermarkEstimator};
use crate::metric_definitions::ChangeStreamMetrics;
use crate::options::StreamerOptions;
use crate::partition::RecordDispatcher;

/// Drives one invocation of a partition run.
///
/// An invocation locks the partition, resolves a close record claimed by the previous
/// invocation if there is one, and otherwise persists the run's progress and streams the
/// partition until a record yields a verdict.
pub struct PartitionStreamController<M, S> {
    metadata_table: M,
    change_stream_source: S,
    dispatcher: RecordDispatcher,
    metrics: ChangeStreamMetrics,
    options: StreamerOptions,
}

impl<M, S> PartitionStreamController<M, S>
where
    M: MetadataTable,
    S: ChangeStreamSource,
{
    pub fn new(
        metadata_table: M,
        change_stream_source: S,
        metrics: ChangeStreamMetrics,
        options: StreamerOptions,
    ) -> Self {
        Self {
            metadata_table,
            change_stream_source,
            dispatcher: RecordDispatcher::new(metrics.clone()),
            metrics,
            options,
        }
    }

    /// Fails only if the metadata table or the change stream fail. The host is then expected to
    /// retry from the last checkpoint.
    #[instrument(level = "debug", skip_all, fields(partition = %run.partition, uuid = %run.uuid))]
    pub async fn run(
        &self,
        run: &PartitionRun,
        tracker: &mut impl RestrictionTracker,
        receiver: &mut impl OutputReceiver,
        watermark_estimator: &mut impl WatermarkEstimator,
    ) -> Result<ProcessContinuation, Error> {
        let should_debug = self.should_debug(watermark_estimator.current_watermark());
        if should_debug {
            info!(
                watermark = %watermark_estimator.current_watermark(),
                restriction = ?tracker.current_restriction(),
                "Partition stream is lagging behind"
            );
        }

        if !self
            .metadata_table
            .lock_partition(&run.partition, run.uuid)
            .await?
        {
            info!(
                partition = %run.partition,
                uuid = %run.uuid,
                "Could not lock partition, another run is already streaming it"
            );
            self.metrics.dec_partition_stream_count();
            if !tracker.try_claim(StreamProgress::LockFailed) {
                debug!("Failed to claim lock failure");
            }
            return Ok(ProcessContinuation::Stop);
        }

        if let Some(close_stream) = tracker.current_restriction().close_stream().cloned() {
            return self
                .resolve_close_stream(
                    run,
                    close_stream,
                    tracker,
                    watermark_estimator,
                    should_debug,
                )
                .await;
        }

        self.metadata_table
            .update_watermark(
                &run.partition,
                watermark_estimator.current_watermark(),
                tracker.current_restriction().current_token(),
            )
            .await?;

        // dropping the stream on any exit path cancels the server side call
        let mut stream = self
            .change_stream_source
            .read_change_stream(
                run,
                tracker.current_restriction(),
                run.end_time,
                self.options.heartbeat_duration(),
                should_debug,
            )
            .await?;

        while let Some(record) = stream.next().await {
            let record = record?;
            if let Some(continuation) = self.dispatcher.run(
                run,
                record,
                tracker,
                receiver,
                watermark_estimator,
                should_debug,
            ) {
                stream.cancel();
                return Ok(continuation);
            }
        }

        stream.cancel();
        Ok(ProcessContinuation::Resume)
    }

    fn should_debug(&self, watermark: MillisSinceEpoch) -> bool {
        watermark.saturating_add(self.options.debug_watermark_lag()) < MillisSinceEpoch::now()
    }

    async fn resolve_close_stream(
        &self,
        run: &PartitionRun,
        close_stream: CloseStream,
        tracker: &mut impl RestrictionTracker,
        watermark_estimator: &mut impl WatermarkEstimator,
        should_debug: bool,
    ) -> Result<ProcessContinuation, Error> {
        match close_stream.status.code {
            StatusCode::Ok => {
                // Downstream watermark aggregation must see this partition past its end time.
                watermark_estimator.set_watermark(MillisSinceEpoch::now());
                self.metadata_table
                    .update_watermark(
                        &run.partition,
                        watermark_estimator.current_watermark(),
                        tracker.current_restriction().current_token(),
                    )
                    .await?;
                info!(partition = %run.partition, "Reached end time, terminating");
            }
            StatusCode::OutOfRange => {
                self.announce_child_partitions(
                    run,
                    &close_stream,
                    &*watermark_estimator,
                    should_debug,
                )
                .await?;
                self.metadata_table
                    .delete_stream_partition_row(&run.partition)
                    .await?;
            }
            StatusCode::Other(_) => {
                error!(
                    partition = %run.partition,
                    status = %close_stream.status,
                    "Reached unexpected terminal state"
                );
            }
        }

        self.metrics.dec_partition_stream_count();
        Ok(ProcessContinuation::Stop)
    }

    /// Writes one new partition row per child of a split or merge. Children inherit the
    /// parent's watermark as their starting low watermark.
    async fn announce_child_partitions(
        &self,
        run: &PartitionRun,
        close_stream: &CloseStream,
        watermark_estimator: &impl WatermarkEstimator,
        should_debug: bool,
    ) -> Result<(), Error> {
        let parent_low_watermark = watermark_estimator.current_watermark();
        let mut children: Vec<ByteRange> =
            Vec::with_capacity(close_stream.continuation_tokens.len());

        for (child, token) in close_stream.child_partitions() {
            let token = match token.with_corrected_partition(&run.partition) {
                Some(corrected) => corrected,
                None => {
                    warn!(
                        partition = %run.partition,
                        %token,
                        "Continuation token does not overlap the closed partition, using it as is"
                    );
                    token.clone()
                }
            };
            self.metadata_table
                .write_new_partition(child, &token, &run.partition, parent_low_watermark)
                .await?;
            children.push(child.clone());
        }

        if should_debug {
            info!(
                partition = %run.partition,
                children = %partitions_to_string(&children),
                "Split/merge"
            );
        }
        if !is_superset(&children, &run.partition) {
            warn!(
                partition = %run.partition,
                children = %partitions_to_string(&children),
                "Child partitions do not cover the key space of the closed partition"
            );
        }
        Ok(())
    }
}
