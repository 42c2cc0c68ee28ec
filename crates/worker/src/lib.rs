// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Streams single partitions of a change stream on behalf of a host scheduler.
//!
//! The [`PartitionStreamController`] owns the lifecycle of one partition run: it locks the
//! partition in the metadata table, finishes a close record left behind by a previous
//! invocation, persists progress and finally reads the change stream, handing every record to
//! the [`RecordDispatcher`].

mod change_stream;
mod host;
mod metric_definitions;
mod options;
mod partition;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

use changefeed_metadata_table::MetadataTableError;

pub use change_stream::{ChangeStream, ChangeStreamError, ChangeStreamSource};
pub use host::{
    CheckpointRequester, ManualWatermarkEstimator, OutputReceiver, ProcessContinuation,
    RestrictionTracker, StreamProgressTracker, WatermarkEstimator,
};
pub use metric_definitions::{ChangeStreamMetrics, describe_metrics};
pub use options::{
    ConfigLoadError, InvalidConfigurationError, OptionsLoader, OptionsLoaderBuilder,
    StreamerOptions, StreamerOptionsBuilder,
};
pub use partition::{PartitionStreamController, RecordDispatcher};

/// Errors that abort a single invocation of the partition stream controller. The host is
/// expected to retry the work item from its last checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    ChangeStream(#[from] ChangeStreamError),
    #[error(transparent)]
    MetadataTable(#[from] MetadataTableError),
}
