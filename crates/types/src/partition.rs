// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use ulid::Ulid;

use crate::range::ByteRange;
use crate::time::MillisSinceEpoch;

/// Identifies one attempt of streaming a partition. Owner of the partition lock.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
    derive_more::From,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// A partition as assigned to a single worker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartitionRun {
    pub partition: ByteRange,
    pub uuid: RunId,
    /// Where the stream starts if nothing has been claimed yet.
    pub start_time: MillisSinceEpoch,
    /// Streaming terminates once this time has been reached. Unbounded if `None`.
    pub end_time: Option<MillisSinceEpoch>,
    /// Watermark inherited from the parent partition(s) on a split or merge.
    pub parent_low_watermark: Option<MillisSinceEpoch>,
}

impl PartitionRun {
    pub fn new(partition: ByteRange, start_time: MillisSinceEpoch) -> Self {
        Self {
            partition,
            uuid: RunId::new(),
            start_time,
            end_time: None,
            parent_low_watermark: None,
        }
    }

    pub fn with_end_time(mut self, end_time: MillisSinceEpoch) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Watermark the host should start the run's watermark estimator with.
    pub fn initial_watermark(&self) -> MillisSinceEpoch {
        self.parent_low_watermark.unwrap_or(self.start_time)
    }
}
