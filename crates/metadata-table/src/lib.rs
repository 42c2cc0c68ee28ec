// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The metadata table is shared by all readers of a change stream. It holds one row per
//! partition that is currently being streamed, doubling as an advisory lock, and announcement
//! rows for child partitions created by splits and merges.

#[cfg(any(test, feature = "test-util"))]
mod memory;

use std::collections::BTreeMap;
use std::future::Future;

use changefeed_types::errors::GenericError;
use changefeed_types::time::MillisSinceEpoch;
use changefeed_types::{ByteRange, ContinuationToken, RunId};

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryMetadataTable;

#[derive(Debug, thiserror::Error)]
pub enum MetadataTableError {
    #[error("metadata table is unavailable: {0}")]
    Unavailable(GenericError),
}

pub type Result<T> = std::result::Result<T, MetadataTableError>;

/// Row of a partition that is being streamed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StreamPartitionRow {
    pub partition: ByteRange,
    pub lock_owner: Option<RunId>,
    pub watermark: Option<MillisSinceEpoch>,
    pub continuation_token: Option<ContinuationToken>,
    /// Wall clock time of the last watermark update. Used to detect stalled partitions.
    pub last_updated: Option<MillisSinceEpoch>,
}

impl StreamPartitionRow {
    pub fn new(partition: ByteRange) -> Self {
        Self {
            partition,
            lock_owner: None,
            watermark: None,
            continuation_token: None,
            last_updated: None,
        }
    }
}

/// What a parent partition handed over to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParentHandOver {
    pub token: ContinuationToken,
    pub low_watermark: MillisSinceEpoch,
}

/// Announcement of a partition created by a split or merge. A merged partition collects one
/// hand-over per parent; it may only be streamed once all parents have announced it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewPartitionRow {
    pub partition: ByteRange,
    pub parents: BTreeMap<ByteRange, ParentHandOver>,
}

impl NewPartitionRow {
    pub fn new(partition: ByteRange) -> Self {
        Self {
            partition,
            parents: BTreeMap::new(),
        }
    }

    pub fn tokens(&self) -> impl Iterator<Item = &ContinuationToken> {
        self.parents.values().map(|hand_over| &hand_over.token)
    }

    /// The child starts from the lowest watermark of its parents.
    pub fn low_watermark(&self) -> Option<MillisSinceEpoch> {
        self.parents
            .values()
            .map(|hand_over| hand_over.low_watermark)
            .min()
    }
}

/// Access to the shared metadata table.
///
/// Implementations must make [`MetadataTable::lock_partition`] atomic: of two runs racing for
/// the same partition at most one observes `true`.
pub trait MetadataTable: Send + Sync {
    /// Locks `partition` for `uuid`, creating its row if needed. Locking again with the owning
    /// `uuid` succeeds.
    fn lock_partition(
        &self,
        partition: &ByteRange,
        uuid: RunId,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Persists the partition's progress. This is the liveness signal of a partition stream.
    fn update_watermark(
        &self,
        partition: &ByteRange,
        watermark: MillisSinceEpoch,
        token: Option<&ContinuationToken>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Announces `child`, resumable from `token`, as successor of `parent`. Writing the same
    /// child and parent again overwrites the previous hand-over.
    fn write_new_partition(
        &self,
        child: &ByteRange,
        token: &ContinuationToken,
        parent: &ByteRange,
        parent_low_watermark: MillisSinceEpoch,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Removes the partition's row, releasing its lock.
    fn delete_stream_partition_row(
        &self,
        partition: &ByteRange,
    ) -> impl Future<Output = Result<()>> + Send;

    fn read_stream_partition_row(
        &self,
        partition: &ByteRange,
    ) -> impl Future<Output = Result<Option<StreamPartitionRow>>> + Send;

    fn read_new_partitions(&self) -> impl Future<Output = Result<Vec<NewPartitionRow>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_partition_starts_from_lowest_parent_watermark() {
        let mut row = NewPartitionRow::new(ByteRange::new("a", "z"));
        assert_eq!(row.low_watermark(), None);

        for (parent, watermark) in [(ByteRange::new("a", "m"), 20), (ByteRange::new("m", "z"), 10)]
        {
            row.parents.insert(
                parent.clone(),
                ParentHandOver {
                    token: ContinuationToken::new(parent, "t"),
                    low_watermark: MillisSinceEpoch::new(watermark),
                },
            );
        }

        assert_eq!(row.low_watermark(), Some(MillisSinceEpoch::new(10)));
        assert_eq!(row.tokens().count(), 2);
    }
}
