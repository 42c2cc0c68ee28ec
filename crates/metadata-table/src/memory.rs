// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use changefeed_types::time::MillisSinceEpoch;
use changefeed_types::{ByteRange, ContinuationToken, RunId};

use crate::{
    MetadataTable, MetadataTableError, NewPartitionRow, ParentHandOver, Result,
    StreamPartitionRow,
};

/// Simple in-memory metadata table for tests. Clones share the same rows, so several
/// simulated workers can contend for the same partition.
#[derive(Clone, Default)]
pub struct InMemoryMetadataTable(Arc<Mutex<Inner>>);

#[derive(Default)]
struct Inner {
    stream_partitions: BTreeMap<ByteRange, StreamPartitionRow>,
    new_partitions: BTreeMap<ByteRange, NewPartitionRow>,
    // remaining successful new partition writes before the table starts failing them
    new_partition_write_budget: Option<usize>,
}

impl InMemoryMetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `successful_writes` calls of `write_new_partition` succeed and fails all
    /// following ones until [`InMemoryMetadataTable::heal`] is called.
    pub fn fail_new_partition_writes_after(&self, successful_writes: usize) {
        self.0.lock().new_partition_write_budget = Some(successful_writes);
    }

    pub fn heal(&self) {
        self.0.lock().new_partition_write_budget = None;
    }

    pub fn stream_partition_rows(&self) -> Vec<StreamPartitionRow> {
        self.0.lock().stream_partitions.values().cloned().collect()
    }
}

impl MetadataTable for InMemoryMetadataTable {
    #[instrument(level = "trace", skip(self), err)]
    async fn lock_partition(&self, partition: &ByteRange, uuid: RunId) -> Result<bool> {
        let mut inner = self.0.lock();
        let row = inner
            .stream_partitions
            .entry(partition.clone())
            .or_insert_with(|| StreamPartitionRow::new(partition.clone()));

        match row.lock_owner {
            Some(owner) if owner != uuid => {
                debug!(%partition, %uuid, %owner, "partition is locked by another run");
                Ok(false)
            }
            _ => {
                row.lock_owner = Some(uuid);
                Ok(true)
            }
        }
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn update_watermark(
        &self,
        partition: &ByteRange,
        watermark: MillisSinceEpoch,
        token: Option<&ContinuationToken>,
    ) -> Result<()> {
        let mut inner = self.0.lock();
        let row = inner
            .stream_partitions
            .entry(partition.clone())
            .or_insert_with(|| StreamPartitionRow::new(partition.clone()));

        row.watermark = Some(watermark);
        if let Some(token) = token {
            row.continuation_token = Some(token.clone());
        }
        row.last_updated = Some(MillisSinceEpoch::now());
        Ok(())
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn write_new_partition(
        &self,
        child: &ByteRange,
        token: &ContinuationToken,
        parent: &ByteRange,
        parent_low_watermark: MillisSinceEpoch,
    ) -> Result<()> {
        let mut inner = self.0.lock();
        if let Some(budget) = inner.new_partition_write_budget.as_mut() {
            if *budget == 0 {
                return Err(MetadataTableError::Unavailable(
                    "injected new partition write failure".into(),
                ));
            }
            *budget -= 1;
        }

        inner
            .new_partitions
            .entry(child.clone())
            .or_insert_with(|| NewPartitionRow::new(child.clone()))
            .parents
            .insert(
                parent.clone(),
                ParentHandOver {
                    token: token.clone(),
                    low_watermark: parent_low_watermark,
                },
            );
        Ok(())
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn delete_stream_partition_row(&self, partition: &ByteRange) -> Result<()> {
        self.0.lock().stream_partitions.remove(partition);
        Ok(())
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn read_stream_partition_row(
        &self,
        partition: &ByteRange,
    ) -> Result<Option<StreamPartitionRow>> {
        Ok(self.0.lock().stream_partitions.get(partition).cloned())
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn read_new_partitions(&self) -> Result<Vec<NewPartitionRow>> {
        Ok(self.0.lock().new_partitions.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use googletest::prelude::*;
    use test_log::test;

    #[test(tokio::test)]
    async fn lock_is_exclusive_and_reentrant() -> googletest::Result<()> {
        let table = InMemoryMetadataTable::new();
        let partition = ByteRange::new("a", "b");
        let (first, second) = (RunId::new(), RunId::new());

        verify_that!(table.lock_partition(&partition, first).await?, eq(true))?;
        verify_that!(table.lock_partition(&partition, first).await?, eq(true))?;
        verify_that!(table.lock_partition(&partition, second).await?, eq(false))?;

        table.delete_stream_partition_row(&partition).await?;
        verify_that!(table.lock_partition(&partition, second).await?, eq(true))
    }

    #[test(tokio::test)]
    async fn clones_share_rows() -> googletest::Result<()> {
        let table = InMemoryMetadataTable::new();
        let other_worker = table.clone();
        let partition = ByteRange::new("a", "b");

        verify_that!(table.lock_partition(&partition, RunId::new()).await?, eq(true))?;
        verify_that!(
            other_worker.lock_partition(&partition, RunId::new()).await?,
            eq(false)
        )
    }

    #[test(tokio::test)]
    async fn update_watermark_keeps_last_token_and_lock() -> googletest::Result<()> {
        let table = InMemoryMetadataTable::new();
        let partition = ByteRange::new("a", "b");
        let uuid = RunId::new();
        let token = ContinuationToken::new(partition.clone(), "t1");

        table.lock_partition(&partition, uuid).await?;
        table
            .update_watermark(&partition, MillisSinceEpoch::new(10), Some(&token))
            .await?;
        table
            .update_watermark(&partition, MillisSinceEpoch::new(20), None)
            .await?;

        let row = table.read_stream_partition_row(&partition).await?;
        verify_that!(
            row,
            some(all!(
                field!(StreamPartitionRow.lock_owner, some(eq(uuid))),
                field!(StreamPartitionRow.watermark, some(eq(MillisSinceEpoch::new(20)))),
                field!(StreamPartitionRow.continuation_token, some(eq(token.clone()))),
                field!(StreamPartitionRow.last_updated, some(anything()))
            ))
        )
    }

    #[test(tokio::test)]
    async fn merge_collects_one_hand_over_per_parent() -> googletest::Result<()> {
        let table = InMemoryMetadataTable::new();
        let child = ByteRange::new("a", "z");
        let left = ByteRange::new("a", "m");
        let right = ByteRange::new("m", "z");

        for parent in [&left, &right, &left] {
            table
                .write_new_partition(
                    &child,
                    &ContinuationToken::new(parent.clone(), "t"),
                    parent,
                    MillisSinceEpoch::new(5),
                )
                .await?;
        }

        let rows = table.read_new_partitions().await?;
        verify_that!(rows.len(), eq(1))?;
        verify_that!(rows[0].parents.len(), eq(2))
    }

    #[test(tokio::test)]
    async fn injected_write_failures() -> googletest::Result<()> {
        let table = InMemoryMetadataTable::new();
        let parent = ByteRange::new("a", "z");
        let token = ContinuationToken::new(parent.clone(), "t");
        table.fail_new_partition_writes_after(1);

        let first = table
            .write_new_partition(&ByteRange::new("a", "m"), &token, &parent, MillisSinceEpoch::UNIX_EPOCH)
            .await;
        let second = table
            .write_new_partition(&ByteRange::new("m", "z"), &token, &parent, MillisSinceEpoch::UNIX_EPOCH)
            .await;
        verify_that!(first.is_ok(), eq(true))?;
        verify_that!(
            second,
            err(pat!(MetadataTableError::Unavailable(anything())))
        )?;

        table.heal();
        verify_that!(
            table
                .write_new_partition(&ByteRange::new("m", "z"), &token, &parent, MillisSinceEpoch::UNIX_EPOCH)
                .await
                .is_ok(),
            eq(true)
        )
    }
}
