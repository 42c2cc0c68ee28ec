// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use changefeed_types::change_record::ChangeRecord;
use changefeed_types::errors::GenericError;
use changefeed_types::time::MillisSinceEpoch;
use changefeed_types::{PartitionRun, StreamProgress};

#[derive(Debug, thiserror::Error)]
pub enum ChangeStreamError {
    #[error("change stream transport error: {0}")]
    Transport(GenericError),
    #[error("change stream failed with status {code}: {message}")]
    Status { code: i32, message: String },
}

/// Opens server-streaming reads of a partition's changes.
pub trait ChangeStreamSource: Send + Sync {
    /// Opens the change stream of `run.partition`, resuming from `progress`. Without a
    /// continuation token the stream starts at `run.start_time`. The server terminates the
    /// stream with a close record once `end_time` is reached and sends a heartbeat at least
    /// every `heartbeat_duration`.
    fn read_change_stream(
        &self,
        run: &PartitionRun,
        progress: &StreamProgress,
        end_time: Option<MillisSinceEpoch>,
        heartbeat_duration: Duration,
        debug: bool,
    ) -> impl Future<Output = Result<ChangeStream, ChangeStreamError>> + Send;
}

/// An open change stream. The server side call is cancelled through the cancellation token
/// when the stream is cancelled or dropped, whichever comes first.
pub struct ChangeStream {
    records: BoxStream<'static, Result<ChangeRecord, ChangeStreamError>>,
    cancellation: CancellationToken,
}

impl ChangeStream {
    pub fn new(
        records: impl Stream<Item = Result<ChangeRecord, ChangeStreamError>> + Send + 'static,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            records: records.boxed(),
            cancellation,
        }
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Stream for ChangeStream {
    type Item = Result<ChangeRecord, ChangeStreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancellation.is_cancelled() {
            return Poll::Ready(None);
        }
        self.records.poll_next_unpin(cx)
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use changefeed_types::change_record::{CloseStatus, CloseStream};

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_call() {
        let cancellation = CancellationToken::new();
        let records = futures::stream::iter(vec![Ok(ChangeRecord::CloseStream(CloseStream::new(
            CloseStatus::ok(),
        )))]);
        let stream = ChangeStream::new(records, cancellation.clone());

        assert!(!cancellation.is_cancelled());
        drop(stream);
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_stream_yields_no_more_records() {
        let records = futures::stream::iter(vec![
            Ok(ChangeRecord::Unrecognized {
                kind: "first".to_owned(),
            }),
            Ok(ChangeRecord::Unrecognized {
                kind: "second".to_owned(),
            }),
        ]);
        let mut stream = ChangeStream::new(records, CancellationToken::new());

        assert!(stream.next().await.is_some());
        stream.cancel();
        assert!(stream.is_cancelled());
        assert!(stream.next().await.is_none());
    }
}
