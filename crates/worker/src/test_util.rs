// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fakes of the host and the change stream for exercising partition runs without a backing
//! store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use changefeed_types::change_record::{ChangeRecord, ChangeStreamMutation};
use changefeed_types::time::MillisSinceEpoch;
use changefeed_types::{PartitionRun, StreamProgress};

use crate::change_stream::{ChangeStream, ChangeStreamError, ChangeStreamSource};
use crate::host::OutputReceiver;

/// Keeps everything a partition run emits.
#[derive(Debug, Default)]
pub struct RecordingOutputReceiver {
    pub outputs: Vec<(Bytes, ChangeStreamMutation, MillisSinceEpoch)>,
}

impl RecordingOutputReceiver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputReceiver for RecordingOutputReceiver {
    fn output_with_timestamp(
        &mut self,
        row_key: Bytes,
        mutation: ChangeStreamMutation,
        timestamp: MillisSinceEpoch,
    ) {
        self.outputs.push((row_key, mutation, timestamp));
    }
}

/// Arguments of a single [`ChangeStreamSource::read_change_stream`] call.
#[derive(Debug, Clone)]
pub struct OpenedStream {
    pub progress: StreamProgress,
    pub end_time: Option<MillisSinceEpoch>,
    pub heartbeat_duration: Duration,
    pub debug: bool,
    pub cancellation: CancellationToken,
}

enum Script {
    Records(Vec<Result<ChangeRecord, ChangeStreamError>>),
    OpenError(ChangeStreamError),
}

#[derive(Default)]
struct State {
    scripts: VecDeque<Script>,
    opened: Vec<OpenedStream>,
}

/// Change stream source that plays back scripted streams, one per opened stream. Once the
/// scripts are used up every opened stream is empty. Clones share the scripts.
#[derive(Clone, Default)]
pub struct MockChangeStreamSource(Arc<Mutex<State>>);

impl MockChangeStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_records(&self, records: impl IntoIterator<Item = ChangeRecord>) -> &Self {
        self.0
            .lock()
            .scripts
            .push_back(Script::Records(records.into_iter().map(Ok).collect()));
        self
    }

    /// Scripts a stream that yields `records` and then fails with `error`.
    pub fn push_records_then_error(
        &self,
        records: impl IntoIterator<Item = ChangeRecord>,
        error: ChangeStreamError,
    ) -> &Self {
        let mut items: Vec<_> = records.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.0.lock().scripts.push_back(Script::Records(items));
        self
    }

    /// Lets the next open call fail.
    pub fn push_open_error(&self, error: ChangeStreamError) -> &Self {
        self.0.lock().scripts.push_back(Script::OpenError(error));
        self
    }

    pub fn opened_streams(&self) -> Vec<OpenedStream> {
        self.0.lock().opened.clone()
    }

    pub fn open_count(&self) -> usize {
        self.0.lock().opened.len()
    }
}

impl ChangeStreamSource for MockChangeStreamSource {
    async fn read_change_stream(
        &self,
        _run: &PartitionRun,
        progress: &StreamProgress,
        end_time: Option<MillisSinceEpoch>,
        heartbeat_duration: Duration,
        debug: bool,
    ) -> Result<ChangeStream, ChangeStreamError> {
        let mut state = self.0.lock();
        let cancellation = CancellationToken::new();
        state.opened.push(OpenedStream {
            progress: progress.clone(),
            end_time,
            heartbeat_duration,
            debug,
            cancellation: cancellation.clone(),
        });

        match state.scripts.pop_front() {
            Some(Script::OpenError(error)) => Err(error),
            Some(Script::Records(records)) => {
                Ok(ChangeStream::new(futures::stream::iter(records), cancellation))
            }
            None => Ok(ChangeStream::new(futures::stream::empty(), cancellation)),
        }
    }
}
