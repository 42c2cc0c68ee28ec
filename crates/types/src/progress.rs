// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The resumable position of a partition stream.
//!
//! The position is owned by the host and persisted with every checkpoint. Besides the usual
//! continuation token it can carry a claimed, not yet processed [`CloseStream`]. Claiming the
//! close record first and processing it only after the following checkpoint guarantees that
//! every mutation emitted before it has been committed downstream.

use crate::change_record::CloseStream;
use crate::continuation_token::ContinuationToken;
use crate::time::MillisSinceEpoch;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamProgress {
    /// Nothing has been claimed yet, the stream starts at the run's start time.
    #[default]
    Initial,
    Streaming {
        token: ContinuationToken,
        estimated_low_watermark: MillisSinceEpoch,
    },
    /// The stream has been closed by the server; the close record is processed after resume.
    PendingClose(CloseStream),
    /// Another worker owns the partition.
    LockFailed,
}

impl StreamProgress {
    pub fn streaming(token: ContinuationToken, estimated_low_watermark: MillisSinceEpoch) -> Self {
        StreamProgress::Streaming {
            token,
            estimated_low_watermark,
        }
    }

    pub fn current_token(&self) -> Option<&ContinuationToken> {
        match self {
            StreamProgress::Streaming { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn estimated_low_watermark(&self) -> Option<MillisSinceEpoch> {
        match self {
            StreamProgress::Streaming {
                estimated_low_watermark,
                ..
            } => Some(*estimated_low_watermark),
            _ => None,
        }
    }

    pub fn close_stream(&self) -> Option<&CloseStream> {
        match self {
            StreamProgress::PendingClose(close_stream) => Some(close_stream),
            _ => None,
        }
    }

    pub fn is_lock_failed(&self) -> bool {
        matches!(self, StreamProgress::LockFailed)
    }
}
