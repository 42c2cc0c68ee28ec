// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Contracts with the host scheduler that drives partition runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::trace;

use changefeed_types::StreamProgress;
use changefeed_types::change_record::ChangeStreamMutation;
use changefeed_types::time::MillisSinceEpoch;

/// Verdict of a partition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContinuation {
    /// The run is finished or must checkpoint now. The host decides whether it resumes later.
    Stop,
    /// The host should checkpoint and invoke the controller again.
    Resume,
}

/// Owner of a run's resumable position.
pub trait RestrictionTracker {
    /// Tries to advance the position. A `false` return means the host wants to checkpoint; the
    /// caller must stop without doing any more work.
    fn try_claim(&mut self, position: StreamProgress) -> bool;

    fn current_restriction(&self) -> &StreamProgress;
}

/// Tracker whose claims succeed until a checkpoint is requested, possibly from another thread.
#[derive(Debug)]
pub struct StreamProgressTracker {
    restriction: StreamProgress,
    checkpoint_requested: Arc<AtomicBool>,
}

impl StreamProgressTracker {
    pub fn new(restriction: StreamProgress) -> Self {
        Self {
            restriction,
            checkpoint_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn checkpoint_requester(&self) -> CheckpointRequester {
        CheckpointRequester(Arc::clone(&self.checkpoint_requested))
    }

    /// Stops all further claims and returns the primary and residual restriction. Both are the
    /// last claimed position: the primary is done, the residual is where the next run resumes.
    pub fn checkpoint(&mut self) -> (StreamProgress, StreamProgress) {
        self.checkpoint_requested.store(true, Ordering::Release);
        (self.restriction.clone(), self.restriction.clone())
    }

    pub fn into_restriction(self) -> StreamProgress {
        self.restriction
    }
}

impl RestrictionTracker for StreamProgressTracker {
    fn try_claim(&mut self, position: StreamProgress) -> bool {
        if self.checkpoint_requested.load(Ordering::Acquire) {
            return false;
        }
        self.restriction = position;
        true
    }

    fn current_restriction(&self) -> &StreamProgress {
        &self.restriction
    }
}

/// Handle to request a checkpoint of a [`StreamProgressTracker`].
#[derive(Debug, Clone)]
pub struct CheckpointRequester(Arc<AtomicBool>);

impl CheckpointRequester {
    pub fn request_checkpoint(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Receives the mutations of a partition run.
pub trait OutputReceiver {
    fn output_with_timestamp(
        &mut self,
        row_key: Bytes,
        mutation: ChangeStreamMutation,
        timestamp: MillisSinceEpoch,
    );
}

/// Holder of a run's output watermark.
pub trait WatermarkEstimator {
    fn current_watermark(&self) -> MillisSinceEpoch;

    fn set_watermark(&mut self, watermark: MillisSinceEpoch);
}

/// Watermark estimator that is advanced explicitly and never moves backwards.
#[derive(Debug, Clone, Copy)]
pub struct ManualWatermarkEstimator {
    watermark: MillisSinceEpoch,
}

impl ManualWatermarkEstimator {
    pub fn new(initial: MillisSinceEpoch) -> Self {
        Self { watermark: initial }
    }
}

impl WatermarkEstimator for ManualWatermarkEstimator {
    fn current_watermark(&self) -> MillisSinceEpoch {
        self.watermark
    }

    fn set_watermark(&mut self, watermark: MillisSinceEpoch) {
        if watermark < self.watermark {
            trace!(current = %self.watermark, proposed = %watermark, "Ignoring watermark regression");
            return;
        }
        self.watermark = watermark;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use changefeed_types::{ByteRange, ContinuationToken};

    fn streaming(token: &str) -> StreamProgress {
        StreamProgress::streaming(
            ContinuationToken::new(ByteRange::unbounded(), token.to_owned()),
            MillisSinceEpoch::UNIX_EPOCH,
        )
    }

    #[test]
    fn claims_fail_after_checkpoint_request() {
        let mut tracker = StreamProgressTracker::new(StreamProgress::Initial);
        let requester = tracker.checkpoint_requester();

        assert!(tracker.try_claim(streaming("t1")));
        requester.request_checkpoint();
        assert!(!tracker.try_claim(streaming("t2")));

        assert_eq!(tracker.current_restriction(), &streaming("t1"));
        let (primary, residual) = tracker.checkpoint();
        assert_eq!(primary, residual);
        assert_eq!(tracker.into_restriction(), streaming("t1"));
    }

    #[test]
    fn checkpoint_request_from_another_thread() {
        let mut tracker = StreamProgressTracker::new(StreamProgress::Initial);
        let requester = tracker.checkpoint_requester();

        std::thread::spawn(move || requester.request_checkpoint())
            .join()
            .expect("requester thread");

        assert!(!tracker.try_claim(streaming("t1")));
        assert_eq!(tracker.current_restriction(), &StreamProgress::Initial);
    }

    #[test]
    fn manual_watermark_never_regresses() {
        let mut estimator = ManualWatermarkEstimator::new(MillisSinceEpoch::new(100));
        estimator.set_watermark(MillisSinceEpoch::new(50));
        assert_eq!(estimator.current_watermark(), MillisSinceEpoch::new(100));
        estimator.set_watermark(MillisSinceEpoch::new(150));
        assert_eq!(estimator.current_watermark(), MillisSinceEpoch::new(150));
    }
}
