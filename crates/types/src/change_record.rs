// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Records yielded by a partition's change stream.

use bytes::Bytes;
use bytestring::ByteString;

use crate::continuation_token::ContinuationToken;
use crate::range::ByteRange;
use crate::time::MillisSinceEpoch;

/// A single decoded message of a partition change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Heartbeat(Heartbeat),
    Mutation(ChangeStreamMutation),
    CloseStream(CloseStream),
    /// A record whose kind the stream source could decode but does not know about.
    Unrecognized { kind: String },
}

/// Periodic progress marker without user data.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Heartbeat {
    pub continuation_token: ContinuationToken,
    pub estimated_low_watermark: MillisSinceEpoch,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum MutationType {
    /// Mutation issued by a client.
    User,
    /// Cells removed by the garbage collection policy of the store.
    GarbageCollection,
}

/// One modification within a row mutation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Entry {
    SetCell {
        family_name: ByteString,
        qualifier: Bytes,
        timestamp_micros: i64,
        value: Bytes,
    },
    DeleteCells {
        family_name: ByteString,
        qualifier: Bytes,
        start_timestamp_micros: i64,
        end_timestamp_micros: i64,
    },
    DeleteFamily {
        family_name: ByteString,
    },
}

/// All modifications committed to a single row in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangeStreamMutation {
    pub row_key: Bytes,
    pub mutation_type: MutationType,
    pub source_cluster_id: ByteString,
    pub commit_timestamp: MillisSinceEpoch,
    pub tiebreaker: i32,
    /// Resume token, scoped to the partition that produced the mutation.
    pub token: ByteString,
    pub estimated_low_watermark: MillisSinceEpoch,
    pub entries: Vec<Entry>,
}

impl ChangeStreamMutation {
    pub fn new(
        row_key: impl Into<Bytes>,
        mutation_type: MutationType,
        commit_timestamp: MillisSinceEpoch,
        token: impl Into<ByteString>,
        estimated_low_watermark: MillisSinceEpoch,
    ) -> Self {
        Self {
            row_key: row_key.into(),
            mutation_type,
            source_cluster_id: ByteString::new(),
            commit_timestamp,
            tiebreaker: 0,
            token: token.into(),
            estimated_low_watermark,
            entries: Vec::new(),
        }
    }

    pub fn with_entries(mut self, entries: Vec<Entry>) -> Self {
        self.entries = entries;
        self
    }
}

/// Status codes a change stream can terminate with. Numeric values follow the gRPC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum StatusCode {
    /// The requested end time has been reached.
    Ok,
    /// The partition has been split or merged.
    OutOfRange,
    Other(i32),
}

impl StatusCode {
    pub const OK: i32 = 0;
    pub const OUT_OF_RANGE: i32 = 11;
}

impl From<i32> for StatusCode {
    fn from(value: i32) -> Self {
        match value {
            Self::OK => StatusCode::Ok,
            Self::OUT_OF_RANGE => StatusCode::OutOfRange,
            other => StatusCode::Other(other),
        }
    }
}

impl From<StatusCode> for i32 {
    fn from(value: StatusCode) -> Self {
        match value {
            StatusCode::Ok => StatusCode::OK,
            StatusCode::OutOfRange => StatusCode::OUT_OF_RANGE,
            StatusCode::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_more::Display)]
#[display("{code:?}: {message}")]
pub struct CloseStatus {
    pub code: StatusCode,
    pub message: String,
}

impl CloseStatus {
    pub fn new(code: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn out_of_range() -> Self {
        Self::new(StatusCode::OutOfRange, "")
    }
}

/// Terminal message of a partition change stream.
///
/// On a split or merge the server hands out one continuation token per child partition.
/// Newer servers also list the child partitions explicitly, element-wise paired with the tokens.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CloseStream {
    pub status: CloseStatus,
    pub continuation_tokens: Vec<ContinuationToken>,
    pub new_partitions: Vec<ByteRange>,
}

impl CloseStream {
    pub fn new(status: CloseStatus) -> Self {
        Self {
            status,
            continuation_tokens: Vec::new(),
            new_partitions: Vec::new(),
        }
    }

    pub fn with_continuation_tokens(mut self, tokens: Vec<ContinuationToken>) -> Self {
        self.continuation_tokens = tokens;
        self
    }

    pub fn with_new_partitions(mut self, partitions: Vec<ByteRange>) -> Self {
        self.new_partitions = partitions;
        self
    }

    /// Child partitions paired with the token each child resumes from. Uses the explicit
    /// partition list only if it pairs up with the tokens, otherwise the tokens' own ranges.
    pub fn child_partitions(&self) -> impl Iterator<Item = (&ByteRange, &ContinuationToken)> {
        let use_new_partitions = self.new_partitions.len() == self.continuation_tokens.len();
        self.continuation_tokens
            .iter()
            .enumerate()
            .map(move |(idx, token)| {
                if use_new_partitions {
                    (&self.new_partitions[idx], token)
                } else {
                    (token.partition(), token)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use googletest::prelude::*;

    #[test]
    fn status_code_numeric_mapping() {
        assert_eq!(StatusCode::from(0), StatusCode::Ok);
        assert_eq!(StatusCode::from(11), StatusCode::OutOfRange);
        assert_eq!(StatusCode::from(13), StatusCode::Other(13));
        assert_eq!(i32::from(StatusCode::Other(13)), 13);
        assert_eq!(i32::from(StatusCode::OutOfRange), 11);
    }

    #[test]
    fn child_partitions_prefer_explicit_list_when_sizes_match() {
        let tokens = vec![
            ContinuationToken::new(ByteRange::new("a", "z"), "t1"),
            ContinuationToken::new(ByteRange::new("a", "z"), "t2"),
        ];
        let close = CloseStream::new(CloseStatus::out_of_range())
            .with_continuation_tokens(tokens.clone())
            .with_new_partitions(vec![ByteRange::new("a", "m"), ByteRange::new("m", "z")]);

        let children: Vec<_> = close.child_partitions().map(|(p, _)| p.clone()).collect();
        assert_that!(
            children,
            elements_are![eq(ByteRange::new("a", "m")), eq(ByteRange::new("m", "z"))]
        );
    }

    #[test]
    fn child_partitions_fall_back_to_token_ranges() {
        let tokens = vec![
            ContinuationToken::new(ByteRange::new("a", "m"), "t1"),
            ContinuationToken::new(ByteRange::new("m", "z"), "t2"),
        ];
        let close = CloseStream::new(CloseStatus::out_of_range())
            .with_continuation_tokens(tokens)
            .with_new_partitions(vec![ByteRange::new("a", "z")]);

        let children: Vec<_> = close
            .child_partitions()
            .map(|(p, t)| (p.clone(), t.token().to_string()))
            .collect();
        assert_that!(
            children,
            elements_are![
                eq((ByteRange::new("a", "m"), "t1".to_owned())),
                eq((ByteRange::new("m", "z"), "t2".to_owned()))
            ]
        );
    }

    #[test]
    fn mutation_type_names() {
        assert_eq!(MutationType::GarbageCollection.to_string(), "garbage_collection");
    }
}
