// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use bytestring::ByteString;

use crate::range::ByteRange;

/// Opaque cursor into the change stream of a partition. The server hands one out with every
/// heartbeat and mutation and, on a split or merge, one per child partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContinuationToken {
    partition: ByteRange,
    token: ByteString,
}

impl ContinuationToken {
    pub fn new(partition: ByteRange, token: impl Into<ByteString>) -> Self {
        Self {
            partition,
            token: token.into(),
        }
    }

    pub fn partition(&self) -> &ByteRange {
        &self.partition
    }

    pub fn token(&self) -> &ByteString {
        &self.token
    }

    /// Re-scopes this token to the keys it shares with `parent`. Tokens handed out on a merge
    /// cover the merged range, while the reader of `parent` may only resume its own keys.
    ///
    /// Returns `None` if the token does not overlap `parent` at all.
    pub fn with_corrected_partition(&self, parent: &ByteRange) -> Option<ContinuationToken> {
        parent
            .intersect(&self.partition)
            .map(|partition| ContinuationToken::new(partition, self.token.clone()))
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.partition, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use googletest::prelude::*;

    #[test]
    fn corrected_partition_is_intersection_with_parent() {
        let token = ContinuationToken::new(ByteRange::new("a", "z"), "1234");

        assert_that!(
            token.with_corrected_partition(&ByteRange::new("c", "f")),
            some(eq(ContinuationToken::new(ByteRange::new("c", "f"), "1234")))
        );
        assert_that!(
            token.with_corrected_partition(&ByteRange::new("m", "")),
            some(eq(ContinuationToken::new(ByteRange::new("m", "z"), "1234")))
        );
        assert_that!(
            token.with_corrected_partition(&ByteRange::new("z", "")),
            none()
        );
    }
}
