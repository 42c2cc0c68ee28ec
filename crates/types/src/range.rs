// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

/// A contiguous, half-open range of row keys `[start, end)`.
///
/// An empty `start` denotes the smallest possible key and an empty `end` denotes an
/// unbounded range, so `ByteRange::unbounded()` covers the whole keyspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ByteRange {
    start: Bytes,
    end: Bytes,
}

impl ByteRange {
    /// Creates a range without validating that `start` lies before `end`.
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(Bytes::new(), Bytes::new())
    }

    pub fn start(&self) -> &Bytes {
        &self.start
    }

    pub fn end(&self) -> &Bytes {
        &self.end
    }

    pub fn is_end_unbounded(&self) -> bool {
        self.end.is_empty()
    }

    /// Returns the keys shared by both ranges or `None` if the ranges are disjoint.
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = std::cmp::max(&self.start, &other.start);
        let end = match cmp_end(&self.end, &other.end) {
            Ordering::Greater => &other.end,
            _ => &self.end,
        };

        is_before_end(start, end).then(|| ByteRange::new(start.clone(), end.clone()))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "['{}','{}')",
            self.start.escape_ascii(),
            self.end.escape_ascii()
        )
    }
}

/// Compares two range ends, treating an empty end as unbounded.
fn cmp_end(a: &Bytes, b: &Bytes) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

fn is_before_end(key: &[u8], end: &Bytes) -> bool {
    end.is_empty() || key < end.as_ref()
}

/// Returns true if the union of `children` covers every key of `parent`. Children may overlap
/// each other and may extend beyond the parent, but any gap inside the parent fails the check.
pub fn is_superset(children: &[ByteRange], parent: &ByteRange) -> bool {
    let mut sorted: Vec<&ByteRange> = children.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start));

    // every key of the parent below `covered_until` is covered by some child
    let mut covered_until = parent.start.clone();
    for child in sorted {
        if child.start > covered_until {
            return false;
        }
        if child.is_end_unbounded() {
            return true;
        }
        if child.end > covered_until {
            covered_until = child.end.clone();
        }
        if !parent.is_end_unbounded() && covered_until >= parent.end {
            return true;
        }
    }

    false
}

/// Formats a list of partitions as `{['a','b'), ['b','c')}`.
pub fn partitions_to_string(partitions: &[ByteRange]) -> String {
    let ranges: Vec<String> = partitions.iter().map(ToString::to_string).collect();
    format!("{{{}}}", ranges.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use googletest::prelude::*;

    fn range(start: &'static str, end: &'static str) -> ByteRange {
        ByteRange::new(start, end)
    }

    #[test]
    fn intersect_bounded_and_unbounded_ranges() {
        assert_that!(range("a", "m").intersect(&range("f", "z")), some(eq(range("f", "m"))));
        assert_that!(range("a", "").intersect(&range("f", "z")), some(eq(range("f", "z"))));
        assert_that!(range("", "").intersect(&range("m", "")), some(eq(range("m", ""))));
        assert_that!(range("a", "f").intersect(&range("f", "z")), none());
        assert_that!(range("a", "b").intersect(&range("x", "")), none());
    }

    #[test]
    fn superset_of_split_children() {
        let parent = range("a", "z");
        assert!(is_superset(&[range("m", "z"), range("a", "m")], &parent));
        assert!(is_superset(&[range("", "")], &parent));
        assert!(is_superset(&[range("", "n"), range("c", "")], &parent));
    }

    #[test]
    fn superset_detects_gaps() {
        let parent = range("a", "z");
        assert!(!is_superset(&[range("a", "k"), range("m", "z")], &parent));
        assert!(!is_superset(&[range("b", "z")], &parent));
        assert!(!is_superset(&[range("a", "y")], &parent));
        assert!(!is_superset(&[], &parent));
    }

    #[test]
    fn superset_of_unbounded_parent_needs_unbounded_child() {
        let parent = range("a", "");
        assert!(!is_superset(&[range("a", "z")], &parent));
        assert!(is_superset(&[range("a", "m"), range("m", "")], &parent));
    }

    #[test]
    fn display_escapes_bytes() {
        assert_eq!(range("a", "z").to_string(), "['a','z')");
        assert_eq!(
            ByteRange::new(Bytes::from_static(b"\x00\x01"), Bytes::new()).to_string(),
            "['\\x00\\x01','')"
        );
        assert_eq!(
            partitions_to_string(&[range("a", "m"), range("m", "z")]),
            "{['a','m'), ['m','z')}"
        );
    }
}
