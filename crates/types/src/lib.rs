// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This crate contains the data model shared by the change stream components: key ranges,
//! continuation tokens, change records and the resumable stream position.

pub mod change_record;
pub mod continuation_token;
pub mod errors;
pub mod partition;
pub mod progress;
pub mod range;
pub mod time;

pub use continuation_token::ContinuationToken;
pub use partition::{PartitionRun, RunId};
pub use progress::StreamProgress;
pub use range::ByteRange;
