// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod record_dispatcher;
mod stream_controller;


pub use record_dispatcher::RecordDispatcher;
pub use stream_controller::PartitionStreamController;
