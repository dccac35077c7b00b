// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Kiln Snapshot Collector
//!
//! This crate tracks captured profiling snapshots through their lifecycle,
//! drives their processing through a caching layer, and keeps a consistent
//! in-memory view of every snapshot's status while it is being updated.
//!
//! Architecture:
//! - Status ledger behind a single reader/writer lock, entries replaced by value
//! - Caching processor with single-flight, per-snapshot memoization
//! - Detached recovery threads for snapshots persisted by earlier runs
//! - Synchronous capture-then-process for live collection
//! - "Ledger changed" notifications published on a `kiln_event` hub

pub mod collector;
pub mod config;
pub mod logging;
pub mod processor;
pub mod snapshot;

pub use collector::{CollectError, Collector, CollectorOptions, Entry, Ledger, Status};
pub use processor::{CacheConfig, CachingProcessor, Payload, ProcessError, Processor, RawProcessor};
pub use snapshot::{
	FileSnapshot, FileStorage, HttpCapture, Snapshot, SnapshotError, SnapshotMeta, SnapshotRef,
	SnapshotStorage, SnapshotTarget,
};
