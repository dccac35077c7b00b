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

mod ledger;

pub use ledger::{Entry, Ledger, Status};

use std::{
	panic::{self, AssertUnwindSafe},
	path::PathBuf,
	sync::Arc,
	thread,
	time::Duration,
};

use kiln_event::{EventHub, Publisher};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
	processor::{CacheConfig, CachingProcessor, Payload, ProcessError, Processor, panic_message},
	snapshot::{FileStorage, SnapshotError, SnapshotRef, SnapshotStorage, SnapshotTarget},
};

/// Error types for collector operations
#[derive(Debug, Error)]
pub enum CollectError {
	#[error("{0}")]
	Init(String),
	#[error("{0}")]
	InvalidArgument(&'static str),
	#[error("failed to collect: {0}")]
	Capture(#[source] SnapshotError),
	#[error("failed to process: {0}")]
	Processing(#[source] Arc<ProcessError>),
	#[error("no such entry: {0}")]
	NotFound(String),
}

/// Options for constructing a [`Collector`]
#[derive(Debug, Clone)]
pub struct CollectorOptions {
	/// Type label of the snapshots this collector owns (e.g. "pprof")
	pub type_label: String,
	/// Storage root for [`FileStorage`]
	pub work_dir: PathBuf,
	/// Data file name inside each snapshot directory
	pub file_name: String,
	/// Hub that receives a "ledger changed" event on every status update
	pub event_hub: EventHub,
	pub cache: CacheConfig,
	/// Request timeout slack on top of the capture duration
	pub capture_grace: Duration,
}

/// Collector - orchestrates capture, processing and status reporting
///
/// The collector owns the status ledger and the caching processor. Work
/// happens in two places:
/// - Startup recovery: one detached thread per persisted snapshot
/// - Live collection: synchronously on the caller's thread
///
/// Both paths funnel into the same processing step, and every status
/// transition is published on the hub under the collector's type label.
///
/// Lock discipline:
/// - The ledger lock is held only for the map read/write
/// - Capture and processing never run under the ledger lock
/// - Publishing happens after the ledger lock is released
///
/// Cloning is cheap; clones share the same ledger and cache.
#[derive(Clone)]
pub struct Collector {
	inner: Arc<CollectorInner>,
}

struct CollectorInner {
	type_label: String,
	storage: Box<dyn SnapshotStorage>,
	processor: CachingProcessor,
	publisher: Publisher,
	ledger: Ledger,
	recovered: usize,
}

impl Collector {
	/// Open file storage under `options.work_dir` and start recovery
	pub fn new(
		processor: impl Processor + 'static,
		options: CollectorOptions,
	) -> Result<Self, CollectError> {
		let storage = FileStorage::open(&options.work_dir, options.file_name.clone())
			.map_err(|e| CollectError::Init(format!("failed to initialize storage: {}", e)))?
			.with_capture_grace(options.capture_grace);

		Self::with_storage(processor, Box::new(storage), options)
	}

	/// Start a collector over an already opened storage
	///
	/// Lists persisted snapshots carrying this collector's type label and
	/// launches one background processing thread for each. Returns without
	/// waiting for any of them.
	pub fn with_storage(
		processor: impl Processor + 'static,
		storage: Box<dyn SnapshotStorage>,
		options: CollectorOptions,
	) -> Result<Self, CollectError> {
		let snapshots = storage
			.list()
			.map_err(|e| CollectError::Init(format!("failed to list snapshots: {}", e)))?;

		let (owned, foreign): (Vec<_>, Vec<_>) = snapshots
			.into_iter()
			.partition(|s| s.type_label() == options.type_label);
		if !foreign.is_empty() {
			debug!(
				target: "collector",
				type_label = %options.type_label,
				skipped = foreign.len(),
				"Ignoring snapshots of other types"
			);
		}

		let collector = Self {
			inner: Arc::new(CollectorInner {
				publisher: options.event_hub.publisher(options.type_label.clone()),
				type_label: options.type_label,
				storage,
				processor: CachingProcessor::new(Arc::new(processor), &options.cache),
				ledger: Ledger::new(),
				recovered: owned.len(),
			}),
		};

		info!(
			target: "collector",
			type_label = %collector.inner.type_label,
			snapshots = owned.len(),
			"Recovering persisted snapshots"
		);

		for snapshot in owned {
			collector.spawn_recovery(snapshot);
		}

		Ok(collector)
	}

	pub fn type_label(&self) -> &str {
		&self.inner.type_label
	}

	/// Number of persisted snapshots handed to background recovery
	pub fn recovered(&self) -> usize {
		self.inner.recovered
	}

	/// Capture a new snapshot from `target` and process it
	///
	/// Blocks for the capture duration plus processing time. Returns the new
	/// snapshot ID once it is Ok; on failure the ledger Entry is Fail with the
	/// underlying error text. A panicking capture or processor is reported as
	/// a failure rather than unwinding into the caller.
	pub fn collect(&self, target: &SnapshotTarget) -> Result<String, CollectError> {
		if !target.is_complete() {
			return Err(CollectError::InvalidArgument("URL and Duration cannot be empty"));
		}

		let snapshot = self
			.inner
			.storage
			.prepare_snapshot(&self.inner.type_label, target);
		self.update_status(&snapshot, Status::Pending, "Collecting");

		let captured = panic::catch_unwind(AssertUnwindSafe(|| snapshot.collect()))
			.unwrap_or_else(|payload| {
				Err(SnapshotError::Capture(format!(
					"capture panicked: {}",
					panic_message(payload.as_ref())
				)))
			});

		if let Err(e) = captured {
			warn!(
				target: "collector",
				id = %snapshot.id(),
				url = %target.url,
				error = %e,
				"Capture failed"
			);
			self.update_status(&snapshot, Status::Fail, &e.to_string());
			return Err(CollectError::Capture(e));
		}

		self.run_processor(&snapshot)
			.map_err(CollectError::Processing)?;

		Ok(snapshot.id().to_string())
	}

	/// Processed payload of a known snapshot
	///
	/// Served from the cache when possible; otherwise the snapshot is
	/// processed again.
	pub fn get(&self, id: &str) -> Result<Payload, CollectError> {
		let entry = self
			.inner
			.ledger
			.get(id)
			.ok_or_else(|| CollectError::NotFound(id.to_string()))?;

		self.inner
			.processor
			.process(entry.snapshot.as_ref())
			.map_err(CollectError::Processing)
	}

	/// Current Entry of a snapshot, without touching the processor
	pub fn entry(&self, id: &str) -> Option<Entry> {
		self.inner.ledger.get(id)
	}

	/// Point-in-time copy of every Entry, in no particular order
	pub fn list(&self) -> Vec<Entry> {
		self.inner.ledger.list()
	}

	fn update_status(&self, snapshot: &SnapshotRef, status: Status, message: &str) {
		debug!(
			target: "collector",
			id = %snapshot.id(),
			status = %status,
			detail = message,
			"Status updated"
		);

		self.inner.ledger.replace(Entry {
			snapshot: snapshot.clone(),
			status,
			message: message.to_string(),
		});

		self.inner.publisher.publish();
	}

	fn run_processor(&self, snapshot: &SnapshotRef) -> Result<(), Arc<ProcessError>> {
		self.update_status(snapshot, Status::Pending, "Processing");

		match self.inner.processor.process(snapshot.as_ref()) {
			Ok(_) => {
				// The payload stays in the cache; readers fetch it through `get`
				self.update_status(snapshot, Status::Ok, "Ready");
				Ok(())
			}
			Err(e) => {
				spawn_prune(snapshot.clone());
				self.update_status(snapshot, Status::Fail, &e.to_string());
				Err(e)
			}
		}
	}

	fn spawn_recovery(&self, snapshot: SnapshotRef) {
		let collector = self.clone();
		let task_snapshot = snapshot.clone();

		let spawned = thread::Builder::new()
			.name(format!("recover-{}", snapshot.id()))
			.spawn(move || {
				if let Err(e) = collector.run_processor(&task_snapshot) {
					warn!(
						target: "collector",
						id = %task_snapshot.id(),
						error = %e,
						"Recovered snapshot failed processing"
					);
				}
			});

		if let Err(e) = spawned {
			error!(
				target: "collector",
				id = %snapshot.id(),
				error = %e,
				"Failed to spawn recovery thread"
			);
			self.update_status(
				&snapshot,
				Status::Fail,
				&format!("failed to start processing: {}", e),
			);
		}
	}
}

/// Delete a snapshot's data in the background; the outcome is only logged
fn spawn_prune(snapshot: SnapshotRef) {
	let id = snapshot.id().to_string();

	let spawned = thread::Builder::new()
		.name(format!("prune-{}", id))
		.spawn(move || {
			if let Err(e) = snapshot.prune() {
				warn!(target: "collector", id = %snapshot.id(), error = %e, "Failed to prune snapshot");
			}
		});

	if let Err(e) = spawned {
		warn!(target: "collector", id = %id, error = %e, "Failed to spawn prune thread");
	}
}
