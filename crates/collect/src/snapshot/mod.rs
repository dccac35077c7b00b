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

mod capture;
mod storage;

use std::{io::Read, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capture::{HttpCapture, MAX_CAPTURE_DURATION};
pub use storage::{FileSnapshot, FileStorage, META_FILE_NAME};

/// Shared handle to a snapshot owned by storage
pub type SnapshotRef = Arc<dyn Snapshot>;

/// Error types for snapshot storage and capture
#[derive(Debug, Error)]
pub enum SnapshotError {
	#[error("{0}")]
	Io(#[from] std::io::Error),
	#[error("{0}")]
	Http(#[from] reqwest::Error),
	#[error("unexpected response status {status} from {url}")]
	Status { url: String, status: u16 },
	#[error("invalid snapshot metadata: {0}")]
	Metadata(#[from] serde_json::Error),
	/// Capture refused or aborted before any transport error occurred
	/// (limits, panics, non-HTTP snapshot sources)
	#[error("capture failed: {0}")]
	Capture(String),
	#[error("snapshot data not found: {0}")]
	NotFound(String),
}

/// What to capture: an endpoint and how long to profile it for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTarget {
	pub url: String,
	#[serde(rename = "duration_secs", with = "duration_secs")]
	pub duration: Duration,
}

impl SnapshotTarget {
	pub fn new(url: impl Into<String>, duration: Duration) -> Self {
		Self {
			url: url.into(),
			duration,
		}
	}

	/// Both the endpoint and a duration of at least one second are required
	///
	/// Durations travel as whole seconds (query parameter and metadata), so a
	/// sub-second duration counts as empty.
	pub fn is_complete(&self) -> bool {
		!self.url.is_empty() && self.duration.as_secs() > 0
	}
}

/// Descriptive part of a snapshot, persisted next to its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
	pub id: String,
	#[serde(rename = "type")]
	pub type_label: String,
	pub target: SnapshotTarget,
	pub created_at: DateTime<Utc>,
}

impl SnapshotMeta {
	/// Allocate metadata with a fresh unique ID
	pub fn allocate(type_label: &str, target: &SnapshotTarget) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			type_label: type_label.to_string(),
			target: target.clone(),
			created_at: Utc::now(),
		}
	}
}

/// Snapshot - one captured unit of profiling data
///
/// Snapshots are owned by their storage. The collector only holds shared
/// handles and drives them through capture, processing and pruning.
pub trait Snapshot: Send + Sync {
	fn meta(&self) -> &SnapshotMeta;

	/// Capture data from the target, blocking for the target duration
	fn collect(&self) -> Result<(), SnapshotError>;

	/// Delete the snapshot's underlying data (best-effort)
	fn prune(&self) -> Result<(), SnapshotError>;

	/// Open the captured raw data for reading
	fn open(&self) -> Result<Box<dyn Read + Send>, SnapshotError>;

	fn id(&self) -> &str {
		&self.meta().id
	}

	fn type_label(&self) -> &str {
		&self.meta().type_label
	}

	fn target(&self) -> &SnapshotTarget {
		&self.meta().target
	}

	fn created_at(&self) -> DateTime<Utc> {
		self.meta().created_at
	}
}

/// Snapshot Storage trait - where snapshots live between runs
///
/// This abstraction allows different backing stores:
/// - Local filesystem (one directory per snapshot)
/// - In-memory doubles for testing
pub trait SnapshotStorage: Send + Sync {
	/// List every persisted snapshot, in no particular order
	fn list(&self) -> Result<Vec<SnapshotRef>, SnapshotError>;

	/// Allocate a new snapshot with a unique ID for the given target
	fn prepare_snapshot(&self, type_label: &str, target: &SnapshotTarget) -> SnapshotRef;
}

impl<S: SnapshotStorage + ?Sized> SnapshotStorage for Arc<S> {
	fn list(&self) -> Result<Vec<SnapshotRef>, SnapshotError> {
		(**self).list()
	}

	fn prepare_snapshot(&self, type_label: &str, target: &SnapshotTarget) -> SnapshotRef {
		(**self).prepare_snapshot(type_label, target)
	}
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_secs)
	}
}

/// In-memory snapshot used by unit tests
#[cfg(test)]
pub(crate) struct TestSnapshot {
	meta: SnapshotMeta,
	data: Vec<u8>,
}

#[cfg(test)]
impl TestSnapshot {
	pub(crate) fn new(id: &str, data: &[u8]) -> Self {
		let mut meta = SnapshotMeta::allocate(
			"pprof",
			&SnapshotTarget::new("http://localhost:6060", Duration::from_secs(5)),
		);
		meta.id = id.to_string();

		Self {
			meta,
			data: data.to_vec(),
		}
	}

	pub(crate) fn shared(id: &str, data: &[u8]) -> SnapshotRef {
		Arc::new(Self::new(id, data))
	}
}

#[cfg(test)]
impl Snapshot for TestSnapshot {
	fn meta(&self) -> &SnapshotMeta {
		&self.meta
	}

	fn collect(&self) -> Result<(), SnapshotError> {
		Ok(())
	}

	fn prune(&self) -> Result<(), SnapshotError> {
		Ok(())
	}

	fn open(&self) -> Result<Box<dyn Read + Send>, SnapshotError> {
		Ok(Box::new(std::io::Cursor::new(self.data.clone())))
	}
}
