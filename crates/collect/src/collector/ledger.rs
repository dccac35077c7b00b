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

use std::{
	collections::HashMap,
	fmt,
	sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::snapshot::{SnapshotRef, SnapshotTarget};

/// Processing status of a snapshot
///
/// `Pending` is the only non-terminal state. Once a snapshot reaches `Ok` or
/// `Fail` it never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Pending,
	Ok,
	Fail,
}

impl Status {
	pub fn is_terminal(self) -> bool {
		!matches!(self, Status::Pending)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Status::Pending => "pending",
			Status::Ok => "ok",
			Status::Fail => "fail",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Status record for one snapshot
///
/// Entries are values: an update builds a new Entry and replaces the old one,
/// so a reader holding a clone never sees it change underneath.
#[derive(Clone)]
pub struct Entry {
	pub snapshot: SnapshotRef,
	pub status: Status,
	pub message: String,
}

impl Entry {
	pub fn id(&self) -> &str {
		self.snapshot.id()
	}
}

impl fmt::Debug for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("id", &self.snapshot.id())
			.field("status", &self.status)
			.field("message", &self.message)
			.finish()
	}
}

#[derive(Serialize)]
struct EntryView<'a> {
	id: &'a str,
	#[serde(rename = "type")]
	type_label: &'a str,
	target: &'a SnapshotTarget,
	created_at: DateTime<Utc>,
	status: Status,
	message: &'a str,
}

impl Serialize for Entry {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		EntryView {
			id: self.snapshot.id(),
			type_label: self.snapshot.type_label(),
			target: self.snapshot.target(),
			created_at: self.snapshot.created_at(),
			status: self.status,
			message: &self.message,
		}
		.serialize(serializer)
	}
}

/// Status Ledger - latest known Entry per snapshot ID
///
/// A single reader/writer lock guards the map and is held only for the map
/// operation itself. A panic elsewhere while the lock was held cannot leave a
/// half-written Entry behind, so a poisoned lock is recovered rather than
/// propagated.
#[derive(Default)]
pub struct Ledger {
	entries: RwLock<HashMap<String, Entry>>,
}

impl Ledger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the Entry for the snapshot's ID
	pub fn replace(&self, entry: Entry) {
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
		entries.insert(entry.id().to_string(), entry);
	}

	pub fn get(&self, id: &str) -> Option<Entry> {
		let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
		entries.get(id).cloned()
	}

	/// Point-in-time copy of every Entry, in no particular order
	pub fn list(&self) -> Vec<Entry> {
		let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
		entries.values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
