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

mod cache;

use std::{
	any::Any,
	fmt,
	io::{Cursor, Read},
	sync::Arc,
};

use thiserror::Error;

use crate::snapshot::{Snapshot, SnapshotError};
pub use cache::{CacheConfig, CachingProcessor, DEFAULT_CACHE_MAX_BYTES};

/// Error types for snapshot processing
#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("{0}")]
	Io(#[from] std::io::Error),
	#[error("{0}")]
	Snapshot(#[from] SnapshotError),
	#[error("processing failed: {0}")]
	Failed(String),
	#[error("processor panicked: {0}")]
	Panicked(String),
}

/// Processor trait - transforms captured snapshot data
///
/// The returned stream may be single-use; callers that need to read a result
/// more than once go through [`CachingProcessor`], which buffers it.
pub trait Processor: Send + Sync {
	fn process(&self, snapshot: &dyn Snapshot) -> Result<Box<dyn Read + Send>, ProcessError>;
}

impl<P: Processor + ?Sized> Processor for Arc<P> {
	fn process(&self, snapshot: &dyn Snapshot) -> Result<Box<dyn Read + Send>, ProcessError> {
		(**self).process(snapshot)
	}
}

/// Pass-through processor that yields the raw captured data
#[derive(Debug, Default, Clone, Copy)]
pub struct RawProcessor;

impl Processor for RawProcessor {
	fn process(&self, snapshot: &dyn Snapshot) -> Result<Box<dyn Read + Send>, ProcessError> {
		Ok(snapshot.open()?)
	}
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&str>() {
		msg.to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"unknown panic".to_string()
	}
}

/// Buffered processing result
///
/// Cloning is cheap and every clone reads the same immutable bytes, so any
/// number of callers can read a payload independently.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Arc<[u8]>);

impl Payload {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Fresh reader positioned at the start of the payload
	pub fn reader(&self) -> Cursor<Arc<[u8]>> {
		Cursor::new(self.0.clone())
	}
}

impl From<Vec<u8>> for Payload {
	fn from(bytes: Vec<u8>) -> Self {
		Self(Arc::from(bytes))
	}
}

impl fmt::Debug for Payload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Payload").field("len", &self.len()).finish()
	}
}
