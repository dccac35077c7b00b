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
	io::Read,
	panic::{self, AssertUnwindSafe},
	sync::Arc,
	time::{Duration, Instant},
};

use moka::sync::Cache;
use tracing::{debug, error, info};

use super::{Payload, ProcessError, Processor, panic_message};
use crate::snapshot::Snapshot;

/// Default upper bound on cached payload bytes (256 MiB)
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 256 * 1024 * 1024;

/// Configuration for the processing cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
	/// Total payload bytes kept before least-used entries are evicted
	pub max_bytes: u64,
	/// Drop payloads that have not been read for this long
	pub time_to_idle: Option<Duration>,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			max_bytes: DEFAULT_CACHE_MAX_BYTES,
			time_to_idle: None,
		}
	}
}

/// Caching Processor - memoizes processing results per snapshot ID
///
/// This wrapper uses `moka::sync::Cache` to provide:
/// - **Single-flight**: concurrent calls for the same ID are coalesced into
///   one call to the wrapped processor; the others wait for its outcome
/// - **Reusable results**: the wrapped processor's stream is drained into a
///   [`Payload`] that every caller can read independently
/// - **Retryable failures**: errors are handed to the waiting callers but
///   never stored, so the next call runs the wrapped processor again
/// - **Bounded memory**: entries are weighed by payload size
/// - **Contained panics**: a panicking processor yields
///   [`ProcessError::Panicked`] instead of unwinding into the caller
///
/// An evicted payload is simply recomputed on the next call.
pub struct CachingProcessor {
	inner: Arc<dyn Processor>,
	cache: Cache<String, Payload>,
}

impl CachingProcessor {
	pub fn new(inner: Arc<dyn Processor>, config: &CacheConfig) -> Self {
		let mut builder = Cache::builder()
			.max_capacity(config.max_bytes)
			.weigher(|_id: &String, payload: &Payload| -> u32 {
				payload.len().try_into().unwrap_or(u32::MAX)
			});
		if let Some(idle) = config.time_to_idle {
			builder = builder.time_to_idle(idle);
		}

		Self {
			inner,
			cache: builder.build(),
		}
	}

	/// Return the processed payload for `snapshot`, computing it at most once
	/// per ID concurrently
	pub fn process(&self, snapshot: &dyn Snapshot) -> Result<Payload, Arc<ProcessError>> {
		self.cache
			.try_get_with(snapshot.id().to_string(), || self.compute(snapshot))
	}

	/// Number of payloads currently cached
	pub fn cached_len(&self) -> u64 {
		self.cache.run_pending_tasks();
		self.cache.entry_count()
	}

	fn compute(&self, snapshot: &dyn Snapshot) -> Result<Payload, ProcessError> {
		let start = Instant::now();
		debug!(target: "cache", id = %snapshot.id(), "Cache miss, running processor");

		let run = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Vec<u8>, ProcessError> {
			let mut stream = self.inner.process(snapshot)?;
			let mut buf = Vec::new();
			stream.read_to_end(&mut buf)?;
			Ok(buf)
		}));
		let buf = match run {
			Ok(result) => result?,
			Err(payload) => {
				let msg = panic_message(payload.as_ref());
				error!(target: "cache", id = %snapshot.id(), panic = %msg, "Processor panicked");
				return Err(ProcessError::Panicked(msg));
			}
		};

		info!(
			target: "cache",
			id = %snapshot.id(),
			size_bytes = buf.len(),
			elapsed_ms = start.elapsed().as_millis(),
			"Snapshot processed"
		);

		Ok(Payload::from(buf))
	}
}
