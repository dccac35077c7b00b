// Copyright 2025 chenjjiaa
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

use std::{path::PathBuf, time::Duration};

use kiln_event::EventHub;
use serde::{Deserialize, Serialize};

use crate::{
	collector::CollectorOptions,
	processor::{CacheConfig, DEFAULT_CACHE_MAX_BYTES},
	snapshot::SnapshotTarget,
};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "collect";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

/// Environment variable prefix for collector settings (e.g. `KILN_WORK_DIR`)
pub const ENV_PREFIX: &str = "KILN";

/// Collector service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
	/// Snapshot type label, also the event topic
	pub type_label: String,
	/// Snapshot storage root
	pub work_dir: PathBuf,
	/// Data file name inside each snapshot directory
	pub file_name: String,
	/// Upper bound on cached processed bytes
	pub cache_max_bytes: u64,
	/// Evict processed payloads idle for this many seconds
	pub cache_ttl_secs: Option<u64>,
	/// Capture request timeout slack on top of the capture duration
	pub capture_grace_secs: u64,
	/// Per-subscriber event buffer
	pub event_capacity: usize,
	/// How long the daemon waits for in-flight processing to finish
	pub settle_timeout_secs: u64,
	/// Targets captured once at startup
	pub targets: Vec<SnapshotTarget>,
}

impl Default for CollectConfig {
	fn default() -> Self {
		Self {
			type_label: "pprof".to_string(),
			work_dir: PathBuf::from("data"),
			file_name: "profile.pb.gz".to_string(),
			cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
			cache_ttl_secs: None,
			capture_grace_secs: 30,
			event_capacity: kiln_event::DEFAULT_CAPACITY,
			settle_timeout_secs: 300,
			targets: Vec::new(),
		}
	}
}

impl CollectConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		dotenv::dotenv().ok();

		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		dotenv::dotenv().ok();

		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
			.build()?;

		cfg.try_deserialize()
	}

	pub fn cache_config(&self) -> CacheConfig {
		CacheConfig {
			max_bytes: self.cache_max_bytes,
			time_to_idle: self.cache_ttl_secs.map(Duration::from_secs),
		}
	}

	pub fn collector_options(&self, event_hub: EventHub) -> CollectorOptions {
		CollectorOptions {
			type_label: self.type_label.clone(),
			work_dir: self.work_dir.clone(),
			file_name: self.file_name.clone(),
			event_hub,
			cache: self.cache_config(),
			capture_grace: Duration::from_secs(self.capture_grace_secs),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	#[test]
	fn test_defaults() {
		let config = CollectConfig::default();
		assert_eq!(config.type_label, "pprof");
		assert_eq!(config.cache_max_bytes, DEFAULT_CACHE_MAX_BYTES);
		assert!(config.targets.is_empty());

		let options = config.collector_options(EventHub::default());
		assert_eq!(options.capture_grace, Duration::from_secs(30));
		assert!(options.cache.time_to_idle.is_none());
	}

	#[test]
	fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("kiln.toml");
		fs::write(
			&path,
			r#"
type_label = "httplog"
work_dir = "/var/lib/kiln/httplog"
file_name = "access.log"
cache_ttl_secs = 600

[[targets]]
url = "http://10.0.0.5:19000/access.log"
duration_secs = 60
"#,
		)
		.unwrap();

		let config = CollectConfig::from_file(path.to_str().unwrap()).unwrap();
		assert_eq!(config.type_label, "httplog");
		assert_eq!(config.file_name, "access.log");
		assert_eq!(config.capture_grace_secs, 30);
		assert_eq!(config.targets.len(), 1);
		assert_eq!(config.targets[0].duration, Duration::from_secs(60));

		let cache = config.cache_config();
		assert_eq!(cache.time_to_idle, Some(Duration::from_secs(600)));
	}
}
