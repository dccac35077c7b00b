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

//! Collector daemon entry point
//!
//! This binary wires up:
//! - Logging (daily rolling files, optional console)
//! - Configuration (`KILN_CONFIG` file, `KILN_*` environment, defaults)
//! - Event hub and a collector over file storage
//! - One capture per configured target
//!
//! It then waits for every snapshot to leave Pending and prints the ledger
//! as JSON.

use std::{env, time::Duration};

use anyhow::{Context, Result};
use tokio::{signal, task, time};
use tracing::{error, info, warn};

use kiln_collect::{
	CollectError, Collector, RawProcessor, Status, config::CollectConfig, logging,
};
use kiln_event::EventHub;

#[tokio::main]
async fn main() -> Result<()> {
	logging::init_logging()?;

	let config = match env::var("KILN_CONFIG") {
		Ok(path) => CollectConfig::from_file(&path)
			.with_context(|| format!("Failed to load configuration from {}", path))?,
		Err(_) => CollectConfig::from_env().unwrap_or_else(|_| {
			info!(target: "server", "Using default configuration");
			CollectConfig::default()
		}),
	};

	info!(target: "server", "Starting Kiln collector");
	info!(target: "server", "Type: {}", config.type_label);
	info!(target: "server", "Work directory: {}", config.work_dir.display());
	info!(target: "server", "Targets: {}", config.targets.len());

	let hub = EventHub::new(config.event_capacity);
	let mut subscriber = hub.subscribe();

	// Storage listing and captures block, keep them off the async workers
	let options = config.collector_options(hub.clone());
	let collector = task::spawn_blocking(move || Collector::new(RawProcessor, options))
		.await
		.context("Collector startup panicked")?
		.context("Failed to start collector")?;

	info!(
		target: "server",
		"Recovering {} persisted snapshots",
		collector.recovered()
	);

	let mut expected = collector.recovered();
	for target in config.targets.iter().cloned() {
		let worker = collector.clone();
		let url = target.url.clone();
		let result = task::spawn_blocking(move || worker.collect(&target))
			.await
			.context("Collect task panicked")?;

		match result {
			Ok(id) => {
				expected += 1;
				info!(target: "server", id = %id, url = %url, "Snapshot collected");
			}
			Err(e @ CollectError::InvalidArgument(_)) => {
				warn!(target: "server", url = %url, error = %e, "Skipping invalid target");
			}
			Err(e) => {
				expected += 1;
				error!(target: "server", url = %url, error = %e, "Collection failed");
			}
		}
	}

	// Re-read the ledger on every change until nothing is pending
	let deadline = time::Instant::now() + Duration::from_secs(config.settle_timeout_secs);
	loop {
		let entries = collector.list();
		let pending = entries
			.iter()
			.filter(|e| e.status == Status::Pending)
			.count();
		if entries.len() >= expected && pending == 0 {
			break;
		}

		tokio::select! {
			event = time::timeout_at(deadline, subscriber.recv()) => match event {
				Ok(Some(_)) => continue,
				Ok(None) => break,
				Err(_) => {
					warn!(target: "server", pending, "Timed out waiting for processing to settle");
					break;
				}
			},
			_ = signal::ctrl_c() => {
				info!(target: "server", "Interrupted, reporting current state");
				break;
			}
		}
	}

	let mut entries = collector.list();
	entries.sort_by(|a, b| {
		a.snapshot
			.created_at()
			.cmp(&b.snapshot.created_at())
			.then_with(|| a.id().cmp(b.id()))
	});

	let failed = entries.iter().filter(|e| e.status == Status::Fail).count();
	info!(
		target: "server",
		total = entries.len(),
		failed,
		"Collector settled"
	);

	println!(
		"{}",
		serde_json::to_string_pretty(&entries).context("Failed to encode ledger")?
	);

	Ok(())
}
