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
	fs::{self, File},
	io::{self, BufReader, Read},
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use tracing::{debug, info, warn};

use super::{
	HttpCapture, Snapshot, SnapshotError, SnapshotMeta, SnapshotRef, SnapshotStorage,
	SnapshotTarget,
};

/// Name of the metadata file inside every snapshot directory
pub const META_FILE_NAME: &str = "meta.json";

/// Filesystem snapshot storage
///
/// Layout:
///
/// ```text
/// {work_dir}/
///   {snapshot_id}/
///     meta.json      # SnapshotMeta
///     {file_name}    # captured data
/// ```
///
/// Snapshot directories are only written when a capture starts, so
/// allocating a snapshot never touches the disk.
pub struct FileStorage {
	work_dir: PathBuf,
	file_name: String,
	capture: HttpCapture,
}

impl FileStorage {
	/// Open (and create if missing) the storage root
	pub fn open(
		work_dir: impl Into<PathBuf>,
		file_name: impl Into<String>,
	) -> Result<Self, SnapshotError> {
		let work_dir = work_dir.into();
		fs::create_dir_all(&work_dir)?;

		Ok(Self {
			work_dir,
			file_name: file_name.into(),
			capture: HttpCapture::default(),
		})
	}

	/// Override the request timeout slack used by captures
	pub fn with_capture_grace(mut self, grace: Duration) -> Self {
		self.capture = HttpCapture::new(grace);
		self
	}

	pub fn work_dir(&self) -> &Path {
		&self.work_dir
	}

	fn snapshot(&self, meta: SnapshotMeta) -> FileSnapshot {
		FileSnapshot {
			dir: self.work_dir.join(&meta.id),
			file_name: self.file_name.clone(),
			capture: self.capture.clone(),
			meta,
		}
	}

	fn load_meta(dir: &Path) -> Result<SnapshotMeta, SnapshotError> {
		let file = File::open(dir.join(META_FILE_NAME))?;
		let meta = serde_json::from_reader(BufReader::new(file))?;
		Ok(meta)
	}
}

impl SnapshotStorage for FileStorage {
	fn list(&self) -> Result<Vec<SnapshotRef>, SnapshotError> {
		let mut snapshots: Vec<SnapshotRef> = Vec::new();

		for entry in fs::read_dir(&self.work_dir)? {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}

			let dir = entry.path();
			match Self::load_meta(&dir) {
				Ok(meta) => snapshots.push(Arc::new(self.snapshot(meta))),
				Err(e) => {
					warn!(
						target: "storage",
						dir = %dir.display(),
						error = %e,
						"Skipping snapshot directory with unreadable metadata"
					);
				}
			}
		}

		debug!(
			target: "storage",
			work_dir = %self.work_dir.display(),
			count = snapshots.len(),
			"Listed snapshots"
		);

		Ok(snapshots)
	}

	fn prepare_snapshot(&self, type_label: &str, target: &SnapshotTarget) -> SnapshotRef {
		Arc::new(self.snapshot(SnapshotMeta::allocate(type_label, target)))
	}
}

/// Snapshot backed by a directory in [`FileStorage`]
pub struct FileSnapshot {
	meta: SnapshotMeta,
	dir: PathBuf,
	file_name: String,
	capture: HttpCapture,
}

impl FileSnapshot {
	pub fn data_path(&self) -> PathBuf {
		self.dir.join(&self.file_name)
	}

	fn write_meta(&self) -> Result<(), SnapshotError> {
		fs::create_dir_all(&self.dir)?;
		let json = serde_json::to_vec_pretty(&self.meta)?;
		fs::write(self.dir.join(META_FILE_NAME), json)?;
		Ok(())
	}
}

impl Snapshot for FileSnapshot {
	fn meta(&self) -> &SnapshotMeta {
		&self.meta
	}

	fn collect(&self) -> Result<(), SnapshotError> {
		self.write_meta()?;
		self.capture.fetch(&self.meta.target, &self.data_path())?;
		Ok(())
	}

	fn prune(&self) -> Result<(), SnapshotError> {
		match fs::remove_dir_all(&self.dir) {
			Ok(()) => {
				info!(target: "storage", id = %self.meta.id, "Snapshot pruned");
				Ok(())
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	fn open(&self) -> Result<Box<dyn Read + Send>, SnapshotError> {
		let path = self.data_path();
		match File::open(&path) {
			Ok(file) => Ok(Box::new(BufReader::new(file))),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				Err(SnapshotError::NotFound(path.display().to_string()))
			}
			Err(e) => Err(e.into()),
		}
	}
}
