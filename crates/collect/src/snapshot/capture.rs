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
	io::{BufWriter, Write},
	path::Path,
	time::{Duration, Instant},
};

use tracing::{debug, info};

use super::{SnapshotError, SnapshotTarget};

/// Default slack added to the capture duration before the request times out
pub const DEFAULT_CAPTURE_GRACE: Duration = Duration::from_secs(30);

/// Longest sampling window a capture will request (one day)
pub const MAX_CAPTURE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on the request timeout regardless of the configured grace
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// HTTP capture of profiling endpoints
///
/// Issues a single blocking GET against the target with a `seconds` query
/// parameter, the convention profiling endpoints use for sampling windows.
/// The response body is streamed to a sibling temp file and renamed into
/// place, so a data file is either absent or complete.
///
/// The HTTP client is built per capture and must be used from a blocking
/// context (never directly on an async executor thread).
#[derive(Debug, Clone)]
pub struct HttpCapture {
	grace: Duration,
}

impl HttpCapture {
	pub fn new(grace: Duration) -> Self {
		Self { grace }
	}

	/// Fetch the target into `dest`, returning the number of bytes written
	pub fn fetch(&self, target: &SnapshotTarget, dest: &Path) -> Result<u64, SnapshotError> {
		if target.duration > MAX_CAPTURE_DURATION {
			return Err(SnapshotError::Capture(format!(
				"duration of {}s exceeds the {}s limit",
				target.duration.as_secs(),
				MAX_CAPTURE_DURATION.as_secs()
			)));
		}

		let start = Instant::now();
		let timeout = target
			.duration
			.saturating_add(self.grace)
			.min(MAX_REQUEST_TIMEOUT);
		let client = reqwest::blocking::Client::builder()
			.timeout(timeout)
			.build()?;

		debug!(
			target: "capture",
			url = %target.url,
			duration_secs = target.duration.as_secs(),
			"Starting capture"
		);

		let mut response = client
			.get(&target.url)
			.query(&[("seconds", target.duration.as_secs())])
			.send()?;

		let status = response.status();
		if !status.is_success() {
			return Err(SnapshotError::Status {
				url: target.url.clone(),
				status: status.as_u16(),
			});
		}

		let partial = dest.with_extension("partial");
		let written = {
			let mut writer = BufWriter::new(File::create(&partial)?);
			let written = response.copy_to(&mut writer)?;
			writer.flush()?;
			written
		};
		fs::rename(&partial, dest)?;

		info!(
			target: "capture",
			url = %target.url,
			bytes = written,
			elapsed_ms = start.elapsed().as_millis(),
			"Capture complete"
		);

		Ok(written)
	}
}

impl Default for HttpCapture {
	fn default() -> Self {
		Self::new(DEFAULT_CAPTURE_GRACE)
	}
}

#[cfg(test)]
mod tests {
	use std::{
		io::{BufRead, BufReader},
		net::TcpListener,
		thread,
	};

	use super::*;

	/// Serve exactly one HTTP response and hand back the request line
	fn serve_once(status_line: &'static str, body: &'static [u8]) -> (String, thread::JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();

		let handle = thread::spawn(move || {
			let (mut stream, _) = listener.accept().unwrap();
			let mut reader = BufReader::new(stream.try_clone().unwrap());

			let mut request_line = String::new();
			reader.read_line(&mut request_line).unwrap();
			loop {
				let mut header = String::new();
				reader.read_line(&mut header).unwrap();
				if header == "\r\n" || header.is_empty() {
					break;
				}
			}

			let head = format!(
				"{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
				status_line,
				body.len()
			);
			stream.write_all(head.as_bytes()).unwrap();
			stream.write_all(body).unwrap();
			stream.flush().unwrap();

			request_line
		});

		(format!("http://{}/debug/pprof/profile", addr), handle)
	}

	#[test]
	fn test_fetch_writes_body() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("profile.pb.gz");
		let (url, server) = serve_once("HTTP/1.1 200 OK", b"profile-bytes");

		let target = SnapshotTarget::new(url, Duration::from_secs(3));
		let written = HttpCapture::default().fetch(&target, &dest).unwrap();

		assert_eq!(written, 13);
		assert_eq!(fs::read(&dest).unwrap(), b"profile-bytes");
		assert!(!dest.with_extension("partial").exists());

		let request_line = server.join().unwrap();
		assert!(request_line.starts_with("GET /debug/pprof/profile?seconds=3 "));
	}

	#[test]
	fn test_fetch_rejects_oversized_duration() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("profile.pb.gz");

		// Rejected before any connection is attempted
		let target = SnapshotTarget::new("http://127.0.0.1:1/debug/pprof/profile", Duration::MAX);
		let err = HttpCapture::default().fetch(&target, &dest).unwrap_err();

		assert!(matches!(err, SnapshotError::Capture(_)));
		assert!(!dest.exists());

		let just_over = SnapshotTarget::new(
			"http://127.0.0.1:1/debug/pprof/profile",
			MAX_CAPTURE_DURATION + Duration::from_secs(1),
		);
		let err = HttpCapture::default().fetch(&just_over, &dest).unwrap_err();
		assert!(matches!(err, SnapshotError::Capture(_)));
	}

	#[test]
	fn test_fetch_with_unbounded_grace() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("profile.pb.gz");
		let (url, server) = serve_once("HTTP/1.1 200 OK", b"ok");

		let target = SnapshotTarget::new(url, Duration::from_secs(1));
		let written = HttpCapture::new(Duration::MAX).fetch(&target, &dest).unwrap();

		assert_eq!(written, 2);
		server.join().unwrap();
	}

	#[test]
	fn test_fetch_rejects_error_status() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("profile.pb.gz");
		let (url, server) = serve_once("HTTP/1.1 500 Internal Server Error", b"boom");

		let target = SnapshotTarget::new(url, Duration::from_secs(1));
		let err = HttpCapture::default().fetch(&target, &dest).unwrap_err();

		assert!(matches!(err, SnapshotError::Status { status: 500, .. }));
		assert!(!dest.exists());
		server.join().unwrap();
	}
}
