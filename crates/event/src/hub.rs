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
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{
	self,
	error::{RecvError, TryRecvError},
};
use tracing::{debug, trace};

/// Default number of undelivered events buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 64;

/// A "something changed" notification for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
	/// Topic the publisher was scoped to (e.g. a collector's type label)
	pub topic: String,
	/// When the event was published (unix milliseconds)
	pub published_at: u64,
}

/// Event Hub - fan-out point between publishers and subscribers
///
/// Every subscriber sees events from every publisher; filtering by topic is
/// left to the subscriber. Cloning the hub is cheap and all clones share the
/// same channel.
#[derive(Debug, Clone)]
pub struct EventHub {
	sender: broadcast::Sender<Event>,
}

impl EventHub {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Create a publisher whose events carry `topic`
	pub fn publisher(&self, topic: impl Into<String>) -> Publisher {
		Publisher {
			topic: Arc::from(topic.into()),
			sender: self.sender.clone(),
		}
	}

	/// Subscribe to all events published after this call
	pub fn subscribe(&self) -> Subscriber {
		Subscriber {
			receiver: self.sender.subscribe(),
		}
	}

	/// Number of live subscribers
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for EventHub {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

/// Publisher scoped to a single topic
#[derive(Debug, Clone)]
pub struct Publisher {
	topic: Arc<str>,
	sender: broadcast::Sender<Event>,
}

impl Publisher {
	pub fn topic(&self) -> &str {
		&self.topic
	}

	/// Publish a change notification
	///
	/// Fire-and-forget: having no subscribers is not an error.
	pub fn publish(&self) {
		let event = Event {
			topic: self.topic.to_string(),
			published_at: now_millis(),
		};

		match self.sender.send(event) {
			Ok(receivers) => {
				trace!(target: "event", topic = %self.topic, receivers, "Event published")
			}
			Err(_) => trace!(target: "event", topic = %self.topic, "Event dropped, no subscribers"),
		}
	}
}

/// Receiving side of the hub
///
/// A subscriber that falls behind skips the events it missed and continues
/// with the oldest one still buffered. Since events only signal change, the
/// subscriber is expected to re-read state after any event it does receive.
pub struct Subscriber {
	receiver: broadcast::Receiver<Event>,
}

impl Subscriber {
	/// Wait for the next event
	///
	/// Returns `None` once the hub and every publisher have been dropped.
	pub async fn recv(&mut self) -> Option<Event> {
		loop {
			match self.receiver.recv().await {
				Ok(event) => return Some(event),
				Err(RecvError::Lagged(skipped)) => {
					debug!(target: "event", skipped, "Subscriber lagged, skipping events");
				}
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Blocking variant of [`Subscriber::recv`]
	///
	/// Must not be called from within an asynchronous execution context.
	pub fn blocking_recv(&mut self) -> Option<Event> {
		loop {
			match self.receiver.blocking_recv() {
				Ok(event) => return Some(event),
				Err(RecvError::Lagged(skipped)) => {
					debug!(target: "event", skipped, "Subscriber lagged, skipping events");
				}
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Return the next buffered event without waiting
	pub fn try_recv(&mut self) -> Option<Event> {
		loop {
			match self.receiver.try_recv() {
				Ok(event) => return Some(event),
				Err(TryRecvError::Lagged(_)) => continue,
				Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
			}
		}
	}

	/// Discard every buffered event, returning how many were pending
	pub fn drain(&mut self) -> usize {
		let mut drained = 0;
		while self.try_recv().is_some() {
			drained += 1;
		}
		drained
	}
}

fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_publish_without_subscribers() {
		let hub = EventHub::new(4);
		let publisher = hub.publisher("pprof");

		// Must not panic or error
		publisher.publish();
		assert_eq!(hub.subscriber_count(), 0);
	}

	#[test]
	fn test_subscriber_receives_topic() {
		let hub = EventHub::new(4);
		let mut subscriber = hub.subscribe();

		hub.publisher("pprof").publish();
		hub.publisher("httplog").publish();

		assert_eq!(subscriber.try_recv().unwrap().topic, "pprof");
		assert_eq!(subscriber.try_recv().unwrap().topic, "httplog");
		assert!(subscriber.try_recv().is_none());
	}

	#[test]
	fn test_lagged_subscriber_keeps_receiving() {
		let hub = EventHub::new(2);
		let mut subscriber = hub.subscribe();
		let publisher = hub.publisher("pprof");

		for _ in 0..10 {
			publisher.publish();
		}

		// Only the most recent events remain buffered
		assert_eq!(subscriber.drain(), 2);

		publisher.publish();
		assert!(subscriber.try_recv().is_some());
	}

	#[test]
	fn test_blocking_recv_closed() {
		let hub = EventHub::new(4);
		let mut subscriber = hub.subscribe();
		hub.publisher("pprof").publish();
		drop(hub);

		assert!(subscriber.blocking_recv().is_some());
		assert!(subscriber.blocking_recv().is_none());
	}

	#[tokio::test]
	async fn test_async_recv() {
		let hub = EventHub::default();
		let mut subscriber = hub.subscribe();
		let publisher = hub.publisher("memo");

		let handle = tokio::spawn(async move { subscriber.recv().await });
		publisher.publish();

		let event = handle.await.unwrap().unwrap();
		assert_eq!(event.topic, "memo");
		assert!(event.published_at > 0);
	}

	#[test]
	fn test_event_serialization() {
		let event = Event {
			topic: "pprof".to_string(),
			published_at: 42,
		};
		let json = serde_json::to_string(&event).unwrap();
		assert_eq!(json, r#"{"topic":"pprof","published_at":42}"#);
	}
}
