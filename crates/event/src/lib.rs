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

//! Kiln Event Hub
//!
//! This crate provides the notification transport used to tell external
//! subscribers (a UI, a daemon loop) that some collector state changed.
//!
//! Events are signals, not data:
//! - An event only names the topic that changed
//! - Subscribers re-read authoritative state after every event
//! - Delivery is best-effort; slow subscribers skip missed events
//!
//! The hub is lightweight and embeddable:
//! - No background threads
//! - No runtime initialization (publishing works outside a Tokio runtime)

mod hub;

pub use hub::{DEFAULT_CAPACITY, Event, EventHub, Publisher, Subscriber};
