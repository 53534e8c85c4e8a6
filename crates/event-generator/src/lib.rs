//! Synthetic time-series events for the dbbench workers.
//!
//! The stream is a pure function of its parameters: the same
//! `(identity, start_timestamp, count, start_sequence, device_spread)` always
//! yields the same events. The only exception is `start_timestamp == 0`,
//! which is replaced by the current wall-clock time when [`generate`] is
//! called.
//!
//! ```text
//! identity ──┐
//!            ├─ seed ─▶ StdRng ─▶ timestamp jitter / temperature
//! params ────┘
//!
//! event k: device = pool[k % spread], sequence = start_sequence + k / spread
//! ```
//!
//! # Example
//!
//! ```rust
//! use event_generator::generate;
//!
//! let events: Vec<_> = generate("worker-a", 1_700_000_000_000, 4, 1, 2).collect();
//! assert_eq!(events.len(), 4);
//! assert_eq!(events[0].device_id, "worker-a-0");
//! assert_eq!(events[1].device_id, "worker-a-1");
//! assert_eq!(events[2].sequence_number, 2);
//! ```

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Lower bound of the per-event timestamp jitter, in jitter units.
pub const MIN_JITTER: i64 = 5;
/// Upper bound (inclusive) of the per-event timestamp jitter, in jitter units.
pub const MAX_JITTER: i64 = 10;
/// Milliseconds per jitter unit.
pub const JITTER_UNIT_MS: i64 = 60;

const MIN_TEMPERATURE: f64 = -20.0;
const MAX_TEMPERATURE: f64 = 35.0;

/// One synthetic sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub device_id: String,
    pub sequence_number: i64,
    pub temperature: f64,
}

impl Event {
    /// Key used when the client generates primary keys.
    pub fn client_key(&self) -> String {
        format!(
            "{}{}{}",
            self.device_id, self.timestamp, self.sequence_number
        )
    }
}

/// Generate `count` events for a worker.
///
/// `start_timestamp == 0` means "now". A `device_spread` of 0 is treated as 1.
pub fn generate(
    identity: &str,
    start_timestamp: i64,
    count: u64,
    start_sequence: i64,
    device_spread: u32,
) -> EventStream {
    let timestamp = if start_timestamp == 0 {
        Utc::now().timestamp_millis()
    } else {
        start_timestamp
    };
    let spread = device_spread.max(1);
    let devices = device_pool(identity, spread);
    let seed = stream_seed(identity, timestamp, start_sequence, spread);

    EventStream {
        rng: StdRng::seed_from_u64(seed),
        devices,
        timestamp,
        start_sequence,
        index: 0,
        remaining: count,
    }
}

/// Synthetic device identifiers of a worker.
///
/// A single-device pool uses the identity itself.
pub fn device_pool(identity: &str, spread: u32) -> Vec<String> {
    if spread <= 1 {
        return vec![identity.to_string()];
    }
    (0..spread).map(|i| format!("{identity}-{i}")).collect()
}

/// FNV-1a over the identity, mixed with the numeric parameters.
fn stream_seed(identity: &str, timestamp: i64, start_sequence: i64, spread: u32) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in identity.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash ^ (timestamp as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (start_sequence as u64).rotate_left(32)
        ^ u64::from(spread)
}

/// Lazy, single-pass stream of events returned by [`generate`].
pub struct EventStream {
    rng: StdRng,
    devices: Vec<String>,
    timestamp: i64,
    start_sequence: i64,
    index: u64,
    remaining: u64,
}

impl EventStream {
    /// Number of events not yet produced.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.remaining == 0 {
            return None;
        }
        let spread = self.devices.len() as u64;
        let device_id = self.devices[(self.index % spread) as usize].clone();
        let sequence_number = self
            .start_sequence
            .saturating_add((self.index / spread) as i64);
        let temperature = self.rng.random_range(MIN_TEMPERATURE..MAX_TEMPERATURE);

        let event = Event {
            timestamp: self.timestamp,
            device_id,
            sequence_number,
            temperature,
        };

        let jitter = self.rng.random_range(MIN_JITTER..=MAX_JITTER) * JITTER_UNIT_MS;
        self.timestamp = self.timestamp.saturating_add(jitter);
        self.index += 1;
        self.remaining -= 1;
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
