//! Keyed debounce/throttle for bursty triggers.
//!
//! Mutation storms and rapid navigation requests are coalesced per key:
//!
//! - [`EventThrottler::debounce`] re-arms a timer on every call and runs only
//!   the latest task once the key has been quiet for `wait`.
//! - [`EventThrottler::throttle`] runs immediately (leading edge) and drops
//!   further calls for `wait`, or while the previous run is still executing.
//!
//! Pending timers can be cancelled by key; a task that has started executing
//! always runs to completion.
//!
//! All scheduling uses `tokio::spawn`, so the throttler must be driven from
//! inside a Tokio runtime.
//!
//! # Examples
//!
//! ```
//! use arbor_pages::events::EventThrottler;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let throttler = EventThrottler::new();
//! let runs = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..10 {
//!     let runs = runs.clone();
//!     throttler.debounce("mutations", Duration::from_millis(5), move || async move {
//!         runs.fetch_add(1, Ordering::SeqCst);
//!     });
//! }
//!
//! tokio::time::sleep(Duration::from_millis(50)).await;
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! # }
//! ```

use crate::debug_log;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct PendingTask {
	token: u64,
	handle: JoinHandle<()>,
}

#[derive(Default)]
struct ThrottlerState {
	pending: HashMap<String, PendingTask>,
	in_flight: HashSet<String>,
	last_run: HashMap<String, Instant>,
	next_token: u64,
}

/// Coalesces bursts of calls per key.
#[derive(Clone, Default)]
pub struct EventThrottler {
	state: Arc<Mutex<ThrottlerState>>,
}

impl fmt::Debug for EventThrottler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("EventThrottler")
			.field("pending", &state.pending.len())
			.field("in_flight", &state.in_flight.len())
			.finish()
	}
}

impl EventThrottler {
	/// Creates a throttler with no pending work.
	pub fn new() -> Self {
		Self::default()
	}

	/// Schedules `task` to run once `key` has been quiet for `wait`.
	///
	/// A later call for the same key replaces the pending task. If the
	/// previous run for the key is still executing when the timer fires, the
	/// timer is re-armed instead of re-entering.
	pub fn debounce<F, Fut>(&self, key: &str, wait: Duration, task: F)
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let mut state = self.state.lock();
		if let Some(previous) = state.pending.remove(key) {
			previous.handle.abort();
		}
		state.next_token += 1;
		let token = state.next_token;

		let shared = Arc::clone(&self.state);
		let owned_key = key.to_string();
		let handle = tokio::spawn(async move {
			loop {
				tokio::time::sleep(wait).await;
				let mut state = shared.lock();
				match state.pending.get(&owned_key) {
					Some(p) if p.token == token => {}
					_ => return,
				}
				if state.in_flight.contains(&owned_key) {
					continue;
				}
				state.pending.remove(&owned_key);
				state.in_flight.insert(owned_key.clone());
				break;
			}
			task().await;
			let mut state = shared.lock();
			state.in_flight.remove(&owned_key);
			state.last_run.insert(owned_key, Instant::now());
		});
		state.pending.insert(key.to_string(), PendingTask { token, handle });
	}

	/// Runs `task` now unless `key` ran within `wait` or is still executing.
	///
	/// Returns whether the task was started.
	pub fn throttle<F, Fut>(&self, key: &str, wait: Duration, task: F) -> bool
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let now = Instant::now();
		{
			let mut state = self.state.lock();
			if state.in_flight.contains(key) {
				debug_log!("throttle: '{}' is in flight, dropping call", key);
				return false;
			}
			if let Some(last) = state.last_run.get(key)
				&& now.duration_since(*last) < wait
			{
				debug_log!("throttle: '{}' ran recently, dropping call", key);
				return false;
			}
			state.in_flight.insert(key.to_string());
			state.last_run.insert(key.to_string(), now);
		}

		let shared = Arc::clone(&self.state);
		let owned_key = key.to_string();
		tokio::spawn(async move {
			task().await;
			shared.lock().in_flight.remove(&owned_key);
		});
		true
	}

	/// Cancels the pending timer for `key`. Returns whether one existed.
	pub fn cancel(&self, key: &str) -> bool {
		let pending = self.state.lock().pending.remove(key);
		match pending {
			Some(p) => {
				p.handle.abort();
				true
			}
			None => false,
		}
	}

	/// Cancels every pending timer. Returns how many were cancelled.
	pub fn cancel_all(&self) -> usize {
		let pending: Vec<PendingTask> = self
			.state
			.lock()
			.pending
			.drain()
			.map(|(_, p)| p)
			.collect();
		let count = pending.len();
		for p in pending {
			p.handle.abort();
		}
		count
	}

	/// Whether a timer is pending for `key`.
	pub fn is_pending(&self, key: &str) -> bool {
		self.state.lock().pending.contains_key(key)
	}

	/// Whether a task for `key` is currently executing.
	pub fn is_in_flight(&self, key: &str) -> bool {
		self.state.lock().in_flight.contains(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn counter() -> Arc<AtomicUsize> {
		Arc::new(AtomicUsize::new(0))
	}

	#[tokio::test(start_paused = true)]
	async fn test_debounce_coalesces_burst() {
		// Arrange
		let throttler = EventThrottler::new();
		let runs = counter();

		// Act
		for _ in 0..5 {
			let runs = runs.clone();
			throttler.debounce("k", Duration::from_millis(10), move || async move {
				runs.fetch_add(1, Ordering::SeqCst);
			});
			tokio::time::sleep(Duration::from_millis(3)).await;
		}
		assert_eq!(runs.load(Ordering::SeqCst), 0);
		tokio::time::sleep(Duration::from_millis(20)).await;

		// Assert
		assert_eq!(runs.load(Ordering::SeqCst), 1);
		assert!(!throttler.is_pending("k"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_before_fire() {
		let throttler = EventThrottler::new();
		let runs = counter();
		let r = runs.clone();
		throttler.debounce("k", Duration::from_millis(10), move || async move {
			r.fetch_add(1, Ordering::SeqCst);
		});

		assert!(throttler.cancel("k"));
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert_eq!(runs.load(Ordering::SeqCst), 0);
		assert!(!throttler.cancel("k"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_all() {
		let throttler = EventThrottler::new();
		let runs = counter();
		for key in ["a", "b", "c"] {
			let r = runs.clone();
			throttler.debounce(key, Duration::from_millis(10), move || async move {
				r.fetch_add(1, Ordering::SeqCst);
			});
		}

		assert_eq!(throttler.cancel_all(), 3);
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert_eq!(runs.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_throttle_drops_within_window() {
		// Arrange
		let throttler = EventThrottler::new();
		let runs = counter();
		let start = |throttler: &EventThrottler| {
			let r = runs.clone();
			throttler.throttle("k", Duration::from_millis(100), move || async move {
				r.fetch_add(1, Ordering::SeqCst);
			})
		};

		// Act / Assert
		assert!(start(&throttler));
		tokio::task::yield_now().await;
		assert!(!start(&throttler));
		tokio::time::sleep(Duration::from_millis(150)).await;
		assert!(start(&throttler));
		tokio::task::yield_now().await;
		assert_eq!(runs.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_throttle_does_not_reenter_in_flight() {
		let throttler = EventThrottler::new();
		let started = throttler.throttle("k", Duration::ZERO, || async {
			tokio::time::sleep(Duration::from_millis(50)).await;
		});
		tokio::task::yield_now().await;

		assert!(started);
		assert!(throttler.is_in_flight("k"));
		assert!(!throttler.throttle("k", Duration::ZERO, || async {}));

		tokio::time::sleep(Duration::from_millis(60)).await;
		assert!(!throttler.is_in_flight("k"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_executing_task_is_not_cancelled() {
		// Arrange
		let throttler = EventThrottler::new();
		let runs = counter();
		let r = runs.clone();
		throttler.debounce("k", Duration::from_millis(5), move || async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			r.fetch_add(1, Ordering::SeqCst);
		});

		// Act: let the timer fire, then cancel mid-flight
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(throttler.is_in_flight("k"));
		assert!(!throttler.cancel("k"));
		tokio::time::sleep(Duration::from_millis(30)).await;

		// Assert
		assert_eq!(runs.load(Ordering::SeqCst), 1);
	}
}
