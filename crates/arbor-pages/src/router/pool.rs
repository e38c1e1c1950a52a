//! Bounded per-component recycle pool.
//!
//! Displaced route components are parked here, detached from the host tree,
//! so navigating back to a route can reattach the same instance instead of
//! building a new one. The pool only stores handles; the renderer decides
//! what happens to overflow and expired instances.

use crate::component::ComponentInstance;
use crate::config::PoolConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

struct Pooled {
	instance: Arc<ComponentInstance>,
	pooled_at: Instant,
}

/// Per-component-name pool of detached instances.
pub struct RecyclePool {
	config: PoolConfig,
	slots: Mutex<HashMap<String, VecDeque<Pooled>>>,
}

impl fmt::Debug for RecyclePool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RecyclePool")
			.field("components", &self.slots.lock().len())
			.field("instances", &self.len())
			.field("max_per_component", &self.config.max_per_component)
			.finish()
	}
}

impl RecyclePool {
	/// Creates an empty pool.
	pub fn new(config: PoolConfig) -> Self {
		Self {
			config,
			slots: Mutex::new(HashMap::new()),
		}
	}

	/// Pool settings.
	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	/// Parks `instance` under its component name.
	///
	/// Returns the instance back when that component's slot is full; the
	/// caller must dispose of it.
	pub fn offer(&self, instance: Arc<ComponentInstance>) -> Option<Arc<ComponentInstance>> {
		let mut slots = self.slots.lock();
		let slot = slots.entry(instance.type_tag().to_string()).or_default();
		if slot.len() >= self.config.max_per_component
			|| slot.iter().any(|p| Arc::ptr_eq(&p.instance, &instance))
		{
			return Some(instance);
		}
		slot.push_back(Pooled {
			instance,
			pooled_at: Instant::now(),
		});
		None
	}

	/// Takes the most recently pooled, unexpired instance of `component`.
	pub fn take(&self, component: &str) -> Option<Arc<ComponentInstance>> {
		let idle = self.config.idle();
		let mut slots = self.slots.lock();
		let slot = slots.get_mut(component)?;
		let position = slot.iter().rposition(|p| p.pooled_at.elapsed() < idle)?;
		let taken = slot.remove(position).map(|p| p.instance);
		if slot.is_empty() {
			slots.remove(component);
		}
		taken
	}

	/// Removes and returns every instance pooled for longer than the idle
	/// delay.
	pub fn sweep_expired(&self) -> Vec<Arc<ComponentInstance>> {
		let idle = self.config.idle();
		let mut expired = Vec::new();
		let mut slots = self.slots.lock();
		for slot in slots.values_mut() {
			let (keep, gone): (VecDeque<Pooled>, VecDeque<Pooled>) =
				slot.drain(..).partition(|p| p.pooled_at.elapsed() < idle);
			*slot = keep;
			expired.extend(gone.into_iter().map(|p| p.instance));
		}
		slots.retain(|_, slot| !slot.is_empty());
		expired
	}

	/// Removes and returns every pooled instance.
	pub fn drain(&self) -> Vec<Arc<ComponentInstance>> {
		self.slots
			.lock()
			.drain()
			.flat_map(|(_, slot)| slot.into_iter().map(|p| p.instance))
			.collect()
	}

	/// Whether the instance with `identity` is pooled.
	pub fn contains(&self, identity: &str) -> bool {
		self.slots.lock().values().any(|slot| {
			slot.iter()
				.any(|p| p.instance.identity().as_deref() == Some(identity))
		})
	}

	/// Number of pooled instances of `component`.
	pub fn len_for(&self, component: &str) -> usize {
		self.slots.lock().get(component).map_or(0, VecDeque::len)
	}

	/// Total number of pooled instances.
	pub fn len(&self) -> usize {
		self.slots.lock().values().map(VecDeque::len).sum()
	}

	/// Whether the pool is empty.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::ComponentCategory;
	use rstest::rstest;
	use std::time::Duration;

	fn instance(tag: &str, identity: &str) -> Arc<ComponentInstance> {
		let instance = ComponentInstance::new(tag, ComponentCategory::Visual);
		instance.set_identity(identity.to_string());
		Arc::new(instance)
	}

	fn pool(max: usize) -> RecyclePool {
		RecyclePool::new(
			PoolConfig::default()
				.with_max_per_component(max)
				.with_idle(Duration::from_millis(1_000)),
		)
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_offer_and_take_lifo() {
		let pool = pool(3);
		pool.offer(instance("UserPage", "userpage-1"));
		pool.offer(instance("UserPage", "userpage-2"));

		let taken = pool.take("UserPage").unwrap();

		assert_eq!(taken.identity().as_deref(), Some("userpage-2"));
		assert_eq!(pool.len_for("UserPage"), 1);
		assert!(pool.take("Other").is_none());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_overflow_is_returned() {
		// Arrange
		let pool = pool(2);
		pool.offer(instance("Card", "card-1"));
		pool.offer(instance("Card", "card-2"));

		// Act
		let overflow = pool.offer(instance("Card", "card-3"));

		// Assert
		assert_eq!(overflow.and_then(|i| i.identity()).as_deref(), Some("card-3"));
		assert_eq!(pool.len(), 2);
		assert!(pool.offer(instance("Chart", "chart-1")).is_none());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_same_instance_not_pooled_twice() {
		let pool = pool(3);
		let card = instance("Card", "card-1");

		assert!(pool.offer(card.clone()).is_none());
		assert!(pool.offer(card).is_some());
		assert_eq!(pool.len(), 1);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_expired_are_not_taken_and_are_swept() {
		// Arrange
		let pool = pool(3);
		pool.offer(instance("Card", "card-1"));
		tokio::time::advance(Duration::from_millis(600)).await;
		pool.offer(instance("Card", "card-2"));

		// Act
		tokio::time::advance(Duration::from_millis(600)).await;
		let expired = pool.sweep_expired();

		// Assert
		assert_eq!(expired.len(), 1);
		assert_eq!(expired[0].identity().as_deref(), Some("card-1"));
		assert!(pool.contains("card-2"));
		tokio::time::advance(Duration::from_millis(600)).await;
		assert!(pool.take("Card").is_none());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_drain_empties_pool() {
		let pool = pool(3);
		pool.offer(instance("Card", "card-1"));
		pool.offer(instance("Chart", "chart-1"));

		assert_eq!(pool.drain().len(), 2);
		assert!(pool.is_empty());
	}
}
