//! Publish/subscribe event bus.
//!
//! Subscriptions may be tied to a component identity. Owned subscriptions are
//! removed when [`EventBus::cleanup_owner`] runs for that identity (the
//! registry calls it during destroy) and are pruned lazily during emission if
//! the owner is found dead.
//!
//! # Examples
//!
//! ```
//! use arbor_pages::events::{EventBus, SubscribeOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let bus = EventBus::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = hits.clone();
//!
//! bus.subscribe("saved", move |_event| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! }, SubscribeOptions::default());
//!
//! bus.emit("saved", json!({"id": 1}));
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use crate::error::BusError;
use crate::{error_log, warn_log};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked for every emitted event.
pub type EventCallback = Arc<dyn Fn(&Event) -> Result<(), BusError> + Send + Sync>;

/// Unique id of one subscription. Ids increase monotonically, so ordering by
/// id is subscription order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "sub-{}", self.0)
	}
}

/// An emitted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
	/// Event name.
	pub name: String,
	/// Payload.
	pub data: Value,
}

/// Options for [`EventBus::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
	owner: Option<String>,
}

impl SubscribeOptions {
	/// Ties the subscription's lifetime to a component identity.
	pub fn owned_by(identity: impl Into<String>) -> Self {
		Self {
			owner: Some(identity.into()),
		}
	}

	/// The owning identity, if any.
	pub fn owner(&self) -> Option<&str> {
		self.owner.as_deref()
	}
}

/// Answers whether a component identity is still registered.
pub trait OwnerLiveness: Send + Sync {
	/// Returns `true` while `identity` is registered.
	fn is_live(&self, identity: &str) -> bool;
}

struct Subscription {
	event_name: String,
	callback: EventCallback,
	owner: Option<String>,
	fire_once: bool,
}

#[derive(Default)]
struct BusInner {
	subscriptions: HashMap<SubscriptionId, Subscription>,
	by_event: HashMap<String, BTreeSet<SubscriptionId>>,
	by_owner: HashMap<String, HashSet<SubscriptionId>>,
}

impl BusInner {
	fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
		let sub = self.subscriptions.remove(&id)?;
		if let Some(ids) = self.by_event.get_mut(&sub.event_name) {
			ids.remove(&id);
			if ids.is_empty() {
				self.by_event.remove(&sub.event_name);
			}
		}
		if let Some(owner) = &sub.owner
			&& let Some(ids) = self.by_owner.get_mut(owner)
		{
			ids.remove(&id);
			if ids.is_empty() {
				self.by_owner.remove(owner);
			}
		}
		Some(sub)
	}
}

/// Process-wide publish/subscribe primitive.
pub struct EventBus {
	inner: RwLock<BusInner>,
	next_id: AtomicU64,
	liveness: RwLock<Option<Weak<dyn OwnerLiveness>>>,
}

impl fmt::Debug for EventBus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.read();
		f.debug_struct("EventBus")
			.field("subscriptions", &inner.subscriptions.len())
			.field("events", &inner.by_event.len())
			.field("owners", &inner.by_owner.len())
			.finish()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new()
	}
}

impl EventBus {
	/// Creates an empty bus with no liveness source bound.
	pub fn new() -> Self {
		Self {
			inner: RwLock::new(BusInner::default()),
			next_id: AtomicU64::new(1),
			liveness: RwLock::new(None),
		}
	}

	/// Binds the source used to check owner liveness during emission.
	///
	/// Held weakly: the registry owns the bus, not the other way round.
	pub fn bind_liveness(&self, source: Weak<dyn OwnerLiveness>) {
		*self.liveness.write() = Some(source);
	}

	/// Subscribes `callback` to `event_name`.
	///
	/// Returns `None` (and logs) when the subscription cannot be addressed.
	pub fn subscribe<F>(
		&self,
		event_name: &str,
		callback: F,
		options: SubscribeOptions,
	) -> Option<SubscriptionId>
	where
		F: Fn(&Event) -> Result<(), BusError> + Send + Sync + 'static,
	{
		self.insert(event_name, Arc::new(callback), options, false)
	}

	/// Subscribes `callback` for a single delivery.
	pub fn subscribe_once<F>(
		&self,
		event_name: &str,
		callback: F,
		options: SubscribeOptions,
	) -> Option<SubscriptionId>
	where
		F: Fn(&Event) -> Result<(), BusError> + Send + Sync + 'static,
	{
		self.insert(event_name, Arc::new(callback), options, true)
	}

	fn insert(
		&self,
		event_name: &str,
		callback: EventCallback,
		options: SubscribeOptions,
		fire_once: bool,
	) -> Option<SubscriptionId> {
		if event_name.is_empty() {
			error_log!("{}", BusError::InvalidCallback(event_name.to_string()));
			return None;
		}

		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let mut inner = self.inner.write();
		inner
			.by_event
			.entry(event_name.to_string())
			.or_default()
			.insert(id);
		if let Some(owner) = &options.owner {
			inner.by_owner.entry(owner.clone()).or_default().insert(id);
		}
		inner.subscriptions.insert(
			id,
			Subscription {
				event_name: event_name.to_string(),
				callback,
				owner: options.owner,
				fire_once,
			},
		);
		Some(id)
	}

	/// Removes one subscription. Returns `false` if it was already gone.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.inner.write().remove(id).is_some()
	}

	/// Delivers an event to every subscriber present at call time, in
	/// subscription order. Returns the number of callbacks invoked.
	///
	/// Subscribers added by a callback are not invoked by this emission;
	/// subscribers removed by a callback are skipped. A failing callback is
	/// logged and does not stop delivery.
	pub fn emit(&self, event_name: &str, data: Value) -> usize {
		let ids: Vec<SubscriptionId> = match self.inner.read().by_event.get(event_name) {
			Some(ids) => ids.iter().copied().collect(),
			None => return 0,
		};
		let event = Event {
			name: event_name.to_string(),
			data,
		};

		let mut delivered = 0;
		for id in ids {
			let (callback, owner, fire_once) = {
				let inner = self.inner.read();
				let Some(sub) = inner.subscriptions.get(&id) else {
					continue;
				};
				(Arc::clone(&sub.callback), sub.owner.clone(), sub.fire_once)
			};

			if let Some(owner) = &owner
				&& !self.owner_is_live(owner)
			{
				warn_log!(
					"Pruning subscription {} on '{}': owner '{}' is gone",
					id,
					event_name,
					owner
				);
				self.inner.write().remove(id);
				continue;
			}

			if fire_once && self.inner.write().remove(id).is_none() {
				continue;
			}

			delivered += 1;
			if let Err(e) = callback(&event) {
				error_log!("Subscriber {} for '{}' failed: {}", id, event_name, e);
			}
		}
		delivered
	}

	/// Removes every subscription owned by `owner`. Returns how many were
	/// removed.
	pub fn cleanup_owner(&self, owner: &str) -> usize {
		let mut inner = self.inner.write();
		let Some(ids) = inner.by_owner.remove(owner) else {
			return 0;
		};
		let count = ids.len();
		for id in ids {
			inner.remove(id);
		}
		count
	}

	/// Number of live subscriptions for `event_name`.
	pub fn subscriber_count(&self, event_name: &str) -> usize {
		self.inner
			.read()
			.by_event
			.get(event_name)
			.map_or(0, BTreeSet::len)
	}

	/// Number of subscriptions owned by `owner`.
	pub fn owned_count(&self, owner: &str) -> usize {
		self.inner.read().by_owner.get(owner).map_or(0, HashSet::len)
	}

	/// Total number of subscriptions.
	pub fn len(&self) -> usize {
		self.inner.read().subscriptions.len()
	}

	/// Whether the bus has no subscriptions.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn owner_is_live(&self, owner: &str) -> bool {
		let source = self.liveness.read().as_ref().and_then(Weak::upgrade);
		source.is_none_or(|s| s.is_live(owner))
	}
}
