//! Named shared-state cells with change notification over the event bus.
//!
//! Every successful [`SharedStateStore::set_state`] replaces the cell value
//! and then emits exactly one bus event named `state:<cell>` whose payload is
//! `{"value": <new>, "previous": <prev>}`. Watches are bus subscriptions owned
//! by a component identity, so the registry tears them down on destroy.

use super::snapshot::SnapshotStore;
use crate::component::ComponentInstance;
use crate::error::{BusError, StateError};
use crate::events::{EventBus, SubscribeOptions, SubscriptionId};
use crate::{debug_log, error_log, warn_log};
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Projects the part of a cell a watcher cares about.
pub type Selector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Prefix of the bus event emitted on every change.
pub const STATE_EVENT_PREFIX: &str = "state:";

/// Bus event name for cell `name`.
pub fn state_event_name(name: &str) -> String {
	format!("{}{}", STATE_EVENT_PREFIX, name)
}

/// Compares two values one level deep.
///
/// Objects are equal when they have the same keys and each pair of values is
/// equal; arrays compare element by element. Nested values are compared by
/// value since JSON values have no identity.
pub fn shallow_equal(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Object(a), Value::Object(b)) => {
			a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
		}
		(Value::Array(a), Value::Array(b)) => {
			a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
		}
		_ => a == b,
	}
}

/// Options for [`SharedStateStore::create`].
#[derive(Debug, Clone, Default)]
pub struct CellOptions {
	persist: bool,
	storage_key: Option<String>,
}

impl CellOptions {
	/// Persists the cell under its own name.
	pub fn persisted() -> Self {
		Self {
			persist: true,
			storage_key: None,
		}
	}

	/// Persists the cell under `key`.
	pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
		self.persist = true;
		self.storage_key = Some(key.into());
		self
	}

	/// Whether the cell is persisted.
	pub fn persist(&self) -> bool {
		self.persist
	}
}

/// New value for a cell: a replacement or a function of the previous value.
pub enum StateUpdate {
	/// Replaces the value.
	Value(Value),
	/// Computes the next value from the previous one.
	Updater(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl StateUpdate {
	/// Wraps an updater function.
	pub fn with<F>(updater: F) -> Self
	where
		F: FnOnce(&Value) -> Value + Send + 'static,
	{
		Self::Updater(Box::new(updater))
	}
}

impl fmt::Debug for StateUpdate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
			Self::Updater(_) => f.write_str("Updater(..)"),
		}
	}
}

impl From<Value> for StateUpdate {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

struct ContextCell {
	value: Value,
	storage_key: Option<String>,
}

/// Named state cells layered on the event bus.
pub struct SharedStateStore {
	cells: RwLock<HashMap<String, ContextCell>>,
	bus: Arc<EventBus>,
	snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl fmt::Debug for SharedStateStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SharedStateStore")
			.field("cells", &self.cells.read().len())
			.field("has_snapshots", &self.snapshots.is_some())
			.finish()
	}
}

impl SharedStateStore {
	/// Creates a store emitting on `bus`, without persistence.
	pub fn new(bus: Arc<EventBus>) -> Self {
		Self {
			cells: RwLock::new(HashMap::new()),
			bus,
			snapshots: None,
		}
	}

	/// Sets the snapshot backend used by persisted cells.
	pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
		self.snapshots = Some(snapshots);
		self
	}

	/// Creates cell `name`. Returns `false` (and logs) if it already exists.
	///
	/// A persisted cell starts from its stored snapshot when one loads,
	/// otherwise from `initial`.
	pub fn create(&self, name: &str, initial: Value, options: CellOptions) -> bool {
		if self.cells.read().contains_key(name) {
			error_log!("{}", StateError::AlreadyExists(name.to_string()));
			return false;
		}

		let storage_key = options
			.persist
			.then(|| options.storage_key.unwrap_or_else(|| name.to_string()));
		let value = match (&storage_key, &self.snapshots) {
			(Some(key), Some(snapshots)) => match snapshots.load(key) {
				Ok(Some(stored)) => stored,
				Ok(None) => initial,
				Err(e) => {
					warn_log!("snapshot load for '{}' failed, using initial value: {}", name, e);
					initial
				}
			},
			(Some(_), None) => {
				warn_log!("cell '{}' is persisted but no snapshot store is configured", name);
				initial
			}
			_ => initial,
		};

		let mut cells = self.cells.write();
		if cells.contains_key(name) {
			error_log!("{}", StateError::AlreadyExists(name.to_string()));
			return false;
		}
		cells.insert(name.to_string(), ContextCell { value, storage_key });
		debug_log!("created state cell '{}'", name);
		true
	}

	/// Whether cell `name` exists.
	pub fn contains(&self, name: &str) -> bool {
		self.cells.read().contains_key(name)
	}

	/// Names of all cells, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.cells.read().keys().cloned().collect();
		names.sort();
		names
	}

	/// Current value of cell `name`. Logs and returns `None` when missing.
	pub fn get_state(&self, name: &str) -> Option<Value> {
		let value = self.cells.read().get(name).map(|c| c.value.clone());
		if value.is_none() {
			warn_log!("{}", StateError::NotFound(name.to_string()));
		}
		value
	}

	/// Replaces the value of cell `name`, persists it if configured and
	/// emits one change event. Returns `false` (and logs) when missing.
	///
	/// An updater runs under the store's write lock, so concurrent updaters
	/// of the same cell never lose each other's writes. Updaters must not
	/// call back into the store.
	pub fn set_state(&self, name: &str, update: impl Into<StateUpdate>) -> bool {
		let update = update.into();
		let (previous, next, storage_key) = {
			let mut cells = self.cells.write();
			let Some(cell) = cells.get_mut(name) else {
				error_log!("{}", StateError::NotFound(name.to_string()));
				return false;
			};
			let next = match update {
				StateUpdate::Value(v) => v,
				StateUpdate::Updater(f) => f(&cell.value),
			};
			let previous = std::mem::replace(&mut cell.value, next.clone());
			(previous, next, cell.storage_key.clone())
		};

		if let Some(key) = storage_key {
			self.persist(&key, &next);
		}
		self.bus.emit(
			&state_event_name(name),
			json!({ "value": next, "previous": previous }),
		);
		true
	}

	fn persist(&self, key: &str, value: &Value) {
		if let Some(snapshots) = &self.snapshots
			&& let Err(e) = snapshots.save(key, value)
		{
			error_log!("{}", e);
		}
	}

	/// Watches cell `name` on behalf of `owner`.
	///
	/// `callback` receives `(new, previous)`. With a selector, both values are
	/// projected first and the callback only fires when the projections are
	/// not [`shallow_equal`]. The owner must have an identity so the watch is
	/// removed when the owner is destroyed.
	pub fn watch<F>(
		&self,
		name: &str,
		owner: &ComponentInstance,
		callback: F,
		selector: Option<Selector>,
	) -> Result<SubscriptionId, StateError>
	where
		F: Fn(&Value, &Value) + Send + Sync + 'static,
	{
		let Some(identity) = owner.identity() else {
			let err = StateError::OwnerWithoutIdentity;
			error_log!("watch on '{}' rejected: {}", name, err);
			return Err(err);
		};

		let wrapped = move |event: &crate::events::Event| -> Result<(), BusError> {
			let new = event.data.get("value").unwrap_or(&Value::Null);
			let previous = event.data.get("previous").unwrap_or(&Value::Null);
			match &selector {
				Some(select) => {
					let (new, previous) = (select(new), select(previous));
					if !shallow_equal(&new, &previous) {
						callback(&new, &previous);
					}
				}
				None => callback(new, previous),
			}
			Ok(())
		};

		self.bus
			.subscribe(
				&state_event_name(name),
				wrapped,
				SubscribeOptions::owned_by(identity),
			)
			.ok_or_else(|| StateError::NotFound(name.to_string()))
	}

	/// Removes cell `name` and its snapshot. Returns whether it existed.
	pub fn destroy(&self, name: &str) -> bool {
		let Some(cell) = self.cells.write().remove(name) else {
			warn_log!("{}", StateError::NotFound(name.to_string()));
			return false;
		};
		if let Some(key) = cell.storage_key
			&& let Some(snapshots) = &self.snapshots
			&& let Err(e) = snapshots.remove(&key)
		{
			error_log!("{}", e);
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::{ComponentCategory, ComponentRegistry};
	use crate::dom::Dom;
	use crate::state::MemorySnapshotStore;
	use parking_lot::Mutex;
	use rstest::{fixture, rstest};

	struct Harness {
		bus: Arc<EventBus>,
		store: SharedStateStore,
		snapshots: Arc<MemorySnapshotStore>,
	}

	#[fixture]
	fn harness() -> Harness {
		let bus = Arc::new(EventBus::new());
		let snapshots = Arc::new(MemorySnapshotStore::new());
		let store = SharedStateStore::new(bus.clone()).with_snapshots(snapshots.clone());
		Harness {
			bus,
			store,
			snapshots,
		}
	}

	fn owner(identity: &str) -> ComponentInstance {
		let instance = ComponentInstance::new("Watcher", ComponentCategory::Service);
		instance.set_identity(identity.to_string());
		instance
	}

	#[rstest]
	#[case(json!({"a": 1, "b": 2}), json!({"b": 2, "a": 1}), true)]
	#[case(json!({"a": 1}), json!({"a": 1, "b": 2}), false)]
	#[case(json!([1, 2]), json!([1, 2]), true)]
	#[case(json!([1, 2]), json!([2, 1]), false)]
	#[case(json!(3), json!(3), true)]
	#[case(json!("x"), json!(null), false)]
	fn test_shallow_equal(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
		assert_eq!(shallow_equal(&a, &b), expected);
	}

	#[rstest]
	fn test_create_rejects_duplicate(harness: Harness) {
		assert!(harness.store.create("user", json!(null), CellOptions::default()));
		assert!(!harness.store.create("user", json!(1), CellOptions::default()));
		assert_eq!(harness.store.get_state("user"), Some(json!(null)));
	}

	#[rstest]
	fn test_missing_cell_sentinels(harness: Harness) {
		assert_eq!(harness.store.get_state("nope"), None);
		assert!(!harness.store.set_state("nope", json!(1)));
		assert!(!harness.store.destroy("nope"));
	}

	#[rstest]
	fn test_set_state_emits_once_with_new_and_previous(harness: Harness) {
		// Arrange
		harness.store.create("count", json!(1), CellOptions::default());
		let seen = Arc::new(Mutex::new(Vec::new()));
		let s = seen.clone();
		harness.bus.subscribe(
			"state:count",
			move |e| {
				s.lock().push(e.data.clone());
				Ok(())
			},
			SubscribeOptions::default(),
		);

		// Act
		assert!(harness.store.set_state("count", StateUpdate::with(|prev| {
			json!(prev.as_i64().unwrap_or(0) + 1)
		})));

		// Assert
		assert_eq!(harness.store.get_state("count"), Some(json!(2)));
		assert_eq!(*seen.lock(), vec![json!({"value": 2, "previous": 1})]);
	}

	#[rstest]
	fn test_concurrent_updaters_do_not_lose_writes(harness: Harness) {
		// Arrange
		harness.store.create("count", json!(0), CellOptions::default());
		let store = &harness.store;

		// Act
		std::thread::scope(|scope| {
			for _ in 0..8 {
				scope.spawn(|| {
					for _ in 0..100 {
						store.set_state(
							"count",
							StateUpdate::with(|prev| json!(prev.as_i64().unwrap_or(0) + 1)),
						);
					}
				});
			}
		});

		// Assert
		assert_eq!(harness.store.get_state("count"), Some(json!(800)));
	}

	#[rstest]
	#[case("a", 0)]
	#[case("b", 1)]
	fn test_watch_selector_fires_only_on_change(
		harness: Harness,
		#[case] field: &'static str,
		#[case] expected_calls: usize,
	) {
		// Arrange
		harness.store.create("s", json!({"a": 1, "b": 2}), CellOptions::default());
		let calls = Arc::new(Mutex::new(Vec::new()));
		let c = calls.clone();
		let selector: Selector = Arc::new(move |s| s.get(field).cloned().unwrap_or(Value::Null));
		harness
			.store
			.watch("s", &owner("watcher-1"), move |new, _| c.lock().push(new.clone()), Some(selector))
			.unwrap();

		// Act
		harness.store.set_state("s", json!({"a": 1, "b": 3}));

		// Assert
		let calls = calls.lock();
		assert_eq!(calls.len(), expected_calls);
		if expected_calls == 1 {
			assert_eq!(calls[0], json!(3));
		}
	}

	#[rstest]
	fn test_watch_requires_identity(harness: Harness) {
		let anonymous = ComponentInstance::new("Watcher", ComponentCategory::Service);

		let result = harness.store.watch("s", &anonymous, |_, _| {}, None);

		assert_eq!(result, Err(StateError::OwnerWithoutIdentity));
		assert!(harness.bus.is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_watch_removed_when_owner_destroyed() {
		// Arrange
		let bus = Arc::new(EventBus::new());
		let registry = ComponentRegistry::new(bus.clone(), Dom::new());
		let store = SharedStateStore::new(bus.clone());
		store.create("theme", json!("light"), CellOptions::default());
		let instance = Arc::new(ComponentInstance::new("Panel", ComponentCategory::Service));
		let identity = registry.register(instance.clone(), None).unwrap();
		let calls = Arc::new(Mutex::new(0));
		let c = calls.clone();
		store
			.watch("theme", &instance, move |_, _| *c.lock() += 1, None)
			.unwrap();

		// Act
		store.set_state("theme", json!("dark"));
		registry.destroy_one(&identity).await;
		store.set_state("theme", json!("light"));

		// Assert
		assert_eq!(*calls.lock(), 1);
		assert_eq!(bus.owned_count(&identity), 0);
	}

	#[rstest]
	fn test_persisted_cell_loads_saves_and_removes(harness: Harness) {
		// Arrange
		harness.snapshots.save("prefs", &json!({"lang": "en"})).unwrap();

		// Act
		harness
			.store
			.create("settings", json!({}), CellOptions::default().with_storage_key("prefs"));
		let loaded = harness.store.get_state("settings");
		harness.store.set_state("settings", json!({"lang": "fr"}));
		let saved = harness.snapshots.load("prefs").unwrap();
		harness.store.destroy("settings");

		// Assert
		assert_eq!(loaded, Some(json!({"lang": "en"})));
		assert_eq!(saved, Some(json!({"lang": "fr"})));
		assert!(harness.snapshots.is_empty());
	}

	#[rstest]
	fn test_persisted_cell_without_snapshot_uses_initial(harness: Harness) {
		harness.store.create("cart", json!([]), CellOptions::persisted());
		assert_eq!(harness.store.get_state("cart"), Some(json!([])));
	}

	struct FailingStore;

	impl SnapshotStore for FailingStore {
		fn load(&self, key: &str) -> Result<Option<Value>, StateError> {
			Err(StateError::Persistence {
				key: key.to_string(),
				message: "corrupt".to_string(),
			})
		}

		fn save(&self, _key: &str, _value: &Value) -> Result<(), StateError> {
			Ok(())
		}

		fn remove(&self, _key: &str) -> Result<(), StateError> {
			Ok(())
		}
	}

	#[rstest]
	fn test_failed_load_falls_back_to_initial() {
		let store =
			SharedStateStore::new(Arc::new(EventBus::new())).with_snapshots(Arc::new(FailingStore));

		assert!(store.create("cart", json!([1]), CellOptions::persisted()));
		assert_eq!(store.get_state("cart"), Some(json!([1])));
	}
}
