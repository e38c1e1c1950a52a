//! Snapshot hook for persisted state cells.
//!
//! The store treats snapshots as opaque key/value pairs. Backends implement
//! [`SnapshotStore`]; [`MemorySnapshotStore`] is provided for tests and
//! embedders that persist elsewhere.

use crate::error::StateError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Backend for persisted state cells.
pub trait SnapshotStore: Send + Sync {
	/// Loads the snapshot under `key`, `None` if absent.
	fn load(&self, key: &str) -> Result<Option<Value>, StateError>;

	/// Saves `value` under `key`, replacing any prior snapshot.
	fn save(&self, key: &str, value: &Value) -> Result<(), StateError>;

	/// Removes the snapshot under `key`.
	fn remove(&self, key: &str) -> Result<(), StateError>;
}

/// In-memory snapshot store
///
/// # Examples
///
/// ```
/// use arbor_pages::state::{MemorySnapshotStore, SnapshotStore};
/// use serde_json::json;
///
/// let store = MemorySnapshotStore::new();
/// store.save("theme", &json!("dark")).unwrap();
/// assert_eq!(store.load("theme").unwrap(), Some(json!("dark")));
/// ```
#[derive(Default)]
pub struct MemorySnapshotStore {
	entries: RwLock<HashMap<String, Value>>,
}

impl fmt::Debug for MemorySnapshotStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemorySnapshotStore")
			.field("entries", &self.entries.read().len())
			.finish()
	}
}

impl MemorySnapshotStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored snapshots.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Whether no snapshot is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}

impl SnapshotStore for MemorySnapshotStore {
	fn load(&self, key: &str) -> Result<Option<Value>, StateError> {
		Ok(self.entries.read().get(key).cloned())
	}

	fn save(&self, key: &str, value: &Value) -> Result<(), StateError> {
		self.entries.write().insert(key.to_string(), value.clone());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StateError> {
		self.entries.write().remove(key);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_memory_store_roundtrip_and_remove() {
		let store = MemorySnapshotStore::new();
		assert!(store.is_empty());

		store.save("cart", &json!({"items": 2})).unwrap();
		store.save("cart", &json!({"items": 3})).unwrap();

		assert_eq!(store.len(), 1);
		assert_eq!(store.load("cart").unwrap(), Some(json!({"items": 3})));
		store.remove("cart").unwrap();
		assert_eq!(store.load("cart").unwrap(), None);
	}
}
