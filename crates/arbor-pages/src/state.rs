//! Shared state: named cells with selector-scoped watchers.

pub mod snapshot;
pub mod store;

pub use snapshot::{MemorySnapshotStore, SnapshotStore};
pub use store::{
	CellOptions, STATE_EVENT_PREFIX, Selector, SharedStateStore, StateUpdate, shallow_equal,
	state_event_name,
};
