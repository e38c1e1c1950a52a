//! Memoized route-container discovery.
//!
//! Finding the route containers under a root means walking its whole
//! subtree. [`RouteCache`] keeps the result per root for a short TTL and
//! re-validates it on every read:
//!
//! - the memo must be younger than `ttl`
//! - the root must still exist
//! - at least `liveness_threshold` of the memoized containers must still be
//!   connected to the document
//!
//! Entries are keyed by the root's identity (`data-identity`), then its `id`
//! attribute, then its tag, sibling index and parent as a last resort.

use crate::config::CacheConfig;
use crate::debug_log;
use crate::dom::{DISABLED_ATTR, Dom, IDENTITY_ATTR, MutationRecord, NodeId, ROUTE_CONTAINER_TAG};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CachedContainerSet {
	containers: Arc<[NodeId]>,
	timestamp: Instant,
	root: NodeId,
}

/// Per-root memo of route containers.
pub struct RouteCache {
	dom: Dom,
	config: CacheConfig,
	entries: RwLock<HashMap<String, CachedContainerSet>>,
}

impl fmt::Debug for RouteCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RouteCache")
			.field("entries", &self.entries.read().len())
			.field("ttl", &self.config.ttl())
			.finish()
	}
}

impl RouteCache {
	/// Creates an empty cache over `dom`.
	pub fn new(dom: Dom, config: CacheConfig) -> Self {
		Self {
			dom,
			config,
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// The host tree this cache scans.
	pub fn dom(&self) -> &Dom {
		&self.dom
	}

	/// Key under which the memo for `root` is stored.
	pub fn container_key(&self, root: NodeId) -> String {
		if let Some(identity) = self.dom.attribute(root, IDENTITY_ATTR) {
			return identity;
		}
		if let Some(id) = self.dom.attribute(root, "id") {
			return format!("#{}", id);
		}
		let tag = self.dom.tag(root).unwrap_or_default();
		let index = self.dom.index_in_parent(root).unwrap_or(0);
		match self.dom.parent(root) {
			Some(parent) => format!("{}:{}@{}", tag, index, parent),
			None => format!("{}:{}@{}", tag, index, root),
		}
	}

	/// Route containers under `root`, from the memo when it is still valid.
	///
	/// Two calls within the TTL with no relevant change return the same
	/// allocation (`Arc::ptr_eq`).
	pub fn get_cached_route_containers(&self, root: NodeId) -> Arc<[NodeId]> {
		let key = self.container_key(root);
		let cached = self.entries.read().get(&key).cloned();
		if let Some(entry) = cached
			&& entry.root == root
			&& self.is_valid(&entry)
		{
			debug_log!("route cache hit for '{}'", key);
			return entry.containers;
		}

		let containers: Arc<[NodeId]> = self.discover(root).into();
		debug_log!("route cache miss for '{}': {} container(s)", key, containers.len());
		self.entries.write().insert(
			key,
			CachedContainerSet {
				containers: Arc::clone(&containers),
				timestamp: Instant::now(),
				root,
			},
		);
		containers
	}

	fn is_valid(&self, entry: &CachedContainerSet) -> bool {
		if entry.timestamp.elapsed() >= self.config.ttl() || !self.dom.contains(entry.root) {
			return false;
		}
		if entry.containers.is_empty() {
			return true;
		}
		let attached = entry
			.containers
			.iter()
			.filter(|&&c| self.dom.is_connected(c))
			.count();
		(attached as f64 / entry.containers.len() as f64) >= self.config.liveness_threshold
	}

	fn discover(&self, root: NodeId) -> Vec<NodeId> {
		let candidates = self.dom.descendants_filtered(root, |tag, attrs| {
			tag == ROUTE_CONTAINER_TAG && !attrs.contains_key(DISABLED_ATTR)
		});
		candidates
			.into_iter()
			.filter(|&c| self.dom.is_connected(c))
			.collect()
	}

	/// Drops the memo for `root`. Returns whether one existed.
	pub fn invalidate_container(&self, root: NodeId) -> bool {
		let key = self.container_key(root);
		self.entries.write().remove(&key).is_some()
	}

	/// Drops every memo.
	pub fn invalidate_all(&self) {
		self.entries.write().clear();
	}

	/// Drops the memos affected by a batch of mutations.
	///
	/// A record is relevant when it adds a route container (directly or
	/// anywhere inside an added subtree), or removes one. Removed subtrees may
	/// already be disposed, so a removal also counts when some memo holds a
	/// container that is no longer connected. For a relevant record, every
	/// memo rooted at the target or one of its ancestors is dropped, as is
	/// every memo holding a removed or disconnected container. Returns the
	/// number of dropped memos.
	pub fn invalidate_by_mutation(&self, records: &[MutationRecord]) -> usize {
		let mut roots: HashSet<NodeId> = HashSet::new();
		let mut removed: HashSet<NodeId> = HashSet::new();
		let mut removal_seen = false;
		{
			let entries = self.entries.read();
			let memoized = |node: NodeId| entries.values().any(|e| e.containers.contains(&node));
			let stale = || {
				entries
					.values()
					.any(|e| e.containers.iter().any(|&c| !self.dom.is_connected(c)))
			};
			for record in records {
				let added = record.added.iter().any(|&n| self.holds_container(n));
				let dropped = !record.removed.is_empty()
					&& (record
						.removed
						.iter()
						.any(|&n| self.holds_container(n) || memoized(n))
						|| stale());
				if !added && !dropped {
					continue;
				}
				roots.insert(record.target);
				roots.extend(self.dom.ancestors(record.target));
				if dropped {
					removal_seen = true;
					removed.extend(record.removed.iter().copied());
				}
			}
		}
		if roots.is_empty() {
			return 0;
		}

		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|_, e| {
			!roots.contains(&e.root)
				&& !e.containers.iter().any(|&c| {
					removed.contains(&c) || (removal_seen && !self.dom.is_connected(c))
				})
		});
		let dropped = before - entries.len();
		debug_log!("mutation batch invalidated {} memo(s)", dropped);
		dropped
	}

	fn holds_container(&self, node: NodeId) -> bool {
		self.dom.is_route_container(node)
			|| !self
				.dom
				.descendants_filtered(node, |tag, _| tag == ROUTE_CONTAINER_TAG)
				.is_empty()
	}

	/// Purges memos whose root is gone or whose age exceeds the sweep age.
	/// Returns the number purged.
	pub fn sweep(&self) -> usize {
		let max_age = self.config.max_age();
		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|_, e| self.dom.contains(e.root) && e.timestamp.elapsed() < max_age);
		before - entries.len()
	}

	/// Number of memos.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Whether no memo is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
