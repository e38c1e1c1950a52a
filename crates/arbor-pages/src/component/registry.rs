//! Component registry: identity, the parent/child index, and cascading
//! destroy.
//!
//! The registry is the only authority over which identities are live. Its
//! graph consists of two maps kept in lockstep:
//!
//! - identity -> instance
//! - parent identity -> set of child identities (the children index)
//!
//! Every identity stored in the children index is a key of the identity map,
//! and parent sets are pruned as soon as they become empty. Both maps are only
//! mutated inside a single lock scope, so the graph is consistent at every
//! suspension point of an async destroy.

use super::instance::ComponentInstance;
use crate::dom::{Dom, IDENTITY_ATTR, NodeId};
use crate::error::RegistryError;
use crate::events::{EventBus, OwnerLiveness};
use crate::{debug_log, error_log, info_log, warn_log};
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

/// Something that can be resolved to a registered identity.
#[derive(Debug, Clone)]
pub enum DestroyTarget {
	/// By identity string.
	Identity(String),
	/// By instance handle.
	Instance(Arc<ComponentInstance>),
}

impl From<&str> for DestroyTarget {
	fn from(identity: &str) -> Self {
		Self::Identity(identity.to_string())
	}
}

impl From<String> for DestroyTarget {
	fn from(identity: String) -> Self {
		Self::Identity(identity)
	}
}

impl From<&String> for DestroyTarget {
	fn from(identity: &String) -> Self {
		Self::Identity(identity.clone())
	}
}

impl From<Arc<ComponentInstance>> for DestroyTarget {
	fn from(instance: Arc<ComponentInstance>) -> Self {
		Self::Instance(instance)
	}
}

impl From<&Arc<ComponentInstance>> for DestroyTarget {
	fn from(instance: &Arc<ComponentInstance>) -> Self {
		Self::Instance(Arc::clone(instance))
	}
}

#[derive(Default)]
struct Graph {
	instances: HashMap<String, Arc<ComponentInstance>>,
	children: HashMap<String, HashSet<String>>,
	counters: HashMap<String, u64>,
	destroying: HashSet<String>,
}

impl Graph {
	fn derive_identity(&mut self, type_tag: &str) -> String {
		let base = type_tag.to_lowercase();
		loop {
			let counter = self.counters.entry(base.clone()).or_insert(0);
			*counter += 1;
			let candidate = format!("{}-{}", base, counter);
			if !self.instances.contains_key(&candidate) {
				return candidate;
			}
		}
	}

	fn collect_subtree(&self, identity: &str, into: &mut HashSet<String>) {
		let mut queue = VecDeque::from([identity.to_string()]);
		while let Some(id) = queue.pop_front() {
			if !into.insert(id.clone()) {
				continue;
			}
			if let Some(children) = self.children.get(&id) {
				queue.extend(children.iter().cloned());
			}
		}
	}

	fn unlink(&mut self, identity: &str, parent: Option<&str>) {
		self.children.remove(identity);
		if let Some(parent) = parent
			&& let Some(siblings) = self.children.get_mut(parent)
		{
			siblings.remove(identity);
			if siblings.is_empty() {
				self.children.remove(parent);
			}
		}
		self.instances.remove(identity);
		self.destroying.remove(identity);
	}
}

/// Owns the live component graph.
pub struct ComponentRegistry {
	graph: RwLock<Graph>,
	bus: Arc<EventBus>,
	dom: Dom,
}

impl fmt::Debug for ComponentRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let graph = self.graph.read();
		f.debug_struct("ComponentRegistry")
			.field("instances", &graph.instances.len())
			.field("parents", &graph.children.len())
			.finish()
	}
}

impl OwnerLiveness for ComponentRegistry {
	fn is_live(&self, identity: &str) -> bool {
		self.contains(identity)
	}
}

impl ComponentRegistry {
	/// Creates a registry and binds it to `bus` as the owner liveness source.
	pub fn new(bus: Arc<EventBus>, dom: Dom) -> Arc<Self> {
		let registry = Arc::new(Self {
			graph: RwLock::new(Graph::default()),
			bus,
			dom,
		});
		let liveness: Weak<dyn OwnerLiveness> = Arc::downgrade(&registry) as Weak<Self>;
		registry.bus.bind_liveness(liveness);
		registry
	}

	/// The event bus this registry cleans up.
	pub fn bus(&self) -> &Arc<EventBus> {
		&self.bus
	}

	/// The host tree instances are attached to.
	pub fn dom(&self) -> &Dom {
		&self.dom
	}

	/// Gives `instance` an identity.
	///
	/// An explicit identity is validated against live identities. Without one,
	/// an instance that already has an identity keeps it; otherwise a
	/// deterministic `<lowercased type tag>-<counter>` identity is derived.
	pub fn assign_identity(
		&self,
		instance: &ComponentInstance,
		explicit: Option<&str>,
	) -> Result<String, RegistryError> {
		let mut graph = self.graph.write();
		let identity = match explicit {
			Some(id) => {
				if graph.instances.contains_key(id) {
					let err = RegistryError::DuplicateIdentity(id.to_string());
					error_log!("{}", err);
					return Err(err);
				}
				id.to_string()
			}
			None => match instance.identity() {
				Some(existing) => existing,
				None => graph.derive_identity(instance.type_tag()),
			},
		};
		instance.set_identity(identity.clone());
		Ok(identity)
	}

	/// Inserts `instance` into the graph under `parent`.
	///
	/// Assigns an identity first if the instance has none. An unknown parent
	/// is logged and the instance becomes a root.
	pub fn register(
		&self,
		instance: Arc<ComponentInstance>,
		parent: Option<&str>,
	) -> Result<String, RegistryError> {
		if instance.identity().is_none() {
			self.assign_identity(&instance, None)?;
		}
		let Some(identity) = instance.identity() else {
			return Err(RegistryError::NotFound(instance.type_tag().to_string()));
		};

		let mut graph = self.graph.write();
		if graph.instances.contains_key(&identity) {
			let err = RegistryError::DuplicateIdentity(identity);
			error_log!("{}", err);
			return Err(err);
		}

		let parent = parent.and_then(|p| {
			if graph.destroying.contains(p) {
				warn_log!("register: parent '{}' is being destroyed, '{}' becomes a root", p, identity);
				return None;
			}
			match graph.instances.get(p) {
				Some(parent) => Some((p.to_string(), parent.depth() + 1)),
				None => {
					warn_log!("register: unknown parent '{}', '{}' becomes a root", p, identity);
					None
				}
			}
		});

		match parent {
			Some((parent_id, depth)) => {
				graph
					.children
					.entry(parent_id.clone())
					.or_default()
					.insert(identity.clone());
				instance.set_placement(Some(parent_id), depth);
			}
			None => instance.set_placement(None, 0),
		}

		if let Some(host) = instance.host() {
			self.dom.set_attribute(host, IDENTITY_ATTR, &identity);
		}
		graph.instances.insert(identity.clone(), instance);
		debug_log!("registered '{}'", identity);
		Ok(identity)
	}

	/// Looks up an instance.
	pub fn get(&self, identity: &str) -> Option<Arc<ComponentInstance>> {
		self.graph.read().instances.get(identity).cloned()
	}

	/// Whether `identity` is registered.
	pub fn contains(&self, identity: &str) -> bool {
		self.graph.read().instances.contains_key(identity)
	}

	/// Number of registered instances.
	pub fn len(&self) -> usize {
		self.graph.read().instances.len()
	}

	/// Whether nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All registered identities, sorted.
	pub fn identities(&self) -> Vec<String> {
		let mut ids: Vec<String> = self.graph.read().instances.keys().cloned().collect();
		ids.sort();
		ids
	}

	/// Direct children of `identity`, sorted.
	pub fn children_of(&self, identity: &str) -> Vec<String> {
		let mut ids: Vec<String> = self
			.graph
			.read()
			.children
			.get(identity)
			.map(|c| c.iter().cloned().collect())
			.unwrap_or_default();
		ids.sort();
		ids
	}

	/// `identity` and every registered descendant, leaves first. Empty when
	/// `identity` is not registered.
	pub fn subtree_of(&self, identity: &str) -> Vec<Arc<ComponentInstance>> {
		let graph = self.graph.read();
		if !graph.instances.contains_key(identity) {
			return Vec::new();
		}
		let mut collected = HashSet::new();
		graph.collect_subtree(identity, &mut collected);
		let mut subtree: Vec<Arc<ComponentInstance>> = collected
			.iter()
			.filter_map(|id| graph.instances.get(id).cloned())
			.collect();
		subtree.sort_by_key(|i| Reverse(i.depth()));
		subtree
	}

	/// Registered instances built from component `type_tag`.
	pub fn find_by_type(&self, type_tag: &str) -> Vec<Arc<ComponentInstance>> {
		self.graph
			.read()
			.instances
			.values()
			.filter(|i| i.type_tag() == type_tag)
			.cloned()
			.collect()
	}

	/// Checks the graph invariants: every child in the index is registered,
	/// no parent set is empty, and each child's recorded parent matches.
	pub fn is_consistent(&self) -> bool {
		let graph = self.graph.read();
		graph.children.iter().all(|(parent, kids)| {
			!kids.is_empty()
				&& graph.instances.contains_key(parent)
				&& kids.iter().all(|k| {
					graph
						.instances
						.get(k)
						.is_some_and(|i| i.parent().as_deref() == Some(parent.as_str()))
				})
		})
	}

	/// Destroys a single target and its subtree.
	pub async fn destroy_one(&self, target: impl Into<DestroyTarget>) -> usize {
		self.destroy([target.into()]).await
	}

	/// Destroys every target together with all registered descendants.
	///
	/// Unknown targets are logged and skipped. Teardown runs leaves first
	/// (descending depth); a failing before-destroy hook is logged and the
	/// cascade continues. Returns the number of destroyed instances.
	pub async fn destroy<I, T>(&self, targets: I) -> usize
	where
		I: IntoIterator<Item = T>,
		T: Into<DestroyTarget>,
	{
		let mut ordered: Vec<Arc<ComponentInstance>> = {
			let mut graph = self.graph.write();
			let mut collected = HashSet::new();
			for target in targets {
				let identity = match target.into() {
					DestroyTarget::Identity(id) => id,
					DestroyTarget::Instance(instance) => match instance.identity() {
						Some(id) => id,
						None => {
							warn_log!("destroy: instance of '{}' has no identity", instance.type_tag());
							continue;
						}
					},
				};
				if !graph.instances.contains_key(&identity) || graph.destroying.contains(&identity) {
					warn_log!("destroy: unknown identity '{}'", identity);
					continue;
				}
				graph.collect_subtree(&identity, &mut collected);
			}
			collected.retain(|id| !graph.destroying.contains(id));
			for id in &collected {
				graph.destroying.insert(id.clone());
			}
			collected
				.iter()
				.filter_map(|id| graph.instances.get(id).cloned())
				.collect()
		};
		ordered.sort_by_key(|i| Reverse(i.depth()));

		let mut destroyed = 0;
		for instance in ordered {
			let Some(identity) = instance.identity() else {
				continue;
			};
			if let Some(hook) = &instance.hooks().before_destroy
				&& let Err(e) = hook(Arc::clone(&instance)).await
			{
				error_log!("before-destroy hook of '{}' failed: {}", identity, e);
			}
			self.teardown(&identity, &instance);
			destroyed += 1;
		}
		if destroyed > 0 {
			info_log!("destroyed {} component(s)", destroyed);
		}
		destroyed
	}

	fn teardown(&self, identity: &str, instance: &ComponentInstance) {
		instance.run_cleanup();
		self.bus.cleanup_owner(identity);
		self.graph
			.write()
			.unlink(identity, instance.parent().as_deref());
		if let Some(host) = instance.host() {
			self.dom.dispose(host);
		}
	}

	/// Destroys every registered instance whose host lies inside `boundary`.
	///
	/// Uses the host tree rather than the children index because the
	/// boundary does not have to be a registered instance.
	pub async fn destroy_by_container(&self, boundary: NodeId) -> usize {
		let identities: Vec<String> = self
			.dom
			.find_by_attribute(boundary, IDENTITY_ATTR)
			.into_iter()
			.map(|(_, id)| id)
			.filter(|id| self.contains(id))
			.collect();
		if identities.is_empty() {
			return 0;
		}
		self.destroy(identities).await
	}

	/// Destroys every instance whose identity satisfies `matcher`.
	pub async fn destroy_by_pattern<F>(&self, matcher: F) -> usize
	where
		F: Fn(&str) -> bool,
	{
		let identities: Vec<String> = self
			.graph
			.read()
			.instances
			.keys()
			.filter(|id| matcher(id))
			.cloned()
			.collect();
		if identities.is_empty() {
			return 0;
		}
		self.destroy(identities).await
	}
}
