//! In-memory host tree.
//!
//! Components are attached to elements of a [`Dom`], and route containers are
//! discovered by walking it. The tree is an arena of elements addressed by
//! [`NodeId`]; ids are never reused, so a disposed id stays dead forever and
//! can serve as a liveness check.
//!
//! Structural changes are recorded as [`MutationRecord`]s and drained with
//! [`Dom::take_mutations`], mirroring a browser mutation observer. At most
//! [`MAX_PENDING_MUTATIONS`] records are kept between drains.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tag of route container elements.
pub const ROUTE_CONTAINER_TAG: &str = "route-view";

/// Attribute holding the identity of the component hosted by an element.
pub const IDENTITY_ATTR: &str = "data-identity";

/// Attribute naming the parent route whose children a container renders.
pub const SCOPE_ATTR: &str = "scope";

/// Attribute excluding a container from discovery.
pub const DISABLED_ATTR: &str = "disabled";

/// Pending mutation records kept before the oldest are discarded.
pub const MAX_PENDING_MUTATIONS: usize = 1024;

/// Identifier of an element in a [`Dom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
	/// Raw numeric value.
	pub fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// One structural change to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
	/// Element whose child list changed.
	pub target: NodeId,
	/// Elements inserted under `target`.
	pub added: Vec<NodeId>,
	/// Elements removed from `target`.
	pub removed: Vec<NodeId>,
}

#[derive(Debug)]
struct Element {
	tag: String,
	attributes: BTreeMap<String, String>,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

#[derive(Debug)]
struct DomInner {
	nodes: HashMap<NodeId, Element>,
	root: NodeId,
	mutations: Vec<MutationRecord>,
}

/// Shared handle to a host tree.
///
/// Cloning is cheap; all clones see the same tree.
#[derive(Clone)]
pub struct Dom {
	inner: Arc<RwLock<DomInner>>,
	next_id: Arc<AtomicU64>,
}

impl fmt::Debug for Dom {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.read();
		f.debug_struct("Dom")
			.field("root", &inner.root)
			.field("nodes", &inner.nodes.len())
			.field("pending_mutations", &inner.mutations.len())
			.finish()
	}
}

impl Default for Dom {
	fn default() -> Self {
		Self::new()
	}
}

impl Dom {
	/// Creates a tree containing only the document root (`body`).
	pub fn new() -> Self {
		let root = NodeId(0);
		let mut nodes = HashMap::new();
		nodes.insert(
			root,
			Element {
				tag: "body".to_string(),
				attributes: BTreeMap::new(),
				parent: None,
				children: Vec::new(),
			},
		);
		Self {
			inner: Arc::new(RwLock::new(DomInner {
				nodes,
				root,
				mutations: Vec::new(),
			})),
			next_id: Arc::new(AtomicU64::new(1)),
		}
	}

	/// The document root.
	pub fn root(&self) -> NodeId {
		self.inner.read().root
	}

	/// Creates a detached element.
	pub fn create_element(&self, tag: &str) -> NodeId {
		let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.inner.write().nodes.insert(
			id,
			Element {
				tag: tag.to_ascii_lowercase(),
				attributes: BTreeMap::new(),
				parent: None,
				children: Vec::new(),
			},
		);
		id
	}

	/// Creates an element and appends it to `parent`.
	pub fn create_child(&self, parent: NodeId, tag: &str) -> NodeId {
		let id = self.create_element(tag);
		self.append_child(parent, id);
		id
	}

	/// Appends `child` to `parent`, detaching it from its previous parent.
	///
	/// Returns `false` if either node is unknown or the move would create a
	/// cycle.
	pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
		let mut inner = self.inner.write();
		if !inner.nodes.contains_key(&parent) || !inner.nodes.contains_key(&child) {
			return false;
		}
		if parent == child || inner.is_ancestor(child, parent) {
			return false;
		}
		inner.unlink(child);
		if let Some(el) = inner.nodes.get_mut(&child) {
			el.parent = Some(parent);
		}
		if let Some(el) = inner.nodes.get_mut(&parent) {
			el.children.push(child);
		}
		inner.record(MutationRecord {
			target: parent,
			added: vec![child],
			removed: Vec::new(),
		});
		true
	}

	/// Detaches `node` from its parent. The subtree stays alive.
	pub fn detach(&self, node: NodeId) -> bool {
		self.inner.write().unlink(node).is_some()
	}

	/// Detaches and frees `node` together with its whole subtree.
	pub fn dispose(&self, node: NodeId) {
		let mut inner = self.inner.write();
		if node == inner.root {
			return;
		}
		inner.unlink(node);
		let mut stack = vec![node];
		while let Some(id) = stack.pop() {
			if let Some(el) = inner.nodes.remove(&id) {
				stack.extend(el.children);
			}
		}
	}

	/// Detaches every child of `node`, returning them in order.
	pub fn clear_children(&self, node: NodeId) -> Vec<NodeId> {
		let mut inner = self.inner.write();
		let Some(el) = inner.nodes.get_mut(&node) else {
			return Vec::new();
		};
		let children = std::mem::take(&mut el.children);
		for child in &children {
			if let Some(c) = inner.nodes.get_mut(child) {
				c.parent = None;
			}
		}
		if !children.is_empty() {
			inner.record(MutationRecord {
				target: node,
				added: Vec::new(),
				removed: children.clone(),
			});
		}
		children
	}

	/// Whether `node` exists (has not been disposed).
	pub fn contains(&self, node: NodeId) -> bool {
		self.inner.read().nodes.contains_key(&node)
	}

	/// Whether `node` is attached to the document root.
	pub fn is_connected(&self, node: NodeId) -> bool {
		let inner = self.inner.read();
		let mut current = Some(node);
		while let Some(id) = current {
			if id == inner.root {
				return true;
			}
			current = inner.nodes.get(&id).and_then(|el| el.parent);
		}
		false
	}

	/// Tag name of `node`.
	pub fn tag(&self, node: NodeId) -> Option<String> {
		self.inner.read().nodes.get(&node).map(|el| el.tag.clone())
	}

	/// Parent of `node`.
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.inner.read().nodes.get(&node).and_then(|el| el.parent)
	}

	/// Children of `node`, in order.
	pub fn children(&self, node: NodeId) -> Vec<NodeId> {
		self.inner
			.read()
			.nodes
			.get(&node)
			.map(|el| el.children.clone())
			.unwrap_or_default()
	}

	/// Position of `node` among its parent's children.
	pub fn index_in_parent(&self, node: NodeId) -> Option<usize> {
		let inner = self.inner.read();
		let parent = inner.nodes.get(&node)?.parent?;
		inner
			.nodes
			.get(&parent)?
			.children
			.iter()
			.position(|c| *c == node)
	}

	/// Ancestors of `node`, nearest first.
	pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
		let inner = self.inner.read();
		let mut out = Vec::new();
		let mut current = inner.nodes.get(&node).and_then(|el| el.parent);
		while let Some(id) = current {
			out.push(id);
			current = inner.nodes.get(&id).and_then(|el| el.parent);
		}
		out
	}

	/// Descendants of `node` in document (pre-)order, excluding `node`.
	pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
		self.descendants_filtered(node, |_, _| true)
	}

	/// Descendants of `node` in document order accepted by `filter`.
	///
	/// The filter sees the tag and attributes of each element; rejected
	/// elements are still descended into.
	pub fn descendants_filtered<F>(&self, node: NodeId, mut filter: F) -> Vec<NodeId>
	where
		F: FnMut(&str, &BTreeMap<String, String>) -> bool,
	{
		let inner = self.inner.read();
		let mut out = Vec::new();
		let mut stack: Vec<NodeId> = inner
			.nodes
			.get(&node)
			.map(|el| el.children.iter().rev().copied().collect())
			.unwrap_or_default();
		while let Some(id) = stack.pop() {
			if let Some(el) = inner.nodes.get(&id) {
				if filter(&el.tag, &el.attributes) {
					out.push(id);
				}
				stack.extend(el.children.iter().rev().copied());
			}
		}
		out
	}

	/// Descendants of `node` carrying attribute `name`, with its value.
	pub fn find_by_attribute(&self, node: NodeId, name: &str) -> Vec<(NodeId, String)> {
		let matches = self.descendants_filtered(node, |_, attrs| attrs.contains_key(name));
		let inner = self.inner.read();
		matches
			.into_iter()
			.filter_map(|id| {
				inner
					.nodes
					.get(&id)
					.and_then(|el| el.attributes.get(name).cloned())
					.map(|v| (id, v))
			})
			.collect()
	}

	/// Sets an attribute.
	pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
		if let Some(el) = self.inner.write().nodes.get_mut(&node) {
			el.attributes.insert(name.to_string(), value.to_string());
		}
	}

	/// Reads an attribute.
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
		self.inner
			.read()
			.nodes
			.get(&node)
			.and_then(|el| el.attributes.get(name).cloned())
	}

	/// Whether an attribute is present.
	pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
		self.inner
			.read()
			.nodes
			.get(&node)
			.is_some_and(|el| el.attributes.contains_key(name))
	}

	/// Removes an attribute.
	pub fn remove_attribute(&self, node: NodeId, name: &str) {
		if let Some(el) = self.inner.write().nodes.get_mut(&node) {
			el.attributes.remove(name);
		}
	}

	/// Whether `node` is a route container.
	pub fn is_route_container(&self, node: NodeId) -> bool {
		self.inner
			.read()
			.nodes
			.get(&node)
			.is_some_and(|el| el.tag == ROUTE_CONTAINER_TAG)
	}

	/// Drains the pending mutation records.
	pub fn take_mutations(&self) -> Vec<MutationRecord> {
		std::mem::take(&mut self.inner.write().mutations)
	}

	/// Number of records waiting to be drained.
	pub fn pending_mutations(&self) -> usize {
		self.inner.read().mutations.len()
	}

	/// Number of live elements, including the root.
	pub fn len(&self) -> usize {
		self.inner.read().nodes.len()
	}

	/// Whether only the root exists.
	pub fn is_empty(&self) -> bool {
		self.len() <= 1
	}
}

impl DomInner {
	fn record(&mut self, record: MutationRecord) {
		self.mutations.push(record);
		if self.mutations.len() > MAX_PENDING_MUTATIONS {
			let excess = self.mutations.len() - MAX_PENDING_MUTATIONS;
			self.mutations.drain(..excess);
		}
	}

	fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
		let mut current = self.nodes.get(&node).and_then(|el| el.parent);
		while let Some(id) = current {
			if id == candidate {
				return true;
			}
			current = self.nodes.get(&id).and_then(|el| el.parent);
		}
		false
	}

	fn unlink(&mut self, node: NodeId) -> Option<NodeId> {
		let parent = self.nodes.get_mut(&node)?.parent.take()?;
		if let Some(p) = self.nodes.get_mut(&parent) {
			p.children.retain(|c| *c != node);
		}
		self.record(MutationRecord {
			target: parent,
			added: Vec::new(),
			removed: vec![node],
		});
		Some(parent)
	}
}
