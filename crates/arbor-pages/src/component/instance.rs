//! Component instances and their optional lifecycle hooks.

use crate::dom::{Dom, NodeId};
use crate::error::HookError;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Route or build parameters passed to hooks.
pub type Params = Map<String, Value>;

/// Runs once after the host element is created, before registration.
pub type InitHook = Arc<dyn Fn(&ComponentInstance, &Dom) -> Result<(), HookError> + Send + Sync>;

/// Receives merged params when an existing instance is reused.
pub type UpdateHook = Arc<dyn Fn(&ComponentInstance, &Params) -> Result<(), HookError> + Send + Sync>;

/// Runs before an instance is torn down. May suspend.
pub type BeforeDestroyHook =
	Arc<dyn Fn(Arc<ComponentInstance>) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

/// Releases listeners held by the instance (before pooling and destroy).
pub type CleanupHook = Arc<dyn Fn(&ComponentInstance) + Send + Sync>;

/// Kind of component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentCategory {
	/// Rendered leaf or page.
	Visual,
	/// Non-visual worker.
	Service,
	/// Runtime-owned singleton; cannot be built by user code.
	Structural,
	/// Supplies context to descendants.
	Provider,
}

/// Optional capability slots of a component.
#[derive(Clone, Default)]
pub struct ComponentHooks {
	/// Init hook.
	pub init: Option<InitHook>,
	/// Update hook.
	pub update: Option<UpdateHook>,
	/// Before-destroy hook.
	pub before_destroy: Option<BeforeDestroyHook>,
	/// Cleanup hook.
	pub cleanup: Option<CleanupHook>,
}

impl fmt::Debug for ComponentHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentHooks")
			.field("init", &self.init.is_some())
			.field("update", &self.update.is_some())
			.field("before_destroy", &self.before_destroy.is_some())
			.field("cleanup", &self.cleanup.is_some())
			.finish()
	}
}

impl ComponentHooks {
	/// Creates hooks with every slot empty.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the init hook.
	pub fn on_init<F>(mut self, hook: F) -> Self
	where
		F: Fn(&ComponentInstance, &Dom) -> Result<(), HookError> + Send + Sync + 'static,
	{
		self.init = Some(Arc::new(hook));
		self
	}

	/// Sets the update hook.
	pub fn on_update<F>(mut self, hook: F) -> Self
	where
		F: Fn(&ComponentInstance, &Params) -> Result<(), HookError> + Send + Sync + 'static,
	{
		self.update = Some(Arc::new(hook));
		self
	}

	/// Sets the before-destroy hook.
	pub fn on_before_destroy<F>(mut self, hook: F) -> Self
	where
		F: Fn(Arc<ComponentInstance>) -> BoxFuture<'static, Result<(), HookError>>
			+ Send
			+ Sync
			+ 'static,
	{
		self.before_destroy = Some(Arc::new(hook));
		self
	}

	/// Sets the cleanup hook.
	pub fn on_cleanup<F>(mut self, hook: F) -> Self
	where
		F: Fn(&ComponentInstance) + Send + Sync + 'static,
	{
		self.cleanup = Some(Arc::new(hook));
		self
	}
}

#[derive(Debug, Default)]
struct Placement {
	identity: Option<String>,
	parent: Option<String>,
	depth: usize,
}

/// Handle to a rendered unit.
///
/// Identity, parent and depth are written by the registry; everything else is
/// fixed at construction.
pub struct ComponentInstance {
	type_tag: String,
	category: ComponentCategory,
	host: Option<NodeId>,
	template: Option<String>,
	hooks: ComponentHooks,
	placement: RwLock<Placement>,
	props: RwLock<Params>,
}

impl fmt::Debug for ComponentInstance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let placement = self.placement.read();
		f.debug_struct("ComponentInstance")
			.field("type_tag", &self.type_tag)
			.field("category", &self.category)
			.field("identity", &placement.identity)
			.field("parent", &placement.parent)
			.field("depth", &placement.depth)
			.field("host", &self.host)
			.finish()
	}
}

impl ComponentInstance {
	/// Creates an unregistered instance.
	pub fn new(type_tag: impl Into<String>, category: ComponentCategory) -> Self {
		Self {
			type_tag: type_tag.into(),
			category,
			host: None,
			template: None,
			hooks: ComponentHooks::default(),
			placement: RwLock::new(Placement::default()),
			props: RwLock::new(Params::new()),
		}
	}

	/// Attaches a host element.
	pub fn with_host(mut self, host: NodeId) -> Self {
		self.host = Some(host);
		self
	}

	/// Stores the fetched template text.
	pub fn with_template(mut self, template: impl Into<String>) -> Self {
		self.template = Some(template.into());
		self
	}

	/// Installs lifecycle hooks.
	pub fn with_hooks(mut self, hooks: ComponentHooks) -> Self {
		self.hooks = hooks;
		self
	}

	/// Sets initial props.
	pub fn with_props(self, props: Params) -> Self {
		*self.props.write() = props;
		self
	}

	/// Component name this instance was built from.
	pub fn type_tag(&self) -> &str {
		&self.type_tag
	}

	/// Category.
	pub fn category(&self) -> ComponentCategory {
		self.category
	}

	/// Host element, if the instance is visual.
	pub fn host(&self) -> Option<NodeId> {
		self.host
	}

	/// Fetched template text.
	pub fn template(&self) -> Option<&str> {
		self.template.as_deref()
	}

	/// Lifecycle hooks.
	pub fn hooks(&self) -> &ComponentHooks {
		&self.hooks
	}

	/// Assigned identity.
	pub fn identity(&self) -> Option<String> {
		self.placement.read().identity.clone()
	}

	/// Identity of the parent instance.
	pub fn parent(&self) -> Option<String> {
		self.placement.read().parent.clone()
	}

	/// Distance from a root instance.
	pub fn depth(&self) -> usize {
		self.placement.read().depth
	}

	/// Current props.
	pub fn props(&self) -> Params {
		self.props.read().clone()
	}

	/// Merges `params` into the props and runs the update hook if present.
	pub fn apply_update(&self, params: &Params) -> Result<(), HookError> {
		{
			let mut props = self.props.write();
			for (k, v) in params {
				props.insert(k.clone(), v.clone());
			}
		}
		match &self.hooks.update {
			Some(hook) => hook(self, &self.props()),
			None => Ok(()),
		}
	}

	/// Runs the cleanup hook if present.
	pub fn run_cleanup(&self) {
		if let Some(hook) = &self.hooks.cleanup {
			hook(self);
		}
	}

	pub(crate) fn set_identity(&self, identity: String) {
		self.placement.write().identity = Some(identity);
	}

	pub(crate) fn set_placement(&self, parent: Option<String>, depth: usize) {
		let mut placement = self.placement.write();
		placement.parent = parent;
		placement.depth = depth;
	}
}
