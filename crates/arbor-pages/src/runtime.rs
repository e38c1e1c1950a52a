//! Composition root.
//!
//! [`Runtime`] constructs every service once and wires them explicitly; no
//! component of the runtime reaches for a global.
//!
//! ## Example
//!
//! ```
//! use arbor_pages::component::{ComponentCategory, ComponentDefinition};
//! use arbor_pages::config::RuntimeConfig;
//! use arbor_pages::dom::ROUTE_CONTAINER_TAG;
//! use arbor_pages::router::RouteDefinition;
//! use arbor_pages::runtime::Runtime;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), arbor_pages::error::ArborError> {
//! let runtime = Runtime::builder(RuntimeConfig::default())
//!     .with_component(ComponentDefinition::new("HomePage", ComponentCategory::Visual))
//!     .with_routes(vec![RouteDefinition::new("/", "HomePage")])
//!     .build()?;
//! let dom = runtime.dom();
//! dom.create_child(dom.root(), ROUTE_CONTAINER_TAG);
//!
//! assert!(runtime.router().navigate("/").await?);
//! assert_eq!(runtime.registry().len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::component::{
	ComponentBuilder, ComponentDefinition, ComponentRegistry, TemplateProvider,
};
use crate::config::RuntimeConfig;
use crate::dom::Dom;
use crate::error::ArborError;
use crate::events::{EventBus, EventThrottler};
use crate::router::{RecyclePool, RouteCache, RouteDefinition, RouteRenderer, Router};
use crate::state::{SharedStateStore, SnapshotStore};
use crate::{debug_log, info_log};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Collects the pieces a [`Runtime`] is built from.
pub struct RuntimeBuilder {
	config: RuntimeConfig,
	templates: Option<Arc<dyn TemplateProvider>>,
	snapshots: Option<Arc<dyn SnapshotStore>>,
	components: Vec<ComponentDefinition>,
	routes: Vec<RouteDefinition>,
}

impl fmt::Debug for RuntimeBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuntimeBuilder")
			.field("config", &self.config)
			.field("components", &self.components.len())
			.field("routes", &self.routes.len())
			.finish()
	}
}

impl RuntimeBuilder {
	/// Template provider used by the component builder.
	pub fn with_templates(mut self, templates: Arc<dyn TemplateProvider>) -> Self {
		self.templates = Some(templates);
		self
	}

	/// Snapshot backend for persisted state cells.
	pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
		self.snapshots = Some(snapshots);
		self
	}

	/// Registers a component definition.
	pub fn with_component(mut self, definition: ComponentDefinition) -> Self {
		self.components.push(definition);
		self
	}

	/// Sets the route table.
	pub fn with_routes(mut self, routes: Vec<RouteDefinition>) -> Self {
		self.routes = routes;
		self
	}

	/// Wires every service.
	///
	/// # Errors
	///
	/// Fails if the route table does not compile.
	pub fn build(self) -> Result<Runtime, ArborError> {
		let dom = Dom::new();
		let bus = Arc::new(EventBus::new());
		let registry = ComponentRegistry::new(Arc::clone(&bus), dom.clone());

		let mut state = SharedStateStore::new(Arc::clone(&bus));
		if let Some(snapshots) = self.snapshots {
			state = state.with_snapshots(snapshots);
		}

		let mut builder = ComponentBuilder::new(Arc::clone(&registry));
		if let Some(templates) = self.templates {
			builder = builder.with_templates(templates);
		}
		for definition in self.components {
			builder.define(definition);
		}
		let builder = Arc::new(builder);

		let renderer = Arc::new(RouteRenderer::new(
			Arc::clone(&builder),
			RouteCache::new(dom.clone(), self.config.cache.clone()),
			RecyclePool::new(self.config.pool.clone()),
		));
		let throttler = EventThrottler::new();
		let router = Router::new(
			&self.routes,
			Arc::clone(&renderer),
			Arc::clone(&bus),
			throttler.clone(),
			&self.config.router,
			self.config.throttle.clone(),
		)?;
		info_log!("runtime ready with {} route(s)", router.matcher().len());

		Ok(Runtime {
			config: self.config,
			dom,
			bus,
			registry,
			state: Arc::new(state),
			builder,
			renderer,
			router: Arc::new(router),
			throttler,
		})
	}
}

/// The wired runtime.
pub struct Runtime {
	config: RuntimeConfig,
	dom: Dom,
	bus: Arc<EventBus>,
	registry: Arc<ComponentRegistry>,
	state: Arc<SharedStateStore>,
	builder: Arc<ComponentBuilder>,
	renderer: Arc<RouteRenderer>,
	router: Arc<Router>,
	throttler: EventThrottler,
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("registry", &self.registry)
			.field("bus", &self.bus)
			.field("router", &self.router)
			.finish()
	}
}

impl Runtime {
	/// Starts building a runtime.
	pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
		RuntimeBuilder {
			config,
			templates: None,
			snapshots: None,
			components: Vec::new(),
			routes: Vec::new(),
		}
	}

	/// Configuration the runtime was built with.
	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	/// The host tree.
	pub fn dom(&self) -> &Dom {
		&self.dom
	}

	/// The event bus.
	pub fn bus(&self) -> &Arc<EventBus> {
		&self.bus
	}

	/// The component registry.
	pub fn registry(&self) -> &Arc<ComponentRegistry> {
		&self.registry
	}

	/// The shared state store.
	pub fn state(&self) -> &Arc<SharedStateStore> {
		&self.state
	}

	/// The component builder.
	pub fn components(&self) -> &Arc<ComponentBuilder> {
		&self.builder
	}

	/// The route renderer.
	pub fn renderer(&self) -> &Arc<RouteRenderer> {
		&self.renderer
	}

	/// The router.
	pub fn router(&self) -> &Arc<Router> {
		&self.router
	}

	/// The shared throttler.
	pub fn throttler(&self) -> &EventThrottler {
		&self.throttler
	}

	/// Every `interval`, feeds pending DOM mutations to
	/// [`Router::on_mutations`] and runs [`RouteRenderer::sweep`], until the
	/// handle is aborted.
	pub fn spawn_maintenance(&self, interval: Duration) -> JoinHandle<()> {
		let renderer = Arc::clone(&self.renderer);
		let router = Arc::clone(&self.router);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				let invalidated = router.on_mutations();
				if invalidated > 0 {
					debug_log!("maintenance invalidated {} container memo(s)", invalidated);
				}
				let report = renderer.sweep().await;
				if report != Default::default() {
					debug_log!("maintenance sweep: {:?}", report);
				}
			}
		})
	}

	/// Cancels pending throttled work and destroys every instance, pooled
	/// ones included. Returns the number of destroyed instances.
	pub async fn shutdown(&self) -> usize {
		self.throttler.cancel_all();
		let pooled = self.renderer.drain_pool().await;
		let live = self.registry.destroy_by_pattern(|_| true).await;
		info_log!("runtime shut down, {} instance(s) destroyed", pooled + live);
		pooled + live
	}
}
