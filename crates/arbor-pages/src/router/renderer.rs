//! Rendering matched routes into route containers.
//!
//! For every route container under a root the renderer picks the route the
//! container is responsible for (top-level, or the child of its `scope`
//! route) and makes sure the right component occupies it:
//!
//! 1. the current occupant, if it is the same component, is updated in place
//! 2. otherwise a pooled instance of the component is reattached
//! 3. otherwise a new instance is built
//!
//! The displaced occupant is detached, has its listeners and those of its
//! descendants released and is offered to the [`RecyclePool`]. Instances the pool rejects, and pooled
//! instances that expire, are destroyed through the registry so their
//! before-destroy hooks and subscription cleanup always run.

use super::cache::RouteCache;
use super::matcher::{ResolvedRoute, RouteMatch};
use super::pool::RecyclePool;
use crate::component::{ComponentBuilder, ComponentInstance, ComponentRegistry, Params};
use crate::dom::{Dom, IDENTITY_ATTR, NodeId, SCOPE_ATTR};
use crate::{debug_log, error_log, info_log, warn_log};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Result of [`RouteRenderer::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Cache memos purged.
	pub cache_entries: usize,
	/// Pooled instances destroyed.
	pub pooled_destroyed: usize,
	/// Occupant entries dropped because their container is gone.
	pub occupants_pruned: usize,
}

#[derive(Debug, Clone)]
struct Occupant {
	identity: String,
	params: HashMap<String, String>,
}

struct InFlightGuard<'a> {
	set: &'a Mutex<HashSet<NodeId>>,
	container: NodeId,
}

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.set.lock().remove(&self.container);
	}
}

/// Builds, reuses and pools route components.
pub struct RouteRenderer {
	registry: Arc<ComponentRegistry>,
	builder: Arc<ComponentBuilder>,
	cache: RouteCache,
	pool: Arc<RecyclePool>,
	in_flight: Mutex<HashSet<NodeId>>,
	occupants: RwLock<HashMap<NodeId, Occupant>>,
}

impl fmt::Debug for RouteRenderer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RouteRenderer")
			.field("cache", &self.cache)
			.field("pool", &self.pool)
			.field("occupied", &self.occupants.read().len())
			.finish()
	}
}

fn to_props(params: &HashMap<String, String>) -> Params {
	params
		.iter()
		.map(|(k, v)| (k.clone(), Value::String(v.clone())))
		.collect()
}

impl RouteRenderer {
	/// Creates a renderer.
	pub fn new(builder: Arc<ComponentBuilder>, cache: RouteCache, pool: RecyclePool) -> Self {
		Self {
			registry: Arc::clone(builder.registry()),
			builder,
			cache,
			pool: Arc::new(pool),
			in_flight: Mutex::new(HashSet::new()),
			occupants: RwLock::new(HashMap::new()),
		}
	}

	/// The container cache.
	pub fn cache(&self) -> &RouteCache {
		&self.cache
	}

	/// The recycle pool.
	pub fn pool(&self) -> &RecyclePool {
		&self.pool
	}

	fn dom(&self) -> &Dom {
		self.registry.dom()
	}

	/// Identity of the component currently rendered in `container`.
	pub fn occupant(&self, container: NodeId) -> Option<String> {
		self.occupants
			.read()
			.get(&container)
			.map(|o| o.identity.clone())
	}

	/// Containers that currently hold a rendered component.
	pub fn occupied_containers(&self) -> Vec<NodeId> {
		self.occupants.read().keys().copied().collect()
	}

	/// Renders `route_match` into every route container under `root`.
	///
	/// Containers render concurrently; a container already rendering is
	/// skipped. Returns whether any container rendered.
	pub fn render_routes_components_in_page<'a>(
		&'a self,
		root: NodeId,
		route_match: &'a RouteMatch,
	) -> BoxFuture<'a, bool> {
		async move {
			let containers = self.cache.get_cached_route_containers(root);
			let renders = containers
				.iter()
				.map(|&container| self.render_container(container, route_match));
			join_all(renders).await.into_iter().any(|rendered| rendered)
		}
		.boxed()
	}

	/// Renders the route `container` is responsible for, then recurses into
	/// the nested containers of the rendered component.
	pub async fn render_container(&self, container: NodeId, route_match: &RouteMatch) -> bool {
		let dom = self.dom();
		if !dom.is_connected(container) {
			return false;
		}
		if !self.in_flight.lock().insert(container) {
			debug_log!("container {} is already rendering", container);
			return false;
		}
		let _guard = InFlightGuard {
			set: &self.in_flight,
			container,
		};

		let scope = dom.attribute(container, SCOPE_ATTR);
		let Some(route) = route_match.route_for_scope(scope.as_deref()) else {
			return match scope {
				Some(scope) if route_match.includes(&super::pattern::normalize_path(&scope)) => {
					self.vacate(container).await
				}
				_ => false,
			};
		};

		let Some(instance) = self
			.handle_route(route, &route_match.params, container)
			.await
		else {
			return false;
		};
		if let Some(host) = instance.host() {
			self.render_routes_components_in_page(host, route_match).await;
		}
		true
	}

	/// Puts an instance of `route`'s component into `container`.
	///
	/// Prefers the current occupant, then a pooled instance, then a fresh
	/// build. Returns `None` (leaving the container untouched) when the
	/// component cannot be built.
	pub async fn handle_route(
		&self,
		route: &ResolvedRoute,
		params: &HashMap<String, String>,
		container: NodeId,
	) -> Option<Arc<ComponentInstance>> {
		let props = to_props(params);
		let current = self.live_occupant(container);

		if let Some((instance, occupant)) = &current
			&& instance.type_tag() == route.component()
			&& (route.reuse() || occupant.params == *params)
		{
			if let Err(e) = instance.apply_update(&props) {
				error_log!("update hook of '{}' failed: {}", occupant.identity, e);
			}
			self.set_occupant(container, &occupant.identity, params);
			return Some(Arc::clone(instance));
		}

		let instance = match self.take_pooled(route.component()) {
			Some(pooled) => {
				if let Err(e) = pooled.apply_update(&props) {
					error_log!("update hook of reused '{}' failed: {}", route.component(), e);
				}
				info_log!(
					"reusing pooled '{}' for {}",
					pooled.identity().unwrap_or_default(),
					route.full_path()
				);
				pooled
			}
			None => {
				let parent = self.owning_identity(container);
				self.builder
					.build(route.component(), props, parent.as_deref())
					.await?
			}
		};

		if let Some((previous, _)) = current
			&& !Arc::ptr_eq(&previous, &instance)
		{
			self.displace(previous).await;
		}

		let identity = instance.identity().unwrap_or_default();
		if let Some(host) = instance.host()
			&& !self.dom().append_child(container, host)
		{
			warn_log!("could not attach '{}' to container {}", identity, container);
		}
		self.set_occupant(container, &identity, params);
		Some(instance)
	}

	fn live_occupant(&self, container: NodeId) -> Option<(Arc<ComponentInstance>, Occupant)> {
		let occupant = self.occupants.read().get(&container).cloned()?;
		let instance = self.registry.get(&occupant.identity);
		let attached = instance.as_ref().is_some_and(|i| match i.host() {
			Some(host) => self.dom().parent(host) == Some(container),
			None => true,
		});
		match instance {
			Some(instance) if attached => Some((instance, occupant)),
			_ => {
				self.occupants.write().remove(&container);
				None
			}
		}
	}

	fn set_occupant(&self, container: NodeId, identity: &str, params: &HashMap<String, String>) {
		self.occupants.write().insert(
			container,
			Occupant {
				identity: identity.to_string(),
				params: params.clone(),
			},
		);
	}

	fn take_pooled(&self, component: &str) -> Option<Arc<ComponentInstance>> {
		while let Some(candidate) = self.pool.take(component) {
			match candidate.identity() {
				Some(identity) if self.registry.contains(&identity) => return Some(candidate),
				_ => debug_log!("dropping pooled '{}' destroyed elsewhere", component),
			}
		}
		None
	}

	fn owning_identity(&self, container: NodeId) -> Option<String> {
		let dom = self.dom();
		std::iter::once(container)
			.chain(dom.ancestors(container))
			.filter_map(|node| dom.attribute(node, IDENTITY_ATTR))
			.find(|identity| self.registry.contains(identity))
	}

	async fn vacate(&self, container: NodeId) -> bool {
		match self.live_occupant(container) {
			Some((instance, _)) => {
				self.displace(instance).await;
				true
			}
			None => false,
		}
	}

	/// Detaches `instance`, releases its listeners and pools it. Overflow is
	/// destroyed; pooled instances are destroyed once idle for too long.
	async fn displace(&self, instance: Arc<ComponentInstance>) {
		let identity = instance.identity().unwrap_or_default();
		if let Some(host) = instance.host() {
			if let Some(container) = self.dom().parent(host) {
				self.occupants.write().remove(&container);
			}
			self.dom().detach(host);
		}
		let subtree = self.registry.subtree_of(&identity);
		if subtree.is_empty() {
			instance.run_cleanup();
			self.registry.bus().cleanup_owner(&identity);
		}
		for member in &subtree {
			member.run_cleanup();
			if let Some(id) = member.identity() {
				self.registry.bus().cleanup_owner(&id);
			}
		}

		match self.pool.offer(instance) {
			Some(overflow) => {
				debug_log!("pool full, destroying '{}'", identity);
				self.registry.destroy_one(overflow).await;
			}
			None => self.schedule_expiry(),
		}
	}

	fn schedule_expiry(&self) {
		let pool = Arc::clone(&self.pool);
		let registry = Arc::clone(&self.registry);
		let idle = pool.config().idle();
		tokio::spawn(async move {
			tokio::time::sleep(idle).await;
			let expired = pool.sweep_expired();
			if !expired.is_empty() {
				registry.destroy(expired).await;
			}
		});
	}

	/// Purges stale cache memos, destroys expired pooled instances and
	/// forgets occupants of containers that no longer exist.
	pub async fn sweep(&self) -> SweepReport {
		let cache_entries = self.cache.sweep();
		let expired = self.pool.sweep_expired();
		let pooled_destroyed = if expired.is_empty() {
			0
		} else {
			self.registry.destroy(expired).await
		};
		let occupants_pruned = {
			let dom = self.dom();
			let mut occupants = self.occupants.write();
			let before = occupants.len();
			occupants.retain(|&container, _| dom.contains(container));
			before - occupants.len()
		};
		SweepReport {
			cache_entries,
			pooled_destroyed,
			occupants_pruned,
		}
	}

	/// Destroys every pooled instance.
	pub async fn drain_pool(&self) -> usize {
		let pooled = self.pool.drain();
		if pooled.is_empty() {
			return 0;
		}
		self.registry.destroy(pooled).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::{ComponentCategory, ComponentDefinition, ComponentHooks};
	use crate::config::{CacheConfig, PoolConfig};
	use crate::dom::ROUTE_CONTAINER_TAG;
	use crate::events::{EventBus, SubscribeOptions};
	use crate::router::matcher::{RouteDefinition, RouteMatcher};
	use rstest::{fixture, rstest};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	struct Harness {
		renderer: RouteRenderer,
		matcher: RouteMatcher,
		dom: Dom,
		view: NodeId,
		updates: Arc<AtomicUsize>,
	}

	#[fixture]
	fn harness() -> Harness {
		let dom = Dom::new();
		let view = dom.create_child(dom.root(), ROUTE_CONTAINER_TAG);
		let registry = ComponentRegistry::new(Arc::new(EventBus::new()), dom.clone());
		let builder = Arc::new(ComponentBuilder::new(registry));
		let updates = Arc::new(AtomicUsize::new(0));
		let u = updates.clone();
		builder.define(ComponentDefinition::new("HomePage", ComponentCategory::Visual));
		builder.define(
			ComponentDefinition::new("UserPage", ComponentCategory::Visual).with_hooks(move || {
				let u = u.clone();
				ComponentHooks::new().on_update(move |_, _| {
					u.fetch_add(1, Ordering::SeqCst);
					Ok(())
				})
			}),
		);
		builder.define(
			ComponentDefinition::new("SettingsPage", ComponentCategory::Visual).with_hooks(|| {
				ComponentHooks::new().on_init(|instance, dom| {
					if let Some(host) = instance.host() {
						let nested = dom.create_child(host, ROUTE_CONTAINER_TAG);
						dom.set_attribute(nested, SCOPE_ATTR, "/settings");
					}
					Ok(())
				})
			}),
		);
		builder.define(ComponentDefinition::new("ProfileTab", ComponentCategory::Visual));
		let matcher = RouteMatcher::new(
			&[
				RouteDefinition::new("/", "HomePage"),
				RouteDefinition::new("/users/${id}", "UserPage"),
				RouteDefinition::new("/settings", "SettingsPage")
					.child(RouteDefinition::new("profile", "ProfileTab")),
				RouteDefinition::new("/broken", "Missing"),
			],
			"/404",
		)
		.unwrap();
		let renderer = RouteRenderer::new(
			builder,
			RouteCache::new(dom.clone(), CacheConfig::default()),
			RecyclePool::new(PoolConfig::default().with_idle(Duration::from_millis(1_000))),
		);
		Harness {
			renderer,
			matcher,
			dom,
			view,
			updates,
		}
	}

	impl Harness {
		async fn render(&self, path: &str) -> bool {
			let m = self.matcher.match_route(path).unwrap();
			self.renderer
				.render_routes_components_in_page(self.dom.root(), &m)
				.await
		}

		fn shown(&self) -> Option<String> {
			self.renderer
				.occupant(self.view)
				.and_then(|id| self.renderer.registry.get(&id))
				.map(|i| i.type_tag().to_string())
		}
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_builds_into_container(harness: Harness) {
		// Act
		let rendered = harness.render("/users/7").await;

		// Assert
		assert!(rendered);
		assert_eq!(harness.shown().as_deref(), Some("UserPage"));
		let identity = harness.renderer.occupant(harness.view).unwrap();
		let host = harness.renderer.registry.get(&identity).unwrap().host().unwrap();
		assert_eq!(harness.dom.parent(host), Some(harness.view));
		assert_eq!(harness.renderer.builder.build_count("UserPage"), 1);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_same_params_updates_in_place(harness: Harness) {
		harness.render("/users/7").await;
		let first = harness.renderer.occupant(harness.view);

		harness.render("/users/7").await;

		assert_eq!(harness.renderer.occupant(harness.view), first);
		assert_eq!(harness.updates.load(Ordering::SeqCst), 1);
		assert_eq!(harness.renderer.builder.build_count("UserPage"), 1);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_displaced_instance_is_pooled_and_reused(harness: Harness) {
		// Arrange
		harness.render("/users/7").await;
		let user = harness.renderer.occupant(harness.view).unwrap();

		// Act
		harness.render("/").await;
		let pooled = harness.renderer.pool().contains(&user);
		harness.render("/users/7").await;

		// Assert
		assert!(pooled);
		assert_eq!(harness.renderer.occupant(harness.view), Some(user.clone()));
		assert!(!harness.renderer.pool().contains(&user));
		assert_eq!(harness.renderer.builder.build_count("UserPage"), 1);
		assert_eq!(harness.dom.children(harness.view).len(), 1);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_pooled_instance_destroyed_after_idle(harness: Harness) {
		harness.render("/users/7").await;
		let user = harness.renderer.occupant(harness.view).unwrap();
		harness.render("/").await;

		tokio::time::sleep(Duration::from_millis(1_100)).await;

		assert!(!harness.renderer.registry.contains(&user));
		assert!(harness.renderer.pool().is_empty());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_nested_container_renders_child(harness: Harness) {
		// Act
		harness.render("/settings/profile").await;

		// Assert
		let settings = harness.renderer.occupant(harness.view).unwrap();
		let host = harness.renderer.registry.get(&settings).unwrap().host().unwrap();
		let nested = harness.dom.children(host)[0];
		let tab = harness.renderer.occupant(nested).unwrap();
		let tab = harness.renderer.registry.get(&tab).unwrap();
		assert_eq!(tab.type_tag(), "ProfileTab");
		assert_eq!(tab.parent(), Some(settings));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_nested_container_vacated_when_child_gone(harness: Harness) {
		harness.render("/settings/profile").await;
		let settings = harness.renderer.occupant(harness.view).unwrap();
		let host = harness.renderer.registry.get(&settings).unwrap().host().unwrap();
		let nested = harness.dom.children(host)[0];

		harness.render("/settings").await;

		assert!(harness.renderer.occupant(nested).is_none());
		assert!(harness.dom.children(nested).is_empty());
		assert_eq!(harness.renderer.pool().len_for("ProfileTab"), 1);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_displaced_subtree_releases_listeners(harness: Harness) {
		// Arrange
		harness.render("/settings/profile").await;
		let settings = harness.renderer.occupant(harness.view).unwrap();
		let host = harness.renderer.registry.get(&settings).unwrap().host().unwrap();
		let nested = harness.dom.children(host)[0];
		let tab = harness.renderer.occupant(nested).unwrap();
		let bus = harness.renderer.registry.bus();
		let hits = Arc::new(AtomicUsize::new(0));
		let h = hits.clone();
		bus.subscribe(
			"tick",
			move |_| {
				h.fetch_add(1, Ordering::SeqCst);
				Ok(())
			},
			SubscribeOptions::owned_by(tab.clone()),
		)
		.unwrap();

		// Act
		harness.render("/").await;
		let delivered = bus.emit("tick", Value::Null);

		// Assert
		assert_eq!(delivered, 0);
		assert_eq!(hits.load(Ordering::SeqCst), 0);
		assert_eq!(bus.owned_count(&tab), 0);
		assert!(harness.renderer.registry.contains(&tab));
		assert!(harness.renderer.pool().contains(&settings));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_sweep_prunes_occupants_of_disposed_containers(harness: Harness) {
		// Arrange
		harness.render("/settings/profile").await;
		harness.render("/").await;
		let occupied = harness.renderer.occupied_containers().len();

		// Act
		harness.renderer.drain_pool().await;
		let report = harness.renderer.sweep().await;

		// Assert
		assert_eq!(occupied, 2);
		assert_eq!(report.occupants_pruned, 1);
		assert_eq!(harness.renderer.occupied_containers(), vec![harness.view]);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_failed_build_leaves_content(harness: Harness) {
		harness.render("/").await;

		let rendered = harness.render("/broken").await;

		assert!(!rendered);
		assert_eq!(harness.shown().as_deref(), Some("HomePage"));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_sweep_and_drain(harness: Harness) {
		// Arrange
		harness.render("/users/7").await;
		harness.render("/").await;
		harness.render("/users/8").await;
		harness.render("/settings").await;

		// Act
		let drained = harness.renderer.drain_pool().await;
		let report = harness.renderer.sweep().await;

		// Assert
		assert_eq!(drained, 2);
		assert_eq!(report.pooled_destroyed, 0);
		assert!(harness.renderer.pool().is_empty());
	}
}
