//! Core Router Implementation.
//!
//! The [`Router`] owns the route table, the session history and the
//! navigation state machine, and drives the [`RouteRenderer`].

use super::history::{History, HistoryState, NavigationType};
use super::matcher::{RouteDefinition, RouteMatch, RouteMatcher};
use super::navigation::{NavigationEffect, NavigationEvent, NavigationMachine, NavigationState};
use super::pattern::normalize_path;
use super::renderer::RouteRenderer;
use crate::config::{RouterConfig, ThrottleConfig};
use crate::dom::{Dom, NodeId, SCOPE_ATTR};
use crate::error::RouterError;
use crate::events::{EventBus, EventThrottler};
use crate::{debug_log, info_log, warn_log};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Bus event emitted after every finished navigation.
pub const NAVIGATED_EVENT: &str = "router:navigated";

/// Throttler key used for mutation-driven re-renders.
pub const MUTATION_THROTTLE_KEY: &str = "route-mutations";

/// Top-level routing coordinator.
pub struct Router {
	matcher: RouteMatcher,
	renderer: Arc<RouteRenderer>,
	dom: Dom,
	bus: Arc<EventBus>,
	throttler: EventThrottler,
	throttle: ThrottleConfig,
	history: Mutex<History>,
	machine: Mutex<NavigationMachine>,
	current: RwLock<Option<RouteMatch>>,
}

impl fmt::Debug for Router {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router")
			.field("matcher", &self.matcher)
			.field("history_len", &self.history.lock().len())
			.field("state", self.machine.lock().state())
			.finish()
	}
}

impl Router {
	/// Builds a router over `routes`.
	///
	/// # Errors
	///
	/// Returns [`RouterError::InvalidPattern`] if a route path fails to
	/// compile.
	pub fn new(
		routes: &[RouteDefinition],
		renderer: Arc<RouteRenderer>,
		bus: Arc<EventBus>,
		throttler: EventThrottler,
		config: &RouterConfig,
		throttle: ThrottleConfig,
	) -> Result<Self, RouterError> {
		let matcher = RouteMatcher::new(routes, &config.not_found_path)?;
		let dom = renderer.cache().dom().clone();
		Ok(Self {
			matcher,
			renderer,
			dom,
			bus,
			throttler,
			throttle,
			history: Mutex::new(History::new(HistoryState::new(normalize_path(
				&config.base_path,
			)))),
			machine: Mutex::new(NavigationMachine::new()),
			current: RwLock::new(None),
		})
	}

	/// The route matcher.
	pub fn matcher(&self) -> &RouteMatcher {
		&self.matcher
	}

	/// The renderer.
	pub fn renderer(&self) -> &Arc<RouteRenderer> {
		&self.renderer
	}

	/// Resolves `path` without navigating.
	pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
		self.matcher.match_route(path)
	}

	/// Generates a URL for `route_path`. Missing parameters fall back to their
	/// placeholder names.
	pub fn generate_url(&self, route_path: &str, params: &[(&str, &str)]) -> String {
		let params: HashMap<String, String> = params
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		self.matcher.generate_url(route_path, &params)
	}

	/// Path of the current history entry.
	pub fn current_path(&self) -> String {
		self.history.lock().current().path.clone()
	}

	/// State of the current history entry.
	pub fn current_state(&self) -> HistoryState {
		self.history.lock().current().clone()
	}

	/// Match of the last finished navigation.
	pub fn current_match(&self) -> Option<RouteMatch> {
		self.current.read().clone()
	}

	/// Navigation state.
	pub fn state(&self) -> NavigationState {
		self.machine.lock().state().clone()
	}

	/// Whether a back navigation is possible.
	pub fn can_go_back(&self) -> bool {
		self.history.lock().can_go_back()
	}

	/// Whether a forward navigation is possible.
	pub fn can_go_forward(&self) -> bool {
		self.history.lock().can_go_forward()
	}

	/// Navigates to `path`, pushing a history entry.
	///
	/// Returns whether any container rendered. An unmatched path with no
	/// not-found route leaves the page as it is.
	pub async fn navigate(&self, path: &str) -> Result<bool, RouterError> {
		self.run(path, NavigationType::Push).await
	}

	/// Navigates to `path`, replacing the current history entry.
	pub async fn replace(&self, path: &str) -> Result<bool, RouterError> {
		self.run(path, NavigationType::Replace).await
	}

	/// Moves back one history entry and renders it.
	pub async fn back(&self) -> Result<bool, RouterError> {
		let path = self.history.lock().back().map(|s| s.path.clone());
		match path {
			Some(path) => self.run(&path, NavigationType::Pop).await,
			None => Err(RouterError::NavigationFailed("no previous entry".to_string())),
		}
	}

	/// Moves forward one history entry and renders it.
	pub async fn forward(&self) -> Result<bool, RouterError> {
		let path = self.history.lock().forward().map(|s| s.path.clone());
		match path {
			Some(path) => self.run(&path, NavigationType::Pop).await,
			None => Err(RouterError::NavigationFailed("no next entry".to_string())),
		}
	}

	/// Renders the current history entry, as after an external location
	/// change.
	pub async fn handle_location_change(&self) -> Result<bool, RouterError> {
		let path = self.current_path();
		self.run(&path, NavigationType::Pop).await
	}

	/// Drains pending DOM mutations, invalidates the affected cache memos and
	/// schedules one coalesced re-render of the current route.
	///
	/// Returns the number of invalidated memos.
	pub fn on_mutations(self: &Arc<Self>) -> usize {
		let records = self.dom.take_mutations();
		if records.is_empty() {
			return 0;
		}
		let invalidated = self.renderer.cache().invalidate_by_mutation(&records);
		if invalidated > 0 {
			let router = Arc::clone(self);
			self.throttler.debounce(
				MUTATION_THROTTLE_KEY,
				self.throttle.default_wait(),
				move || async move {
					router.rerender().await;
				},
			);
		}
		invalidated
	}

	/// Renders the current match again without touching history.
	pub async fn rerender(&self) -> bool {
		let Some(route_match) = self.current_match() else {
			return false;
		};
		self.renderer
			.render_routes_components_in_page(self.dom.root(), &route_match)
			.await
	}

	fn step(&self, event: NavigationEvent) -> Option<Vec<NavigationEffect>> {
		match self.machine.lock().transition(event) {
			Ok((_, effects)) => Some(effects),
			Err(e) => {
				debug_log!("navigation superseded: {}", e);
				None
			}
		}
	}

	async fn run(&self, path: &str, kind: NavigationType) -> Result<bool, RouterError> {
		let path = normalize_path(path);
		let mut pending = self
			.machine
			.lock()
			.transition(NavigationEvent::Navigate {
				path: path.clone(),
				kind,
			})?
			.1;
		let mut resolved: Option<RouteMatch> = None;
		let mut outcome = false;

		while !pending.is_empty() {
			let mut next = Vec::new();
			for effect in pending {
				match effect {
					NavigationEffect::PushHistory(p) => self.history.lock().push(HistoryState::new(p)),
					NavigationEffect::ReplaceHistory(p) => {
						self.history.lock().replace(HistoryState::new(p))
					}
					NavigationEffect::Resolve { id, path } => {
						resolved = self.matcher.match_route(&path);
						let route_path = resolved.as_ref().map(|m| m.route.full_path().to_string());
						if route_path.is_none() {
							warn_log!("{}", RouterError::NotFound(path.clone()));
						}
						self.record_state(&path, resolved.as_ref());
						match self.step(NavigationEvent::Resolved { id, route_path }) {
							Some(effects) => next.extend(effects),
							None => return Ok(false),
						}
					}
					NavigationEffect::Render { id, .. } => {
						let rendered = match &resolved {
							Some(route_match) => self.render(route_match).await,
							None => false,
						};
						match self.step(NavigationEvent::Rendered { id, rendered }) {
							Some(effects) => next.extend(effects),
							None => return Ok(false),
						}
					}
					NavigationEffect::Finish { path, rendered, .. } => {
						outcome = rendered;
						if let Some(route_match) = &resolved {
							*self.current.write() = Some(route_match.clone());
							self.bus.emit(
								NAVIGATED_EVENT,
								json!({
									"path": path,
									"route": route_match.route.full_path(),
									"params": route_match.params,
									"rendered": rendered,
								}),
							);
						}
						info_log!("navigated to {} (rendered: {})", path, rendered);
					}
				}
			}
			pending = next;
		}
		Ok(outcome)
	}

	fn record_state(&self, path: &str, route_match: Option<&RouteMatch>) {
		let mut state = HistoryState::new(path);
		if let Some(m) = route_match {
			state = state
				.with_params(m.params.clone())
				.with_route_path(m.route.full_path());
		}
		let mut history = self.history.lock();
		if history.current().path == path {
			history.replace(state);
		}
	}

	/// Lets nested containers handle the new path in place before falling
	/// back to a full render from the document root.
	async fn render(&self, route_match: &RouteMatch) -> bool {
		let nested = self.nested_handlers(route_match);
		if !nested.is_empty() {
			debug_log!("{} nested container(s) handle {}", nested.len(), route_match.path);
			let mut handled = false;
			for container in nested {
				handled |= self.renderer.render_container(container, route_match).await;
			}
			if handled {
				return true;
			}
		}
		self.renderer
			.render_routes_components_in_page(self.dom.root(), route_match)
			.await
	}

	/// Connected scoped containers whose scope route is shared, with the
	/// same parameters, by the previous and the new match. Only the
	/// shallowest scope is kept; deeper containers are reached by recursion.
	fn nested_handlers(&self, route_match: &RouteMatch) -> Vec<NodeId> {
		let Some(previous) = self.current_match() else {
			return Vec::new();
		};
		let mut containers: Vec<NodeId> = self
			.renderer
			.cache()
			.get_cached_route_containers(self.dom.root())
			.to_vec();
		for occupied in self.renderer.occupied_containers() {
			if !containers.contains(&occupied) {
				containers.push(occupied);
			}
		}
		let mut handlers: Vec<(usize, NodeId)> = containers
			.into_iter()
			.filter(|&c| self.dom.is_connected(c))
			.filter_map(|c| {
				let scope = normalize_path(&self.dom.attribute(c, SCOPE_ATTR)?);
				let depth = route_match
					.chain()
					.iter()
					.position(|r| r.full_path() == scope)?;
				let unchanged = previous.includes(&scope)
					&& self.matcher.generate_url(&scope, &previous.params)
						== self.matcher.generate_url(&scope, &route_match.params);
				unchanged.then_some((depth, c))
			})
			.collect();
		let Some(shallowest) = handlers.iter().map(|(d, _)| *d).min() else {
			return Vec::new();
		};
		handlers.retain(|(d, _)| *d == shallowest);
		handlers.into_iter().map(|(_, c)| c).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::{ComponentBuilder, ComponentCategory, ComponentDefinition, ComponentHooks, ComponentRegistry};
	use crate::config::{CacheConfig, PoolConfig};
	use crate::dom::ROUTE_CONTAINER_TAG;
	use crate::router::{RecyclePool, RouteCache};
	use crate::events::SubscribeOptions;
	use rstest::{fixture, rstest};
	use std::time::Duration;

	struct Harness {
		router: Arc<Router>,
		builder: Arc<ComponentBuilder>,
		dom: Dom,
		bus: Arc<EventBus>,
		view: NodeId,
	}

	#[fixture]
	fn harness() -> Harness {
		let dom = Dom::new();
		let view = dom.create_child(dom.root(), ROUTE_CONTAINER_TAG);
		let bus = Arc::new(EventBus::new());
		let registry = ComponentRegistry::new(bus.clone(), dom.clone());
		let builder = Arc::new(ComponentBuilder::new(registry));
		for name in ["HomePage", "UserPage", "NotFoundPage", "ProfileTab", "BillingTab"] {
			builder.define(ComponentDefinition::new(name, ComponentCategory::Visual));
		}
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
		let renderer = Arc::new(RouteRenderer::new(
			builder.clone(),
			RouteCache::new(dom.clone(), CacheConfig::default()),
			RecyclePool::new(PoolConfig::default()),
		));
		let router = Router::new(
			&[
				RouteDefinition::new("/", "HomePage"),
				RouteDefinition::new("/users/${id}", "UserPage"),
				RouteDefinition::new("/settings", "SettingsPage")
					.child(RouteDefinition::new("profile", "ProfileTab"))
					.child(RouteDefinition::new("billing", "BillingTab")),
				RouteDefinition::new("/404", "NotFoundPage"),
			],
			renderer,
			bus.clone(),
			EventThrottler::new(),
			&RouterConfig::default(),
			ThrottleConfig::default(),
		)
		.unwrap();
		Harness {
			router: Arc::new(router),
			builder,
			dom,
			bus,
			view,
		}
	}

	impl Harness {
		fn shown(&self, container: NodeId) -> Option<String> {
			let identity = self.router.renderer().occupant(container)?;
			self.builder
				.registry()
				.get(&identity)
				.map(|i| i.type_tag().to_string())
		}
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_navigate_pushes_history_and_renders(harness: Harness) {
		// Act
		let rendered = harness.router.navigate("/users/7").await.unwrap();

		// Assert
		assert!(rendered);
		assert_eq!(harness.router.current_path(), "/users/7");
		let state = harness.router.current_state();
		assert_eq!(state.route_path.as_deref(), Some("/users/${id}"));
		assert_eq!(state.params.get("id").map(String::as_str), Some("7"));
		assert!(harness.router.can_go_back());
		assert!(harness.router.state().is_idle());
		assert_eq!(harness.shown(harness.view).as_deref(), Some("UserPage"));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_back_and_forward(harness: Harness) {
		harness.router.navigate("/").await.unwrap();
		harness.router.navigate("/users/7").await.unwrap();

		harness.router.back().await.unwrap();
		let after_back = harness.shown(harness.view);
		harness.router.forward().await.unwrap();

		assert_eq!(after_back.as_deref(), Some("HomePage"));
		assert_eq!(harness.shown(harness.view).as_deref(), Some("UserPage"));
		assert!(harness.router.forward().await.is_err());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_replace_keeps_history_length(harness: Harness) {
		harness.router.navigate("/users/1").await.unwrap();

		harness.router.replace("/users/2").await.unwrap();

		assert_eq!(harness.router.current_path(), "/users/2");
		harness.router.back().await.unwrap();
		assert_eq!(harness.router.current_path(), "/");
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_unknown_path_renders_not_found(harness: Harness) {
		harness.router.navigate("/nope").await.unwrap();

		assert_eq!(harness.shown(harness.view).as_deref(), Some("NotFoundPage"));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_nested_container_gets_first_refusal(harness: Harness) {
		// Arrange
		harness.router.navigate("/settings/profile").await.unwrap();
		let settings = harness.router.renderer().occupant(harness.view).unwrap();

		// Act
		harness.router.navigate("/settings/billing").await.unwrap();

		// Assert
		assert_eq!(harness.router.renderer().occupant(harness.view), Some(settings.clone()));
		let host = harness.builder.registry().get(&settings).unwrap().host().unwrap();
		let nested = harness.dom.children(host)[0];
		assert_eq!(harness.shown(nested).as_deref(), Some("BillingTab"));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_navigated_event_emitted(harness: Harness) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let s = seen.clone();
		harness.bus.subscribe(
			NAVIGATED_EVENT,
			move |e| {
				s.lock().push(e.data["path"].clone());
				Ok(())
			},
			SubscribeOptions::default(),
		);

		harness.router.navigate("/users/3").await.unwrap();

		assert_eq!(*seen.lock(), vec![json!("/users/3")]);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_on_mutations_rerenders_new_container(harness: Harness) {
		// Arrange
		harness.router.navigate("/").await.unwrap();
		harness.dom.take_mutations();
		let second = harness.dom.create_child(harness.dom.root(), ROUTE_CONTAINER_TAG);

		// Act
		let invalidated = harness.router.on_mutations();
		tokio::time::sleep(Duration::from_millis(50)).await;

		// Assert
		assert_eq!(invalidated, 1);
		assert_eq!(harness.shown(second).as_deref(), Some("HomePage"));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_handle_location_change_renders_current(harness: Harness) {
		let rendered = harness.router.handle_location_change().await.unwrap();

		assert!(rendered);
		assert_eq!(harness.shown(harness.view).as_deref(), Some("HomePage"));
	}

	#[rstest]
	fn test_generate_url(harness: Harness) {
		assert_eq!(harness.router.generate_url("/users/${id}", &[("id", "9")]), "/users/9");
	}
}
