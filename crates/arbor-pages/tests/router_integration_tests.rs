//! Router Integration Tests
//!
//! End-to-end tests driving the router through a fully wired [`Runtime`].
//!
//! Success Criteria:
//! 1. Static routes win over dynamic patterns covering the same path
//! 2. Container discovery is memoized and invalidated by relevant mutations
//! 3. Navigating away pools the displaced page and history traversal reuses it
//! 4. Nested containers keep their parent page across sibling navigations
//!
//! Test Categories:
//! - Category 1: Matching (2 tests)
//! - Category 2: Container Cache (2 tests)
//! - Category 3: Navigation and Reuse (3 tests)

use arbor_pages::component::{ComponentCategory, ComponentDefinition, ComponentHooks};
use arbor_pages::config::RuntimeConfig;
use arbor_pages::dom::{NodeId, ROUTE_CONTAINER_TAG, SCOPE_ATTR};
use arbor_pages::router::{RouteDefinition, RouteMatcher};
use arbor_pages::runtime::Runtime;
use rstest::*;
use std::sync::Arc;

struct App {
	runtime: Runtime,
	view: NodeId,
}

impl App {
	fn shown(&self, container: NodeId) -> Option<String> {
		let identity = self.runtime.renderer().occupant(container)?;
		self.runtime
			.registry()
			.get(&identity)
			.map(|i| i.type_tag().to_string())
	}
}

fn routes() -> Vec<RouteDefinition> {
	vec![
		RouteDefinition::new("/", "HomePage"),
		RouteDefinition::new("/users/new", "NewUserPage"),
		RouteDefinition::new("/users/${id}", "UserPage"),
		RouteDefinition::new("/settings", "SettingsPage")
			.child(RouteDefinition::new("profile", "ProfileTab"))
			.child(RouteDefinition::new("billing", "BillingTab")),
		RouteDefinition::new("/404", "NotFoundPage"),
	]
}

#[fixture]
fn app() -> App {
	let mut builder = Runtime::builder(RuntimeConfig::default()).with_routes(routes());
	for name in [
		"HomePage",
		"NewUserPage",
		"UserPage",
		"ProfileTab",
		"BillingTab",
		"NotFoundPage",
	] {
		builder = builder.with_component(ComponentDefinition::new(name, ComponentCategory::Visual));
	}
	let runtime = builder
		.with_component(
			ComponentDefinition::new("SettingsPage", ComponentCategory::Visual).with_hooks(|| {
				ComponentHooks::new().on_init(|instance, dom| {
					if let Some(host) = instance.host() {
						let nested = dom.create_child(host, ROUTE_CONTAINER_TAG);
						dom.set_attribute(nested, SCOPE_ATTR, "/settings");
					}
					Ok(())
				})
			}),
		)
		.build()
		.unwrap();
	let main = runtime.dom().create_child(runtime.dom().root(), "main");
	let view = runtime.dom().create_child(main, ROUTE_CONTAINER_TAG);
	App { runtime, view }
}

// ============================================================================
// Category 1: Matching (2 tests)
// ============================================================================

/// Tests that a static route shadows the dynamic pattern for its exact path
#[rstest]
#[case("/users/new", "NewUserPage", None)]
#[case("/users/42", "UserPage", Some("42"))]
#[case("/users/42/", "UserPage", Some("42"))]
#[case("/missing", "NotFoundPage", None)]
fn test_static_before_dynamic(
	#[case] path: &str,
	#[case] component: &str,
	#[case] id: Option<&str>,
) {
	let matcher = RouteMatcher::new(&routes(), "/404").unwrap();

	let m = matcher.match_route(path).unwrap();

	assert_eq!(m.route.component(), component);
	assert_eq!(m.params.get("id").map(String::as_str), id);
}

/// Tests that a route table loaded from JSON flattens nested children
#[rstest]
fn test_route_table_from_json() {
	let json = r#"[
		{"path": "/", "component": "HomePage"},
		{"path": "/docs", "component": "DocsPage", "reuse": true, "children": [
			{"path": "${slug}", "component": "DocPage"}
		]}
	]"#;
	let definitions: Vec<RouteDefinition> = serde_json::from_str(json).unwrap();

	let matcher = RouteMatcher::new(&definitions, "/404").unwrap();
	let m = matcher.match_route("/docs/intro").unwrap();

	assert_eq!(m.route.component(), "DocPage");
	assert_eq!(m.route.parent(), Some("/docs"));
	assert!(matcher.get("/docs").unwrap().reuse());
	assert_eq!(matcher.generate_url("/docs/${slug}", &Default::default()), "/docs/slug");
}

// ============================================================================
// Category 2: Container Cache (2 tests)
// ============================================================================

/// Tests that repeated discovery returns the memoized set
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_cache_returns_same_set_within_ttl(app: App) {
	let cache = app.runtime.renderer().cache();
	let root = app.runtime.dom().root();

	let first = cache.get_cached_route_containers(root);
	let second = cache.get_cached_route_containers(root);

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(&*first, &[app.view]);
}

/// Tests that adding a container invalidates the memo and re-renders it
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_mutation_invalidates_and_rerenders(app: App) {
	// Arrange
	app.runtime.router().navigate("/").await.unwrap();
	let cache = app.runtime.renderer().cache();
	let before = cache.get_cached_route_containers(app.runtime.dom().root());
	app.runtime.dom().take_mutations();
	let aside = app
		.runtime
		.dom()
		.create_child(app.runtime.dom().root(), ROUTE_CONTAINER_TAG);

	// Act
	assert!(app.runtime.router().on_mutations() > 0);
	tokio::time::sleep(std::time::Duration::from_millis(100)).await;
	let after = cache.get_cached_route_containers(app.runtime.dom().root());

	// Assert
	assert!(!Arc::ptr_eq(&before, &after));
	assert_eq!(after.len(), 2);
	assert_eq!(app.shown(aside).as_deref(), Some("HomePage"));
}

// ============================================================================
// Category 3: Navigation and Reuse (3 tests)
// ============================================================================

/// Tests that back then forward reuses the pooled page instead of building
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_history_traversal_reuses_pooled_page(app: App) {
	// Arrange
	let router = app.runtime.router();
	router.navigate("/").await.unwrap();
	router.navigate("/users/7").await.unwrap();
	let user_page = app.runtime.renderer().occupant(app.view).unwrap();

	// Act
	router.back().await.unwrap();
	let pooled = app.runtime.renderer().pool().contains(&user_page);
	router.forward().await.unwrap();

	// Assert
	assert!(pooled);
	assert_eq!(app.runtime.components().build_count("UserPage"), 1);
	assert_eq!(app.runtime.components().build_count("HomePage"), 1);
	assert_eq!(app.runtime.renderer().occupant(app.view), Some(user_page));
	assert_eq!(router.current_path(), "/users/7");
	assert!(app.runtime.registry().is_consistent());
}

/// Tests that the displaced page's props are refreshed on reuse
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_reused_page_receives_new_params(app: App) {
	let router = app.runtime.router();
	router.navigate("/users/7").await.unwrap();
	router.navigate("/").await.unwrap();

	router.navigate("/users/8").await.unwrap();

	let identity = app.runtime.renderer().occupant(app.view).unwrap();
	let page = app.runtime.registry().get(&identity).unwrap();
	assert_eq!(page.props()["id"], "8");
	assert_eq!(app.runtime.components().build_count("UserPage"), 1);
}

/// Tests that sibling child routes only swap the nested container
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_sibling_child_routes_keep_parent(app: App) {
	// Arrange
	let router = app.runtime.router();
	router.navigate("/settings/profile").await.unwrap();
	let settings = app.runtime.renderer().occupant(app.view).unwrap();
	let host = app
		.runtime
		.registry()
		.get(&settings)
		.unwrap()
		.host()
		.unwrap();
	let nested = app.runtime.dom().children(host)[0];

	// Act
	router.navigate("/settings/billing").await.unwrap();

	// Assert
	assert_eq!(app.shown(app.view).as_deref(), Some("SettingsPage"));
	assert_eq!(app.runtime.renderer().occupant(app.view), Some(settings));
	assert_eq!(app.shown(nested).as_deref(), Some("BillingTab"));
	assert_eq!(app.runtime.components().build_count("SettingsPage"), 1);
}
