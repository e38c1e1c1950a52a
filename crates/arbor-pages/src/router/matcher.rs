//! Route table flattening and path resolution.
//!
//! Nested [`RouteDefinition`]s are flattened into one [`ResolvedRoute`] per
//! distinct full path. Paths without placeholders go into a static map that
//! is checked first; patterned paths are compiled once and scanned in
//! declaration order.

use super::pattern::{RoutePattern, join_paths, normalize_path, substitute};
use crate::debug_log;
use crate::error::RouterError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One node of the declarative route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
	/// Path segment, may contain `${param}` placeholders.
	pub path: String,
	/// Component rendered for this route.
	pub component: String,
	/// Reuse an existing instance instead of rebuilding on re-navigation.
	#[serde(default)]
	pub reuse: bool,
	/// Nested routes.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<RouteDefinition>,
}

impl RouteDefinition {
	/// Creates a leaf route.
	pub fn new(path: impl Into<String>, component: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			component: component.into(),
			reuse: false,
			children: Vec::new(),
		}
	}

	/// Marks the route as reusable.
	pub fn reusable(mut self) -> Self {
		self.reuse = true;
		self
	}

	/// Adds a nested route.
	pub fn child(mut self, child: RouteDefinition) -> Self {
		self.children.push(child);
		self
	}
}

/// A route flattened to its full path.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
	full_path: String,
	component: String,
	reuse: bool,
	parent: Option<String>,
	pattern: Option<RoutePattern>,
}

impl ResolvedRoute {
	/// Full normalized path, placeholders included.
	pub fn full_path(&self) -> &str {
		&self.full_path
	}

	/// Component name.
	pub fn component(&self) -> &str {
		&self.component
	}

	/// Whether the route asked for instance reuse.
	pub fn reuse(&self) -> bool {
		self.reuse
	}

	/// Full path of the parent route, for nested routes.
	pub fn parent(&self) -> Option<&str> {
		self.parent.as_deref()
	}

	/// Compiled pattern of a dynamic route.
	pub fn pattern(&self) -> Option<&RoutePattern> {
		self.pattern.as_ref()
	}

	/// Whether the path has placeholders.
	pub fn is_dynamic(&self) -> bool {
		self.pattern.is_some()
	}
}

/// Result of [`RouteMatcher::match_route`].
///
/// `chain` runs from the top-level route down to the matched route, so a
/// container scoped to a parent route can find the child it renders.
#[derive(Debug, Clone)]
pub struct RouteMatch {
	/// The matched route.
	pub route: Arc<ResolvedRoute>,
	/// Extracted parameters.
	pub params: HashMap<String, String>,
	/// The path that was matched.
	pub path: String,
	chain: Vec<Arc<ResolvedRoute>>,
}

impl RouteMatch {
	/// Parent route of the matched route, if nested.
	pub fn parent(&self) -> Option<&Arc<ResolvedRoute>> {
		self.chain.len().checked_sub(2).map(|i| &self.chain[i])
	}

	/// Routes from the top level down to the matched route.
	pub fn chain(&self) -> &[Arc<ResolvedRoute>] {
		&self.chain
	}

	/// The route a container with `scope` renders.
	///
	/// A container without scope renders the top-level route; a container
	/// scoped to a route in the chain renders that route's child.
	pub fn route_for_scope(&self, scope: Option<&str>) -> Option<&Arc<ResolvedRoute>> {
		match scope {
			None => self.chain.first(),
			Some(scope) => {
				let scope = normalize_path(scope);
				let position = self.chain.iter().position(|r| r.full_path == scope)?;
				self.chain.get(position + 1)
			}
		}
	}

	/// The child of `route` in this match, if any.
	pub fn child_of(&self, route: &str) -> Option<&Arc<ResolvedRoute>> {
		self.route_for_scope(Some(route))
	}

	/// Whether `route` is the matched route or one of its ancestors.
	pub fn includes(&self, route: &str) -> bool {
		self.chain.iter().any(|r| r.full_path == route)
	}
}

/// Resolves paths against a flattened route table.
pub struct RouteMatcher {
	routes: Vec<Arc<ResolvedRoute>>,
	by_path: HashMap<String, usize>,
	static_routes: HashMap<String, usize>,
	dynamic_routes: Vec<usize>,
	not_found: Option<usize>,
}

impl fmt::Debug for RouteMatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RouteMatcher")
			.field("routes", &self.routes.len())
			.field("static", &self.static_routes.len())
			.field("dynamic", &self.dynamic_routes.len())
			.field("has_not_found", &self.not_found.is_some())
			.finish()
	}
}

impl RouteMatcher {
	/// Flattens and compiles `definitions`.
	///
	/// A full path declared twice keeps its first declaration. The route at
	/// `not_found_path`, if declared, is the fallback for unmatched paths.
	///
	/// # Errors
	///
	/// Returns [`RouterError::InvalidPattern`] if a dynamic path fails to
	/// compile.
	pub fn new(definitions: &[RouteDefinition], not_found_path: &str) -> Result<Self, RouterError> {
		let mut matcher = Self {
			routes: Vec::new(),
			by_path: HashMap::new(),
			static_routes: HashMap::new(),
			dynamic_routes: Vec::new(),
			not_found: None,
		};
		for definition in definitions {
			matcher.flatten(definition, None)?;
		}
		matcher.not_found = matcher.static_routes.get(&normalize_path(not_found_path)).copied();
		debug_log!("route table built: {:?}", matcher);
		Ok(matcher)
	}

	fn flatten(&mut self, definition: &RouteDefinition, parent: Option<&str>) -> Result<(), RouterError> {
		let full_path = match parent {
			Some(parent) => join_paths(parent, &definition.path),
			None => normalize_path(&definition.path),
		};

		if !self.by_path.contains_key(&full_path) {
			let pattern = if RoutePattern::is_dynamic(&full_path) {
				Some(RoutePattern::new(&full_path)?)
			} else {
				None
			};
			let index = self.routes.len();
			if pattern.is_some() {
				self.dynamic_routes.push(index);
			} else {
				self.static_routes.insert(full_path.clone(), index);
			}
			self.by_path.insert(full_path.clone(), index);
			self.routes.push(Arc::new(ResolvedRoute {
				full_path: full_path.clone(),
				component: definition.component.clone(),
				reuse: definition.reuse,
				parent: parent.map(str::to_string),
				pattern,
			}));
		}

		for child in &definition.children {
			self.flatten(child, Some(&full_path))?;
		}
		Ok(())
	}

	/// Resolves `path`: static routes first, then dynamic routes in
	/// declaration order, then the not-found route.
	pub fn match_route(&self, path: &str) -> Option<RouteMatch> {
		let path = normalize_path(path);

		if let Some(&index) = self.static_routes.get(&path) {
			return Some(self.build_match(index, HashMap::new(), path));
		}
		for &index in &self.dynamic_routes {
			if let Some(pattern) = &self.routes[index].pattern
				&& let Some(params) = pattern.matches(&path)
			{
				return Some(self.build_match(index, params, path));
			}
		}
		self.not_found
			.map(|index| self.build_match(index, HashMap::new(), path))
	}

	fn build_match(&self, index: usize, params: HashMap<String, String>, path: String) -> RouteMatch {
		let route = Arc::clone(&self.routes[index]);
		let mut chain = vec![Arc::clone(&route)];
		let mut parent = route.parent.clone();
		while let Some(p) = parent {
			match self.get(&p) {
				Some(r) => {
					parent = r.parent.clone();
					chain.push(r);
				}
				None => break,
			}
		}
		chain.reverse();
		RouteMatch {
			route,
			params,
			path,
			chain,
		}
	}

	/// Looks up a route by full path.
	pub fn get(&self, full_path: &str) -> Option<Arc<ResolvedRoute>> {
		self.by_path
			.get(&normalize_path(full_path))
			.map(|&i| Arc::clone(&self.routes[i]))
	}

	/// Whether a not-found route is declared.
	pub fn has_not_found(&self) -> bool {
		self.not_found.is_some()
	}

	/// Whether `route_match` resolved to the not-found fallback.
	pub fn is_not_found(&self, route_match: &RouteMatch) -> bool {
		self.not_found
			.is_some_and(|i| Arc::ptr_eq(&self.routes[i], &route_match.route))
			&& route_match.route.full_path != route_match.path
	}

	/// Substitutes `params` into `route_path`. Missing parameters fall back to
	/// their placeholder names.
	pub fn generate_url(&self, route_path: &str, params: &HashMap<String, String>) -> String {
		normalize_path(&substitute(route_path, params))
	}

	/// Same as [`RouteMatcher::generate_url`].
	pub fn reverse(&self, route_path: &str, params: &HashMap<String, String>) -> String {
		self.generate_url(route_path, params)
	}

	/// All routes in declaration order.
	pub fn routes(&self) -> &[Arc<ResolvedRoute>] {
		&self.routes
	}

	/// Number of flattened routes.
	pub fn len(&self) -> usize {
		self.routes.len()
	}

	/// Whether the table is empty.
	pub fn is_empty(&self) -> bool {
		self.routes.is_empty()
	}
}
