//! Client-side router.
//!
//! The pipeline, from a navigation request to rendered components:
//!
//! - [`RouteMatcher`]: flattened route table, static paths before `${param}`
//!   patterns, then the not-found route
//! - [`RouteCache`]: memoized route-container discovery per root
//! - [`RouteRenderer`]: occupant reuse, pooling and building per container
//! - [`Router`]: history, the navigation state machine and nested-container
//!   first refusal
//!
//! ## Example
//!
//! ```
//! use arbor_pages::router::{RouteDefinition, RouteMatcher};
//!
//! let matcher = RouteMatcher::new(
//!     &[
//!         RouteDefinition::new("/", "HomePage"),
//!         RouteDefinition::new("/users/${id}", "UserPage"),
//!         RouteDefinition::new("/404", "NotFoundPage"),
//!     ],
//!     "/404",
//! )
//! .unwrap();
//!
//! let m = matcher.match_route("/users/42").unwrap();
//! assert_eq!(m.route.component(), "UserPage");
//! assert_eq!(m.params["id"], "42");
//! assert_eq!(matcher.match_route("/unknown").unwrap().route.component(), "NotFoundPage");
//! ```

pub mod cache;
pub mod core;
pub mod history;
pub mod matcher;
pub mod navigation;
pub mod pattern;
pub mod pool;
pub mod renderer;

pub use cache::RouteCache;
pub use core::{MUTATION_THROTTLE_KEY, NAVIGATED_EVENT, Router};
pub use history::{History, HistoryState, NavigationType};
pub use matcher::{ResolvedRoute, RouteDefinition, RouteMatch, RouteMatcher};
pub use navigation::{
	NavigationEffect, NavigationEvent, NavigationId, NavigationMachine, NavigationState,
};
pub use pattern::{RoutePattern, join_paths, normalize_path};
pub use pool::RecyclePool;
pub use renderer::{RouteRenderer, SweepReport};
