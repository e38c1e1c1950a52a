//! Component graph and routing runtime
//!
//! This module provides access to arbor-pages, the coordination layer that
//! tracks component instances, delivers events between them, holds shared
//! state and maps URLs onto component trees.
//!
//! ## Architecture
//!
//! - **Component Registry**: Identity-keyed graph with cascading destroy
//! - **Event Bus**: Ordered, owner-scoped subscriptions
//! - **Shared State**: Named cells with selector watches and snapshots
//! - **Routing**: Static-first matching, nested containers and a recycle pool
//!
//! ## Example
//!
//! ```rust
//! use arbor::pages::router::{RouteDefinition, RouteMatcher};
//!
//! let matcher = RouteMatcher::new(&[RouteDefinition::new("/users/${id}", "UserPage")], "/404")
//!     .unwrap();
//! assert_eq!(matcher.match_route("/users/5").unwrap().params["id"], "5");
//! ```

pub use arbor_pages::*;
