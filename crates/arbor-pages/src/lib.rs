//! Arbor Pages - Component Graph and Routing Runtime
//!
//! The coordination layer of a component-based frontend: it keeps track of
//! which component instances exist and how they nest, delivers events between
//! them, holds shared state, and maps URLs onto component trees.
//!
//! ## Features
//!
//! - **Component Graph**: Identity-keyed registry with parent/child links and
//!   cascading, idempotent destruction
//! - **Event Bus**: Ordered delivery with per-owner cleanup and one-shot
//!   subscriptions
//! - **Shared State**: Named cells with selector-filtered watches and optional
//!   snapshot persistence
//! - **Client Router**: Static-first matching, nested route containers,
//!   recycle pool and a navigation state machine
//!
//! ## Architecture
//!
//! - [`dom`]: In-memory host tree with mutation records
//! - [`component`]: Instances, registry and builder
//! - [`events`]: Event bus and throttler
//! - [`state`]: Shared state store and snapshot backends
//! - [`router`]: Matching, container discovery, rendering and navigation
//! - [`runtime`]: Composition root wiring all of the above
//! - [`config`]: TOML-loadable tuning knobs
//!
//! ## Example
//!
//! ```
//! use arbor_pages::{ComponentCategory, ComponentDefinition, RouteDefinition, Runtime, RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), arbor_pages::ArborError> {
//! let runtime = Runtime::builder(RuntimeConfig::default())
//!     .with_component(ComponentDefinition::new("UserPage", ComponentCategory::Visual))
//!     .with_routes(vec![RouteDefinition::new("/users/${id}", "UserPage")])
//!     .build()?;
//! runtime
//!     .dom()
//!     .create_child(runtime.dom().root(), arbor_pages::dom::ROUTE_CONTAINER_TAG);
//!
//! runtime.router().navigate("/users/7").await?;
//! assert_eq!(runtime.router().current_path(), "/users/7");
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod config;
pub mod dom;
pub mod error;
pub mod events;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod state;

pub use component::{
	ComponentBuilder, ComponentCategory, ComponentDefinition, ComponentInstance, ComponentRegistry,
};
pub use config::RuntimeConfig;
pub use dom::{Dom, NodeId};
pub use error::{ArborError, BuildError, BusError, RegistryError, RouterError, StateError};
pub use events::{EventBus, EventThrottler};
pub use router::{RouteDefinition, Router};
pub use runtime::{Runtime, RuntimeBuilder};
pub use state::SharedStateStore;
