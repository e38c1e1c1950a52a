//! # Arbor
//!
//! A runtime for component-based frontends, written in Rust.
//!
//! Arbor keeps the bookkeeping a page needs once it is split into components:
//! which instances exist and how they nest, who listens to what, which state
//! is shared, and which component tree a URL should produce. Rendering itself
//! is left to the embedding application; Arbor drives an in-memory host tree
//! and reports what changed.
//!
//! ## Core Principles
//!
//! - **Explicit Wiring**: Every service is constructed once by [`Runtime`] and
//!   passed where it is needed; there are no globals
//! - **Log, Don't Throw**: Runtime failures are logged through `tracing` and the
//!   page is left as it was
//! - **Async Where It Matters**: Building, destroying and navigating are async;
//!   everything else is synchronous
//!
//! ## Feature Flags
//!
//! - `debug-hooks` - Emits graph and cache tracing at `DEBUG` level
//!
//! ## Quick Example
//!
//! ```rust
//! use arbor::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ArborError> {
//! let runtime = Runtime::builder(RuntimeConfig::default())
//!     .with_component(ComponentDefinition::new("HomePage", ComponentCategory::Visual))
//!     .with_routes(vec![RouteDefinition::new("/", "HomePage")])
//!     .build()?;
//! runtime.dom().create_child(runtime.dom().root(), ROUTE_CONTAINER_TAG);
//!
//! runtime.router().navigate("/").await?;
//! assert_eq!(runtime.components().build_count("HomePage"), 1);
//! # Ok(())
//! # }
//! ```

pub mod pages;

pub use arbor_pages::{
	ArborError, ComponentBuilder, ComponentCategory, ComponentDefinition, ComponentInstance,
	ComponentRegistry, Dom, EventBus, EventThrottler, NodeId, RouteDefinition, Router, Runtime,
	RuntimeBuilder, RuntimeConfig, SharedStateStore,
};

/// Commonly used types.
pub mod prelude {
	pub use arbor_pages::component::{ComponentHooks, Params};
	pub use arbor_pages::dom::ROUTE_CONTAINER_TAG;
	pub use arbor_pages::events::SubscribeOptions;
	pub use arbor_pages::state::{CellOptions, StateUpdate};
	pub use arbor_pages::{
		ArborError, ComponentCategory, ComponentDefinition, RouteDefinition, Runtime,
		RuntimeConfig,
	};
}
