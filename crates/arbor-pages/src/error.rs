//! Error types for the component graph and routing runtime.
//!
//! Most operations report "not found" conditions through the logging macros
//! and return a sentinel instead of an error. The enums below cover the
//! failures that are surfaced explicitly.

use thiserror::Error;

/// Errors raised by [`ComponentRegistry`](crate::component::ComponentRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
	/// The identity is already held by a registered instance.
	#[error("Duplicate identity: {0}")]
	DuplicateIdentity(String),
	/// No registered instance has this identity.
	#[error("Identity not found: {0}")]
	NotFound(String),
}

/// Errors raised by [`EventBus`](crate::events::EventBus).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
	/// The subscription cannot be addressed (empty event name).
	#[error("Invalid callback registration for event '{0}'")]
	InvalidCallback(String),
	/// A subscriber reported a failure while handling an event.
	#[error("Subscriber failed: {0}")]
	Subscriber(String),
}

/// Errors raised by [`SharedStateStore`](crate::state::SharedStateStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
	/// A cell with this name already exists.
	#[error("State cell already exists: {0}")]
	AlreadyExists(String),
	/// No cell with this name exists.
	#[error("State cell not found: {0}")]
	NotFound(String),
	/// Watches must be owned by an instance with an identity.
	#[error("Watcher owner has no identity")]
	OwnerWithoutIdentity,
	/// Snapshot load/save failed.
	#[error("Persistence failed for '{key}': {message}")]
	Persistence {
		/// Snapshot key.
		key: String,
		/// Backend message.
		message: String,
	},
}

/// Errors raised while building a component instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
	/// No definition registered under this name.
	#[error("Unknown component: {0}")]
	Unknown(String),
	/// Structural components are singletons owned by the runtime.
	#[error("Structural component '{0}' cannot be built")]
	Structural(String),
	/// Template or style text could not be fetched.
	#[error("Failed to load {kind} for '{name}': {message}")]
	Template {
		/// Component name.
		name: String,
		/// Resource kind (`html` or `css`).
		kind: String,
		/// Provider message.
		message: String,
	},
	/// The init hook failed.
	#[error("Init hook failed for '{name}': {message}")]
	Init {
		/// Component name.
		name: String,
		/// Hook message.
		message: String,
	},
	/// Registration of the new instance failed.
	#[error(transparent)]
	Registration(#[from] RegistryError),
}

/// Errors raised by the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
	/// Route not found.
	#[error("Route not found: {0}")]
	NotFound(String),
	/// The route pattern could not be compiled.
	#[error("Invalid route pattern '{pattern}': {message}")]
	InvalidPattern {
		/// Offending pattern.
		pattern: String,
		/// Compiler message.
		message: String,
	},
	/// Missing parameter for reverse URL.
	#[error("Missing parameter: {0}")]
	MissingParameter(String),
	/// Navigation failed.
	#[error("Navigation failed: {0}")]
	NavigationFailed(String),
}

/// Failure reported by a component lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
	/// Creates a hook error from any message.
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// Aggregate error for callers that want a single type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArborError {
	/// Registry failure.
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// Event bus failure.
	#[error(transparent)]
	Bus(#[from] BusError),
	/// Shared state failure.
	#[error(transparent)]
	State(#[from] StateError),
	/// Build failure.
	#[error(transparent)]
	Build(#[from] BuildError),
	/// Router failure.
	#[error(transparent)]
	Router(#[from] RouterError),
	/// Hook failure.
	#[error(transparent)]
	Hook(#[from] HookError),
	/// Configuration could not be parsed.
	#[error("Invalid configuration: {0}")]
	Config(String),
}
