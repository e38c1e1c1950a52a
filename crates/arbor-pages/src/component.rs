//! Component instances, the registry that owns them, and the builder that
//! creates them.

pub mod builder;
pub mod instance;
pub mod registry;

pub use builder::{
	ComponentBuilder, ComponentDefinition, StaticTemplateProvider, TemplateKind, TemplateProvider,
};
pub use instance::{
	BeforeDestroyHook, CleanupHook, ComponentCategory, ComponentHooks, ComponentInstance, InitHook,
	Params, UpdateHook,
};
pub use registry::{ComponentRegistry, DestroyTarget};
