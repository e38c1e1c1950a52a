//! Building component instances from registered definitions.
//!
//! A build fetches the component's template (and, once per component name,
//! its styles) through a [`TemplateProvider`], creates a detached host
//! element, runs the init hook and registers the result. Failures are caught
//! at this boundary: [`ComponentBuilder::build`] logs and returns `None`.

use super::instance::{ComponentCategory, ComponentHooks, ComponentInstance, Params};
use super::registry::ComponentRegistry;
use crate::error::BuildError;
use crate::{error_log, info_log};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Kind of text resource a component needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
	/// Markup.
	Html,
	/// Styles.
	Css,
}

impl fmt::Display for TemplateKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Html => f.write_str("html"),
			Self::Css => f.write_str("css"),
		}
	}
}

/// Supplies template and style text by logical component name.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
	/// Fetches the `kind` resource for component `name`.
	async fn fetch_text(
		&self,
		name: &str,
		kind: TemplateKind,
		category: Option<ComponentCategory>,
	) -> Result<String, BuildError>;
}

/// In-memory [`TemplateProvider`].
#[derive(Debug, Default)]
pub struct StaticTemplateProvider {
	entries: RwLock<HashMap<(String, TemplateKind), String>>,
}

impl StaticTemplateProvider {
	/// Creates an empty provider.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a resource.
	pub fn with(self, name: &str, kind: TemplateKind, text: impl Into<String>) -> Self {
		self.insert(name, kind, text);
		self
	}

	/// Adds or replaces a resource.
	pub fn insert(&self, name: &str, kind: TemplateKind, text: impl Into<String>) {
		self.entries
			.write()
			.insert((name.to_string(), kind), text.into());
	}
}

#[async_trait]
impl TemplateProvider for StaticTemplateProvider {
	async fn fetch_text(
		&self,
		name: &str,
		kind: TemplateKind,
		_category: Option<ComponentCategory>,
	) -> Result<String, BuildError> {
		self.entries
			.read()
			.get(&(name.to_string(), kind))
			.cloned()
			.ok_or_else(|| BuildError::Template {
				name: name.to_string(),
				kind: kind.to_string(),
				message: "no such resource".to_string(),
			})
	}
}

type HooksFactory = Arc<dyn Fn() -> ComponentHooks + Send + Sync>;

/// Describes how to build one kind of component.
#[derive(Clone)]
pub struct ComponentDefinition {
	name: String,
	category: ComponentCategory,
	host_tag: String,
	fetch_template: bool,
	fetch_styles: bool,
	hooks: HooksFactory,
}

impl fmt::Debug for ComponentDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentDefinition")
			.field("name", &self.name)
			.field("category", &self.category)
			.field("host_tag", &self.host_tag)
			.field("fetch_template", &self.fetch_template)
			.field("fetch_styles", &self.fetch_styles)
			.finish()
	}
}

impl ComponentDefinition {
	/// Creates a definition with no hooks that fetches no resources.
	///
	/// The host tag defaults to the kebab-cased name (`UserPage` ->
	/// `user-page`).
	pub fn new(name: impl Into<String>, category: ComponentCategory) -> Self {
		let name = name.into();
		Self {
			host_tag: kebab_case(&name),
			name,
			category,
			fetch_template: false,
			fetch_styles: false,
			hooks: Arc::new(ComponentHooks::default),
		}
	}

	/// Fetches the HTML template on build.
	pub fn with_template(mut self) -> Self {
		self.fetch_template = true;
		self
	}

	/// Fetches the stylesheet the first time this component is built.
	pub fn with_styles(mut self) -> Self {
		self.fetch_styles = true;
		self
	}

	/// Overrides the host element tag.
	pub fn with_host_tag(mut self, tag: impl Into<String>) -> Self {
		self.host_tag = tag.into();
		self
	}

	/// Hooks installed on every built instance.
	pub fn with_hooks<F>(mut self, factory: F) -> Self
	where
		F: Fn() -> ComponentHooks + Send + Sync + 'static,
	{
		self.hooks = Arc::new(factory);
		self
	}

	/// Component name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Category.
	pub fn category(&self) -> ComponentCategory {
		self.category
	}
}

fn kebab_case(name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 4);
	for (i, c) in name.chars().enumerate() {
		if c.is_ascii_uppercase() {
			if i > 0 {
				out.push('-');
			}
			out.push(c.to_ascii_lowercase());
		} else {
			out.push(c);
		}
	}
	out
}

/// Builds and registers component instances.
pub struct ComponentBuilder {
	registry: Arc<ComponentRegistry>,
	templates: Option<Arc<dyn TemplateProvider>>,
	definitions: RwLock<HashMap<String, ComponentDefinition>>,
	styles: RwLock<HashMap<String, String>>,
	style_attempts: RwLock<HashSet<String>>,
	built: RwLock<HashMap<String, usize>>,
}

impl fmt::Debug for ComponentBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentBuilder")
			.field("definitions", &self.definitions.read().len())
			.field("has_templates", &self.templates.is_some())
			.finish()
	}
}

impl ComponentBuilder {
	/// Creates a builder registering into `registry`.
	pub fn new(registry: Arc<ComponentRegistry>) -> Self {
		Self {
			registry,
			templates: None,
			definitions: RwLock::new(HashMap::new()),
			styles: RwLock::new(HashMap::new()),
			style_attempts: RwLock::new(HashSet::new()),
			built: RwLock::new(HashMap::new()),
		}
	}

	/// Sets the template provider.
	pub fn with_templates(mut self, provider: Arc<dyn TemplateProvider>) -> Self {
		self.templates = Some(provider);
		self
	}

	/// Adds or replaces a definition.
	pub fn define(&self, definition: ComponentDefinition) {
		self.definitions
			.write()
			.insert(definition.name.clone(), definition);
	}

	/// Whether a definition exists for `name`.
	pub fn is_defined(&self, name: &str) -> bool {
		self.definitions.read().contains_key(name)
	}

	/// The registry new instances are registered into.
	pub fn registry(&self) -> &Arc<ComponentRegistry> {
		&self.registry
	}

	/// Number of instances successfully built for `name`.
	pub fn build_count(&self, name: &str) -> usize {
		self.built.read().get(name).copied().unwrap_or(0)
	}

	/// Stylesheet text fetched for `name`.
	pub fn styles_for(&self, name: &str) -> Option<String> {
		self.styles.read().get(name).cloned()
	}

	/// Builds component `name`. Failures are logged and yield `None`.
	///
	/// A string `id` prop is used as the explicit identity.
	pub async fn build(
		&self,
		name: &str,
		props: Params,
		parent: Option<&str>,
	) -> Option<Arc<ComponentInstance>> {
		match self.try_build(name, props, parent).await {
			Ok(instance) => Some(instance),
			Err(e) => {
				error_log!("build of '{}' failed: {}", name, e);
				None
			}
		}
	}

	/// Builds component `name`, returning the failure.
	pub async fn try_build(
		&self,
		name: &str,
		props: Params,
		parent: Option<&str>,
	) -> Result<Arc<ComponentInstance>, BuildError> {
		let definition = self
			.definitions
			.read()
			.get(name)
			.cloned()
			.ok_or_else(|| BuildError::Unknown(name.to_string()))?;
		if definition.category == ComponentCategory::Structural {
			return Err(BuildError::Structural(name.to_string()));
		}

		let template = if definition.fetch_template {
			Some(self.fetch(name, TemplateKind::Html, definition.category).await?)
		} else {
			None
		};
		if definition.fetch_styles && self.style_attempts.write().insert(name.to_string()) {
			match self.fetch(name, TemplateKind::Css, definition.category).await {
				Ok(css) => {
					self.styles.write().insert(name.to_string(), css);
				}
				Err(e) => {
					self.style_attempts.write().remove(name);
					return Err(e);
				}
			}
		}

		let explicit = match props.get("id") {
			Some(Value::String(id)) => Some(id.clone()),
			_ => None,
		};

		let dom = self.registry.dom().clone();
		let host = match definition.category {
			ComponentCategory::Visual | ComponentCategory::Provider => {
				Some(dom.create_element(&definition.host_tag))
			}
			_ => None,
		};
		let mut instance = ComponentInstance::new(name, definition.category)
			.with_props(props)
			.with_hooks((definition.hooks)());
		if let Some(host) = host {
			instance = instance.with_host(host);
		}
		if let Some(template) = template {
			instance = instance.with_template(template);
		}

		let dispose_host = || {
			if let Some(host) = host {
				dom.dispose(host);
			}
		};

		if let Some(id) = explicit.as_deref()
			&& let Err(e) = self.registry.assign_identity(&instance, Some(id))
		{
			dispose_host();
			return Err(e.into());
		}

		if let Some(init) = instance.hooks().init.clone()
			&& let Err(e) = init(&instance, &dom)
		{
			dispose_host();
			return Err(BuildError::Init {
				name: name.to_string(),
				message: e.to_string(),
			});
		}

		let instance = Arc::new(instance);
		if let Err(e) = self.registry.register(Arc::clone(&instance), parent) {
			dispose_host();
			return Err(e.into());
		}

		*self.built.write().entry(name.to_string()).or_insert(0) += 1;
		info_log!(
			"built '{}' as '{}'",
			name,
			instance.identity().unwrap_or_default()
		);
		Ok(instance)
	}

	async fn fetch(
		&self,
		name: &str,
		kind: TemplateKind,
		category: ComponentCategory,
	) -> Result<String, BuildError> {
		match &self.templates {
			Some(provider) => provider.fetch_text(name, kind, Some(category)).await,
			None => Err(BuildError::Template {
				name: name.to_string(),
				kind: kind.to_string(),
				message: "no template provider configured".to_string(),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::{Dom, IDENTITY_ATTR};
	use crate::error::HookError;
	use crate::events::EventBus;
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn builder() -> ComponentBuilder {
		let registry = ComponentRegistry::new(Arc::new(EventBus::new()), Dom::new());
		let templates = StaticTemplateProvider::new()
			.with("UserPage", TemplateKind::Html, "<h1>user</h1>")
			.with("UserPage", TemplateKind::Css, "h1 { color: red }");
		let builder = ComponentBuilder::new(registry).with_templates(Arc::new(templates));
		builder.define(
			ComponentDefinition::new("UserPage", ComponentCategory::Visual)
				.with_template()
				.with_styles(),
		);
		builder.define(ComponentDefinition::new("AppShell", ComponentCategory::Structural));
		builder.define(ComponentDefinition::new("Chart", ComponentCategory::Visual).with_template());
		builder
	}

	#[rstest]
	#[case("UserPage", "user-page")]
	#[case("Card", "card")]
	#[case("user-card", "user-card")]
	fn test_kebab_case(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(kebab_case(input), expected);
	}

	#[rstest]
	#[tokio::test]
	async fn test_build_registers_with_template(builder: ComponentBuilder) {
		// Act
		let instance = builder.build("UserPage", Params::new(), None).await.unwrap();

		// Assert
		let identity = instance.identity().unwrap();
		assert_eq!(identity, "userpage-1");
		assert_eq!(instance.template(), Some("<h1>user</h1>"));
		assert!(builder.registry().contains(&identity));
		let host = instance.host().unwrap();
		assert_eq!(builder.registry().dom().tag(host).as_deref(), Some("user-page"));
		assert_eq!(
			builder.registry().dom().attribute(host, IDENTITY_ATTR),
			Some(identity)
		);
		assert_eq!(builder.styles_for("UserPage").as_deref(), Some("h1 { color: red }"));
		assert_eq!(builder.build_count("UserPage"), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_structural_cannot_be_built(builder: ComponentBuilder) {
		let result = builder.try_build("AppShell", Params::new(), None).await;
		assert_eq!(result.unwrap_err(), BuildError::Structural("AppShell".to_string()));
		assert!(builder.build("AppShell", Params::new(), None).await.is_none());
	}

	#[rstest]
	#[tokio::test]
	async fn test_unknown_component(builder: ComponentBuilder) {
		assert!(builder.build("Nope", Params::new(), None).await.is_none());
		assert!(builder.registry().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_missing_template_yields_none(builder: ComponentBuilder) {
		// Chart has no template in the provider
		let result = builder.try_build("Chart", Params::new(), None).await;

		assert!(matches!(result, Err(BuildError::Template { .. })));
		assert!(builder.registry().is_empty());
		assert!(builder.registry().dom().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_explicit_id_prop(builder: ComponentBuilder) {
		let mut props = Params::new();
		props.insert("id".to_string(), json!("profile"));

		let first = builder.build("UserPage", props.clone(), None).await.unwrap();
		let second = builder.try_build("UserPage", props, None).await;

		assert_eq!(first.identity().as_deref(), Some("profile"));
		assert!(matches!(second, Err(BuildError::Registration(_))));
		assert_eq!(builder.build_count("UserPage"), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_failing_init_disposes_host(builder: ComponentBuilder) {
		// Arrange
		builder.define(
			ComponentDefinition::new("Fragile", ComponentCategory::Visual).with_hooks(|| {
				ComponentHooks::new().on_init(|_, _| Err(HookError::new("no canvas")))
			}),
		);

		// Act
		let result = builder.try_build("Fragile", Params::new(), None).await;

		// Assert
		assert!(matches!(result, Err(BuildError::Init { .. })));
		assert!(builder.registry().dom().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_service_has_no_host(builder: ComponentBuilder) {
		builder.define(ComponentDefinition::new("Poller", ComponentCategory::Service));

		let instance = builder.build("Poller", Params::new(), None).await.unwrap();

		assert!(instance.host().is_none());
	}

	#[rstest]
	#[tokio::test]
	async fn test_build_under_parent(builder: ComponentBuilder) {
		let parent = builder.build("UserPage", Params::new(), None).await.unwrap();
		let parent_id = parent.identity().unwrap();

		let child = builder
			.build("UserPage", Params::new(), Some(&parent_id))
			.await
			.unwrap();

		assert_eq!(child.depth(), 1);
		assert_eq!(child.parent(), Some(parent_id));
	}
}
