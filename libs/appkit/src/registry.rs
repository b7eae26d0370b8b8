//! The registration registry: one app slot plus an arena of tagged endpoints.
//!
//! The registry is an explicit object. Registration code (hand-written or
//! emitted by `#[appkit::app]`) feeds it through the [`AppSpec`],
//! [`EndpointDef`] and [`HookDef`] builders.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::handler::{EndpointInvoker, Factory, HookInvoker, Instance};
use crate::schema::{short_type_name, Param, Signature, TypeDescriptor};

pub const SETUP_HOOK: &str = "setup";
pub const DOWNLOAD_WEIGHTS_HOOK: &str = "download_weights";

/// Identity of a user-authored app type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppType {
    id: TypeId,
    name: String,
}

impl AppType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(type_name::<T>()),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Declared (short) type name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A lifecycle hook (`setup`, `download_weights`) as declared on the app.
#[derive(Debug, Clone)]
pub struct HookDescriptor {
    pub name: String,
    /// Parameter names, receiver excluded.
    pub params: Vec<String>,
    /// `None` when the hook returns nothing (`()` or `Result<()>`).
    pub returns: Option<TypeDescriptor>,
    pub invoker: Option<HookInvoker>,
}

/// The one registered app.
pub struct AppDescriptor {
    pub app_type: AppType,
    pub name: String,
    pub requirements: Vec<String>,
    pub hooks: Vec<HookDescriptor>,
    factory: Factory,
}

impl fmt::Debug for AppDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDescriptor")
            .field("app_type", &self.app_type.name())
            .field("name", &self.name)
            .field("requirements", &self.requirements)
            .field(
                "hooks",
                &self.hooks.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AppDescriptor {
    pub fn hook(&self, name: &str) -> Option<&HookDescriptor> {
        self.hooks.iter().find(|h| h.name == name)
    }

    /// Create a fresh app instance.
    pub fn instantiate(&self) -> Instance {
        (self.factory)()
    }
}

/// One tagged handler method.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub app_type: AppType,
    pub name: String,
    pub path: String,
    pub signature: Signature,
    pub invoker: Option<EndpointInvoker>,
}

impl EndpointDescriptor {
    /// Declared type of the first parameter, if any.
    pub fn input_type(&self) -> Option<&TypeDescriptor> {
        self.signature.first_param().and_then(|p| p.ty.as_ref())
    }

    pub fn output_type(&self) -> Option<&TypeDescriptor> {
        self.signature.returns.as_ref()
    }
}

/// Registration request for an app type.
pub struct AppSpec {
    app_type: AppType,
    name: Option<String>,
    requirements: Option<Value>,
    hooks: Vec<HookDescriptor>,
    factory: Factory,
}

impl AppSpec {
    /// Describe `T`, instantiated through `Default`.
    pub fn of<T: Default + Any + Send + Sync>() -> Self {
        Self::with_factory::<T, _>(T::default)
    }

    pub fn with_factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            app_type: AppType::of::<T>(),
            name: None,
            requirements: None,
            hooks: Vec::new(),
            factory: Arc::new(move || Box::new(factory()) as Instance),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn requirements<I, S>(self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = requirements
            .into_iter()
            .map(|s| Value::String(s.into()))
            .collect();
        self.requirements_value(Value::Array(list))
    }

    /// Raw requirements value; checked on registration.
    pub fn requirements_value(mut self, value: Value) -> Self {
        self.requirements = Some(value);
        self
    }

    pub fn hook(mut self, hook: HookDef) -> Self {
        self.hooks.retain(|h| h.name != hook.0.name);
        self.hooks.push(hook.0);
        self
    }

    pub fn app_type(&self) -> &AppType {
        &self.app_type
    }
}

/// Builder for a [`HookDescriptor`].
pub struct HookDef(HookDescriptor);

impl HookDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(HookDescriptor {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            invoker: None,
        })
    }

    pub fn setup() -> Self {
        Self::new(SETUP_HOOK)
    }

    pub fn download_weights() -> Self {
        Self::new(DOWNLOAD_WEIGHTS_HOOK)
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.0.params.push(name.into());
        self
    }

    pub fn returns(mut self, ty: TypeDescriptor) -> Self {
        self.0.returns = Some(ty);
        self
    }

    pub fn invoker(mut self, invoker: HookInvoker) -> Self {
        self.0.invoker = Some(invoker);
        self
    }
}

/// Builder for an [`EndpointDescriptor`].
pub struct EndpointDef {
    app_type: AppType,
    name: String,
    path: Option<String>,
    signature: Signature,
    invoker: Option<EndpointInvoker>,
}

impl EndpointDef {
    pub fn new<T: Any>(name: impl Into<String>) -> Self {
        Self {
            app_type: AppType::of::<T>(),
            name: name.into(),
            path: None,
            signature: Signature::default(),
            invoker: None,
        }
    }

    /// Override the default `/{name}` route.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Declare the next parameter; `None` means it has no concrete type.
    pub fn param(mut self, name: impl Into<String>, ty: Option<TypeDescriptor>) -> Self {
        self.signature.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn returns(mut self, ty: TypeDescriptor) -> Self {
        self.signature.returns = Some(ty);
        self
    }

    pub fn invoker(mut self, invoker: EndpointInvoker) -> Self {
        self.invoker = Some(invoker);
        self
    }
}

/// Requirements argument rejected on registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequirementsError {
    #[error("requirements must be a list, got {actual}")]
    NotList { actual: &'static str },
    #[error("requirements[{index}] must be a string, got {actual}")]
    NotString { index: usize, actual: &'static str },
    #[error("requirements[{index}] must be a non-empty string")]
    Empty { index: usize },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(
        "Only one app is allowed per process. Found existing app '{existing}' and attempted to register '{attempted}'. Split multiple apps into separate binaries."
    )]
    MultipleApps { existing: String, attempted: String },
    #[error(transparent)]
    InvalidRequirements(#[from] RequirementsError),
}

/// Registry of the single app and its tagged endpoints. Shareable across threads.
#[derive(Default)]
pub struct Registry {
    app: Mutex<Option<Arc<AppDescriptor>>>,
    endpoints: DashMap<TypeId, Vec<Arc<EndpointDescriptor>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let app = self.app.lock().as_ref().map(|a| a.app_type.name().to_string());
        let endpoints: usize = self.endpoints.iter().map(|e| e.value().len()).sum();
        f.debug_struct("Registry")
            .field("app", &app)
            .field("endpoints", &endpoints)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the app. Fails if one is already registered or the requirements
    /// argument is malformed.
    pub fn register(&self, spec: AppSpec) -> Result<Arc<AppDescriptor>, RegistryError> {
        let mut slot = self.app.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(RegistryError::MultipleApps {
                existing: existing.app_type.name().to_string(),
                attempted: spec.app_type.name().to_string(),
            });
        }

        let requirements = match &spec.requirements {
            Some(value) => check_requirements(value)?,
            None => Vec::new(),
        };

        let descriptor = Arc::new(AppDescriptor {
            name: spec
                .name
                .unwrap_or_else(|| spec.app_type.name().to_string()),
            app_type: spec.app_type,
            requirements,
            hooks: spec.hooks,
            factory: spec.factory,
        });
        tracing::debug!(
            app = %descriptor.name,
            requirements = ?descriptor.requirements,
            "App registered"
        );
        *slot = Some(descriptor.clone());
        Ok(descriptor)
    }

    /// Record an endpoint on its owning type. Re-tagging the same method replaces it.
    pub fn tag_endpoint(&self, def: EndpointDef) -> Arc<EndpointDescriptor> {
        let path = match def.path {
            Some(p) if p.starts_with('/') => p,
            Some(p) => format!("/{p}"),
            None => format!("/{}", def.name),
        };
        let descriptor = Arc::new(EndpointDescriptor {
            app_type: def.app_type,
            name: def.name,
            path,
            signature: def.signature,
            invoker: def.invoker,
        });
        let mut list = self.endpoints.entry(descriptor.app_type.id()).or_default();
        list.retain(|e| e.name != descriptor.name);
        list.push(descriptor.clone());
        descriptor
    }

    /// Forget the registered app. Tagged endpoints stay in the arena.
    pub fn reset(&self) {
        if let Some(old) = self.app.lock().take() {
            tracing::debug!(app = %old.name, "App registration cleared");
        }
    }

    pub fn registered(&self) -> Option<Arc<AppDescriptor>> {
        self.app.lock().clone()
    }

    /// The registered descriptor, if it belongs to `app_type`.
    pub fn descriptor(&self, app_type: &AppType) -> Option<Arc<AppDescriptor>> {
        self.registered()
            .filter(|d| d.app_type.id() == app_type.id())
    }

    /// All endpoints tagged on `app_type`, in no particular order.
    pub fn list_endpoints(&self, app_type: &AppType) -> Vec<Arc<EndpointDescriptor>> {
        self.endpoints
            .get(&app_type.id())
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }
}

fn check_requirements(value: &Value) -> Result<Vec<String>, RequirementsError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(RequirementsError::NotList {
                actual: json_type_name(other),
            })
        }
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(s) if s.trim().is_empty() => Err(RequirementsError::Empty { index }),
            Value::String(s) => Ok(s.clone()),
            other => Err(RequirementsError::NotString {
                index,
                actual: json_type_name(other),
            }),
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
