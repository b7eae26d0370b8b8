//! Dispatch binder: one validated app, one shared instance, one route per endpoint.
//!
//! Lifecycle: `bind` (validate + instantiate) → `start` (run `setup` with
//! exclusive access) → `dispatch` (lock-free, shared `&self` access).
//! A service whose `setup` fails stays `Failed` and never dispatches.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::handler::{panic_message, EndpointInvoker, Instance, InvokeError, SharedInstance};
use crate::registry::{AppDescriptor, AppType, EndpointDescriptor, Registry, DOWNLOAD_WEIGHTS_HOOK, SETUP_HOOK};
use crate::validator::{validate, EndpointValidationError, ValidationMode};

/// A lifecycle hook failed; wraps the original error.
#[derive(Debug, Error)]
#[error("{hook}() failed: {source}")]
pub struct EndpointSetupError {
    pub hook: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Validation(#[from] EndpointValidationError),
    #[error(transparent)]
    Setup(#[from] EndpointSetupError),
    #[error("Endpoint method {method}() cannot be bound: {reason}")]
    Unbound { method: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no endpoint is bound to path '{0}'")]
    UnknownPath(String),
    #[error("service is not ready ({0})")]
    NotReady(ServiceState),
    #[error("invalid input for {method}(): {source}")]
    InvalidInput {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{message}")]
    Handler { method: String, message: String },
    #[error("invalid output from {method}(): {source}")]
    InvalidOutput {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Ready => "ready",
            ServiceState::Failed => "failed",
        })
    }
}

enum Phase {
    Uninitialized,
    Ready(SharedInstance),
    Failed(String),
}

/// An endpoint resolved to its handler at bind time.
#[derive(Debug, Clone)]
pub struct BoundRoute {
    pub endpoint: Arc<EndpointDescriptor>,
    invoker: EndpointInvoker,
}

/// One instantiated app and its routes.
pub struct BoundService {
    descriptor: Arc<AppDescriptor>,
    routes: HashMap<String, BoundRoute>,
    pending: Mutex<Option<Instance>>,
    phase: ArcSwap<Phase>,
}

impl fmt::Debug for BoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundService")
            .field("app", &self.descriptor.name)
            .field("paths", &self.routes.keys().collect::<Vec<_>>())
            .field("state", &self.state())
            .finish()
    }
}

/// Validate `app_type` and instantiate it once. The service must be
/// [`start`](BoundService::start)ed before it dispatches.
pub fn bind(registry: &Registry, app_type: &AppType) -> Result<BoundService, BindError> {
    let (descriptor, endpoints) = validate(registry, app_type, ValidationMode::Standard)?;

    let mut routes = HashMap::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let invoker = endpoint.invoker.clone().ok_or_else(|| BindError::Unbound {
            method: endpoint.name.clone(),
            reason: "it must take exactly one input parameter by value".to_string(),
        })?;
        routes.insert(endpoint.path.clone(), BoundRoute { endpoint, invoker });
    }

    let instance = descriptor.instantiate();
    tracing::info!(
        app = %descriptor.name,
        paths = ?routes.keys().collect::<Vec<_>>(),
        "App bound"
    );

    Ok(BoundService {
        descriptor,
        routes,
        pending: Mutex::new(Some(instance)),
        phase: ArcSwap::from_pointee(Phase::Uninitialized),
    })
}

/// Build-time path: strict validation, one instance, `download_weights()`.
pub fn materialize(registry: &Registry, app_type: &AppType) -> Result<(), BindError> {
    let (descriptor, _) = validate(registry, app_type, ValidationMode::Strict)?;
    let mut instance = descriptor.instantiate();
    run_hook(&descriptor, DOWNLOAD_WEIGHTS_HOOK, &mut instance)?;
    tracing::info!(app = %descriptor.name, "Weights downloaded");
    Ok(())
}

fn run_hook(
    descriptor: &AppDescriptor,
    name: &str,
    instance: &mut Instance,
) -> Result<(), EndpointSetupError> {
    let Some(hook) = descriptor.hook(name) else {
        return Ok(());
    };
    let fail = |source: anyhow::Error| EndpointSetupError {
        hook: name.to_string(),
        source,
    };
    let invoker = hook.invoker.as_ref().ok_or_else(|| {
        fail(anyhow::anyhow!(
            "{name}() must only accept 'self', found {} extra parameter(s)",
            hook.params.len()
        ))
    })?;

    tracing::info!(app = %descriptor.name, hook = name, "Running lifecycle hook");
    match catch_unwind(AssertUnwindSafe(|| invoker.call(instance.as_mut()))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(fail(e)),
        Err(payload) => Err(fail(anyhow::anyhow!(panic_message(payload.as_ref())))),
    }
}

impl BoundService {
    pub fn descriptor(&self) -> &Arc<AppDescriptor> {
        &self.descriptor
    }

    pub fn app_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn state(&self) -> ServiceState {
        match &**self.phase.load() {
            Phase::Uninitialized => ServiceState::Uninitialized,
            Phase::Ready(_) => ServiceState::Ready,
            Phase::Failed(_) => ServiceState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServiceState::Ready
    }

    /// Routes sorted by path.
    pub fn routes(&self) -> Vec<&BoundRoute> {
        let mut routes: Vec<_> = self.routes.values().collect();
        routes.sort_by(|a, b| a.endpoint.path.cmp(&b.endpoint.path));
        routes
    }

    pub fn route(&self, path: &str) -> Option<&BoundRoute> {
        self.routes.get(path)
    }

    /// Run `setup()` once and mark the service ready. Idempotent once ready;
    /// a failed service keeps failing with the original message.
    pub fn start(&self) -> Result<(), EndpointSetupError> {
        let mut pending = self.pending.lock();
        match &**self.phase.load() {
            Phase::Ready(_) => return Ok(()),
            Phase::Failed(message) => {
                return Err(EndpointSetupError {
                    hook: SETUP_HOOK.to_string(),
                    source: anyhow::anyhow!(message.clone()),
                })
            }
            Phase::Uninitialized => {}
        }

        let Some(mut instance) = pending.take() else {
            return Err(EndpointSetupError {
                hook: SETUP_HOOK.to_string(),
                source: anyhow::anyhow!("app instance is no longer available"),
            });
        };

        if let Err(e) = run_hook(&self.descriptor, SETUP_HOOK, &mut instance) {
            tracing::error!(app = %self.descriptor.name, error = %e, "App setup failed");
            self.phase
                .store(Arc::new(Phase::Failed(format!("{:#}", e.source))));
            return Err(e);
        }

        self.phase
            .store(Arc::new(Phase::Ready(SharedInstance::from(instance))));
        tracing::info!(app = %self.descriptor.name, "App ready");
        Ok(())
    }

    /// Invoke the endpoint bound to `path` with a JSON payload.
    pub fn dispatch(&self, path: &str, input: Value) -> Result<Value, DispatchError> {
        let route = self
            .routes
            .get(path)
            .ok_or_else(|| DispatchError::UnknownPath(path.to_string()))?;
        let phase = self.phase.load_full();
        let Phase::Ready(instance) = &*phase else {
            return Err(DispatchError::NotReady(self.state()));
        };

        let method = &route.endpoint.name;
        let result = catch_unwind(AssertUnwindSafe(|| {
            route.invoker.call(instance.as_ref(), input)
        }));
        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(InvokeError::Input(source))) => Err(DispatchError::InvalidInput {
                method: method.clone(),
                source,
            }),
            Ok(Err(InvokeError::Output(source))) => Err(DispatchError::InvalidOutput {
                method: method.clone(),
                source,
            }),
            Ok(Err(InvokeError::Handler(e))) => {
                let message = format!("{e:#}");
                tracing::error!(method = %method, error = %message, "Endpoint handler failed");
                Err(DispatchError::Handler {
                    method: method.clone(),
                    message,
                })
            }
            Ok(Err(e @ InvokeError::InstanceMismatch { .. })) => Err(DispatchError::Handler {
                method: method.clone(),
                message: e.to_string(),
            }),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(method = %method, error = %message, "Endpoint handler panicked");
                Err(DispatchError::Handler {
                    method: method.clone(),
                    message,
                })
            }
        }
    }
}
