//! Type-erased invokers captured when endpoints and hooks are tagged.
//!
//! The app instance lives behind `dyn Any`; each invoker downcasts back to the
//! concrete app type it was built for, so dispatch never looks methods up by name.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// An app instance before it is shared (setup needs exclusive access).
pub type Instance = Box<dyn Any + Send + Sync>;

/// An app instance shared by every handler once setup has completed.
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

/// Creates a fresh app instance.
pub type Factory = Arc<dyn Fn() -> Instance + Send + Sync>;

type EndpointFn = dyn Fn(&(dyn Any + Send + Sync), Value) -> Result<Value, InvokeError> + Send + Sync;
type HookFn = dyn Fn(&mut (dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync;

/// Failures of a single invocation, before translation at the dispatch boundary.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("instance is not a '{expected}'")]
    InstanceMismatch { expected: &'static str },
    #[error("invalid input: {0}")]
    Input(#[source] serde_json::Error),
    #[error("{0}")]
    Handler(anyhow::Error),
    #[error("invalid output: {0}")]
    Output(#[source] serde_json::Error),
}

/// Calls one endpoint method on the shared instance: JSON in, JSON out.
#[derive(Clone)]
pub struct EndpointInvoker(Arc<EndpointFn>);

impl fmt::Debug for EndpointInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EndpointInvoker")
    }
}

impl EndpointInvoker {
    /// Wrap a fallible handler `Fn(&A, I) -> Result<O, E>`.
    pub fn new<A, I, O, E, F>(f: F) -> Self
    where
        A: Any + Send + Sync,
        I: DeserializeOwned,
        O: Serialize,
        E: Into<anyhow::Error>,
        F: Fn(&A, I) -> Result<O, E> + Send + Sync + 'static,
    {
        Self(Arc::new(move |instance, input| {
            let app = instance
                .downcast_ref::<A>()
                .ok_or(InvokeError::InstanceMismatch {
                    expected: type_name::<A>(),
                })?;
            let input: I = serde_json::from_value(input).map_err(InvokeError::Input)?;
            let output = f(app, input).map_err(|e| InvokeError::Handler(e.into()))?;
            serde_json::to_value(output).map_err(InvokeError::Output)
        }))
    }

    /// Wrap a handler that cannot fail (it may still panic).
    pub fn infallible<A, I, O, F>(f: F) -> Self
    where
        A: Any + Send + Sync,
        I: DeserializeOwned,
        O: Serialize,
        F: Fn(&A, I) -> O + Send + Sync + 'static,
    {
        Self::new(move |app: &A, input: I| Ok::<O, anyhow::Error>(f(app, input)))
    }

    pub fn call(
        &self,
        instance: &(dyn Any + Send + Sync),
        input: Value,
    ) -> Result<Value, InvokeError> {
        (self.0)(instance, input)
    }
}

/// Runs a lifecycle hook with exclusive access to the instance.
#[derive(Clone)]
pub struct HookInvoker(Arc<HookFn>);

impl fmt::Debug for HookInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HookInvoker")
    }
}

impl HookInvoker {
    pub fn new<A, E, F>(f: F) -> Self
    where
        A: Any + Send + Sync,
        E: Into<anyhow::Error>,
        F: Fn(&mut A) -> Result<(), E> + Send + Sync + 'static,
    {
        Self(Arc::new(move |instance| {
            let app = instance.downcast_mut::<A>().ok_or_else(|| {
                anyhow::anyhow!("instance is not a '{}'", type_name::<A>())
            })?;
            f(app).map_err(Into::into)
        }))
    }

    pub fn infallible<A, F>(f: F) -> Self
    where
        A: Any + Send + Sync,
        F: Fn(&mut A) + Send + Sync + 'static,
    {
        Self::new(move |app: &mut A| {
            f(app);
            Ok::<(), anyhow::Error>(())
        })
    }

    pub fn call(&self, instance: &mut (dyn Any + Send + Sync)) -> anyhow::Result<()> {
        (self.0)(instance)
    }
}

/// Render a caught panic payload as a message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
