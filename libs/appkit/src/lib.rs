//! # Appkit - one typed app, many endpoints, one shared instance
//!
//! An app is a plain Rust type whose `impl` block is annotated with `#[appkit::app]`.
//! Methods tagged `#[endpoint]` become `POST` routes; methods named `setup` and
//! `download_weights` become lifecycle hooks.
//!
//! ```rust,ignore
//! use appkit::app;
//! use serde::{Deserialize, Serialize};
//! use utoipa::ToSchema;
//!
//! #[derive(Deserialize, ToSchema)]
//! pub struct TwoNumbers { a: f64, b: f64 }
//!
//! #[derive(Serialize, ToSchema)]
//! pub struct Sum { result: f64 }
//!
//! #[derive(Default)]
//! pub struct Calculator;
//!
//! #[app(name = "calculator", requirements = ["numpy>=1.26"])]
//! impl Calculator {
//!     #[endpoint]
//!     fn add(&self, input: TwoNumbers) -> Sum {
//!         Sum { result: input.a + input.b }
//!     }
//! }
//! ```
//!
//! The macro only emits explicit builder calls (`AppSpec`, `EndpointDef`, `HookDef`)
//! plus an `inventory` registrator; the same registration can be written by hand
//! against a [`Registry`].
//!
//! Pipeline: [`extract`] (requirements, no compilation) → [`Registry`] →
//! [`validator::validate`] → [`binder::bind`] → [`api::router`].

extern crate self as appkit;

pub use anyhow::Result;

/// For implementing [`runtime::Installer`] outside this crate.
pub use async_trait::async_trait;

// Used by macro-generated code
pub use inventory;
pub use serde_json;

pub use appkit_macros::{app, endpoint};

pub mod api;
pub mod binder;
pub mod contracts;
pub mod extract;
pub mod handler;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod validator;

pub use api::{router, ApiOptions, Problem};
pub use binder::{
    bind, materialize, BindError, BoundService, DispatchError, EndpointSetupError, ServiceState,
};
pub use contracts::{App, AppRegistrator};
pub use extract::{extract_requirements, extract_requirements_from_file, ExtractError};
pub use handler::{EndpointInvoker, HookInvoker, InvokeError};
pub use registry::{
    AppDescriptor, AppSpec, AppType, EndpointDef, EndpointDescriptor, HookDef, Registry,
    RegistryError, RequirementsError,
};
pub use runtime::{build, dev, load_app, RunOptions, RuntimeError, ShutdownOptions};
pub use schema::{Shape, TypeDescriptor};
pub use validator::{validate, EndpointValidationError, ValidationMode};

/// Any error the core can raise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] EndpointValidationError),
    #[error(transparent)]
    Setup(#[from] EndpointSetupError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
