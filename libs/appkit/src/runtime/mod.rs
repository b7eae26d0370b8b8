//! Build/dev orchestration: source check → cache dir → install requirements →
//! load the app → validate → run hooks → (dev) serve.

use std::path::PathBuf;

use appkit_bootstrap::cache::CacheConfigError;
use thiserror::Error;

use crate::binder::{BindError, EndpointSetupError};
use crate::extract::ExtractError;
use crate::registry::RegistryError;

pub mod installer;
pub mod loader;
pub mod runner;

pub use installer::{install_requirements, CommandInstaller, Installer};
pub use loader::load_app;
pub use runner::{build, dev, prepare_dev, BuildReport, DevServer, RunOptions, ShutdownOptions};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("File not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("File must be a Rust source file (.rs): {}", .0.display())]
    NotRustSource(PathBuf),
    #[error(transparent)]
    Cache(#[from] CacheConfigError),
    #[error("Build marker not found in {}. Run `build` first.", .cache_dir.display())]
    NotBuilt { cache_dir: PathBuf },
    #[error("Failed to write build marker in {}: {source}", .cache_dir.display())]
    Marker {
        cache_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to extract requirements: {0}")]
    Extract(#[from] ExtractError),
    #[error("Failed to install requirements: {source}")]
    Install {
        #[source]
        source: anyhow::Error,
    },
    #[error("No app found. Did you annotate an impl block with #[appkit::app]?")]
    NoApp,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Setup(#[from] EndpointSetupError),
    #[error("Invalid listen address {addr}: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Server error: {0}")]
    Serve(#[source] anyhow::Error),
}
