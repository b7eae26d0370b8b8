//! Runtime runner.
//!
//! - `build`: install → load → strict validation → `download_weights()` → build marker.
//! - `dev`: marker check → install → load → bind → `setup()` → serve until shutdown.
//!
//! Shutdown can be driven by OS signals, an external `CancellationToken`,
//! or an arbitrary future.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use appkit_bootstrap::cache::{has_build_marker, resolve_cache_dir, write_build_marker};
use appkit_bootstrap::config::AppConfig;
use appkit_bootstrap::signals::wait_for_shutdown;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::installer::{install_requirements, CommandInstaller, Installer};
use super::loader::load_app;
use super::RuntimeError;
use crate::api::{self, ApiOptions};
use crate::binder::{bind, materialize, BoundService};
use crate::registry::Registry;

/// How the dev server should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

pub struct RunOptions {
    /// Source file of the app; scanned for requirements, never compiled.
    pub source: PathBuf,
    pub config: AppConfig,
    pub installer: Arc<dyn Installer>,
    /// Only consulted by `dev`.
    pub shutdown: ShutdownOptions,
}

impl RunOptions {
    pub fn new(source: impl Into<PathBuf>, config: AppConfig) -> Self {
        let installer = Arc::new(CommandInstaller::from_config(&config.installer));
        Self {
            source: source.into(),
            config,
            installer,
            shutdown: ShutdownOptions::Signals,
        }
    }

    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownOptions) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// What a successful `build` produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub app_name: String,
    pub cache_dir: PathBuf,
    pub requirements: Vec<String>,
    pub marker: PathBuf,
}

fn check_source(path: &Path) -> Result<(), RuntimeError> {
    if !path.exists() {
        return Err(RuntimeError::SourceNotFound(path.to_path_buf()));
    }
    if path.extension().and_then(|e| e.to_str()) != Some("rs") {
        return Err(RuntimeError::NotRustSource(path.to_path_buf()));
    }
    Ok(())
}

/// Install dependencies, validate strictly, download weights and mark the cache as built.
pub async fn build(opts: RunOptions) -> Result<BuildReport, RuntimeError> {
    check_source(&opts.source)?;
    let cache_dir = resolve_cache_dir(opts.config.cache_dir.as_deref())?;
    tracing::info!(cache_dir = %cache_dir.display(), "Using cache directory");

    let requirements = install_requirements(&opts.source, &cache_dir, opts.installer.as_ref()).await?;

    let registry = Arc::new(Registry::new());
    let app_type = load_app(&registry)?;
    let app_name = registry
        .descriptor(&app_type)
        .map(|d| d.name.clone())
        .unwrap_or_else(|| app_type.name().to_string());

    // download_weights() may block for a long time.
    let worker = registry.clone();
    tokio::task::spawn_blocking(move || materialize(&worker, &app_type)).await??;

    let marker = write_build_marker(&cache_dir).map_err(|source| RuntimeError::Marker {
        cache_dir: cache_dir.clone(),
        source,
    })?;
    tracing::info!(app = %app_name, marker = %marker.display(), "Build complete");

    Ok(BuildReport {
        app_name,
        cache_dir,
        requirements,
        marker,
    })
}

/// A ready service plus the address it will listen on.
pub struct DevServer {
    service: Arc<BoundService>,
    addr: SocketAddr,
    api: ApiOptions,
    shutdown: ShutdownOptions,
}

impl DevServer {
    pub fn service(&self) -> &Arc<BoundService> {
        &self.service
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `POST {path}` for every bound endpoint, sorted by path.
    pub fn endpoints(&self) -> Vec<String> {
        self.service
            .routes()
            .iter()
            .map(|r| format!("POST {}", r.endpoint.path))
            .collect()
    }

    pub fn router(&self) -> axum::Router {
        api::router(self.service.clone(), &self.api)
    }

    /// Bind the listener and serve until the configured shutdown fires.
    pub async fn serve(self) -> Result<(), RuntimeError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| RuntimeError::Address {
                addr: self.addr.to_string(),
                source,
            })?;
        let router = self.router();
        let cancel = shutdown_token(self.shutdown);
        api::serve_listener(listener, router, cancel)
            .await
            .map_err(RuntimeError::Serve)
    }
}

fn shutdown_token(shutdown: ShutdownOptions) -> CancellationToken {
    let cancel = match &shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    match shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = wait_for_shutdown().await {
                    tracing::warn!(error = %e, "shutdown: signal waiter failed; falling back to ctrl_c()");
                    let _ = tokio::signal::ctrl_c().await;
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::debug!("shutdown: external token will control lifecycle");
        }
    }
    cancel
}

/// Everything `dev` does before it starts listening.
pub async fn prepare_dev(opts: RunOptions) -> Result<DevServer, RuntimeError> {
    check_source(&opts.source)?;
    let cache_dir = resolve_cache_dir(opts.config.cache_dir.as_deref())?;
    if !has_build_marker(&cache_dir) {
        return Err(RuntimeError::NotBuilt { cache_dir });
    }

    install_requirements(&opts.source, &cache_dir, opts.installer.as_ref()).await?;

    let registry = Registry::new();
    let app_type = load_app(&registry)?;
    let service = Arc::new(bind(&registry, &app_type)?);

    // setup() may load weights from disk.
    let starting = service.clone();
    tokio::task::spawn_blocking(move || starting.start()).await??;

    let server = &opts.config.server;
    let addr = resolve_addr(&server.host, server.port).await?;
    let api = ApiOptions {
        request_timeout: server.request_timeout,
        body_limit_bytes: server.body_limit_bytes,
    };

    tracing::info!(app = %service.app_name(), %addr, "App ready");
    Ok(DevServer {
        service,
        addr,
        api,
        shutdown: opts.shutdown,
    })
}

/// Prepare and serve in one call.
pub async fn dev(opts: RunOptions) -> Result<(), RuntimeError> {
    prepare_dev(opts).await?.serve().await
}

async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, RuntimeError> {
    let addr = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let resolved = tokio::net::lookup_host(addr.as_str())
        .await
        .map(|mut candidates| candidates.next());
    match resolved {
        Ok(Some(found)) => Ok(found),
        Ok(None) => Err(RuntimeError::Address {
            addr,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
        }),
        Err(source) => Err(RuntimeError::Address { addr, source }),
    }
}
