//! HTTP surface: maps each bound endpoint to a `POST` route.

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod openapi;
pub mod problem;
pub mod router;

pub use openapi::build_openapi;
pub use problem::{Problem, APPLICATION_PROBLEM_JSON};
pub use router::{router, ApiOptions};

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!("HTTP server bound on {}", local);

    let shutdown = async move {
        cancel.cancelled().await;
        tracing::info!("HTTP server shutting down gracefully (cancellation)");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}
