//! The HTTP surface.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /health-check` | fixed liveness text |
//! | `GET`/`HEAD` of a file under the public directory, when configured | static file |
//! | anything else, any method | [`Dispatcher::dispatch`] |

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::handler::Handler;
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::dispatch::{collect_query, Dispatcher, InboundRequest};
use crate::response::DispatchResponse;

pub const HEALTH_CHECK_PATH: &str = "/health-check";
pub const HEALTH_CHECK_TEXT: &str = "Online and ready for action";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Builds the router. `body_limit` is the maximum request body in bytes.
///
/// With a `public_dir`, files under it are served first and every request
/// that does not name an existing file falls through to the dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>, body_limit: usize, public_dir: Option<&Path>) -> Router {
    let routes = Router::new().route(HEALTH_CHECK_PATH, get(health_check));
    let routes = match public_dir {
        Some(dir) => routes.fallback_service(
            ServeDir::new(dir)
                .call_fallback_on_method_not_allowed(true)
                .fallback(dispatch.with_state(Arc::clone(&dispatcher))),
        ),
        None => routes.fallback(dispatch),
    };
    routes
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(dispatcher)
}

async fn health_check() -> &'static str {
    HEALTH_CHECK_TEXT
}

async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> DispatchResponse {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();
    dispatcher
        .dispatch(InboundRequest {
            method: method.as_str().to_owned(),
            path: uri.path().to_owned(),
            query: collect_query(query),
            headers,
            body,
        })
        .await
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
