//! HTTP responder
//!
//! One plain-text endpoint whose status code mirrors the node verdict. Every
//! response closes its connection; load balancers open a fresh one per check.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error, info};

use crate::health::HealthService;
use crate::pool::Backend;

use super::supervisor::DaemonError;

/// Body sent for any path other than the configured one
pub const NOT_FOUND_BODY: &str = "404 page not found\n";

struct Endpoint<B> {
    service: HealthService<B>,
    path: String,
}

/// Build the responder for `path`, evaluating through `service`
pub fn build_router<B: Backend>(service: HealthService<B>, path: &str) -> Router {
    let endpoint = Arc::new(Endpoint {
        service,
        path: path.to_string(),
    });
    Router::new().fallback(handle::<B>).with_state(endpoint)
}

async fn handle<B: Backend>(State(endpoint): State<Arc<Endpoint<B>>>, request: Request) -> Response {
    let path = request.uri().path();
    if path != endpoint.path {
        debug!(method = %request.method(), path = %path, "No health endpoint at path");
        return plain(StatusCode::NOT_FOUND, NOT_FOUND_BODY);
    }

    let status = endpoint.service.check().await;
    let code = if status.is_available() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    debug!(method = %request.method(), status = %status, code = code.as_u16(), "Health check served");
    plain(code, status.message())
}

fn plain(code: StatusCode, body: &'static str) -> Response {
    (code, [(header::CONNECTION, "close")], body).into_response()
}

/// Serve `router` on `listener` until `shutdown` is cancelled
///
/// After cancellation the listener is dropped and in-flight connections are
/// given `grace` to finish. A failed accept ends serving with an error.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), DaemonError> {
    let mut builder = http1::Builder::new();
    builder.keep_alive(false);
    let graceful = GracefulShutdown::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.map_err(DaemonError::Accept)?,
        };

        let router = router.clone();
        let svc = service_fn(move |req: hyper::Request<Incoming>| router.clone().oneshot(req));
        let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), svc));

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                error!(peer = %peer, error = %e, "Failed to write health check response");
            }
        });
    }

    drop(listener);
    info!(grace_secs = grace.as_secs_f64(), "Draining in-flight health checks");

    tokio::time::timeout(grace, graceful.shutdown())
        .await
        .map_err(|_| DaemonError::ShutdownTimeout(grace))
}
