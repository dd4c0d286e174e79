use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::admission::AdmissionController;
use crate::handlers::{
    health::health_check,
    metrics::metrics_handler,
    users::{add_user, delete_user, edit_user, list_users, query_user},
};
use crate::middleware::{AdmissionLayer, MakeRequestUuidV7, make_request_span};
use crate::state::AppState;

/// Builds the full router.
///
/// `/api/*` sits behind the admission layer; `/health` and `/metrics` do not.
pub fn create_router_with_state(
    state: AppState,
    admission: Arc<AdmissionController>,
    prometheus_handle: PrometheusHandle,
) -> Router {
    let api_router = Router::new()
        .route("/api/query", post(query_user))
        .route("/api/add", post(add_user))
        .route("/api/edit", post(edit_user))
        .route("/api/delete", post(delete_user))
        .route("/api/list", post(list_users))
        .route_layer(AdmissionLayer::new(admission))
        .with_state(state.clone());

    let health_router = Router::new()
        .route("/health", get(health_check))
        .with_state(state);

    // Router for metrics endpoint (different state)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            make_request_span(request)
        }))
        .layer(PropagateRequestIdLayer::x_request_id());

    Router::new()
        .merge(api_router)
        .merge(health_router)
        .merge(metrics_router)
        .layer(middleware::from_fn(
            crate::metrics::http::http_metrics_middleware,
        ))
        .layer(middleware_stack)
}

/// Serves `app` on `addr` until SIGINT/SIGTERM.
pub async fn run_server(addr: SocketAddr, app: Router) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
