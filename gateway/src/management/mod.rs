//! Administrative surface: health/readiness, config dump, and Prometheus
//! metrics, each served on their own bind address so the data plane listener
//! can be firewalled off separately from operational endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use llmwarden_core::drain::DrainWatcher;
use llmwarden_core::readiness::Ready;
use llmwarden_core::signal::ShutdownTrigger;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;

#[derive(Clone)]
struct AdminState {
	ready: Ready,
	config: Arc<Config>,
	shutdown: ShutdownTrigger,
}

pub async fn serve_admin(addr: SocketAddr, mut drain_rx: DrainWatcher, ready: Ready, config: Arc<Config>, shutdown: ShutdownTrigger) -> anyhow::Result<()> {
	let state = AdminState { ready, config, shutdown };
	let app = Router::new()
		.route("/healthz/ready", get(ready_handler))
		.route("/debug/config", get(config_dump_handler))
		.route("/quitquitquit", axum::routing::post(quit_handler))
		.with_state(state);

	let listener = TcpListener::bind(addr).await?;
	info!(%addr, "admin server listening");
	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			drain_rx.signaled().await;
		})
		.await?;
	Ok(())
}

async fn ready_handler(State(state): State<AdminState>) -> impl IntoResponse {
	if state.ready.is_ready() {
		(axum::http::StatusCode::OK, "ready\n".to_string())
	} else {
		(
			axum::http::StatusCode::SERVICE_UNAVAILABLE,
			format!("not ready, pending: {}\n", state.ready.pending_tasks().join(", ")),
		)
	}
}

async fn config_dump_handler(State(state): State<AdminState>) -> impl IntoResponse {
	axum::Json(state.config.as_ref().clone())
}

async fn quit_handler(State(state): State<AdminState>) -> impl IntoResponse {
	state.shutdown.shutdown_now();
	(axum::http::StatusCode::OK, "shutting down\n")
}

pub async fn serve_metrics(addr: SocketAddr, mut drain_rx: DrainWatcher, registry: Arc<Registry>) -> anyhow::Result<()> {
	let app = Router::new().route("/metrics", get(metrics_handler)).with_state(registry);
	let listener = TcpListener::bind(addr).await?;
	info!(%addr, "metrics server listening");
	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			drain_rx.signaled().await;
		})
		.await?;
	Ok(())
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
	let mut buf = String::new();
	match encode(&mut buf, &registry) {
		Ok(()) => (axum::http::StatusCode::OK, buf),
		Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
	}
}
