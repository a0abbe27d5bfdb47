//! Process wiring: builds every pipeline component from [`Config`], binds
//! the data-plane listener and the admin/metrics listeners, and returns a
//! [`Bound`] handle the caller awaits for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use llmwarden_core::prelude::*;
use llmwarden_core::{drain, readiness, signal};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;

use crate::breaker::CircuitBreakerRegistry;
use crate::cache::{CacheEntry, ResponseCache};
use crate::client::UpstreamClient;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::management;
use crate::parse::ParserRegistry;
use crate::pipeline::{self, PipelineDeps};
use crate::policy::PolicyEngine;
use crate::pool::ConnectionPool;
use crate::scanners::{Orchestrator, default_scanners};
use crate::telemetry::log::emit_audit_log;

/// A started process; dropping it does not stop anything, the caller must
/// await [`Bound::wait_termination`] to actually drain and exit.
pub struct Bound {
	shutdown: signal::Shutdown,
	drain_tx: drain::DrainTrigger,
	tasks: tokio::task::JoinSet<anyhow::Result<()>>,
}

impl Bound {
	pub async fn wait_termination(mut self) -> anyhow::Result<()> {
		self.shutdown.wait().await;
		info!("shutdown requested, draining");
		self.drain_tx.start_drain_and_wait(drain::DrainMode::Graceful).await;
		while let Some(result) = self.tasks.join_next().await {
			if let Err(e) = result.unwrap_or_else(|je| Err(anyhow::anyhow!(je))) {
				warn!(error = %e, "component exited with an error");
			}
		}
		Ok(())
	}
}

pub async fn run(config: Arc<Config>) -> anyhow::Result<Bound> {
	let shutdown = signal::Shutdown::new();
	let (drain_tx, drain_rx) = drain::new();
	let ready = readiness::Ready::new();

	let mut registry = Registry::default();
	let sub_registry = llmwarden_core::metrics::sub_registry(&mut registry);
	let _metrics = crate::telemetry::metrics::Metrics::new(sub_registry);
	let registry = Arc::new(registry);

	let orchestrator = Arc::new(Orchestrator::new(default_scanners(), config.scan_timeout()));
	let policy = Arc::new(PolicyEngine::new(config.policy.policies.clone()));
	let cache = Arc::new(ResponseCache::new(config.cache.max_bytes, config.cache.max_entries, config.cache_ttl()));
	let dedup: Arc<Deduplicator<CacheEntry>> = Arc::new(Deduplicator::new(config.dedup_timeout()));
	let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.to_breaker_config()));
	let client = Arc::new(UpstreamClient::new(config.client_config())?);
	let pool: Arc<ConnectionPool<()>> = Arc::new(ConnectionPool::new(config.pool_config()));

	let deps = Arc::new(PipelineDeps {
		parsers: ParserRegistry::with_default_parsers(),
		orchestrator,
		policy,
		cache: cache.clone(),
		dedup,
		breakers: breakers.clone(),
		client,
		pool: pool.clone(),
		stream_config: config.stream_config(),
		request_timeout: config.request_timeout(),
	});

	let mut tasks = tokio::task::JoinSet::new();

	// data plane
	{
		let deps = deps.clone();
		let listen_addr = config.listen_addr;
		let data_plane_ready = ready.register_task("data-plane");
		let mut data_plane_drain = drain_rx.clone();
		tasks.spawn(async move {
			let listener = TcpListener::bind(listen_addr).await?;
			info!(%listen_addr, "data plane listening");
			drop(data_plane_ready);
			let app = Router::new()
				.fallback(axum::routing::any(handle_request))
				.with_state(deps);
			axum::serve(listener, app)
				.with_graceful_shutdown(async move { data_plane_drain.signaled().await })
				.await?;
			Ok(())
		});
	}

	// background idle reaper: connection pool + circuit breaker sweep
	{
		let breakers = breakers.clone();
		let pool = pool.clone();
		let mut reap_drain = drain_rx.clone();
		tasks.spawn(async move {
			let mut interval = tokio::time::interval(Duration::from_secs(30));
			loop {
				tokio::select! {
					_ = interval.tick() => {
						breakers.sweep_idle();
						pool.reap_idle();
					},
					_ = reap_drain.signaled() => break,
				}
			}
			Ok(())
		});
	}

	// admin server
	{
		let admin_addr = config.admin_addr;
		let admin_drain = drain_rx.clone();
		let ready = ready.clone();
		let config = config.clone();
		let shutdown_trigger = shutdown.trigger();
		let ready_task = ready.register_task("admin");
		tasks.spawn(async move {
			drop(ready_task);
			management::serve_admin(admin_addr, admin_drain, ready, config, shutdown_trigger).await
		});
	}

	// metrics server
	{
		let metrics_addr = config.metrics_addr;
		let metrics_drain = drain_rx.clone();
		let registry = registry.clone();
		tasks.spawn(async move { management::serve_metrics(metrics_addr, metrics_drain, registry).await });
	}

	Ok(Bound { shutdown, drain_tx, tasks })
}

async fn handle_request(State(deps): State<Arc<PipelineDeps>>, req: crate::http::Request) -> crate::http::Response {
	let correlation_id = llmwarden_core::strng::new(uuid_like());
	let (response, record) = pipeline::handle(&deps, correlation_id, req).await;
	// streaming responses log their own record once the body finishes, since
	// only then is threat_level final
	if !record.is_stream {
		emit_audit_log(&record);
	}
	response
}

/// A lightweight, dependency-free correlation id. Not a cryptographic
/// identifier; collisions are acceptable here since it exists purely to
/// correlate log lines for a single request, not for security purposes.
fn uuid_like() -> String {
	use std::sync::atomic::{AtomicU64, Ordering};
	static COUNTER: AtomicU64 = AtomicU64::new(0);
	let n = COUNTER.fetch_add(1, Ordering::Relaxed);
	let nanos = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default()
		.as_nanos();
	format!("{nanos:x}-{n:x}")
}
