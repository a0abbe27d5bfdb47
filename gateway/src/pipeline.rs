//! Pipeline Driver: the single path every request walks, from parsing
//! through to the response the client sees. Exactly one audit record is
//! produced per request regardless of which branch (cache hit, policy
//! block, upstream call) it takes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::breaker::CircuitBreakerRegistry;
use crate::cache::{self, CacheEntry, ResponseCache};
use crate::client::UpstreamClient;
use crate::dedup::{DedupError, Deduplicator};
use crate::error::PipelineError;
use crate::http::{self, HeaderValue, Request, Response};
use crate::parse::ParserRegistry;
use crate::policy::{Action, PolicyEngine};
use crate::pool::ConnectionPool;
use crate::scanners::Orchestrator;
use crate::stream::{ScanningBody, SseScanningBody, StreamConfig};
use crate::strng::Strng;
use crate::telemetry::log::AsyncLog;

#[derive(Debug, Clone)]
pub struct AuditRecord {
	pub correlation_id: Strng,
	pub host: String,
	pub action: Action,
	pub policy_id: Option<String>,
	pub cache_hit: bool,
	pub threat_level: crate::scan::Severity,
	pub latency: Duration,
	pub timestamp: DateTime<Utc>,
	/// Whether this request's response was a stream. When `true`, the
	/// caller must not emit this record itself — [`ScanningBody`] emits it
	/// once the stream finishes, since only then is `threat_level` final
	/// (mid-stream scanning can escalate it past what the request-side scan
	/// found).
	pub is_stream: bool,
}

pub struct PipelineDeps {
	pub parsers: ParserRegistry,
	pub orchestrator: Arc<Orchestrator>,
	pub policy: Arc<PolicyEngine>,
	pub cache: Arc<ResponseCache>,
	pub dedup: Arc<Deduplicator<CacheEntry>>,
	pub breakers: Arc<CircuitBreakerRegistry>,
	pub client: Arc<UpstreamClient>,
	/// Bounds concurrent in-flight upstream calls per host. `reqwest` already
	/// manages the underlying TCP connections/keep-alive; this pool's "slot"
	/// is the permit to have a call outstanding at all, acquired via
	/// [`ConnectionPool::acquire`] and released as soon as the call returns.
	pub pool: Arc<ConnectionPool<()>>,
	pub stream_config: StreamConfig,
	pub request_timeout: Duration,
}

/// An outbound request as owned bytes, built once the inbound body has been
/// read, so the producer closures handed to the cache deduplicator don't
/// need to borrow the inbound request across an await point.
#[derive(Clone)]
struct Outbound {
	method: http::Method,
	uri: http::Uri,
	headers: http::HeaderMap,
	body: bytes::Bytes,
}

impl Outbound {
	fn into_request(self) -> Request {
		let mut builder = ::http::Request::builder().method(self.method).uri(self.uri);
		for (name, value) in self.headers.iter() {
			builder = builder.header(name, value.clone());
		}
		builder.body(http::Body::from(self.body)).expect("outbound parts are already valid")
	}
}

/// Prefixes used to recover the timeout-vs-transport-error distinction
/// across the deduplicator's broadcast channel, which only carries a
/// stringified error to every waiter.
const UPSTREAM_TIMEOUT_TAG: &str = "upstream-timeout: ";
const POOL_TIMEOUT_TAG: &str = "pool-timeout: ";

struct Outcome {
	action: Action,
	policy_id: Option<String>,
	cache_hit: bool,
	threat_level: crate::scan::Severity,
	/// Whether the response body the client receives differs from what
	/// upstream actually returned. Derived from the policy's dominant action
	/// rather than a body diff: a cache hit is never modified relative to
	/// what it was stored as, and a fresh response is modified only when the
	/// matching policy's action is `Modify`.
	content_modified: bool,
	is_stream: bool,
	/// Set only for streaming responses: [`ScanningBody`] escalates
	/// `threat_level` here as mid-stream scans find worse content than the
	/// request-side scan did, and emits the final audit record itself once
	/// the stream ends.
	audit_log: Option<AsyncLog<AuditRecord>>,
}

/// Runs a single request through parsing, caching, scanning, policy
/// evaluation, deduplication, circuit breaking, and the upstream call,
/// producing the response to return to the caller plus one audit record.
/// The whole pipeline is bounded by `deps.request_timeout`; exceeding it
/// aborts the in-flight work and fails the request as a deadline timeout.
pub async fn handle(deps: &PipelineDeps, correlation_id: Strng, req: Request) -> (Response, AuditRecord) {
	let start = Instant::now();
	let host = http::get_host(&req).map(str::to_string).unwrap_or_default();

	let result = match tokio::time::timeout(deps.request_timeout, run(deps, &correlation_id, &host, req)).await {
		Ok(result) => result,
		Err(_) => Err(PipelineError::RequestTimeout),
	};
	let latency = start.elapsed();

	match result {
		Ok((mut response, outcome)) => {
			apply_response_headers(response.headers_mut(), &outcome, latency);
			let record = AuditRecord {
				correlation_id,
				host,
				action: outcome.action,
				policy_id: outcome.policy_id,
				cache_hit: outcome.cache_hit,
				threat_level: outcome.threat_level,
				latency,
				timestamp: Utc::now(),
				is_stream: outcome.is_stream,
			};
			if let Some(log) = &outcome.audit_log {
				log.store(record.clone());
			}
			(response, record)
		},
		Err(e) => {
			warn!(error = %e, %host, "pipeline rejected request");
			let record = AuditRecord {
				correlation_id,
				host,
				action: Action::Block,
				policy_id: None,
				cache_hit: false,
				threat_level: crate::scan::Severity::None,
				latency,
				timestamp: Utc::now(),
				is_stream: false,
			};
			(e.into_response(), record)
		},
	}
}

/// Sets the response headers every `/proxy/...` response carries, mandated
/// regardless of which branch of the pipeline produced the response.
fn apply_response_headers(headers: &mut http::HeaderMap, outcome: &Outcome, latency: Duration) {
	headers.insert("x-cache", HeaderValue::from_static(if outcome.cache_hit { "HIT" } else { "MISS" }));
	if let Ok(v) = HeaderValue::from_str(&format!("{}ms", latency.as_millis())) {
		headers.insert("x-response-time", v);
	}
	headers.insert(
		"x-content-modified",
		HeaderValue::from_static(if outcome.content_modified { "true" } else { "false" }),
	);
	if outcome.is_stream {
		headers.insert("x-proxilion-streaming", HeaderValue::from_static("true"));
	}
}

async fn run(deps: &PipelineDeps, correlation_id: &Strng, host: &str, mut req: Request) -> Result<(Response, Outcome), PipelineError> {
	let body_bytes = http::inspect_body(req.body_mut()).await.map_err(PipelineError::Internal)?;
	let normalised = deps.parsers.parse(&req, &body_bytes)?;

	let outbound = Outbound {
		method: req.method().clone(),
		uri: req.uri().clone(),
		headers: req.headers().clone(),
		body: body_bytes,
	};

	let fp = cache::fingerprint(normalised.provider, &normalised.model, &normalised.messages, &normalised.params);

	if !normalised.params.stream
		&& let Some(entry) = deps.cache.get(&fp)
	{
		info!(%correlation_id, "serving cached response");
		return Ok((
			entry_to_response(entry),
			Outcome {
				action: Action::Allow,
				policy_id: None,
				cache_hit: true,
				threat_level: crate::scan::Severity::None,
				content_modified: false,
				is_stream: false,
				audit_log: None,
			},
		));
	}

	let text: Arc<str> = Arc::from(normalised.scannable_text());
	let verdict = deps.orchestrator.run(text).await;
	let decision = deps.policy.evaluate(&normalised, &verdict);

	if decision.action == Action::Block {
		return Err(PipelineError::PolicyBlocked(
			decision.policy_name.clone().unwrap_or_else(|| "default-deny".into()),
		));
	}

	let host_key = Strng::from(host);
	if !deps.breakers.allow(&host_key) {
		return Err(PipelineError::CircuitOpen { host: host.to_string() });
	}

	let is_stream = normalised.params.stream;
	let mut audit_log = None;
	let response = if is_stream {
		let lease = deps
			.pool
			.acquire(host_key.clone(), || async { Ok(()) })
			.await
			.map_err(|_| PipelineError::PoolTimeout { host: host.to_string() })?;
		let send_result = deps.client.send(outbound.into_request()).await;
		drop(lease);
		match send_result {
			Ok(resp) => {
				deps.breakers.record_success(&host_key);
				let (parts, body) = resp.into_parts();
				let log = AsyncLog::new();
				let body = match http::classify_content_type(&parts.headers) {
					http::WellKnownContentTypes::Sse => http::Body::new(SseScanningBody::new(
						body,
						deps.orchestrator.clone(),
						correlation_id.clone(),
						deps.stream_config.clone(),
						log.clone(),
					)),
					_ => http::Body::new(ScanningBody::new(body, deps.orchestrator.clone(), correlation_id.clone(), deps.stream_config.clone(), log.clone())),
				};
				audit_log = Some(log);
				::http::Response::from_parts(parts, body)
			},
			Err(e) => {
				deps.breakers.record_failure(&host_key);
				return Err(e);
			},
		}
	} else {
		let client = deps.client.clone();
		let pool = deps.pool.clone();
		let producer_host_key = host_key.clone();
		let producer = move || async move {
			let lease = pool
				.acquire(producer_host_key, || async { Ok(()) })
				.await
				.map_err(|e| anyhow::anyhow!("{POOL_TIMEOUT_TAG}{e}"))?;
			let resp = client.send(outbound.into_request()).await;
			drop(lease);
			let resp = resp.map_err(|e| match e {
				PipelineError::UpstreamTimeout(inner) => anyhow::anyhow!("{UPSTREAM_TIMEOUT_TAG}{inner}"),
				other => anyhow::anyhow!(other),
			})?;
			let (parts, body) = resp.into_parts();
			let bytes = http_body_util::BodyExt::collect(body).await.map_err(|e| anyhow::anyhow!(e.to_string()))?.to_bytes();
			Ok::<_, anyhow::Error>(CacheEntry::new(parts.status, parts.headers, bytes))
		};

		match deps.dedup.execute(fp.clone(), producer).await {
			Ok(entry) => {
				deps.breakers.record_success(&host_key);
				deps.cache.set(fp, entry.clone());
				entry_to_response(entry)
			},
			Err(DedupError::ProducerFailed(msg)) => {
				if msg.starts_with(POOL_TIMEOUT_TAG) {
					return Err(PipelineError::PoolTimeout { host: host.to_string() });
				}
				deps.breakers.record_failure(&host_key);
				return Err(match msg.strip_prefix(UPSTREAM_TIMEOUT_TAG) {
					Some(rest) => PipelineError::UpstreamTimeout(anyhow::anyhow!(rest.to_string())),
					None => PipelineError::UpstreamCall(anyhow::anyhow!(msg)),
				});
			},
			Err(DedupError::Timeout) => {
				return Err(PipelineError::PoolTimeout { host: host.to_string() });
			},
		}
	};

	Ok((
		response,
		Outcome {
			action: decision.action,
			policy_id: decision.policy_id,
			cache_hit: false,
			threat_level: verdict.overall_threat_level,
			content_modified: decision.action == Action::Modify,
			is_stream,
			audit_log,
		},
	))
}

fn entry_to_response(entry: CacheEntry) -> Response {
	let mut builder = ::http::Response::builder().status(entry.status);
	for (name, value) in entry.headers.iter() {
		builder = builder.header(name, value.clone());
	}
	builder.body(http::Body::from(entry.body)).expect("cached parts are already valid")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn audit_record_carries_correlation_id() {
		let record = AuditRecord {
			correlation_id: Strng::from("abc"),
			host: "api.openai.com".into(),
			action: Action::Allow,
			policy_id: None,
			cache_hit: false,
			threat_level: crate::scan::Severity::None,
			latency: Duration::from_millis(5),
			timestamp: Utc::now(),
			is_stream: false,
		};
		assert_eq!(record.correlation_id.as_str(), "abc");
	}
}
