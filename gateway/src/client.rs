//! Upstream HTTP client: forwards a normalised request to the vendor's
//! native endpoint over a pooled reqwest client, translating the response
//! back into the proxy's own body/response types.

use std::time::Duration;

use bytes::Bytes;
use futures_util::TryStreamExt;

use crate::error::PipelineError;
use crate::http::{self, Body, Response};

#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub connect_timeout: Duration,
	pub request_timeout: Duration,
	pub pool_idle_timeout: Duration,
	pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		ClientConfig {
			connect_timeout: Duration::from_secs(10),
			request_timeout: Duration::from_secs(60),
			pool_idle_timeout: Duration::from_secs(30),
			pool_max_idle_per_host: 32,
		}
	}
}

/// Thin wrapper over a `reqwest::Client`; reqwest already does its own
/// per-host connection pooling and keep-alive, so this layer's job is just
/// translating request/response shapes, not re-implementing pooling.
pub struct UpstreamClient {
	inner: reqwest::Client,
}

impl UpstreamClient {
	pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
		let inner = reqwest::Client::builder()
			.connect_timeout(config.connect_timeout)
			.timeout(config.request_timeout)
			.pool_idle_timeout(config.pool_idle_timeout)
			.pool_max_idle_per_host(config.pool_max_idle_per_host)
			.build()?;
		Ok(UpstreamClient { inner })
	}

	pub async fn send(&self, req: http::Request) -> Result<Response, PipelineError> {
		let (parts, mut body) = req.into_parts();
		let body_bytes = http::inspect_body(&mut body).await.map_err(PipelineError::Internal)?;

		let url = parts.uri.to_string();
		let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes()).map_err(|e| PipelineError::Internal(e.into()))?;
		let mut builder = self.inner.request(method, &url).body(body_bytes);
		for (name, value) in parts.headers.iter() {
			builder = builder.header(name.as_str(), value.as_bytes());
		}

		let resp = builder.send().await.map_err(|e| {
			if e.is_timeout() {
				PipelineError::UpstreamTimeout(e.into())
			} else {
				PipelineError::UpstreamCall(e.into())
			}
		})?;
		let status = resp.status();
		let headers = resp.headers().clone();
		let stream = resp.bytes_stream().map_err(std::io::Error::other);
		let body = Body::from_stream(stream);

		let mut builder = ::http::Response::builder().status(::http::StatusCode::from_u16(status.as_u16()).unwrap_or(::http::StatusCode::BAD_GATEWAY));
		for (name, value) in headers.iter() {
			if let (Ok(name), Ok(value)) = (
				::http::HeaderName::from_bytes(name.as_str().as_bytes()),
				::http::HeaderValue::from_bytes(value.as_bytes()),
			) {
				builder = builder.header(name, value);
			}
		}
		builder.body(body).map_err(|e| PipelineError::Internal(e.into()))
	}
}

/// Used by tests and by callers that already hold raw bytes they want
/// forwarded verbatim, bypassing the full axum `Body` reconstruction dance.
pub fn bytes_response(status: u16, body: Bytes) -> Response {
	::http::Response::builder()
		.status(status)
		.body(Body::from(body))
		.expect("status and body are always valid here")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_has_sane_timeouts() {
		let cfg = ClientConfig::default();
		assert!(cfg.connect_timeout < cfg.request_timeout);
		assert!(cfg.pool_max_idle_per_host > 0);
	}

	#[test]
	fn bytes_response_round_trips_status() {
		let resp = bytes_response(200, Bytes::from_static(b"ok"));
		assert_eq!(resp.status(), http::StatusCode::OK);
	}
}
