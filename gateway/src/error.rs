//! Unified pipeline error type with HTTP status mapping, mirroring how each
//! stage's own error variant maps onto the response the client sees.

use ::http::{HeaderValue, StatusCode};

use crate::http::{Body, Response};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
	#[error("no parser recognised the request dialect")]
	ParseFailure,
	#[error("request body was not valid for the matched dialect: {0}")]
	InvalidRequest(String),
	#[error("request exceeded the pipeline deadline")]
	RequestTimeout,
	#[error("policy blocked the request: {0}")]
	PolicyBlocked(String),
	#[error("no connection became available for {host} within the acquire timeout")]
	PoolTimeout { host: String },
	#[error("circuit open for {host}")]
	CircuitOpen { host: String },
	#[error("upstream transport error: {0}")]
	UpstreamCall(#[source] anyhow::Error),
	#[error("upstream call timed out: {0}")]
	UpstreamTimeout(#[source] anyhow::Error),
	#[error("stream backpressure exceeded, {buffered} chunks queued")]
	StreamBackpressure { buffered: usize },
	#[error("internal error: {0}")]
	Internal(#[source] anyhow::Error),
}

impl PipelineError {
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			PipelineError::UpstreamCall(_) | PipelineError::UpstreamTimeout(_) | PipelineError::RequestTimeout
		)
	}

	/// Matches the wire mapping: `circuit-open` / `upstream-transport` → 503,
	/// `pool-acquire-timeout` / `upstream-timeout` / `stream-timeout` → 504.
	pub fn status(&self) -> StatusCode {
		match self {
			PipelineError::ParseFailure => StatusCode::BAD_REQUEST,
			PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
			PipelineError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
			PipelineError::PolicyBlocked(_) => StatusCode::FORBIDDEN,
			PipelineError::PoolTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			PipelineError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
			PipelineError::UpstreamCall(_) => StatusCode::SERVICE_UNAVAILABLE,
			PipelineError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
			PipelineError::StreamBackpressure { .. } => StatusCode::TOO_MANY_REQUESTS,
			PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn into_response(self) -> Response {
		let status = self.status();
		let body = serde_json::json!({ "error": self.to_string() }).to_string();
		let mut rb = ::http::Response::builder()
			.status(status)
			.header(::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
		if let PipelineError::PoolTimeout { host } | PipelineError::CircuitOpen { host } = &self {
			if let Ok(hv) = HeaderValue::try_from(host.as_str()) {
				rb = rb.header("x-llmwarden-upstream-host", hv);
			}
		}
		rb.body(Body::from(body)).expect("static response parts are always valid")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_failure_is_400() {
		assert_eq!(PipelineError::ParseFailure.status(), StatusCode::BAD_REQUEST);
	}

	#[test]
	fn policy_blocked_is_403() {
		assert_eq!(PipelineError::PolicyBlocked("pii".into()).status(), StatusCode::FORBIDDEN);
	}

	#[test]
	fn upstream_call_is_retryable() {
		assert!(PipelineError::UpstreamCall(anyhow::anyhow!("boom")).is_retryable());
		assert!(!PipelineError::ParseFailure.is_retryable());
	}

	#[test]
	fn pool_timeout_and_upstream_timeout_are_504() {
		assert_eq!(PipelineError::PoolTimeout { host: "h".into() }.status(), StatusCode::GATEWAY_TIMEOUT);
		assert_eq!(PipelineError::UpstreamTimeout(anyhow::anyhow!("boom")).status(), StatusCode::GATEWAY_TIMEOUT);
	}

	#[test]
	fn circuit_open_and_upstream_transport_are_503() {
		assert_eq!(PipelineError::CircuitOpen { host: "h".into() }.status(), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(PipelineError::UpstreamCall(anyhow::anyhow!("boom")).status(), StatusCode::SERVICE_UNAVAILABLE);
	}
}
