//! HTTP type aliases and small body/URI helpers shared across the pipeline.

use axum::body::to_bytes;
use bytes::Bytes;

pub type Error = axum_core::Error;
pub type Body = axum_core::body::Body;
pub type Request = ::http::Request<Body>;
pub type Response = ::http::Response<Body>;
pub use ::http::uri::{Authority, Scheme};
pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header, status, uri};

use crate::error::PipelineError;

#[derive(Debug)]
pub enum WellKnownContentTypes {
	Json,
	Sse,
	Unknown,
}

pub fn classify_content_type(h: &HeaderMap) -> WellKnownContentTypes {
	let Some(content_type) = h.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
		return WellKnownContentTypes::Unknown;
	};
	if content_type.starts_with("application/json") {
		WellKnownContentTypes::Json
	} else if content_type.starts_with("text/event-stream") {
		WellKnownContentTypes::Sse
	} else {
		WellKnownContentTypes::Unknown
	}
}

pub fn get_host(req: &Request) -> Result<&str, PipelineError> {
	let host = req
		.uri()
		.host()
		.ok_or_else(|| PipelineError::InvalidRequest("missing host".into()))?;
	Ok(strip_port(host))
}

pub async fn inspect_body(body: &mut Body) -> anyhow::Result<Bytes> {
	let orig = std::mem::replace(body, Body::empty());
	let bytes = to_bytes(orig, 16_777_216).await?;
	*body = Body::from(bytes.clone());
	Ok(bytes)
}

fn strip_port(auth: &str) -> &str {
	if auth.as_bytes().first() == Some(&b'[') {
		auth.find(']').map(|i| &auth[0..=i]).unwrap_or(auth)
	} else {
		auth.split(':').next().unwrap_or(auth)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strip_port_removes_trailing_port() {
		assert_eq!(strip_port("api.openai.com:443"), "api.openai.com");
		assert_eq!(strip_port("api.openai.com"), "api.openai.com");
	}
}
