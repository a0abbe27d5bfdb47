//! Parser Registry: recognises the vendor dialect of an inbound request and
//! lifts it into the `NormalisedRequest` form. Dispatch is priority-ordered;
//! the first parser that recognises the request wins. If none do, the
//! pipeline rejects with 400 rather than forwarding an unparsed request.

pub mod anthropic;
pub mod cohere;
pub mod google;
pub mod huggingface;
pub mod openai;
pub mod passthrough;
pub mod sse;
pub mod transform;

use std::sync::Arc;

use crate::error::PipelineError;
use crate::http::{self, Request};
use crate::model::NormalisedRequest;

/// Fills in the parts of [`RequestMetadata`](crate::model::RequestMetadata)
/// that come from the transport rather than the dialect body, so every
/// parser doesn't have to repeat this. No identity extraction happens here:
/// `user_id` is read verbatim from a header an upstream auth layer is
/// expected to have already populated, the way `get_host` reads `Host`
/// rather than authenticating the request itself.
fn populate_transport_metadata(normalised: &mut NormalisedRequest, req: &Request) {
	let headers = req.headers();
	normalised.metadata.user_agent = headers.get(http::header::USER_AGENT).and_then(|v| v.to_str().ok()).map(String::from);
	normalised.metadata.user_id = headers.get("x-user-id").and_then(|v| v.to_str().ok()).map(String::from);
	normalised.metadata.tenant = headers.get("x-tenant-id").and_then(|v| v.to_str().ok()).map(String::from);
	normalised.metadata.source_ip = headers
		.get("x-forwarded-for")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.split(',').next())
		.map(|s| s.trim().to_string());
}

/// A single vendor dialect recogniser. Parsers are pure functions of the
/// request's URL/headers and body bytes: no shared state, no I/O.
pub trait Parser: Send + Sync {
	fn name(&self) -> &str;

	/// Returns `None` if this parser does not recognise the request at all
	/// (registry tries the next one); `Some(Err(_))` if it recognised the
	/// dialect but the body was malformed for it (registry stops and fails
	/// the request rather than falling through).
	fn try_parse(&self, req: &Request, body: &[u8]) -> Option<anyhow::Result<NormalisedRequest>>;
}

pub struct ParserRegistry {
	parsers: Vec<Arc<dyn Parser>>,
}

impl ParserRegistry {
	pub fn new(parsers: Vec<Arc<dyn Parser>>) -> Self {
		ParserRegistry { parsers }
	}

	pub fn with_default_parsers() -> Self {
		ParserRegistry::new(vec![
			Arc::new(openai::OpenAiParser),
			Arc::new(anthropic::AnthropicParser),
			Arc::new(google::GoogleParser),
			Arc::new(cohere::CohereParser),
			Arc::new(huggingface::HuggingFaceParser),
		])
	}

	/// Security-critical: when no parser succeeds there is no pass-through.
	/// The request is rejected rather than forwarded unscanned.
	pub fn parse(&self, req: &Request, body: &[u8]) -> Result<NormalisedRequest, PipelineError> {
		for parser in &self.parsers {
			if let Some(result) = parser.try_parse(req, body) {
				let mut normalised = result.map_err(|e| PipelineError::InvalidRequest(format!("{}: {e}", parser.name())))?;
				populate_transport_metadata(&mut normalised, req);
				return Ok(normalised);
			}
		}
		Err(PipelineError::ParseFailure)
	}
}

impl Default for ParserRegistry {
	fn default() -> Self {
		Self::with_default_parsers()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unrecognised_request_is_parse_failure() {
		let registry = ParserRegistry::with_default_parsers();
		let req = ::http::Request::builder()
			.uri("https://example.com/unknown")
			.body(crate::http::Body::empty())
			.unwrap();
		let err = registry.parse(&req, b"{}").unwrap_err();
		assert!(matches!(err, PipelineError::ParseFailure));
	}

	#[test]
	fn transport_metadata_is_populated_from_headers() {
		let registry = ParserRegistry::with_default_parsers();
		let req = ::http::Request::builder()
			.uri("https://api.openai.com/v1/chat/completions")
			.header("user-agent", "my-sdk/1.0")
			.header("x-user-id", "u-42")
			.header("x-forwarded-for", "203.0.113.5, 10.0.0.1")
			.body(crate::http::Body::empty())
			.unwrap();
		let body = br#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#;
		let normalised = registry.parse(&req, body).unwrap();
		assert_eq!(normalised.metadata.user_agent.as_deref(), Some("my-sdk/1.0"));
		assert_eq!(normalised.metadata.user_id.as_deref(), Some("u-42"));
		assert_eq!(normalised.metadata.source_ip.as_deref(), Some("203.0.113.5"));
	}
}
